#![cfg_attr(not(test), no_std)]

#[cfg(any(test, feature = "sim"))]
extern crate alloc;

pub mod dma;
pub mod host;
pub mod ios;
pub mod lifecycle;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
pub mod timing;

pub use dma::{is_dma_aligned, DmaAligned, DmaRegion, DMA_ALIGN};
pub use host::{
    BitsState, CommandType, DataBuffer, ResponseType, SdioCommand, SdioConfig, SdioError,
    SdioHost, SdioResult, SlotStatus,
};
pub use ios::{
    CacheMaintenance, IoVec, IosFd, IosOpenMode, IosService, IPC_EINVAL, IPC_ENOENT, IPC_OK,
};
pub use lifecycle::{CardPhase, LifecycleEvent};
pub use timing::{HollywoodTimer, TickDelay, TickSource};

pub const SDIO_SECTOR_SIZE: usize = 512;
pub const SDIO_PATH_MAX: usize = 64;
