#![cfg_attr(not(test), no_std)]

pub mod disc;
pub mod slot;

pub use disc::{
    DiscInterface, DEVICE_TYPE_WII_SD, FEATURE_MEDIUM_CANREAD, FEATURE_MEDIUM_CANWRITE,
    FEATURE_WII_SD,
};
pub use sdio;
pub use slot::SdSlot;
