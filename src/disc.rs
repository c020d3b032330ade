//! Block-device record consumed by a FAT-style storage stack.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use sdio::{CacheMaintenance, IosService};

use crate::slot::SdSlot;

/// Four-character device tag `WISD`.
pub const DEVICE_TYPE_WII_SD: u32 = u32::from_be_bytes(*b"WISD");

pub const FEATURE_MEDIUM_CANREAD: u32 = 0x0000_0001;
pub const FEATURE_MEDIUM_CANWRITE: u32 = 0x0000_0002;
pub const FEATURE_WII_SD: u32 = 0x0000_0100;

/// Sector-addressed medium with the classic boolean-result calling convention.
///
/// Sectors are 512 bytes and addressed with 32-bit numbers.
pub trait DiscInterface {
    fn io_type(&self) -> u32;
    fn features(&self) -> u32;
    fn startup(&mut self) -> bool;
    fn is_inserted(&mut self) -> bool;
    fn read_sectors(&mut self, sector: u32, count: u32, buffer: &mut [u8]) -> bool;
    fn write_sectors(&mut self, sector: u32, count: u32, buffer: &[u8]) -> bool;
    fn clear_status(&mut self) -> bool;
    fn shutdown(&mut self) -> bool;
}

impl<I, C, D, L> DiscInterface for SdSlot<I, C, D, L>
where
    I: IosService,
    C: CacheMaintenance,
    D: DelayNs,
    L: OutputPin,
{
    fn io_type(&self) -> u32 {
        DEVICE_TYPE_WII_SD
    }

    fn features(&self) -> u32 {
        FEATURE_MEDIUM_CANREAD | FEATURE_MEDIUM_CANWRITE | FEATURE_WII_SD
    }

    fn startup(&mut self) -> bool {
        self.start().is_ok()
    }

    fn is_inserted(&mut self) -> bool {
        SdSlot::is_inserted(self).unwrap_or(false)
    }

    fn read_sectors(&mut self, sector: u32, count: u32, buffer: &mut [u8]) -> bool {
        SdSlot::read_sectors(self, sector, count, buffer).is_ok()
    }

    fn write_sectors(&mut self, sector: u32, count: u32, buffer: &[u8]) -> bool {
        SdSlot::write_sectors(self, sector, count, buffer).is_ok()
    }

    fn clear_status(&mut self) -> bool {
        SdSlot::clear_status(self).is_ok()
    }

    fn shutdown(&mut self) -> bool {
        SdSlot::shutdown(self).is_ok()
    }
}
