use embedded_hal::delay::DelayNs;

use super::codec::{decode_word, HcrQuery, HCR_VALUE_LEN};
use super::session::{
    ios_status, SdioError, SdioHost, SdioResult, IOCTL_SDIO_READHCREG, IOCTL_SDIO_WRITEHCREG,
    SDIO_HCR_POLL_ATTEMPTS, SDIO_HCR_POLL_INTERVAL_MS,
};
use crate::dma::{DmaAligned, DmaRegion};
use crate::ios::{CacheMaintenance, IosService};

/// Polarity a masked register value is waited for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BitsState {
    Set,
    Clear,
}

impl BitsState {
    fn matches(self, value: u32, mask: u32) -> bool {
        match self {
            Self::Set => value & mask != 0,
            Self::Clear => value & mask == 0,
        }
    }
}

fn check_size(size: u8) -> SdioResult<()> {
    match size {
        1 | 2 | 4 => Ok(()),
        _ => Err(SdioError::InvalidArgument),
    }
}

impl<I, C, D> SdioHost<I, C, D>
where
    I: IosService,
    C: CacheMaintenance,
    D: DelayNs,
{
    pub fn read_hcr(&mut self, reg: u8, size: u8) -> SdioResult<u32> {
        check_size(size)?;
        let fd = self.require_fd()?;
        let query = DmaAligned(
            HcrQuery {
                reg,
                size,
                value: 0,
            }
            .encode(),
        );
        let mut value = DmaAligned([0u8; HCR_VALUE_LEN]);

        DmaRegion::of(&query.0).prepare_for_device(&mut self.cache);
        let ret = self
            .ios
            .ioctl(fd, IOCTL_SDIO_READHCREG, &query.0, &mut value.0);
        ios_status(ret)?;
        DmaRegion::of(&value.0).prepare_for_host(&mut self.cache);
        Ok(decode_word(&value.0))
    }

    pub fn write_hcr(&mut self, reg: u8, size: u8, value: u32) -> SdioResult<()> {
        check_size(size)?;
        let fd = self.require_fd()?;
        let query = DmaAligned(HcrQuery { reg, size, value }.encode());

        DmaRegion::of(&query.0).prepare_for_device(&mut self.cache);
        let ret = self
            .ios
            .ioctl(fd, IOCTL_SDIO_WRITEHCREG, &query.0, &mut []);
        ios_status(ret).map(|_| ())
    }

    /// Poll until `value & mask` reaches `want`, within the fixed 10 x 10 ms budget.
    pub fn wait_hcr(&mut self, reg: u8, size: u8, want: BitsState, mask: u32) -> SdioResult<()> {
        for _ in 0..SDIO_HCR_POLL_ATTEMPTS {
            let value = self.read_hcr(reg, size)?;
            if want.matches(value, mask) {
                return Ok(());
            }
            self.delay.delay_ms(SDIO_HCR_POLL_INTERVAL_MS);
        }
        log::warn!(
            "sdio: hcr {:#04x} mask={:#x} never {:?}",
            reg,
            mask,
            want
        );
        Err(SdioError::Timeout)
    }
}
