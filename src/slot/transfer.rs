use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use sdio::host::{SDIO_CMD_READMULTIBLOCK, SDIO_CMD_WRITEMULTIBLOCK};
use sdio::{
    is_dma_aligned, CacheMaintenance, CommandType, DataBuffer, IosService, ResponseType,
    SdioCommand, SdioError, SdioResult, SDIO_SECTOR_SIZE,
};

use super::SdSlot;

impl<I, C, D, L> SdSlot<I, C, D, L>
where
    I: IosService,
    C: CacheMaintenance,
    D: DelayNs,
    L: OutputPin,
{
    /// Move `count` sectors starting at `sector` with one data command.
    ///
    /// The buffer is checked before any service call: it must be non-empty,
    /// 32-byte aligned and hold at least `count` sectors. A misaligned buffer
    /// also drives the indicator high. The card is deselected after the
    /// command whatever its outcome.
    pub fn transfer(
        &mut self,
        cmd: u8,
        sector: u32,
        count: u32,
        data: DataBuffer<'_>,
    ) -> SdioResult<()> {
        if data.is_empty() {
            return Err(SdioError::EmptyBuffer);
        }
        if !is_dma_aligned(data.as_bytes().as_ptr()) {
            log::warn!(
                "slot: cmd={} buffer {:p} not dma aligned",
                cmd,
                data.as_bytes().as_ptr()
            );
            let _ = self.indicator.set_high();
            return Err(SdioError::Misaligned);
        }
        if !self.started {
            return Err(SdioError::NotStarted);
        }
        if count == 0 {
            return Err(SdioError::InvalidArgument);
        }
        let needed = count
            .checked_mul(SDIO_SECTOR_SIZE as u32)
            .ok_or(SdioError::InvalidArgument)?;
        if data.len() < needed as usize {
            return Err(SdioError::BufferTooSmall);
        }
        let arg = self.host.sector_address(sector)?;

        #[cfg(feature = "visualize")]
        let _ = self.indicator.set_high();

        let result = self.run_data_command(cmd, arg, count, data);

        #[cfg(feature = "visualize")]
        let _ = self.indicator.set_low();

        result
    }

    pub fn read_sectors(&mut self, sector: u32, count: u32, buffer: &mut [u8]) -> SdioResult<()> {
        self.transfer(
            SDIO_CMD_READMULTIBLOCK,
            sector,
            count,
            DataBuffer::Read(buffer),
        )
    }

    pub fn write_sectors(&mut self, sector: u32, count: u32, buffer: &[u8]) -> SdioResult<()> {
        self.transfer(
            SDIO_CMD_WRITEMULTIBLOCK,
            sector,
            count,
            DataBuffer::Write(buffer),
        )
    }

    fn run_data_command(
        &mut self,
        cmd: u8,
        arg: u32,
        count: u32,
        data: DataBuffer<'_>,
    ) -> SdioResult<()> {
        self.host.select()?;
        let command = SdioCommand::new(cmd, CommandType::Ac, ResponseType::R1, arg).with_data(
            count,
            SDIO_SECTOR_SIZE as u32,
            data,
        );
        let result = self.host.send_command(command, None).map(|_| ());
        if let Err(err) = self.host.deselect() {
            log::warn!("slot: deselect err={:?}", err);
        }
        if let Err(err) = result {
            log::warn!("slot: cmd={} arg={:#010x} count={} err={:?}", cmd, arg, count, err);
        }
        result
    }
}
