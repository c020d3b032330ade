use embedded_hal::delay::DelayNs;

use super::codec::{decode_word, encode_word, CommandType, ResponseType, HCR_VALUE_LEN};
use super::command::SdioCommand;
use super::session::{
    ios_status, SdioError, SdioHost, SdioResult, SlotStatus, IOCTL_SDIO_GETSTATUS,
    IOCTL_SDIO_RESETCARD, IOCTL_SDIO_SETCLK, SDIOHCR_HOSTCONTROL, SDIOHCR_HOSTCONTROL_4BIT,
    SDIO_ACMD_SETBUSWIDTH, SDIO_CMD_APPCMD, SDIO_CMD_DESELECT, SDIO_CMD_SELECT,
    SDIO_CMD_SENDSTATUS, SDIO_CMD_SETBLOCKLEN,
};
use crate::dma::{DmaAligned, DmaRegion};
use crate::ios::{CacheMaintenance, IosService};
use crate::lifecycle::LifecycleEvent;
use crate::SDIO_SECTOR_SIZE;

impl<I, C, D> SdioHost<I, C, D>
where
    I: IosService,
    C: CacheMaintenance,
    D: DelayNs,
{
    /// Reset the card, latch its new relative address and return the low status half.
    pub fn reset_card(&mut self) -> SdioResult<u16> {
        self.rca = 0;
        let fd = self.require_fd()?;
        let mut status = DmaAligned([0u8; HCR_VALUE_LEN]);
        DmaRegion::of(&status.0).prepare_for_device(&mut self.cache);
        let ret = self
            .ios
            .ioctl(fd, IOCTL_SDIO_RESETCARD, &[], &mut status.0);
        self.record(LifecycleEvent::CardReset);
        ios_status(ret)?;
        DmaRegion::of(&status.0).prepare_for_host(&mut self.cache);
        let word = decode_word(&status.0);
        self.rca = (word >> 16) as u16;
        log::debug!("sdio: card reset rca={:#06x} status={:#06x}", self.rca, word & 0xFFFF);
        Ok((word & 0xFFFF) as u16)
    }

    /// Live slot status, queried directly without the command codec.
    pub fn status(&mut self) -> SdioResult<SlotStatus> {
        let fd = self.require_fd()?;
        let mut status = DmaAligned([0u8; HCR_VALUE_LEN]);
        DmaRegion::of(&status.0).prepare_for_device(&mut self.cache);
        let ret = self
            .ios
            .ioctl(fd, IOCTL_SDIO_GETSTATUS, &[], &mut status.0);
        ios_status(ret)?;
        DmaRegion::of(&status.0).prepare_for_host(&mut self.cache);
        Ok(SlotStatus::from_raw(decode_word(&status.0)))
    }

    pub fn set_clock(&mut self, enable: bool) -> SdioResult<()> {
        let fd = self.require_fd()?;
        let clock = DmaAligned(encode_word(enable as u32));
        DmaRegion::of(&clock.0).prepare_for_device(&mut self.cache);
        let ret = self.ios.ioctl(fd, IOCTL_SDIO_SETCLK, &clock.0, &mut []);
        ios_status(ret).map(|_| ())
    }

    pub fn select(&mut self) -> SdioResult<()> {
        let arg = (self.rca as u32) << 16;
        self.send_command(
            SdioCommand::new(SDIO_CMD_SELECT, CommandType::Ac, ResponseType::R1b, arg),
            None,
        )
        .map(|_| ())
    }

    pub fn deselect(&mut self) -> SdioResult<()> {
        self.send_command(
            SdioCommand::new(SDIO_CMD_DESELECT, CommandType::Ac, ResponseType::R1b, 0),
            None,
        )
        .map(|_| ())
    }

    pub fn set_block_length(&mut self, len: u32) -> SdioResult<()> {
        self.send_command(
            SdioCommand::new(SDIO_CMD_SETBLOCKLEN, CommandType::Ac, ResponseType::R1, len),
            None,
        )
        .map(|_| ())
    }

    /// Switch the host controller between 1-bit and 4-bit data lines.
    pub fn set_host_bus_width(&mut self, width: u8) -> SdioResult<()> {
        let mut host_control = self.read_hcr(SDIOHCR_HOSTCONTROL, 1)? & 0xFF;
        host_control &= !SDIOHCR_HOSTCONTROL_4BIT;
        if width == 4 {
            host_control |= SDIOHCR_HOSTCONTROL_4BIT;
        }
        self.write_hcr(SDIOHCR_HOSTCONTROL, 1, host_control)
    }

    /// Ask the card itself to switch bus width (APP_CMD + ACMD6).
    pub fn set_card_bus_width(&mut self, width: u8) -> SdioResult<()> {
        let code = if width == 4 { 0x0002 } else { 0x0000 };
        let arg = (self.rca as u32) << 16;
        self.send_command(
            SdioCommand::new(SDIO_CMD_APPCMD, CommandType::Ac, ResponseType::R1, arg),
            None,
        )?;
        self.send_command(
            SdioCommand::new(SDIO_ACMD_SETBUSWIDTH, CommandType::Ac, ResponseType::R1, code),
            None,
        )
        .map(|_| ())
    }

    /// Card status register (CMD13), first response word.
    pub fn send_status(&mut self) -> SdioResult<u32> {
        let arg = (self.rca as u32) << 16;
        let mut reply = [0u8; 4];
        self.send_command(
            SdioCommand::new(SDIO_CMD_SENDSTATUS, CommandType::Ac, ResponseType::R1, arg),
            Some(&mut reply),
        )?;
        Ok(decode_word(&reply))
    }

    /// Command argument addressing `sector`: byte offset unless the card is high-capacity.
    pub fn sector_address(&self, sector: u32) -> SdioResult<u32> {
        if self.high_capacity {
            return Ok(sector);
        }
        sector
            .checked_mul(SDIO_SECTOR_SIZE as u32)
            .ok_or(SdioError::InvalidArgument)
    }
}
