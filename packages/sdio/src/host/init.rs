use embedded_hal::delay::DelayNs;

use super::regs::BitsState;
use super::session::{
    SdioError, SdioHost, SdioResult, SlotStatus, SDIOHCR_SOFTWARERESET,
    SDIOHCR_SOFTWARERESET_ALL,
};
use crate::ios::{CacheMaintenance, IosService};
use crate::lifecycle::LifecycleEvent;
use crate::SDIO_SECTOR_SIZE;

const BUS_WIDTH_4BIT: u8 = 4;

impl<I, C, D> SdioHost<I, C, D>
where
    I: IosService,
    C: CacheMaintenance,
    D: DelayNs,
{
    /// Reset the card and configure it for 4-bit, 512-byte block transfers.
    ///
    /// A controller that has not finished its own card initialization is
    /// software-reset and the handle reopened; that single attempt reports
    /// [`SdioError::ControllerReset`] and the caller decides whether to retry.
    pub fn init_io(&mut self) -> SdioResult<()> {
        if let Err(err) = self.reset_card() {
            log::warn!("sdio: card reset err={:?}", err);
        }

        let status = match self.status() {
            Ok(status) => status,
            Err(err) => {
                self.record(LifecycleEvent::BringUpFailed);
                return Err(err);
            }
        };
        self.record(LifecycleEvent::StatusRead(status));

        if !status.inserted() {
            log::info!("sdio: no card in slot (status={:#08x})", status.raw());
            self.record(LifecycleEvent::CardAbsent);
            return Err(SdioError::NotInserted);
        }

        if !status.initialized() {
            self.record(LifecycleEvent::ControllerNotReady);
            self.reset_controller();
            return Err(SdioError::ControllerReset);
        }

        self.record(LifecycleEvent::BringUpStarted);
        match self.bring_up(status) {
            Ok(()) => {
                self.card_initialized = true;
                self.record(LifecycleEvent::BringUpSucceeded);
                log::info!(
                    "sdio: card ready rca={:#06x} sdhc={}",
                    self.rca,
                    self.high_capacity
                );
                Ok(())
            }
            Err(err) => {
                self.record(LifecycleEvent::BringUpFailed);
                log::warn!("sdio: bring-up err={:?}", err);
                Err(err)
            }
        }
    }

    fn bring_up(&mut self, status: SlotStatus) -> SdioResult<()> {
        self.high_capacity = status.high_capacity();

        self.set_host_bus_width(BUS_WIDTH_4BIT)?;
        self.set_clock(true)?;
        self.select()?;

        // Once selected, every exit path deselects.
        if let Err(err) = self.set_block_length(SDIO_SECTOR_SIZE as u32) {
            let _ = self.deselect();
            return Err(err);
        }
        let result = self.set_card_bus_width(BUS_WIDTH_4BIT);
        let _ = self.deselect();
        result
    }

    fn reset_controller(&mut self) {
        log::info!("sdio: controller not ready, resetting");
        if let Err(err) = self.write_hcr(SDIOHCR_SOFTWARERESET, 1, SDIOHCR_SOFTWARERESET_ALL) {
            log::warn!("sdio: software reset err={:?}", err);
        }
        if let Err(err) = self.wait_hcr(
            SDIOHCR_SOFTWARERESET,
            1,
            BitsState::Clear,
            SDIOHCR_SOFTWARERESET_ALL,
        ) {
            log::warn!("sdio: software reset wait err={:?}", err);
        }
        if let Err(err) = self.reopen() {
            log::warn!("sdio: reopen after reset err={:?}", err);
        }
    }
}
