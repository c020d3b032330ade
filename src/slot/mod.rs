//! Public driver surface for the front SD slot.

mod transfer;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use sdio::{CacheMaintenance, IosService, SdioError, SdioHost, SdioResult};

/// Started/stopped wrapper around one [`SdioHost`] session.
///
/// Every transfer requires the most recent [`SdSlot::start`] to have succeeded
/// with no [`SdSlot::stop`] in between.
pub struct SdSlot<I, C, D, L> {
    host: SdioHost<I, C, D>,
    indicator: L,
    started: bool,
}

impl<I, C, D, L> SdSlot<I, C, D, L>
where
    I: IosService,
    C: CacheMaintenance,
    D: DelayNs,
    L: OutputPin,
{
    pub fn new(host: SdioHost<I, C, D>, indicator: L) -> Self {
        Self {
            host,
            indicator,
            started: false,
        }
    }

    pub fn host(&self) -> &SdioHost<I, C, D> {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut SdioHost<I, C, D> {
        &mut self.host
    }

    pub fn indicator(&self) -> &L {
        &self.indicator
    }

    pub fn into_parts(self) -> (SdioHost<I, C, D>, L) {
        (self.host, self.indicator)
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Open the service and bring the card up. Already started is a no-op.
    pub fn start(&mut self) -> SdioResult<()> {
        if self.started {
            return Ok(());
        }

        if let Err(err) = self.host.open() {
            log::warn!("slot: open err={:?}", err);
            self.teardown();
            return Err(err);
        }

        if let Err(err) = self.host.init_io() {
            log::warn!("slot: bring-up err={:?}", err);
            self.teardown();
            return Err(err);
        }

        self.started = true;
        log::info!(
            "slot: started sdhc={} rca={:#06x}",
            self.host.is_high_capacity(),
            self.host.rca()
        );
        Ok(())
    }

    /// A failed close is logged; the slot is stopped either way.
    pub fn stop(&mut self) -> SdioResult<()> {
        if !self.started {
            return Err(SdioError::NotStarted);
        }
        self.teardown();
        log::info!("slot: stopped");
        Ok(())
    }

    pub fn shutdown(&mut self) -> SdioResult<()> {
        self.stop()
    }

    pub fn is_inserted(&mut self) -> SdioResult<bool> {
        self.host.status().map(|status| status.inserted())
    }

    pub fn is_initialized(&mut self) -> SdioResult<bool> {
        self.host.status().map(|status| status.initialized())
    }

    /// The controller keeps no error status apart from the live status word.
    pub fn clear_status(&mut self) -> SdioResult<()> {
        Ok(())
    }

    // Every failed startup path funnels through here.
    fn teardown(&mut self) {
        self.started = false;
        if let Err(err) = self.host.close() {
            log::warn!("slot: close err={:?}", err);
        }
    }
}
