use core::fmt;

use embedded_hal::delay::DelayNs;
use heapless::String;

use crate::ios::{CacheMaintenance, IosFd, IosOpenMode, IosService, IPC_EINVAL, IPC_ENOENT};
use crate::lifecycle::{CardPhase, LifecycleApplyStatus, LifecycleEngine, LifecycleEvent};
use crate::SDIO_PATH_MAX;

pub const SDIO_SLOT0_PATH: &str = "/dev/sdio/slot0";

pub const IOCTL_SDIO_WRITEHCREG: u32 = 0x01;
pub const IOCTL_SDIO_READHCREG: u32 = 0x02;
pub const IOCTL_SDIO_READCREG: u32 = 0x03;
pub const IOCTL_SDIO_RESETCARD: u32 = 0x04;
pub const IOCTL_SDIO_WRITECREG: u32 = 0x05;
pub const IOCTL_SDIO_SETCLK: u32 = 0x06;
pub const IOCTL_SDIO_SENDCMD: u32 = 0x07;
pub const IOCTL_SDIO_SETBUSWIDTH: u32 = 0x08;
pub const IOCTL_SDIO_READMCREG: u32 = 0x09;
pub const IOCTL_SDIO_WRITEMCREG: u32 = 0x0A;
pub const IOCTL_SDIO_GETSTATUS: u32 = 0x0B;
pub const IOCTL_SDIO_GETOCR: u32 = 0x0C;
pub const IOCTL_SDIO_READDATA: u32 = 0x0D;
pub const IOCTL_SDIO_WRITEDATA: u32 = 0x0E;

pub const SDIOHCR_RESPONSE: u8 = 0x10;
pub const SDIOHCR_HOSTCONTROL: u8 = 0x28;
pub const SDIOHCR_POWERCONTROL: u8 = 0x29;
pub const SDIOHCR_CLOCKCONTROL: u8 = 0x2C;
pub const SDIOHCR_TIMEOUTCONTROL: u8 = 0x2E;
pub const SDIOHCR_SOFTWARERESET: u8 = 0x2F;

pub const SDIOHCR_HOSTCONTROL_4BIT: u32 = 0x02;
/// Reset-all, reset-CMD and reset-DAT lines together.
pub const SDIOHCR_SOFTWARERESET_ALL: u32 = 0x07;

pub const SDIO_CMD_GOIDLE: u8 = 0x00;
pub const SDIO_CMD_ALL_SENDCID: u8 = 0x02;
pub const SDIO_CMD_SENDRCA: u8 = 0x03;
pub const SDIO_CMD_SELECT: u8 = 0x07;
pub const SDIO_CMD_DESELECT: u8 = 0x07;
pub const SDIO_CMD_SENDIFCOND: u8 = 0x08;
pub const SDIO_CMD_SENDCSD: u8 = 0x09;
pub const SDIO_CMD_SENDCID: u8 = 0x0A;
pub const SDIO_CMD_SENDSTATUS: u8 = 0x0D;
pub const SDIO_CMD_SETBLOCKLEN: u8 = 0x10;
pub const SDIO_CMD_READBLOCK: u8 = 0x11;
pub const SDIO_CMD_READMULTIBLOCK: u8 = 0x12;
pub const SDIO_CMD_WRITEBLOCK: u8 = 0x18;
pub const SDIO_CMD_WRITEMULTIBLOCK: u8 = 0x19;
pub const SDIO_CMD_APPCMD: u8 = 0x37;

pub const SDIO_ACMD_SETBUSWIDTH: u8 = 0x06;
pub const SDIO_ACMD_SENDSCR: u8 = 0x33;
pub const SDIO_ACMD_SENDOPCOND: u8 = 0x29;

pub const SDIO_STATUS_CARD_INSERTED: u32 = 0x00_0001;
pub const SDIO_STATUS_CARD_INITIALIZED: u32 = 0x01_0000;
pub const SDIO_STATUS_CARD_SDHC: u32 = 0x10_0000;

pub const SDIO_HCR_POLL_ATTEMPTS: u32 = 10;
pub const SDIO_HCR_POLL_INTERVAL_MS: u32 = 10;

/// Live slot status word reported by the controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotStatus(u32);

impl SlotStatus {
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn inserted(self) -> bool {
        self.0 & SDIO_STATUS_CARD_INSERTED == SDIO_STATUS_CARD_INSERTED
    }

    pub const fn initialized(self) -> bool {
        self.0 & SDIO_STATUS_CARD_INITIALIZED == SDIO_STATUS_CARD_INITIALIZED
    }

    pub const fn high_capacity(self) -> bool {
        self.0 & SDIO_STATUS_CARD_SDHC != 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SdioError {
    /// Negative status returned by the I/O service.
    Ios(i32),
    InvalidArgument,
    Timeout,
    NotOpen,
    NotInserted,
    /// Controller was not ready; it has been reset and the handle reopened.
    ControllerReset,
    NotStarted,
    Misaligned,
    EmptyBuffer,
    BufferTooSmall,
}

impl SdioError {
    /// Negative status code in the service convention.
    pub const fn code(self) -> i32 {
        match self {
            Self::Ios(code) => code,
            Self::InvalidArgument | Self::Misaligned | Self::EmptyBuffer | Self::BufferTooSmall => {
                IPC_EINVAL
            }
            Self::NotOpen | Self::NotInserted => IPC_ENOENT,
            Self::Timeout | Self::ControllerReset | Self::NotStarted => -1,
        }
    }
}

impl fmt::Display for SdioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ios(code) => write!(f, "ios call failed: {}", code),
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::Timeout => write!(f, "register poll timed out"),
            Self::NotOpen => write!(f, "sdio handle not open"),
            Self::NotInserted => write!(f, "no card inserted"),
            Self::ControllerReset => write!(f, "controller reset, card not ready yet"),
            Self::NotStarted => write!(f, "slot not started"),
            Self::Misaligned => write!(f, "buffer not 32-byte aligned"),
            Self::EmptyBuffer => write!(f, "empty buffer"),
            Self::BufferTooSmall => write!(f, "buffer smaller than transfer"),
        }
    }
}

pub type SdioResult<T> = Result<T, SdioError>;

pub(crate) fn ios_status(ret: i32) -> SdioResult<i32> {
    if ret < 0 {
        Err(SdioError::Ios(ret))
    } else {
        Ok(ret)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SdioConfig {
    pub device_path: String<SDIO_PATH_MAX>,
    pub open_mode: IosOpenMode,
    /// Mode used when the handle is reopened after a controller reset.
    pub reopen_mode: IosOpenMode,
}

impl SdioConfig {
    pub fn with_path(path: &str) -> SdioResult<Self> {
        let mut device_path = String::new();
        device_path
            .push_str(path)
            .map_err(|_| SdioError::InvalidArgument)?;
        Ok(Self {
            device_path,
            ..Self::default()
        })
    }
}

impl Default for SdioConfig {
    fn default() -> Self {
        let mut device_path = String::new();
        let _ = device_path.push_str(SDIO_SLOT0_PATH);
        Self {
            device_path,
            open_mode: IosOpenMode::None,
            reopen_mode: IosOpenMode::Read,
        }
    }
}

/// Open session with the SD host controller service.
pub struct SdioHost<I, C, D> {
    pub(crate) ios: I,
    pub(crate) cache: C,
    pub(crate) delay: D,
    config: SdioConfig,
    fd: Option<IosFd>,
    pub(crate) rca: u16,
    pub(crate) high_capacity: bool,
    pub(crate) card_initialized: bool,
    lifecycle: LifecycleEngine,
}

impl<I, C, D> SdioHost<I, C, D>
where
    I: IosService,
    C: CacheMaintenance,
    D: DelayNs,
{
    pub fn new(ios: I, cache: C, delay: D, config: SdioConfig) -> Self {
        Self {
            ios,
            cache,
            delay,
            config,
            fd: None,
            rca: 0,
            high_capacity: false,
            card_initialized: false,
            lifecycle: LifecycleEngine::new(),
        }
    }

    pub fn config(&self) -> &SdioConfig {
        &self.config
    }

    pub fn ios(&self) -> &I {
        &self.ios
    }

    pub fn ios_mut(&mut self) -> &mut I {
        &mut self.ios
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn delay(&self) -> &D {
        &self.delay
    }

    pub fn fd(&self) -> Option<IosFd> {
        self.fd
    }

    pub fn is_open(&self) -> bool {
        self.fd.is_some()
    }

    /// Relative card address; meaningful only while the card is initialized.
    pub fn rca(&self) -> u16 {
        self.rca
    }

    pub fn is_high_capacity(&self) -> bool {
        self.high_capacity
    }

    pub fn is_card_initialized(&self) -> bool {
        self.card_initialized
    }

    pub fn phase(&self) -> CardPhase {
        self.lifecycle.phase()
    }

    pub fn open(&mut self) -> SdioResult<()> {
        if self.fd.is_some() {
            return Ok(());
        }
        self.open_with(self.config.open_mode)
    }

    pub fn close(&mut self) -> SdioResult<()> {
        let Some(fd) = self.fd.take() else {
            return Ok(());
        };
        self.rca = 0;
        self.high_capacity = false;
        self.card_initialized = false;
        self.record(LifecycleEvent::Closed);
        let ret = self.ios.close(fd);
        if ret < 0 {
            log::warn!("sdio: close fd={} err={}", fd, ret);
        }
        ios_status(ret).map(|_| ())
    }

    /// Close and open again with the configured reopen mode.
    pub fn reopen(&mut self) -> SdioResult<()> {
        let _ = self.close();
        self.open_with(self.config.reopen_mode)
    }

    fn open_with(&mut self, mode: IosOpenMode) -> SdioResult<()> {
        let ret = self.ios.open(self.config.device_path.as_str(), mode);
        if ret < 0 {
            log::warn!(
                "sdio: open {} mode={:?} err={}",
                self.config.device_path.as_str(),
                mode,
                ret
            );
            return Err(SdioError::Ios(ret));
        }
        log::debug!("sdio: opened {} fd={}", self.config.device_path.as_str(), ret);
        self.fd = Some(ret);
        self.record(LifecycleEvent::Opened);
        Ok(())
    }

    pub(crate) fn require_fd(&self) -> SdioResult<IosFd> {
        self.fd.ok_or(SdioError::NotOpen)
    }

    pub(crate) fn record(&mut self, event: LifecycleEvent) {
        let before = self.lifecycle.phase();
        if matches!(
            self.lifecycle.apply(event),
            LifecycleApplyStatus::InvalidTransition
        ) {
            log::warn!("sdio: unexpected {:?} in phase {:?}", event, before);
        }
    }
}
