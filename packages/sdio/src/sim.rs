//! In-memory stand-in for the SDIO service and its platform collaborators.
//!
//! `SimIos` keeps a host-controller register file, a card with flat sector
//! storage and a log of every call, so bring-up and transfer paths can be
//! driven without hardware.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;
use core::convert::Infallible;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, OutputPin};

use crate::host::codec::{encode_word, HcrQuery, SdioRequest, SdioResponse, HCR_VALUE_LEN};
use crate::host::{
    IOCTL_SDIO_GETSTATUS, IOCTL_SDIO_READHCREG, IOCTL_SDIO_RESETCARD, IOCTL_SDIO_SENDCMD,
    IOCTL_SDIO_SETCLK, IOCTL_SDIO_WRITEHCREG, SDIOHCR_SOFTWARERESET, SDIO_ACMD_SETBUSWIDTH,
    SDIO_CMD_APPCMD, SDIO_CMD_READBLOCK, SDIO_CMD_READMULTIBLOCK, SDIO_CMD_SELECT,
    SDIO_CMD_SENDSTATUS, SDIO_CMD_SETBLOCKLEN, SDIO_CMD_WRITEBLOCK, SDIO_CMD_WRITEMULTIBLOCK,
    SDIO_SLOT0_PATH, SDIO_STATUS_CARD_INITIALIZED, SDIO_STATUS_CARD_SDHC,
};
use crate::ios::{CacheMaintenance, IoVec, IosFd, IosOpenMode, IosService, IPC_EINVAL, IPC_ENOENT};
use crate::SDIO_SECTOR_SIZE;

const SIM_FIRST_FD: IosFd = 3;
const CARD_STATE_STANDBY: u32 = 3;
const CARD_STATE_TRANSFER: u32 = 4;
const CARD_STATUS_APP_CMD: u32 = 1 << 5;

/// One call observed by [`SimIos`], in arrival order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SimCall {
    Open { path: String, mode: IosOpenMode },
    Close { fd: IosFd },
    Ioctl { op: u32 },
    Ioctlv { op: u32, num_in: usize, num_io: usize },
}

#[derive(Debug)]
pub struct SimIos {
    path: String,
    status: u32,
    fd: Option<IosFd>,
    next_fd: IosFd,
    regs: BTreeMap<u8, u32>,
    reset_polls: u32,
    reset_reads_left: Option<u32>,
    reset_issued: bool,
    initialize_after_reset: bool,
    storage: Vec<u8>,
    rca: u16,
    selected: bool,
    app_cmd: bool,
    block_len: u32,
    bus_width: u8,
    clock: bool,
    open_failure: Option<i32>,
    close_failure: Option<i32>,
    ioctl_failures: BTreeMap<u32, i32>,
    command_failures: BTreeMap<u8, i32>,
    calls: Vec<SimCall>,
    commands: Vec<SdioRequest>,
}

impl SimIos {
    /// Slot whose controller reports `status` and whose card holds `sectors` zeroed sectors.
    pub fn new(status: u32, sectors: usize) -> Self {
        Self {
            path: SDIO_SLOT0_PATH.to_string(),
            status,
            fd: None,
            next_fd: SIM_FIRST_FD,
            regs: BTreeMap::new(),
            reset_polls: 0,
            reset_reads_left: None,
            reset_issued: false,
            initialize_after_reset: false,
            storage: vec![0; sectors * SDIO_SECTOR_SIZE],
            rca: 0x0001,
            selected: false,
            app_cmd: false,
            block_len: SDIO_SECTOR_SIZE as u32,
            bus_width: 1,
            clock: false,
            open_failure: None,
            close_failure: None,
            ioctl_failures: BTreeMap::new(),
            command_failures: BTreeMap::new(),
            calls: Vec::new(),
            commands: Vec::new(),
        }
    }

    pub fn with_path(mut self, path: &str) -> Self {
        self.path = path.to_string();
        self
    }

    pub fn with_rca(mut self, rca: u16) -> Self {
        self.rca = rca;
        self
    }

    /// Software-reset bits stay set for `polls` reads before clearing.
    pub fn with_reset_polls(mut self, polls: u32) -> Self {
        self.reset_polls = polls;
        self
    }

    /// Controller reports the card initialized once reset and reopened.
    pub fn initialize_after_reset(mut self, enabled: bool) -> Self {
        self.initialize_after_reset = enabled;
        self
    }

    pub fn fail_open(&mut self, code: i32) {
        self.open_failure = Some(code);
    }

    /// Close reports `code` and the handle stays open on the service side.
    pub fn fail_close(&mut self, code: i32) {
        self.close_failure = Some(code);
    }

    pub fn fail_ioctl(&mut self, op: u32, code: i32) {
        self.ioctl_failures.insert(op, code);
    }

    pub fn fail_command(&mut self, cmd: u8, code: i32) {
        self.command_failures.insert(cmd, code);
    }

    pub fn clear_failures(&mut self) {
        self.open_failure = None;
        self.close_failure = None;
        self.ioctl_failures.clear();
        self.command_failures.clear();
    }

    pub fn calls(&self) -> &[SimCall] {
        &self.calls
    }

    pub fn commands(&self) -> &[SdioRequest] {
        &self.commands
    }

    pub fn command_count(&self, cmd: u8) -> usize {
        self.commands
            .iter()
            .filter(|request| request.cmd == cmd as u32)
            .count()
    }

    pub fn clear_log(&mut self) {
        self.calls.clear();
        self.commands.clear();
    }

    pub fn status(&self) -> u32 {
        self.status
    }

    pub fn set_status(&mut self, status: u32) {
        self.status = status;
    }

    pub fn register(&self, reg: u8) -> Option<u32> {
        self.regs.get(&reg).copied()
    }

    pub fn set_register(&mut self, reg: u8, value: u32) {
        self.regs.insert(reg, value);
    }

    pub fn is_open(&self) -> bool {
        self.fd.is_some()
    }

    pub fn card_selected(&self) -> bool {
        self.selected
    }

    pub fn card_block_len(&self) -> u32 {
        self.block_len
    }

    pub fn card_bus_width(&self) -> u8 {
        self.bus_width
    }

    pub fn clock_enabled(&self) -> bool {
        self.clock
    }

    pub fn storage(&self) -> &[u8] {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut [u8] {
        &mut self.storage
    }

    pub fn sector(&self, sector: usize) -> &[u8] {
        let start = sector * SDIO_SECTOR_SIZE;
        &self.storage[start..start + SDIO_SECTOR_SIZE]
    }

    fn check_fd(&self, fd: IosFd) -> Result<(), i32> {
        if self.fd == Some(fd) {
            Ok(())
        } else {
            Err(IPC_EINVAL)
        }
    }

    fn write_register(&mut self, query: HcrQuery) {
        let value = query.value & size_mask(query.size);
        if query.reg == SDIOHCR_SOFTWARERESET && value != 0 {
            self.reset_reads_left = Some(self.reset_polls);
            self.reset_issued = true;
            self.selected = false;
        }
        self.regs.insert(query.reg, value);
    }

    fn read_register(&mut self, query: HcrQuery) -> u32 {
        if query.reg == SDIOHCR_SOFTWARERESET {
            match self.reset_reads_left {
                Some(0) => {
                    self.reset_reads_left = None;
                    self.regs.insert(query.reg, 0);
                }
                Some(left) => self.reset_reads_left = Some(left - 1),
                None => {}
            }
        }
        self.regs.get(&query.reg).copied().unwrap_or(0) & size_mask(query.size)
    }

    fn card_status(&self) -> u32 {
        let state = if self.selected {
            CARD_STATE_TRANSFER
        } else {
            CARD_STATE_STANDBY
        };
        let app = if self.app_cmd { CARD_STATUS_APP_CMD } else { 0 };
        (state << 9) | app
    }

    fn byte_offset(&self, arg: u32) -> usize {
        if self.status & SDIO_STATUS_CARD_SDHC != 0 {
            arg as usize * SDIO_SECTOR_SIZE
        } else {
            arg as usize
        }
    }

    fn execute(
        &mut self,
        request: SdioRequest,
        data: Option<&mut IoVec<'_>>,
    ) -> Result<SdioResponse, i32> {
        self.commands.push(request);
        let cmd = request.cmd as u8;
        let app_cmd = core::mem::replace(&mut self.app_cmd, false);
        if let Some(code) = self.command_failures.get(&cmd) {
            return Err(*code);
        }

        if app_cmd {
            match cmd {
                SDIO_ACMD_SETBUSWIDTH => {
                    self.bus_width = if request.arg & 0x3 == 0x2 { 4 } else { 1 };
                    return Ok(self.r1());
                }
                _ => return Err(IPC_EINVAL),
            }
        }

        match cmd {
            SDIO_CMD_SELECT => {
                if request.arg == 0 {
                    self.selected = false;
                } else if (request.arg >> 16) as u16 == self.rca {
                    self.selected = true;
                } else {
                    return Err(IPC_EINVAL);
                }
            }
            SDIO_CMD_SENDSTATUS => {
                if (request.arg >> 16) as u16 != self.rca {
                    return Err(IPC_EINVAL);
                }
            }
            SDIO_CMD_SETBLOCKLEN => {
                if !self.selected || request.arg == 0 {
                    return Err(IPC_EINVAL);
                }
                self.block_len = request.arg;
            }
            SDIO_CMD_APPCMD => {
                if (request.arg >> 16) as u16 != self.rca {
                    return Err(IPC_EINVAL);
                }
                self.app_cmd = true;
            }
            SDIO_CMD_READBLOCK | SDIO_CMD_READMULTIBLOCK => {
                let range = self.data_range(&request)?;
                match data {
                    Some(IoVec::Output(out)) if out.len() >= range.len() => {
                        let len = range.len();
                        out[..len].copy_from_slice(&self.storage[range]);
                    }
                    _ => return Err(IPC_EINVAL),
                }
            }
            SDIO_CMD_WRITEBLOCK | SDIO_CMD_WRITEMULTIBLOCK => {
                let range = self.data_range(&request)?;
                match data {
                    Some(IoVec::Input(input)) if input.len() >= range.len() => {
                        let len = range.len();
                        self.storage[range].copy_from_slice(&input[..len]);
                    }
                    _ => return Err(IPC_EINVAL),
                }
            }
            _ => return Err(IPC_EINVAL),
        }
        Ok(self.r1())
    }

    fn data_range(&self, request: &SdioRequest) -> Result<core::ops::Range<usize>, i32> {
        if !self.selected || !request.is_dma {
            return Err(IPC_EINVAL);
        }
        let start = self.byte_offset(request.arg);
        let len = request.blk_cnt as usize * request.blk_size as usize;
        let end = start.checked_add(len).ok_or(IPC_EINVAL)?;
        if end > self.storage.len() {
            return Err(IPC_EINVAL);
        }
        Ok(start..end)
    }

    fn r1(&self) -> SdioResponse {
        SdioResponse {
            rsp_fields: [self.card_status(), 0, 0],
            acmd12_response: 0,
        }
    }

    fn dispatch_ioctl(&mut self, op: u32, input: &[u8], output: &mut [u8]) -> Result<(), i32> {
        match op {
            IOCTL_SDIO_WRITEHCREG => {
                let query = HcrQuery::decode(input).ok_or(IPC_EINVAL)?;
                self.write_register(query);
            }
            IOCTL_SDIO_READHCREG => {
                let query = HcrQuery::decode(input).ok_or(IPC_EINVAL)?;
                let value = self.read_register(query);
                write_word(output, value)?;
            }
            IOCTL_SDIO_RESETCARD => {
                self.selected = false;
                self.app_cmd = false;
                write_word(output, (self.rca as u32) << 16)?;
            }
            IOCTL_SDIO_GETSTATUS => write_word(output, self.status)?,
            IOCTL_SDIO_SETCLK => {
                let word = input.get(..HCR_VALUE_LEN).ok_or(IPC_EINVAL)?;
                self.clock = word.iter().any(|byte| *byte != 0);
            }
            IOCTL_SDIO_SENDCMD => {
                let request = SdioRequest::decode(input).ok_or(IPC_EINVAL)?;
                let response = self.execute(request, None)?.encode();
                let len = output.len().min(response.len());
                output[..len].copy_from_slice(&response[..len]);
            }
            _ => return Err(IPC_EINVAL),
        }
        Ok(())
    }
}

impl IosService for SimIos {
    fn open(&mut self, path: &str, mode: IosOpenMode) -> i32 {
        self.calls.push(SimCall::Open {
            path: path.to_string(),
            mode,
        });
        if let Some(code) = self.open_failure {
            return code;
        }
        if path != self.path {
            return IPC_ENOENT;
        }
        if self.reset_issued && self.initialize_after_reset {
            self.status |= SDIO_STATUS_CARD_INITIALIZED;
            self.reset_issued = false;
        }
        let fd = self.next_fd;
        self.next_fd += 1;
        self.fd = Some(fd);
        fd
    }

    fn close(&mut self, fd: IosFd) -> i32 {
        self.calls.push(SimCall::Close { fd });
        if let Err(code) = self.check_fd(fd) {
            return code;
        }
        if let Some(code) = self.close_failure {
            return code;
        }
        self.fd = None;
        0
    }

    fn ioctl(&mut self, fd: IosFd, ioctl: u32, input: &[u8], output: &mut [u8]) -> i32 {
        self.calls.push(SimCall::Ioctl { op: ioctl });
        if let Err(code) = self.check_fd(fd) {
            return code;
        }
        if let Some(code) = self.ioctl_failures.get(&ioctl) {
            return *code;
        }
        match self.dispatch_ioctl(ioctl, input, output) {
            Ok(()) => 0,
            Err(code) => code,
        }
    }

    fn ioctlv(
        &mut self,
        fd: IosFd,
        ioctl: u32,
        num_in: usize,
        num_io: usize,
        vectors: &mut [IoVec<'_>],
    ) -> i32 {
        self.calls.push(SimCall::Ioctlv {
            op: ioctl,
            num_in,
            num_io,
        });
        if let Err(code) = self.check_fd(fd) {
            return code;
        }
        if let Some(code) = self.ioctl_failures.get(&ioctl) {
            return *code;
        }
        if ioctl != IOCTL_SDIO_SENDCMD || vectors.len() != 3 || num_in + num_io != 3 {
            return IPC_EINVAL;
        }
        let request = match &vectors[0] {
            IoVec::Input(bytes) => SdioRequest::decode(bytes),
            _ => None,
        };
        let Some(request) = request else {
            return IPC_EINVAL;
        };
        let response = match self.execute(request, Some(&mut vectors[1])) {
            Ok(response) => response.encode(),
            Err(code) => return code,
        };
        match &mut vectors[2] {
            IoVec::Output(out) => {
                let len = out.len().min(response.len());
                out[..len].copy_from_slice(&response[..len]);
                0
            }
            _ => IPC_EINVAL,
        }
    }
}

fn size_mask(size: u8) -> u32 {
    match size {
        1 => 0xFF,
        2 => 0xFFFF,
        _ => u32::MAX,
    }
}

fn write_word(output: &mut [u8], value: u32) -> Result<(), i32> {
    let slot = output.get_mut(..HCR_VALUE_LEN).ok_or(IPC_EINVAL)?;
    slot.copy_from_slice(&encode_word(value));
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheOp {
    Flush { addr: usize, len: usize },
    Invalidate { addr: usize, len: usize },
}

/// Records cache maintenance instead of performing it.
#[derive(Debug, Default)]
pub struct SimCache {
    ops: Vec<CacheOp>,
}

impl SimCache {
    pub fn ops(&self) -> &[CacheOp] {
        &self.ops
    }

    pub fn clear(&mut self) {
        self.ops.clear();
    }

    pub fn flushed(&self, addr: usize) -> bool {
        self.ops
            .iter()
            .any(|op| matches!(op, CacheOp::Flush { addr: a, .. } if *a == addr))
    }

    pub fn invalidated(&self, addr: usize) -> bool {
        self.ops
            .iter()
            .any(|op| matches!(op, CacheOp::Invalidate { addr: a, .. } if *a == addr))
    }
}

impl CacheMaintenance for SimCache {
    fn flush_range(&mut self, addr: usize, len: usize) {
        self.ops.push(CacheOp::Flush { addr, len });
    }

    fn invalidate_range(&mut self, addr: usize, len: usize) {
        self.ops.push(CacheOp::Invalidate { addr, len });
    }
}

/// Delay that only accounts for the time it was asked to wait.
#[derive(Debug, Default)]
pub struct SimDelay {
    elapsed_ns: u64,
    ms_waits: Vec<u32>,
}

impl SimDelay {
    pub fn elapsed_ns(&self) -> u64 {
        self.elapsed_ns
    }

    pub fn ms_waits(&self) -> &[u32] {
        &self.ms_waits
    }
}

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.elapsed_ns += ns as u64;
    }

    fn delay_us(&mut self, us: u32) {
        self.elapsed_ns += us as u64 * 1_000;
    }

    fn delay_ms(&mut self, ms: u32) {
        self.ms_waits.push(ms);
        self.elapsed_ns += ms as u64 * 1_000_000;
    }
}

/// Indicator output that remembers every level it was driven to.
#[derive(Debug, Default)]
pub struct SimIndicator {
    levels: Vec<bool>,
}

impl SimIndicator {
    pub fn is_high(&self) -> bool {
        self.levels.last().copied().unwrap_or(false)
    }

    pub fn levels(&self) -> &[bool] {
        &self.levels
    }

    pub fn raised(&self) -> usize {
        self.levels.iter().filter(|level| **level).count()
    }
}

impl ErrorType for SimIndicator {
    type Error = Infallible;
}

impl OutputPin for SimIndicator {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.levels.push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.levels.push(true);
        Ok(())
    }
}
