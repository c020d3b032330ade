//! Boundary to the privileged I/O service that owns the SD host controller.
//!
//! Every call is synchronous. Status values follow the service convention:
//! negative means failure, anything else is success.

pub type IosFd = i32;

pub const IPC_OK: i32 = 0;
pub const IPC_EINVAL: i32 = -4;
pub const IPC_ENOENT: i32 = -6;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IosOpenMode {
    None,
    Read,
    Write,
    ReadWrite,
}

impl IosOpenMode {
    pub const fn as_u32(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Read => 1,
            Self::Write => 2,
            Self::ReadWrite => 3,
        }
    }

    pub const fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Read),
            2 => Some(Self::Write),
            3 => Some(Self::ReadWrite),
            _ => None,
        }
    }
}

/// One scatter/gather segment of an `ioctlv` call.
#[derive(Debug)]
pub enum IoVec<'a> {
    Null,
    /// Read by the service.
    Input(&'a [u8]),
    /// Written by the service.
    Output(&'a mut [u8]),
}

impl IoVec<'_> {
    pub fn len(&self) -> usize {
        match self {
            Self::Null => 0,
            Self::Input(bytes) => bytes.len(),
            Self::Output(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub trait IosService {
    fn open(&mut self, path: &str, mode: IosOpenMode) -> i32;

    fn close(&mut self, fd: IosFd) -> i32;

    fn ioctl(&mut self, fd: IosFd, ioctl: u32, input: &[u8], output: &mut [u8]) -> i32;

    /// `num_in` and `num_io` follow the service's own convention for the opcode;
    /// the [`IoVec`] variant of each segment carries its actual direction.
    fn ioctlv(
        &mut self,
        fd: IosFd,
        ioctl: u32,
        num_in: usize,
        num_io: usize,
        vectors: &mut [IoVec<'_>],
    ) -> i32;
}

/// Data cache maintenance for memory shared with the service.
pub trait CacheMaintenance {
    /// Write dirty lines back so the service observes CPU writes.
    fn flush_range(&mut self, addr: usize, len: usize);

    /// Drop cached lines so the CPU observes service writes.
    fn invalidate_range(&mut self, addr: usize, len: usize);
}
