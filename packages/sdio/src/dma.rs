use crate::ios::CacheMaintenance;

pub const DMA_ALIGN: usize = 32;

/// Wrapper that places `T` on a DMA-safe boundary, including on the stack.
#[repr(C, align(32))]
#[derive(Clone, Copy, Debug, Default)]
pub struct DmaAligned<T>(pub T);

pub fn is_dma_aligned(ptr: *const u8) -> bool {
    (ptr as usize) & (DMA_ALIGN - 1) == 0
}

/// Memory region handed across the IOS boundary.
///
/// `prepare_for_device` must run after the last CPU write and before the call;
/// `prepare_for_host` must run after the call and before the first CPU read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DmaRegion {
    addr: usize,
    len: usize,
}

impl DmaRegion {
    pub fn of(bytes: &[u8]) -> Self {
        Self {
            addr: bytes.as_ptr() as usize,
            len: bytes.len(),
        }
    }

    pub fn addr(&self) -> usize {
        self.addr
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_aligned(&self) -> bool {
        self.addr & (DMA_ALIGN - 1) == 0
    }

    pub fn prepare_for_device<C: CacheMaintenance>(&self, cache: &mut C) {
        if self.is_empty() {
            return;
        }
        cache.flush_range(self.addr, self.len);
    }

    pub fn prepare_for_host<C: CacheMaintenance>(&self, cache: &mut C) {
        if self.is_empty() {
            return;
        }
        cache.invalidate_range(self.addr, self.len);
    }
}
