use embedded_hal::delay::DelayNs;

/// Free-running 32-bit hardware counter.
pub trait TickSource {
    fn now(&self) -> u32;
}

pub const HOLLYWOOD_TIMER_ADDR: usize = 0x0D80_0010;
pub const TICKS_PER_US: u32 = 2;
pub const TICKS_PER_MS: u32 = 2048;
const MAX_SPIN_TICKS: u32 = 0x8000_0000;

/// Counter register of the Hollywood starlet timer.
pub struct HollywoodTimer {
    reg: *const u32,
}

impl HollywoodTimer {
    /// # Safety
    /// `addr` must map the timer register for the lifetime of the value.
    pub const unsafe fn new(addr: usize) -> Self {
        Self {
            reg: addr as *const u32,
        }
    }
}

impl TickSource for HollywoodTimer {
    #[inline(always)]
    fn now(&self) -> u32 {
        unsafe { core::ptr::read_volatile(self.reg) }
    }
}

/// Busy-wait delay on top of a [`TickSource`]. Not cancellable.
pub struct TickDelay<T> {
    source: T,
}

impl<T: TickSource> TickDelay<T> {
    pub fn new(source: T) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &T {
        &self.source
    }

    fn spin_ticks(&mut self, ticks: u64) {
        let mut remaining = ticks;
        while remaining > 0 {
            let chunk = remaining.min(MAX_SPIN_TICKS as u64) as u32;
            self.spin_chunk(chunk);
            remaining -= chunk as u64;
        }
    }

    // `ticks` is at most half the counter period so the wrapping difference cannot alias.
    fn spin_chunk(&mut self, ticks: u32) {
        let start = self.source.now();
        while self.source.now().wrapping_sub(start) <= ticks {
            core::hint::spin_loop();
        }
    }
}

impl<T: TickSource> DelayNs for TickDelay<T> {
    fn delay_ns(&mut self, ns: u32) {
        self.delay_us(ns.div_ceil(1000));
    }

    fn delay_us(&mut self, us: u32) {
        self.spin_ticks(us as u64 * TICKS_PER_US as u64);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.spin_ticks(ms as u64 * TICKS_PER_MS as u64);
    }
}
