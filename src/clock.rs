//! Monotonic microsecond clock abstraction (spec.md §4.9: the orchestrator's
//! phase budgets are wall-clock, not iteration counts).
//!
//! The pipeline never touches `std::time` directly so the `std` feature
//! stays optional for a bare-metal embedding with a platform-supplied
//! clock, the same way transport I/O stays behind a trait rather than
//! a concrete socket type.

pub trait Clock: Send + Sync {
    /// Microseconds since an arbitrary fixed epoch chosen at construction.
    /// Only differences between two calls are meaningful.
    fn now_us(&self) -> u64;
}

#[cfg(feature = "std")]
pub struct SystemClock {
    epoch: std::time::Instant,
}

#[cfg(feature = "std")]
impl SystemClock {
    pub fn new() -> Self {
        Self {
            epoch: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl Clock for SystemClock {
    fn now_us(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }
}

/// Manually-advanced clock for deterministic pipeline tests (unit tests
/// in this crate and integration tests driving [`crate::pipeline::Pipeline`]
/// without a real wall clock).
pub struct FakeClock(std::sync::atomic::AtomicU64);

impl FakeClock {
    pub fn new() -> Self {
        Self(std::sync::atomic::AtomicU64::new(0))
    }

    pub fn set(&self, now_us: u64) {
        self.0.store(now_us, std::sync::atomic::Ordering::Relaxed);
    }

    pub fn advance(&self, delta_us: u64) {
        self.0.fetch_add(delta_us, std::sync::atomic::Ordering::Relaxed);
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now_us(&self) -> u64 {
        self.0.load(std::sync::atomic::Ordering::Relaxed)
    }
}
