use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Monotonic engine clock plus the ability to wake a suspended render context.
pub trait HostClock: Send + Sync {
    /// Engine time in seconds.
    fn now(&self) -> f64;

    fn is_suspended(&self) -> bool {
        false
    }

    /// Ask the host to resume rendering. No-op when already running.
    fn resume(&self) {}
}

/// Clock driven by the render context: one tick per rendered frame.
///
/// Time only moves in whole render quanta, and not at all while suspended.
pub struct SampleClock {
    frames: AtomicU64,
    sample_rate: u32,
    suspended: AtomicBool,
}

impl SampleClock {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            frames: AtomicU64::new(0),
            sample_rate,
            suspended: AtomicBool::new(false),
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    /// Called by the render context after each quantum.
    pub fn advance(&self, frames: u64) {
        self.frames.fetch_add(frames, Ordering::AcqRel);
    }

    pub fn suspend(&self) {
        self.suspended.store(true, Ordering::Release);
    }
}

impl HostClock for SampleClock {
    fn now(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire)
    }

    fn resume(&self) {
        self.suspended.store(false, Ordering::Release);
    }
}
