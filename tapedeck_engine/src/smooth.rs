//! Smoothed control values for click-free parameter changes.
//!
//! A [`SmoothedParameter`] approaches its target exponentially:
//! `current += (target - current) * (1 - exp(-dt / tau))`.
//! The step coefficient is always in (0, 1], so the value never overshoots.
//!
//! [`SharedParam`] is the one-way publication cell between contexts: the control
//! context stores a target, the render context loads it at the start of each
//! quantum and feeds it to its own `SmoothedParameter`.
//!
//! ```
//! use tapedeck_engine::smooth::SmoothedParameter;
//!
//! // 10ms time constant at 48kHz
//! let mut gain = SmoothedParameter::new(1.0, 0.010, 48_000.0);
//! gain.set_target(0.5);
//!
//! let mut block = [1.0f32; 128];
//! gain.apply_gain(&mut block);
//! assert!(block[127] < 1.0 && block[127] > 0.5);
//! ```

use std::sync::atomic::{AtomicU32, Ordering};

/// Relative distance below which the value snaps onto the target.
const SNAP_EPSILON: f32 = 1e-4;

#[derive(Debug, Clone)]
pub struct SmoothedParameter {
    current: f32,
    target: f32,
    time_constant: f32,
    /// `1 - exp(-1/(tau * sr))`, the per-sample step.
    coeff: f32,
}

impl SmoothedParameter {
    pub fn new(initial: f32, time_constant_secs: f32, sample_rate: f32) -> Self {
        let time_constant = time_constant_secs.max(f32::EPSILON);
        Self {
            current: initial,
            target: initial,
            time_constant,
            coeff: step_coeff(1.0 / sample_rate.max(1.0), time_constant),
        }
    }

    #[inline]
    pub fn set_target(&mut self, target: f32) {
        self.target = target;
    }

    #[inline]
    pub fn set_immediate(&mut self, value: f32) {
        self.current = value;
        self.target = value;
    }

    /// Advance by one sample and return the new current value.
    #[inline]
    pub fn next_sample(&mut self) -> f32 {
        self.step(self.coeff);
        self.current
    }

    /// Advance by an arbitrary interval, e.g. one animation tick.
    pub fn advance(&mut self, dt_secs: f32) -> f32 {
        if dt_secs > 0.0 {
            self.step(step_coeff(dt_secs, self.time_constant));
        }
        self.current
    }

    #[inline]
    fn step(&mut self, coeff: f32) {
        let diff = self.target - self.current;
        let next = self.current + diff * coeff;
        // f32 stalls short of the target once the step is below half an ulp
        if next == self.current || diff.abs() <= SNAP_EPSILON * self.target.abs().max(1.0) {
            self.current = self.target;
        } else {
            self.current = next;
        }
    }

    #[inline]
    pub fn current(&self) -> f32 {
        self.current
    }

    #[inline]
    pub fn target(&self) -> f32 {
        self.target
    }

    #[inline]
    pub fn is_smoothing(&self) -> bool {
        self.current != self.target
    }

    #[inline]
    pub fn apply_gain(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample *= self.next_sample();
        }
    }
}

#[inline]
fn step_coeff(dt: f32, time_constant: f32) -> f32 {
    (1.0 - (-dt / time_constant).exp()).clamp(0.0, 1.0)
}

/// Lock-free f32 cell written by the control context and read by the render context.
#[derive(Debug)]
pub struct SharedParam(AtomicU32);

impl SharedParam {
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    #[inline]
    pub fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }

    #[inline]
    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }
}

/// Targets for every live control, shared between the two contexts.
#[derive(Debug)]
pub struct ParamTargets {
    pub cutoff_hz: SharedParam,
    pub gain: SharedParam,
    pub playback_rate: SharedParam,
    pub pitch_ratio: SharedParam,
}

impl ParamTargets {
    pub fn new(cutoff_hz: f32, gain: f32, playback_rate: f32, pitch_ratio: f32) -> Self {
        Self {
            cutoff_hz: SharedParam::new(cutoff_hz),
            gain: SharedParam::new(gain),
            playback_rate: SharedParam::new(playback_rate),
            pitch_ratio: SharedParam::new(pitch_ratio),
        }
    }
}
