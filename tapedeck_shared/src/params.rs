//! Ranges for every live control and the clamping applied at the control boundary.
//!
//! Values are clamped here, before they are published to the render context,
//! so nothing out of range ever reaches a DSP loop.

use crate::error::OutOfRange;

/// Inclusive range with a fallback used for non-finite input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamRange {
    pub min: f32,
    pub max: f32,
    pub default: f32,
}

impl ParamRange {
    pub const fn new(min: f32, max: f32, default: f32) -> Self {
        Self { min, max, default }
    }

    /// Returns the value unchanged when it is in range, otherwise an
    /// [`OutOfRange`] carrying the value that should be applied instead.
    pub fn check(&self, value: f32) -> Result<f32, OutOfRange> {
        if !value.is_finite() {
            return Err(OutOfRange { requested: value, applied: self.default });
        }
        if value < self.min || value > self.max {
            return Err(OutOfRange {
                requested: value,
                applied: value.clamp(self.min, self.max),
            });
        }
        Ok(value)
    }

    /// Lenient variant of [`check`](Self::check): always yields a usable value.
    pub fn clamp(&self, value: f32) -> f32 {
        match self.check(value) {
            Ok(v) => v,
            Err(e) => e.applied,
        }
    }
}

pub const MIN_CUTOFF_HZ: f32 = 10.0;

/// Cutoff must stay strictly below Nyquist for the filter to remain stable.
pub const MAX_CUTOFF_NYQUIST_FRACTION: f32 = 0.98;

pub const DEFAULT_CUTOFF_HZ: f32 = 1000.0;

/// The cutoff range depends on the engine sample rate.
pub fn cutoff_range(sample_rate: u32) -> ParamRange {
    let nyquist = sample_rate as f32 * 0.5;
    let max = nyquist * MAX_CUTOFF_NYQUIST_FRACTION;
    ParamRange::new(MIN_CUTOFF_HZ, max, DEFAULT_CUTOFF_HZ.min(max))
}

pub const GAIN: ParamRange = ParamRange::new(0.0, 4.0, 1.0);

pub const PLAYBACK_RATE: ParamRange = ParamRange::new(0.25, 4.0, 1.0);

pub const PITCH_RATIO: ParamRange = ParamRange::new(0.1, 8.0, 1.0);

/// `2^(semitones/12)`
pub fn semitones_to_ratio(semitones: f32) -> f32 {
    2.0_f32.powf(semitones / 12.0)
}

/// `12·log2(ratio)`
pub fn ratio_to_semitones(ratio: f32) -> f32 {
    12.0 * ratio.log2()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn in_range_values_pass_through() {
        assert_eq!(GAIN.check(0.5), Ok(0.5));
        assert_eq!(GAIN.clamp(4.0), 4.0);
    }

    #[test]
    fn out_of_range_reports_the_clamped_value() {
        let err = PITCH_RATIO.check(-1.0).unwrap_err();
        assert_eq!(err.requested, -1.0);
        assert_eq!(err.applied, 0.1);
        assert_eq!(PLAYBACK_RATE.clamp(100.0), 4.0);
    }

    #[test]
    fn non_finite_falls_back_to_default() {
        assert_eq!(GAIN.clamp(f32::NAN), 1.0);
        assert_eq!(PLAYBACK_RATE.clamp(f32::INFINITY), 1.0);
    }

    #[test]
    fn cutoff_stays_below_nyquist() {
        let range = cutoff_range(48_000);
        assert!(range.max < 24_000.0);
        assert_eq!(range.clamp(0.0), MIN_CUTOFF_HZ);
        assert_eq!(range.clamp(30_000.0), range.max);
    }

    #[test]
    fn semitone_conversion() {
        assert_relative_eq!(semitones_to_ratio(12.0), 2.0, epsilon = 1e-6);
        assert_relative_eq!(semitones_to_ratio(-12.0), 0.5, epsilon = 1e-6);
        assert_relative_eq!(ratio_to_semitones(semitones_to_ratio(7.0)), 7.0, epsilon = 1e-4);
    }
}
