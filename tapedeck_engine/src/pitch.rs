//! Granular pitch shifter.
//!
//! Changes perceived pitch by a ratio while keeping the block length: every
//! input sample produces exactly one output sample.
//!
//! ## Algorithm
//!
//! 1. Each input sample is pushed into a ring of `4 * grain_size` samples.
//! 2. Two grains read from the past at distances `phase1` and `phase2`,
//!    offset by half a grain. Each read is weighted by a Hann window over
//!    the phase, `0.5 * (1 - cos(2π·phase / grain_size))`.
//! 3. The output is the sum of both grains. Half-grain offset Hann windows
//!    sum to one, so a steady input comes out at the same level.
//! 4. Both phases advance by the pitch ratio and wrap modulo `grain_size`.
//!    A ratio above one reads faster than real time (pitch up).
//!
//! ## RT-Safety
//!
//! The ring is allocated in [`GranularPitchShifter::new`]. `process()` does not
//! allocate, lock or fail. The ratio is clamped when it is set, once per
//! block, never inside the per-sample loop.
//!
//! Silent input is processed like any other block: phases and the write
//! pointer keep moving and the ring fills with silence.

use std::f64::consts::TAU;

use tapedeck_shared::params::PITCH_RATIO;
use tapedeck_shared::GRAIN_BUFFER_FACTOR;

use crate::ring::RingBuffer;
use crate::smooth::SmoothedParameter;

pub struct GranularPitchShifter {
    grain_size: usize,
    ring: RingBuffer,
    phase1: f64,
    phase2: f64,
    ratio: SmoothedParameter,
}

impl GranularPitchShifter {
    pub fn new(grain_size: usize, ratio: f32, smoothing_secs: f32, sample_rate: f32) -> Self {
        let grain_size = grain_size.max(2);
        Self {
            grain_size,
            ring: RingBuffer::new(grain_size * GRAIN_BUFFER_FACTOR),
            phase1: 0.0,
            phase2: grain_size as f64 / 2.0,
            ratio: SmoothedParameter::new(PITCH_RATIO.clamp(ratio), smoothing_secs, sample_rate),
        }
    }

    pub fn grain_size(&self) -> usize {
        self.grain_size
    }

    pub fn phases(&self) -> (f64, f64) {
        (self.phase1, self.phase2)
    }

    pub fn write_pos(&self) -> usize {
        self.ring.write_pos()
    }

    /// Smoothed ratio as of the last processed sample.
    pub fn current_ratio(&self) -> f32 {
        self.ratio.current()
    }

    /// New ratio target; the per-sample ratio glides toward it.
    pub fn set_ratio(&mut self, ratio: f32) {
        self.ratio.set_target(PITCH_RATIO.clamp(ratio));
    }

    /// Jump straight to `ratio` without gliding.
    pub fn set_ratio_immediate(&mut self, ratio: f32) {
        self.ratio.set_immediate(PITCH_RATIO.clamp(ratio));
    }

    #[inline]
    fn window(&self, phase: f64) -> f32 {
        (0.5 * (1.0 - (TAU * phase / self.grain_size as f64).cos())) as f32
    }

    #[inline]
    fn grain(&self, phase: f64) -> f32 {
        self.ring.read_back(phase as usize) * self.window(phase)
    }

    #[inline]
    pub fn process_sample(&mut self, input: f32) -> f32 {
        self.ring.push(input);

        let out = self.grain(self.phase1) + self.grain(self.phase2);

        let ratio = self.ratio.next_sample() as f64;
        let grain = self.grain_size as f64;
        self.phase1 = wrap_phase(self.phase1 + ratio, grain);
        self.phase2 = wrap_phase(self.phase2 + ratio, grain);

        out
    }

    /// Process one block. `output` receives exactly `input.len()` samples.
    pub fn process(&mut self, input: &[f32], output: &mut [f32]) {
        debug_assert_eq!(input.len(), output.len());
        for (out, &x) in output.iter_mut().zip(input.iter()) {
            *out = self.process_sample(x);
        }
    }

    pub fn process_in_place(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }
}

/// Keeps a phase in `[0, grain)`, including the rounding case where the
/// remainder lands exactly on `grain`.
#[inline]
fn wrap_phase(phase: f64, grain: f64) -> f64 {
    let wrapped = phase.rem_euclid(grain);
    if wrapped >= grain { 0.0 } else { wrapped }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48_000.0;
    const GRAIN: usize = 1024;

    fn shifter(ratio: f32) -> GranularPitchShifter {
        let mut s = GranularPitchShifter::new(GRAIN, ratio, 0.01, SR);
        s.set_ratio_immediate(ratio);
        s
    }

    #[test]
    fn phases_start_half_a_grain_apart() {
        let s = shifter(1.0);
        assert_eq!(s.phases(), (0.0, GRAIN as f64 / 2.0));
        assert_eq!(s.write_pos(), 0);
    }

    #[test]
    fn constant_input_converges_to_unity_at_ratio_one() {
        let mut s = shifter(1.0);
        let input = vec![1.0f32; GRAIN * 3];
        let mut output = vec![0.0f32; input.len()];
        s.process(&input, &mut output);

        for (i, &y) in output.iter().enumerate().skip(GRAIN) {
            assert!((y - 1.0).abs() < 1e-4, "sample {i}: {y}");
        }
    }

    #[test]
    fn constant_input_stays_near_unity_when_shifted() {
        for ratio in [0.5f32, 1.5, 2.0] {
            let mut s = shifter(ratio);
            let input = vec![1.0f32; GRAIN * 8];
            let mut output = vec![0.0f32; input.len()];
            s.process(&input, &mut output);

            // reads reach at most one grain into the past
            for &y in &output[GRAIN * 2..] {
                assert!((y - 1.0).abs() < 1e-3, "ratio {ratio}: {y}");
            }
        }
    }

    #[test]
    fn block_length_is_preserved() {
        for ratio in [0.1f32, 0.75, 1.0, 3.0, 8.0] {
            let mut s = shifter(ratio);
            for len in [1usize, 64, 128, 1000] {
                let input = vec![0.25f32; len];
                let mut output = vec![f32::NAN; len];
                s.process(&input, &mut output);
                assert!(output.iter().all(|y| y.is_finite()), "len {len}");
            }
        }
    }

    #[test]
    fn phases_stay_in_bounds() {
        let mut rng = fastrand::Rng::with_seed(42);
        let mut s = shifter(1.0);
        let grain = GRAIN as f64;
        for _ in 0..200 {
            s.set_ratio(rng.f32() * 8.0 + 0.01);
            for _ in 0..128 {
                s.process_sample(rng.f32() * 2.0 - 1.0);
                let (p1, p2) = s.phases();
                assert!((0.0..grain).contains(&p1), "phase1 {p1}");
                assert!((0.0..grain).contains(&p2), "phase2 {p2}");
            }
        }
    }

    #[test]
    fn write_pointer_advances_once_per_sample() {
        let mut s = shifter(1.7);
        let capacity = GRAIN * GRAIN_BUFFER_FACTOR;
        for i in 0..capacity + 10 {
            assert_eq!(s.write_pos(), i % capacity);
            s.process_sample(0.0);
        }
    }

    #[test]
    fn silent_blocks_keep_state_moving() {
        let mut s = shifter(1.25);
        let silence = [0.0f32; 128];
        let mut out = [1.0f32; 128];
        let before = s.phases();
        s.process(&silence, &mut out);
        assert_ne!(s.phases(), before);
        assert_eq!(s.write_pos(), 128);
        assert!(out.iter().all(|&y| y == 0.0));
    }

    #[test]
    fn invalid_ratio_is_clamped_at_the_boundary() {
        let mut s = shifter(1.0);
        s.set_ratio_immediate(-2.0);
        assert_eq!(s.current_ratio(), PITCH_RATIO.min);
        s.set_ratio_immediate(f32::NAN);
        assert_eq!(s.current_ratio(), PITCH_RATIO.default);
    }

    #[test]
    fn ratio_glides_toward_target() {
        let mut s = shifter(1.0);
        s.set_ratio(2.0);
        s.process_sample(0.0);
        let r = s.current_ratio();
        assert!(r > 1.0 && r < 2.0);
    }

    #[test]
    fn wrap_phase_handles_edges() {
        assert_eq!(wrap_phase(1024.0, 1024.0), 0.0);
        assert_eq!(wrap_phase(1030.5, 1024.0), 6.5);
        assert!(wrap_phase(1023.999_999_999, 1024.0) < 1024.0);
    }
}
