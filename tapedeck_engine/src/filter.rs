//! Low-pass stage: a state-variable filter in the trapezoidal (TPT) form.
//!
//! - `g = tan(π fc / sr)`, `k = 1 / Q`
//! - Butterworth damping by default, so there is no resonant bump at cutoff
//! - Stable under per-sample cutoff modulation, which is how the smoothed
//!   cutoff reaches it

use std::f32::consts::PI;

use tapedeck_shared::params::cutoff_range;

use crate::smooth::SmoothedParameter;

pub const BUTTERWORTH_Q: f32 = std::f32::consts::FRAC_1_SQRT_2;

#[derive(Clone, Debug)]
pub struct LowPassFilter {
    sample_rate: f32,
    max_cutoff: f32,
    cutoff: SmoothedParameter,
    k: f32,
    // derived from the current cutoff
    a1: f32,
    a2: f32,
    a3: f32,
    coeff_cutoff: f32,
    // integrator states
    ic1eq: f32,
    ic2eq: f32,
}

impl LowPassFilter {
    pub fn new(cutoff_hz: f32, smoothing_secs: f32, sample_rate: u32) -> Self {
        let range = cutoff_range(sample_rate);
        let cutoff_hz = range.clamp(cutoff_hz);
        let mut filter = Self {
            sample_rate: sample_rate as f32,
            max_cutoff: range.max,
            cutoff: SmoothedParameter::new(cutoff_hz, smoothing_secs, sample_rate as f32),
            k: 1.0 / BUTTERWORTH_Q,
            a1: 0.0,
            a2: 0.0,
            a3: 0.0,
            coeff_cutoff: f32::NAN,
            ic1eq: 0.0,
            ic2eq: 0.0,
        };
        filter.update_coeffs(cutoff_hz);
        filter
    }

    /// Target for the smoothed cutoff. The value is expected to be clamped already.
    pub fn set_cutoff(&mut self, cutoff_hz: f32) {
        self.cutoff.set_target(cutoff_hz.min(self.max_cutoff));
    }

    pub fn cutoff(&self) -> f32 {
        self.cutoff.current()
    }

    #[inline]
    fn update_coeffs(&mut self, cutoff_hz: f32) {
        let g = (PI * cutoff_hz / self.sample_rate).tan();
        self.a1 = 1.0 / (1.0 + g * (g + self.k));
        self.a2 = g * self.a1;
        self.a3 = g * self.a2;
        self.coeff_cutoff = cutoff_hz;
    }

    #[inline]
    pub fn process_sample(&mut self, x: f32) -> f32 {
        let fc = self.cutoff.next_sample();
        if fc != self.coeff_cutoff {
            self.update_coeffs(fc);
        }

        let v3 = x - self.ic2eq;
        let v1 = self.a1 * self.ic1eq + self.a2 * v3;
        let v2 = self.ic2eq + self.a2 * self.ic1eq + self.a3 * v3;
        self.ic1eq = flush_denormal(2.0 * v1 - self.ic1eq);
        self.ic2eq = flush_denormal(2.0 * v2 - self.ic2eq);
        v2
    }

    pub fn process_in_place(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }
}

#[inline]
fn flush_denormal(x: f32) -> f32 {
    if x.abs() < 1e-20 { 0.0 } else { x }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 48_000;

    fn sine(freq: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f32 / SR as f32).sin())
            .collect()
    }

    fn peak(buf: &[f32]) -> f32 {
        buf.iter().fold(0.0f32, |m, &x| m.max(x.abs()))
    }

    #[test]
    fn passes_dc() {
        let mut lp = LowPassFilter::new(1000.0, 0.01, SR);
        let mut y = 0.0;
        for _ in 0..SR {
            y = lp.process_sample(1.0);
        }
        assert!((y - 1.0).abs() < 1e-3, "y={y}");
    }

    #[test]
    fn attenuates_above_cutoff() {
        let mut lp = LowPassFilter::new(500.0, 0.01, SR);
        let mut high = sine(8000.0, 9600);
        lp.process_in_place(&mut high);
        assert!(peak(&high[4800..]) < 0.01);

        let mut lp = LowPassFilter::new(500.0, 0.01, SR);
        let mut low = sine(50.0, 9600);
        lp.process_in_place(&mut low);
        assert!(peak(&low[4800..]) > 0.9);
    }

    #[test]
    fn cutoff_glides_instead_of_jumping() {
        let mut lp = LowPassFilter::new(1000.0, 0.01, SR);
        lp.set_cutoff(5000.0);
        lp.process_sample(0.0);
        let fc = lp.cutoff();
        assert!(fc > 1000.0 && fc < 5000.0);
    }

    #[test]
    fn cutoff_never_exceeds_nyquist() {
        let mut lp = LowPassFilter::new(1_000_000.0, 0.01, SR);
        assert!(lp.cutoff() < 24_000.0);
        lp.set_cutoff(1_000_000.0);
        let mut noise: Vec<f32> = (0..4096).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        lp.process_in_place(&mut noise);
        assert!(noise.iter().all(|y| y.is_finite()));
    }
}
