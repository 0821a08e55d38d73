//! Visualization tap.
//!
//! The render context writes every post-gain quantum into a fixed window of
//! atomics and publishes a running write count ([`AnalysisTap`]). The control
//! context reads the trailing `fft_size` samples on each animation tick
//! ([`Analyser::poll`]) and derives time-domain and frequency-magnitude views
//! from them. The newest samples always win; a reader that falls behind skips
//! the backlog. Polling never blocks.

use std::f32::consts::PI;
use std::sync::atomic::{fence, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use tapedeck_shared::{EngineConfig, RENDER_QUANTUM};

use crate::nodes::AudioNode;

struct TapWindow {
    samples: Box<[AtomicU32]>,
    /// Total samples published.
    written: AtomicU64,
}

/// Render-side half. Overwrites the oldest samples unconditionally.
pub struct AnalysisTap {
    shared: Arc<TapWindow>,
    written: u64,
}

impl AudioNode for AnalysisTap {
    fn process(&mut self, buffer: &mut [f32]) {
        let capacity = self.shared.samples.len() as u64;
        for (i, &sample) in buffer.iter().enumerate() {
            let slot = ((self.written + i as u64) % capacity) as usize;
            self.shared.samples[slot].store(sample.to_bits(), Ordering::Relaxed);
        }
        self.written += buffer.len() as u64;
        self.shared.written.store(self.written, Ordering::Release);
        // orders the next quantum's overwrites after this count
        fence(Ordering::Release);
    }
}

/// Control-side half.
pub struct Analyser {
    shared: Arc<TapWindow>,
    seen: u64,
    sample_rate: u32,
    fft_size: usize,
    smoothing: f32,
    min_decibels: f32,
    max_decibels: f32,

    // rolling window, oldest sample at `write_pos`
    window: Vec<f32>,
    write_pos: usize,
    drain_buf: Vec<f32>,

    fft: Arc<dyn Fft<f32>>,
    blackman: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
    decibels: Vec<f32>,
}

pub fn analysis_tap(config: &EngineConfig, sample_rate: u32) -> (AnalysisTap, Analyser) {
    let capacity =
        (config.tap_capacity_quanta * RENDER_QUANTUM).max(config.fft_size + RENDER_QUANTUM);
    let shared = Arc::new(TapWindow {
        samples: (0..capacity).map(|_| AtomicU32::new(0)).collect(),
        written: AtomicU64::new(0),
    });

    let fft_size = config.fft_size;
    let fft = FftPlanner::new().plan_fft_forward(fft_size);
    let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];
    let bins = fft_size / 2;

    let analyser = Analyser {
        shared: shared.clone(),
        seen: 0,
        sample_rate,
        fft_size,
        smoothing: config.spectrum_smoothing,
        min_decibels: config.min_decibels,
        max_decibels: config.max_decibels,
        window: vec![0.0; fft_size],
        write_pos: 0,
        drain_buf: vec![0.0; fft_size],
        fft,
        blackman: blackman_window(fft_size),
        spectrum: vec![Complex::new(0.0, 0.0); fft_size],
        scratch,
        smoothed: vec![0.0; bins],
        decibels: vec![f32::NEG_INFINITY; bins],
    };

    (AnalysisTap { shared, written: 0 }, analyser)
}

/// `0.42 - 0.5 cos(2πn/N) + 0.08 cos(4πn/N)`
fn blackman_window(size: usize) -> Vec<f32> {
    let n = size as f32;
    (0..size)
        .map(|i| {
            let x = i as f32 / n;
            0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos()
        })
        .collect()
}

impl Analyser {
    /// Takes the samples rendered since the last call, keeping only the
    /// trailing `fft_size`. Returns how many were rendered.
    pub fn poll(&mut self) -> usize {
        let written = self.shared.written.load(Ordering::Acquire);
        let fresh = written - self.seen;
        if fresh == 0 {
            return 0;
        }
        self.seen = written;

        let take = fresh.min(self.fft_size as u64);
        let first = written - take;
        let capacity = self.shared.samples.len() as u64;
        for (i, out) in self.drain_buf[..take as usize].iter_mut().enumerate() {
            let slot = ((first + i as u64) % capacity) as usize;
            *out = f32::from_bits(self.shared.samples[slot].load(Ordering::Relaxed));
        }

        // anything the render context may have overwritten meanwhile, counting
        // the quantum it could be in the middle of, is dropped
        fence(Ordering::Acquire);
        let now = self.shared.written.load(Ordering::Relaxed);
        let valid_from = (now + RENDER_QUANTUM as u64).saturating_sub(capacity).max(first);
        let skip = (valid_from - first).min(take) as usize;

        for i in skip..take as usize {
            self.window[self.write_pos] = self.drain_buf[i];
            self.write_pos = (self.write_pos + 1) % self.fft_size;
        }
        fresh as usize
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Rolling window, oldest first.
    pub fn time_domain_into(&self, out: &mut [f32]) {
        let n = out.len().min(self.fft_size);
        let start = (self.write_pos + self.fft_size - n) % self.fft_size;
        for (i, o) in out.iter_mut().take(n).enumerate() {
            *o = self.window[(start + i) % self.fft_size];
        }
    }

    pub fn time_domain(&self) -> Vec<f32> {
        let mut out = vec![0.0; self.fft_size];
        self.time_domain_into(&mut out);
        out
    }

    /// The most recently rendered quantum.
    pub fn latest_quantum(&self) -> Vec<f32> {
        let mut out = vec![0.0; RENDER_QUANTUM.min(self.fft_size)];
        self.time_domain_into(&mut out);
        out
    }

    /// Blackman-windowed magnitude spectrum in dB, smoothed over time.
    pub fn frequency_db(&mut self) -> &[f32] {
        let start = self.write_pos;
        for i in 0..self.fft_size {
            let s = self.window[(start + i) % self.fft_size];
            self.spectrum[i] = Complex::new(s * self.blackman[i], 0.0);
        }
        self.fft.process_with_scratch(&mut self.spectrum, &mut self.scratch);

        let norm = 1.0 / self.fft_size as f32;
        let tau = self.smoothing;
        for (k, smoothed) in self.smoothed.iter_mut().enumerate() {
            let mag = self.spectrum[k].norm() * norm;
            *smoothed = tau * *smoothed + (1.0 - tau) * mag;
            self.decibels[k] = if *smoothed > 0.0 {
                20.0 * smoothed.log10()
            } else {
                f32::NEG_INFINITY
            };
        }
        &self.decibels
    }

    /// dB magnitudes scaled into 0..=255 between the configured min/max dB.
    pub fn byte_frequency_data(&mut self) -> Vec<u8> {
        let (lo, hi) = (self.min_decibels, self.max_decibels);
        let scale = 255.0 / (hi - lo);
        self.frequency_db()
            .iter()
            .map(|&db| {
                if db.is_finite() {
                    ((db - lo) * scale).clamp(0.0, 255.0) as u8
                } else {
                    0
                }
            })
            .collect()
    }

    /// Centre frequency of bin `k` in Hz.
    pub fn bin_frequency(&self, k: usize) -> f32 {
        k as f32 * self.sample_rate as f32 / self.fft_size as f32
    }

    /// Loudest bin of the current spectrum, if any bin is above silence.
    pub fn peak_frequency(&mut self) -> Option<f32> {
        let (bin, db) = self
            .frequency_db()
            .iter()
            .copied()
            .enumerate()
            .skip(1)
            .fold((0, f32::NEG_INFINITY), |best, (k, db)| if db > best.1 { (k, db) } else { best });
        if db.is_finite() { Some(self.bin_frequency(bin)) } else { None }
    }
}
