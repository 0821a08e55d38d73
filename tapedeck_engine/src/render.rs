use std::sync::Arc;

use tapedeck_shared::RENDER_QUANTUM;

use crate::clock::{HostClock, SampleClock};
use crate::graph::EffectChain;

/// Render-context driver.
///
/// Hosts ask for arbitrary buffer sizes; the chain always runs whole
/// 128-frame quanta. A partly consumed quantum is carried over to the next
/// host callback. The clock advances once per rendered quantum.
pub struct Renderer {
    chain: EffectChain,
    clock: Arc<SampleClock>,
    quantum: [f32; RENDER_QUANTUM],
    /// Samples of `quantum` already handed out.
    consumed: usize,
}

impl Renderer {
    pub fn new(chain: EffectChain, clock: Arc<SampleClock>) -> Self {
        Self {
            chain,
            clock,
            quantum: [0.0; RENDER_QUANTUM],
            consumed: RENDER_QUANTUM,
        }
    }

    fn next_quantum(&mut self) {
        self.chain.process_quantum(&mut self.quantum);
        self.clock.advance(RENDER_QUANTUM as u64);
        self.consumed = 0;
    }

    /// Fills a mono buffer of any length.
    pub fn render_mono(&mut self, out: &mut [f32]) {
        if self.clock.is_suspended() {
            out.fill(0.0);
            return;
        }

        let mut written = 0;
        while written < out.len() {
            if self.consumed == RENDER_QUANTUM {
                self.next_quantum();
            }
            let n = (RENDER_QUANTUM - self.consumed).min(out.len() - written);
            out[written..written + n].copy_from_slice(&self.quantum[self.consumed..self.consumed + n]);
            self.consumed += n;
            written += n;
        }
    }

    /// Fills an interleaved device buffer, duplicating the mono signal
    /// across `channels`.
    pub fn render_interleaved(&mut self, data: &mut [f32], channels: usize) {
        if channels <= 1 {
            self.render_mono(data);
            return;
        }
        if self.clock.is_suspended() {
            data.fill(0.0);
            return;
        }

        for frame in data.chunks_mut(channels) {
            if self.consumed == RENDER_QUANTUM {
                self.next_quantum();
            }
            frame.fill(self.quantum[self.consumed]);
            self.consumed += 1;
        }
    }

    /// Renders whole quanta with nowhere to send them. For offline drivers.
    pub fn run_quanta(&mut self, count: usize) {
        let mut scratch = [0.0f32; RENDER_QUANTUM];
        for _ in 0..count {
            self.render_mono(&mut scratch);
        }
    }
}
