use crate::filter::LowPassFilter;
use crate::smooth::SmoothedParameter;

pub trait AudioNode: Send {
    /// Process one render quantum in place. Must not allocate or block.
    fn process(&mut self, buffer: &mut [f32]);
}

/// The stage kinds a chain topology can list, in processing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Pitch,
    Filter,
    Gain,
    AnalysisTap,
}

impl StageKind {
    pub fn label(&self) -> &'static str {
        match self {
            StageKind::Pitch => "pitch",
            StageKind::Filter => "filter",
            StageKind::Gain => "gain",
            StageKind::AnalysisTap => "analysis",
        }
    }
}

pub struct GainNode {
    gain: SmoothedParameter,
}

impl GainNode {
    pub fn new(gain: f32, smoothing_secs: f32, sample_rate: f32) -> Self {
        Self { gain: SmoothedParameter::new(gain, smoothing_secs, sample_rate) }
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.gain.set_target(gain);
    }
}

impl AudioNode for GainNode {
    fn process(&mut self, buffer: &mut [f32]) {
        self.gain.apply_gain(buffer);
    }
}

impl AudioNode for LowPassFilter {
    fn process(&mut self, buffer: &mut [f32]) {
        self.process_in_place(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gain_ramps_toward_target() {
        let mut node = GainNode::new(1.0, 0.01, 48_000.0);
        node.set_gain(0.0);
        let mut block = [1.0f32; 128];
        node.process(&mut block);
        assert!(block[0] < 1.0);
        assert!(block.windows(2).all(|w| w[1] <= w[0]));
        assert!(block[127] > 0.0);
    }

    #[test]
    fn settled_gain_is_exact() {
        let mut node = GainNode::new(0.5, 0.01, 48_000.0);
        let mut block = [2.0f32; 16];
        node.process(&mut block);
        assert!(block.iter().all(|&x| x == 1.0));
    }
}
