use std::sync::Arc;

use tapedeck_shared::params::PLAYBACK_RATE;
use tapedeck_shared::SessionId;

use crate::assets::AudioAsset;
use crate::smooth::SmoothedParameter;

/// One playback instance: reads the asset's mono mix from an offset,
/// stepping by the smoothed playback rate. Built on the control context
/// for a single session and never restarted.
pub struct SourceVoice {
    asset: Arc<AudioAsset>,
    session: SessionId,
    /// Read head in asset frames.
    position: f64,
    rate: SmoothedParameter,
    finished: bool,
}

impl SourceVoice {
    pub fn new(
        asset: Arc<AudioAsset>,
        session: SessionId,
        offset_seconds: f64,
        rate: f32,
        smoothing_secs: f32,
        sample_rate: u32,
    ) -> Self {
        let position = offset_seconds.max(0.0) * asset.sample_rate as f64;
        let finished = position >= asset.frame_count() as f64;
        Self {
            asset,
            session,
            position,
            rate: SmoothedParameter::new(PLAYBACK_RATE.clamp(rate), smoothing_secs, sample_rate as f32),
            finished,
        }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn set_rate(&mut self, rate: f32) {
        self.rate.set_target(rate);
    }

    /// Fills `out` with the next samples. Once the read head passes the last
    /// frame the rest of the block is silence and the voice reports finished.
    pub fn render(&mut self, out: &mut [f32]) {
        let data = self.asset.mono();
        let last = data.len().saturating_sub(1);

        for sample in out.iter_mut() {
            if self.finished {
                *sample = 0.0;
                continue;
            }

            let idx = self.position as usize;
            if idx >= data.len() {
                self.finished = true;
                *sample = 0.0;
                continue;
            }

            let frac = (self.position - idx as f64) as f32;
            let a = data[idx];
            let b = data[(idx + 1).min(last)];
            *sample = a + (b - a) * frac;

            self.position += self.rate.next_sample() as f64;
        }
    }
}
