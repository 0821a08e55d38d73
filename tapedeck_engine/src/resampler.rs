use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};

use tapedeck_shared::DecodeError;

use crate::assets::AudioAsset;

const CHUNK_SIZE: usize = 1024;

pub struct AssetResampler;

impl AssetResampler {
    /// Converts every channel of `asset` to `target_rate` using sinc interpolation.
    /// Runs on the control context at load time, never while rendering.
    pub fn to_rate(asset: &AudioAsset, target_rate: u32) -> Result<AudioAsset, DecodeError> {
        if asset.sample_rate == target_rate {
            return Ok(asset.clone());
        }
        if target_rate == 0 {
            return Err(DecodeError::Resample("target rate is zero".to_string()));
        }

        let channels = asset
            .channels
            .iter()
            .map(|ch| Self::resample(ch, asset.sample_rate, target_rate))
            .collect::<Result<Vec<_>, _>>()?;

        AudioAsset::from_channels(channels, target_rate)
    }

    /// Output has `ceil(len * target / source)` frames, aligned with the input.
    pub fn resample(
        input: &[f32],
        source_rate: u32,
        target_rate: u32,
    ) -> Result<Vec<f32>, DecodeError> {
        if source_rate == 0 || target_rate == 0 {
            return Err(DecodeError::Resample("sample rates must be non-zero".to_string()));
        }
        if input.is_empty() {
            return Ok(Vec::new());
        }
        let ratio = target_rate as f64 / source_rate as f64;

        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 128,
            window: WindowFunction::BlackmanHarris2,
        };

        let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, CHUNK_SIZE, 1)
            .map_err(|e| DecodeError::Resample(e.to_string()))?;

        let expected_len =
            (input.len() as u64 * target_rate as u64).div_ceil(source_rate as u64) as usize;
        let delay = resampler.output_delay();
        let mut output = Vec::with_capacity(delay + expected_len + CHUNK_SIZE * 2);

        let mut input_pos = 0;
        // keep feeding silence until the tail has been flushed through the filter
        while output.len() < delay + expected_len {
            let end = (input_pos + CHUNK_SIZE).min(input.len());
            let mut chunk = if input_pos < end { input[input_pos..end].to_vec() } else { Vec::new() };
            chunk.resize(CHUNK_SIZE, 0.0);

            let waves = vec![chunk];
            let out_waves = resampler
                .process(&waves, None)
                .map_err(|e| DecodeError::Resample(e.to_string()))?;
            if let Some(chan_out) = out_waves.first() {
                output.extend_from_slice(chan_out);
            }
            input_pos += CHUNK_SIZE;
        }

        output.drain(..delay);
        output.truncate(expected_len);
        Ok(output)
    }
}
