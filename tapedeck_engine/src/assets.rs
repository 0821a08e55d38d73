use std::io::Cursor;

use tapedeck_shared::DecodeError;

/// Immutable decoded PCM. Created once per load and shared read-only
/// with the render context through an `Arc`.
#[derive(Clone, Debug)]
pub struct AudioAsset {
    pub sample_rate: u32,
    /// Per-channel sample data, all channels the same length.
    pub channels: Vec<Vec<f32>>,
    /// Mixdown used for playback.
    mono: Vec<f32>,
}

/// Per-column extent of the waveform, for overview drawing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WaveformPeak {
    pub min: f32,
    pub max: f32,
}

impl AudioAsset {
    pub fn from_channels(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self, DecodeError> {
        let frames = channels.first().map(Vec::len).unwrap_or(0);
        if frames == 0 || sample_rate == 0 {
            return Err(DecodeError::Empty);
        }
        if channels.iter().any(|c| c.len() != frames) {
            return Err(DecodeError::Malformed("channel lengths differ".to_string()));
        }

        let mono = if channels.len() == 1 {
            channels[0].clone()
        } else {
            let scale = 1.0 / channels.len() as f32;
            (0..frames)
                .map(|i| channels.iter().map(|c| c[i]).sum::<f32>() * scale)
                .collect()
        };

        Ok(Self { sample_rate, channels, mono })
    }

    /// Split interleaved samples into channels.
    pub fn from_interleaved(samples: &[f32], channel_count: u16, sample_rate: u32) -> Result<Self, DecodeError> {
        let n = channel_count as usize;
        if n == 0 {
            return Err(DecodeError::Malformed("zero channels".to_string()));
        }
        let frames = samples.len() / n;
        let mut channels = vec![Vec::with_capacity(frames); n];
        for frame in samples.chunks_exact(n) {
            for (ch, &s) in channels.iter_mut().zip(frame) {
                ch.push(s);
            }
        }
        Self::from_channels(channels, sample_rate)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn frame_count(&self) -> usize {
        self.mono.len()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.frame_count() as f64 / self.sample_rate as f64
    }

    pub fn mono(&self) -> &[f32] {
        &self.mono
    }

    /// Min/max of channel 0 over `columns` equal slices.
    pub fn peaks(&self, columns: usize) -> Vec<WaveformPeak> {
        if columns == 0 {
            return Vec::new();
        }
        let data = &self.channels[0];
        let step = data.len().div_ceil(columns).max(1);
        data.chunks(step)
            .map(|chunk| {
                chunk.iter().fold(WaveformPeak { min: 1.0, max: -1.0 }, |p, &s| WaveformPeak {
                    min: p.min.min(s),
                    max: p.max.max(s),
                })
            })
            .collect()
    }
}

/// Turns raw file bytes into an [`AudioAsset`].
pub trait Decoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<AudioAsset, DecodeError>;
}

/// RIFF/WAVE decoder (integer PCM 8-32 bit, 32-bit float).
#[derive(Debug, Default, Clone, Copy)]
pub struct WavDecoder;

impl Decoder for WavDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<AudioAsset, DecodeError> {
        let reader = hound::WavReader::new(Cursor::new(bytes)).map_err(map_hound_error)?;
        let spec = reader.spec();

        let raw_samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => {
                if spec.bits_per_sample != 32 {
                    return Err(DecodeError::Unsupported(format!(
                        "{}-bit float",
                        spec.bits_per_sample
                    )));
                }
                reader
                    .into_samples::<f32>()
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(map_hound_error)?
            }
            hound::SampleFormat::Int => {
                let max_val = 2.0_f32.powi(spec.bits_per_sample as i32 - 1);
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|x| x as f32 / max_val))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(map_hound_error)?
            }
        };

        AudioAsset::from_interleaved(&raw_samples, spec.channels, spec.sample_rate)
    }
}

fn map_hound_error(err: hound::Error) -> DecodeError {
    match err {
        hound::Error::Unsupported => DecodeError::Unsupported("WAV encoding".to_string()),
        other => DecodeError::Malformed(other.to_string()),
    }
}
