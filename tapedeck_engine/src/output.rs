use anyhow::Context;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use tracing::{debug, info, warn};

use crate::render::Renderer;

/// Frames converted per pass when the device wants a non-f32 format.
const SCRATCH_FRAMES: usize = 4096;

/// The default output device and the config the stream will use.
/// Opened before the engine so the engine can run at the device rate.
pub struct OutputDevice {
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
}

/// A running output stream. Playback stops when this is dropped.
pub struct AudioOutput {
    _stream: cpal::Stream,
    sample_rate: u32,
    channels: usize,
}

impl OutputDevice {
    pub fn open_default() -> anyhow::Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| anyhow::anyhow!("No output device available"))?;
        let supported = device
            .default_output_config()
            .context("querying default output config")?;

        if let cpal::SupportedBufferSize::Range { min, max } = supported.buffer_size() {
            debug!("[Output] Device buffer range: {}-{}", min, max);
        }

        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();
        info!("[Output] Using config: {:?} ({:?})", config, sample_format);

        Ok(Self { device, config, sample_format })
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.config.channels as usize
    }

    /// Moves the renderer onto the device's callback thread and starts the stream.
    pub fn start(self, renderer: Renderer) -> anyhow::Result<AudioOutput> {
        let channels = self.channels();
        let stream = match self.sample_format {
            cpal::SampleFormat::F32 => build_stream::<f32>(&self.device, &self.config, renderer),
            cpal::SampleFormat::I16 => build_stream::<i16>(&self.device, &self.config, renderer),
            cpal::SampleFormat::U16 => build_stream::<u16>(&self.device, &self.config, renderer),
            other => Err(anyhow::anyhow!("Unsupported sample format: {other:?}")),
        }?;
        stream.play().context("starting output stream")?;

        Ok(AudioOutput {
            _stream: stream,
            sample_rate: self.sample_rate(),
            channels,
        })
    }
}

impl AudioOutput {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut renderer: Renderer,
) -> anyhow::Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32> + Send + 'static,
{
    let channels = (config.channels as usize).max(1);
    let mut scratch = vec![0.0f32; SCRATCH_FRAMES * channels];
    let step = scratch.len();

    let err_fn = |err: cpal::StreamError| {
        let s = err.to_string();
        // under/overruns are routine on busy machines
        if !s.contains("underrun") && !s.contains("overrun") {
            warn!("[Output] Stream error: {}", s);
        }
    };

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                for chunk in data.chunks_mut(step) {
                    let buf = &mut scratch[..chunk.len()];
                    renderer.render_interleaved(buf, channels);
                    for (out, &s) in chunk.iter_mut().zip(buf.iter()) {
                        *out = T::from_sample(s.clamp(-1.0, 1.0));
                    }
                }
            },
            err_fn,
            None,
        )
        .context("building output stream")?;

    Ok(stream)
}
