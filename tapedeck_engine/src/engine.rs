use std::path::Path;
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver};
use tracing::{debug, info, trace};

use tapedeck_shared::params::semitones_to_ratio;
use tapedeck_shared::{
    DecodeError, EngineConfig, EngineError, EngineEvent, PlaybackEvent, SessionId, TransportState,
};

use crate::analysis::{analysis_tap, Analyser};
use crate::assets::{AudioAsset, Decoder, WavDecoder};
use crate::clock::{HostClock, SampleClock};
use crate::graph::{build_chain, ChainRouter};
use crate::render::Renderer;
use crate::resampler::AssetResampler;
use crate::transport::Transport;

/// Everything the engine's components share, created once and passed in
/// explicitly.
pub struct EngineContext {
    sample_rate: u32,
    config: EngineConfig,
    clock: Arc<SampleClock>,
}

impl EngineContext {
    pub fn new(sample_rate: u32, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        if sample_rate == 0 {
            return Err(EngineError::InvalidConfig("sample rate must be non-zero".to_string()));
        }

        let clock = Arc::new(SampleClock::new(sample_rate));
        if config.start_suspended {
            clock.suspend();
        }
        Ok(Self { sample_rate, config, clock })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<SampleClock> {
        &self.clock
    }
}

/// Control-side composition root: owns the asset, the transport and the
/// chain router, and turns render-side completions into `on_ended` calls.
pub struct PlaybackEngine {
    sample_rate: u32,
    clock: Arc<SampleClock>,
    decoder: Box<dyn Decoder>,
    asset: Option<Arc<AudioAsset>>,
    transport: Transport,
    router: ChainRouter,
    events: Receiver<PlaybackEvent>,
    analyser: Analyser,
    last_session: u64,
    on_ended: Option<Box<dyn FnMut() + Send>>,
}

impl PlaybackEngine {
    /// Builds the engine with the WAV decoder. The returned [`Renderer`] goes
    /// to whatever drives the render context.
    pub fn new(ctx: &EngineContext) -> Result<(Self, Renderer), EngineError> {
        Self::with_decoder(ctx, Box::new(WavDecoder))
    }

    pub fn with_decoder(
        ctx: &EngineContext,
        decoder: Box<dyn Decoder>,
    ) -> Result<(Self, Renderer), EngineError> {
        let config = ctx.config();
        let (tap, analyser) = analysis_tap(config, ctx.sample_rate());
        let (event_tx, event_rx) = bounded(config.event_capacity);
        let (mut router, chain) = build_chain(config, ctx.sample_rate(), tap, event_tx);

        router.set_pitch_enabled(config.pitch_enabled)?;
        let transport = Transport::new(router.targets().playback_rate.load());

        info!(
            "[Engine] Ready at {} Hz (grain {}, pitch {})",
            ctx.sample_rate(),
            config.grain_size,
            if config.pitch_enabled { "on" } else { "off" }
        );

        let engine = Self {
            sample_rate: ctx.sample_rate(),
            clock: ctx.clock().clone(),
            decoder,
            asset: None,
            transport,
            router,
            events: event_rx,
            analyser,
            last_session: 0,
            on_ended: None,
        };
        let renderer = Renderer::new(chain, ctx.clock().clone());
        Ok((engine, renderer))
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Engine clock in seconds.
    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    fn next_session(&mut self) -> SessionId {
        self.last_session += 1;
        SessionId(self.last_session)
    }

    /// Decodes `bytes` and makes the result the current asset. Playback stops
    /// and the position returns to zero. On failure the previous asset stays.
    pub fn load_asset(&mut self, bytes: &[u8]) -> Result<Arc<AudioAsset>, DecodeError> {
        let decoded = self.decoder.decode(bytes)?;
        let decoded = if decoded.sample_rate != self.sample_rate {
            debug!("[Engine] Resampling {} Hz -> {} Hz", decoded.sample_rate, self.sample_rate);
            AssetResampler::to_rate(&decoded, self.sample_rate)?
        } else {
            decoded
        };

        self.stop();
        let asset = Arc::new(decoded);
        info!(
            "[Engine] Loaded asset: {} frames, {} ch, {:.2}s",
            asset.frame_count(),
            asset.channel_count(),
            asset.duration_seconds()
        );
        self.asset = Some(asset.clone());
        Ok(asset)
    }

    pub fn load_asset_file(&mut self, path: impl AsRef<Path>) -> Result<Arc<AudioAsset>, EngineError> {
        let bytes = std::fs::read(path.as_ref())?;
        Ok(self.load_asset(&bytes)?)
    }

    pub fn asset(&self) -> Option<&Arc<AudioAsset>> {
        self.asset.as_ref()
    }

    /// Starts a new session at `offset_seconds`. Calling it while playing
    /// restarts from the new offset.
    pub fn play(&mut self, offset_seconds: f64) -> Result<SessionId, EngineError> {
        let asset = self.asset.clone().ok_or(EngineError::NoAssetLoaded)?;

        if self.clock.is_suspended() {
            debug!("[Engine] Resuming suspended clock");
            self.clock.resume();
        }

        let offset = offset_seconds.clamp(0.0, asset.duration_seconds());
        let session = self.next_session();
        self.router.instantiate_source(asset, offset, session)?;
        self.transport.play(self.clock.now(), offset, session);
        debug!("[Transport] Play {:?} from {:.3}s", session, offset);
        Ok(session)
    }

    pub fn pause(&mut self) {
        if let Some(position) = self.transport.pause(self.clock.now()) {
            self.router.teardown_source();
            debug!("[Transport] Paused at {:.3}s", position);
        }
    }

    /// Idempotent; also fine before any asset is loaded.
    pub fn stop(&mut self) {
        self.router.teardown_source();
        if self.transport.stop() {
            debug!("[Transport] Stopped");
        }
    }

    pub fn seek(&mut self, seconds: f64) -> Result<(), EngineError> {
        let offset = seconds.clamp(0.0, self.duration());
        if !self.transport.is_playing() {
            self.transport.seek(self.clock.now(), offset, SessionId(self.last_session));
            debug!("[Transport] Seek to {:.3}s (not playing)", offset);
            return Ok(());
        }

        let asset = self.asset.clone().ok_or(EngineError::NoAssetLoaded)?;
        let session = self.next_session();
        self.router.instantiate_source(asset, offset, session)?;
        self.transport.seek(self.clock.now(), offset, session);
        debug!("[Transport] Seek to {:.3}s as {:?}", offset, session);
        Ok(())
    }

    /// Returns the cutoff actually applied.
    pub fn set_filter_cutoff(&mut self, hz: f32) -> f32 {
        self.router.set_filter_cutoff(hz)
    }

    pub fn set_gain(&mut self, gain: f32) -> f32 {
        self.router.set_gain(gain)
    }

    /// Takes effect on the transport at once and on the source through the smoother.
    pub fn set_playback_rate(&mut self, rate: f32) -> f32 {
        let applied = self.router.set_playback_rate(rate);
        self.transport.set_playback_rate(self.clock.now(), applied);
        applied
    }

    /// Converts to a ratio with `2^(n/12)` and returns the ratio applied.
    pub fn set_pitch_shift_semitones(&mut self, semitones: f32) -> f32 {
        self.router.set_pitch_ratio(semitones_to_ratio(semitones))
    }

    pub fn set_pitch_enabled(&mut self, enabled: bool) -> Result<(), EngineError> {
        self.router.set_pitch_enabled(enabled)
    }

    pub fn pitch_enabled(&self) -> bool {
        self.router.pitch_enabled()
    }

    pub fn current_position(&self) -> f64 {
        self.transport
            .position(self.clock.now())
            .clamp(0.0, self.duration())
    }

    pub fn duration(&self) -> f64 {
        self.asset.as_ref().map_or(0.0, |a| a.duration_seconds())
    }

    pub fn is_playing(&self) -> bool {
        self.transport.is_playing()
    }

    pub fn state(&self) -> TransportState {
        self.transport.state()
    }

    /// Session of the source currently playing.
    pub fn session(&self) -> Option<SessionId> {
        self.transport.session()
    }

    /// Called once per naturally ended session, from `poll_events`.
    pub fn on_ended<F>(&mut self, callback: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.on_ended = Some(Box::new(callback));
    }

    /// Processes what the render context reported since the last call:
    /// completions of the active session become `Ended` events, stale ones
    /// are dropped, and retired instances are freed here.
    pub fn poll_events(&mut self) -> Vec<EngineEvent> {
        self.router.collect_garbage();

        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            match event {
                PlaybackEvent::Ended { session } => {
                    if self.transport.complete(session) {
                        self.router.teardown_source();
                        debug!("[Transport] {:?} ended", session);
                        if let Some(callback) = self.on_ended.as_mut() {
                            callback();
                        }
                        out.push(EngineEvent::Ended { session });
                    } else {
                        trace!("[Engine] Suppressed stale completion for {:?}", session);
                    }
                }
            }
        }
        out
    }

    pub fn analyser(&self) -> &Analyser {
        &self.analyser
    }

    pub fn analyser_mut(&mut self) -> &mut Analyser {
        &mut self.analyser
    }
}
