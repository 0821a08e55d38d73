//! Effect chain: `source → [pitch] → filter → gain → analysis tap → output`.
//!
//! The chain is split across the two contexts:
//!
//! - [`ChainRouter`] lives on the control context. It builds stage instances,
//!   publishes parameter targets and swaps in new [`Topology`] values.
//! - [`EffectChain`] lives on the render context. It owns the instances and
//!   runs them in the order of whatever topology it loaded for the quantum.
//!
//! A topology is an immutable, versioned list of stage kinds. Changing it
//! means building a new one and storing it in the `ArcSwap`; a quantum in
//! flight keeps the one it loaded, so every quantum sees one consistent chain.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::{debug, warn};

use tapedeck_shared::params::{cutoff_range, GAIN, PITCH_RATIO, PLAYBACK_RATE};
use tapedeck_shared::{EngineConfig, EngineError, ParamRange, PlaybackEvent, SessionId};

use crate::analysis::AnalysisTap;
use crate::assets::AudioAsset;
use crate::commands::{ChainCommand, Garbage};
use crate::filter::LowPassFilter;
use crate::nodes::{AudioNode, GainNode, StageKind};
use crate::pitch::GranularPitchShifter;
use crate::smooth::ParamTargets;
use crate::source::SourceVoice;

/// Value of the active-session cell when no source should be playing.
const NO_SESSION: u64 = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    version: u64,
    stages: Vec<StageKind>,
}

impl Topology {
    pub fn build(version: u64, pitch_enabled: bool) -> Self {
        let mut stages = Vec::with_capacity(4);
        if pitch_enabled {
            stages.push(StageKind::Pitch);
        }
        stages.extend([StageKind::Filter, StageKind::Gain, StageKind::AnalysisTap]);
        Self { version, stages }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn stages(&self) -> &[StageKind] {
        &self.stages
    }

    pub fn has_pitch(&self) -> bool {
        self.stages.contains(&StageKind::Pitch)
    }

    /// Pitch only directly after the source, filter before gain, each stage
    /// at most once, and the analysis tap last before the output.
    pub fn is_well_formed(&self) -> bool {
        let position = |kind| self.stages.iter().position(|&s| s == kind);
        let unique = self
            .stages
            .iter()
            .all(|kind| self.stages.iter().filter(|&s| s == kind).count() == 1);

        let pitch_first = position(StageKind::Pitch).is_none_or(|i| i == 0);
        let filter_before_gain = match (position(StageKind::Filter), position(StageKind::Gain)) {
            (Some(f), Some(g)) => f < g,
            _ => false,
        };
        let tap_last = self.stages.last() == Some(&StageKind::AnalysisTap);

        unique && pitch_first && filter_before_gain && tap_last
    }
}

/// Control-side handle for the chain.
pub struct ChainRouter {
    topology: Arc<ArcSwap<Topology>>,
    // keeps the last published topology alive so the render context is
    // never the one that frees it
    _previous: Option<Arc<Topology>>,
    commands: Sender<ChainCommand>,
    garbage: Receiver<Garbage>,
    targets: Arc<ParamTargets>,
    active_session: Arc<AtomicU64>,
    sample_rate: u32,
    grain_size: usize,
    smoothing: f32,
}

/// Render-side chain. Everything here is allocated before the first quantum.
pub struct EffectChain {
    topology: Arc<ArcSwap<Topology>>,
    commands: Receiver<ChainCommand>,
    garbage: Sender<Garbage>,
    events: Sender<PlaybackEvent>,
    targets: Arc<ParamTargets>,
    active_session: Arc<AtomicU64>,
    // completion the event queue had no room for yet
    pending_ended: Option<SessionId>,

    source: Option<Box<SourceVoice>>,
    pitch: Option<Box<GranularPitchShifter>>,
    filter: LowPassFilter,
    gain: GainNode,
    tap: AnalysisTap,
}

/// Builds both halves of the chain around shared queues and targets.
pub fn build_chain(
    config: &EngineConfig,
    sample_rate: u32,
    tap: AnalysisTap,
    events: Sender<PlaybackEvent>,
) -> (ChainRouter, EffectChain) {
    let tau = config.smoothing_time_constant;
    let cutoff = cutoff_range(sample_rate).clamp(config.initial_cutoff_hz);
    let gain = GAIN.clamp(config.initial_gain);
    let rate = PLAYBACK_RATE.clamp(config.initial_playback_rate);

    let targets = Arc::new(ParamTargets::new(cutoff, gain, rate, PITCH_RATIO.default));
    let active_session = Arc::new(AtomicU64::new(NO_SESSION));
    let topology = Arc::new(ArcSwap::from_pointee(Topology::build(0, false)));

    let (cmd_tx, cmd_rx) = bounded(config.command_capacity);
    // every retired instance is caused by a command or a session change
    let (garbage_tx, garbage_rx) = bounded(config.command_capacity + 2);

    let router = ChainRouter {
        topology: topology.clone(),
        _previous: None,
        commands: cmd_tx,
        garbage: garbage_rx,
        targets: targets.clone(),
        active_session: active_session.clone(),
        sample_rate,
        grain_size: config.grain_size,
        smoothing: tau,
    };

    let chain = EffectChain {
        topology,
        commands: cmd_rx,
        garbage: garbage_tx,
        events,
        targets,
        active_session,
        pending_ended: None,
        source: None,
        pitch: None,
        filter: LowPassFilter::new(cutoff, tau, sample_rate),
        gain: GainNode::new(gain, tau, sample_rate as f32),
        tap,
    };

    (router, chain)
}

impl ChainRouter {
    pub fn topology(&self) -> Arc<Topology> {
        self.topology.load_full()
    }

    pub fn pitch_enabled(&self) -> bool {
        self.topology.load().has_pitch()
    }

    fn publish(&mut self, pitch_enabled: bool) {
        let current = self.topology.load_full();
        let next = Topology::build(current.version() + 1, pitch_enabled);
        debug_assert!(next.is_well_formed());
        let labels: Vec<&str> = next.stages().iter().map(StageKind::label).collect();
        debug!("[Router] Publishing topology v{}: {}", next.version(), labels.join(" -> "));
        self.topology.store(Arc::new(next));
        self._previous = Some(current);
    }

    fn send(&self, command: ChainCommand) -> Result<(), EngineError> {
        match self.commands.try_send(command) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!("[Router] Command queue full");
                Err(EngineError::CommandQueueFull)
            }
            Err(TrySendError::Disconnected(_)) => {
                // render context is gone; nothing left to reconfigure
                debug!("[Router] Render context disconnected");
                Ok(())
            }
        }
    }

    /// Adds or removes the pitch stage.
    ///
    /// Enabling ships a freshly built shifter before publishing the topology
    /// that uses it. Disabling publishes first, then retires the instance.
    pub fn set_pitch_enabled(&mut self, enabled: bool) -> Result<(), EngineError> {
        if enabled == self.pitch_enabled() {
            return Ok(());
        }

        if enabled {
            let mut shifter = GranularPitchShifter::new(
                self.grain_size,
                self.targets.pitch_ratio.load(),
                self.smoothing,
                self.sample_rate as f32,
            );
            shifter.set_ratio_immediate(self.targets.pitch_ratio.load());
            self.send(ChainCommand::InstallPitch(Box::new(shifter)))?;
            self.publish(true);
        } else {
            self.publish(false);
            if self.send(ChainCommand::RemovePitch).is_err() {
                // unused while bypassed; replaced on the next install
                warn!("[Router] Pitch stage stays parked until the queue drains");
            }
        }
        Ok(())
    }

    fn apply(&self, name: &str, range: ParamRange, value: f32) -> f32 {
        match range.check(value) {
            Ok(v) => v,
            Err(e) => {
                debug!("[Router] {} {}", name, e);
                e.applied
            }
        }
    }

    pub fn set_filter_cutoff(&self, hz: f32) -> f32 {
        let applied = self.apply("cutoff", cutoff_range(self.sample_rate), hz);
        self.targets.cutoff_hz.store(applied);
        applied
    }

    pub fn set_gain(&self, gain: f32) -> f32 {
        let applied = self.apply("gain", GAIN, gain);
        self.targets.gain.store(applied);
        applied
    }

    pub fn set_playback_rate(&self, rate: f32) -> f32 {
        let applied = self.apply("playback rate", PLAYBACK_RATE, rate);
        self.targets.playback_rate.store(applied);
        applied
    }

    pub fn set_pitch_ratio(&self, ratio: f32) -> f32 {
        let applied = self.apply("pitch ratio", PITCH_RATIO, ratio);
        self.targets.pitch_ratio.store(applied);
        applied
    }

    pub fn targets(&self) -> &ParamTargets {
        &self.targets
    }

    /// Starts a new source for `session`. Any previous source stops at the
    /// next quantum boundary.
    pub fn instantiate_source(
        &self,
        asset: Arc<AudioAsset>,
        offset_seconds: f64,
        session: SessionId,
    ) -> Result<(), EngineError> {
        let voice = SourceVoice::new(
            asset,
            session,
            offset_seconds,
            self.targets.playback_rate.load(),
            self.smoothing,
            self.sample_rate,
        );
        let previous = self.active_session.swap(session.0, Ordering::AcqRel);
        if let Err(e) = self.send(ChainCommand::StartSource(Box::new(voice))) {
            self.active_session.store(previous, Ordering::Release);
            return Err(e);
        }
        Ok(())
    }

    /// Lock-free and infallible: the render context retires the source once
    /// it sees the active session cleared. Safe to call with nothing playing.
    pub fn teardown_source(&self) {
        self.active_session.store(NO_SESSION, Ordering::Release);
    }

    pub fn active_session(&self) -> Option<SessionId> {
        match self.active_session.load(Ordering::Acquire) {
            NO_SESSION => None,
            id => Some(SessionId(id)),
        }
    }

    /// Drops everything the render context has handed back.
    pub fn collect_garbage(&self) -> usize {
        let mut count = 0;
        for item in self.garbage.try_iter() {
            debug!("[Router] Dropping retired {}", item.label());
            count += 1;
        }
        count
    }
}

impl EffectChain {
    fn retire(&self, item: Garbage) {
        // a full queue means the control context stopped collecting;
        // dropping here is the only option left
        let _ = self.garbage.try_send(item);
    }

    fn drain_commands(&mut self) {
        while let Ok(cmd) = self.commands.try_recv() {
            match cmd {
                ChainCommand::StartSource(voice) => {
                    if let Some(old) = self.source.replace(voice) {
                        self.retire(Garbage::Source(old));
                    }
                }
                ChainCommand::InstallPitch(shifter) => {
                    if let Some(old) = self.pitch.replace(shifter) {
                        self.retire(Garbage::Pitch(old));
                    }
                }
                ChainCommand::RemovePitch => {
                    if let Some(old) = self.pitch.take() {
                        self.retire(Garbage::Pitch(old));
                    }
                }
            }
        }
    }

    fn flush_ended(&mut self) {
        if let Some(session) = self.pending_ended {
            match self.events.try_send(PlaybackEvent::Ended { session }) {
                Err(TrySendError::Full(_)) => {}
                Ok(()) | Err(TrySendError::Disconnected(_)) => self.pending_ended = None,
            }
        }
    }

    fn check_active_source(&mut self) {
        let active = self.active_session.load(Ordering::Acquire);
        let superseded = self
            .source
            .as_ref()
            .is_some_and(|s| s.session().0 != active);
        if superseded {
            if let Some(old) = self.source.take() {
                self.retire(Garbage::Source(old));
            }
        }
    }

    fn load_targets(&mut self) {
        self.filter.set_cutoff(self.targets.cutoff_hz.load());
        self.gain.set_gain(self.targets.gain.load());
        let ratio = self.targets.pitch_ratio.load();
        if let Some(pitch) = self.pitch.as_mut() {
            pitch.set_ratio(ratio);
        }
        let rate = self.targets.playback_rate.load();
        if let Some(source) = self.source.as_mut() {
            source.set_rate(rate);
        }
    }

    /// Renders one quantum into `buffer`. Never blocks or allocates.
    pub fn process_quantum(&mut self, buffer: &mut [f32]) {
        self.drain_commands();
        self.check_active_source();
        self.load_targets();

        match self.source.as_mut() {
            Some(source) => source.render(buffer),
            None => buffer.fill(0.0),
        }

        if self.source.as_ref().is_some_and(|s| s.is_finished()) {
            if let Some(done) = self.source.take() {
                self.pending_ended = Some(done.session());
                self.retire(Garbage::Source(done));
            }
        }
        self.flush_ended();

        let topology = self.topology.load();
        for stage in topology.stages() {
            match stage {
                // listed before the instance arrives: bypass for this quantum
                StageKind::Pitch => {
                    if let Some(pitch) = self.pitch.as_mut() {
                        pitch.process_in_place(buffer);
                    }
                }
                StageKind::Filter => self.filter.process(buffer),
                StageKind::Gain => self.gain.process(buffer),
                StageKind::AnalysisTap => self.tap.process(buffer),
            }
        }
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    pub fn has_pitch_instance(&self) -> bool {
        self.pitch.is_some()
    }
}
