//! Transport state machine.
//!
//! Position is never stored while playing. It is derived from the engine
//! clock: `offset_at_start + (now - anchor) * playback_rate`. Every operation
//! takes `now` explicitly so the machine is pure and testable.

use tapedeck_shared::{SessionId, TransportState};

#[derive(Debug, Clone, PartialEq)]
pub struct Transport {
    state: TransportState,
    anchor_engine_time: f64,
    offset_at_start: f64,
    paused_offset: f64,
    playback_rate: f64,
    session: Option<SessionId>,
}

impl Default for Transport {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Transport {
    pub fn new(playback_rate: f32) -> Self {
        Self {
            state: TransportState::Stopped,
            anchor_engine_time: 0.0,
            offset_at_start: 0.0,
            paused_offset: 0.0,
            playback_rate: playback_rate as f64,
            session: None,
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    /// Session of the source currently playing, if any.
    pub fn session(&self) -> Option<SessionId> {
        self.session
    }

    pub fn playback_rate(&self) -> f64 {
        self.playback_rate
    }

    pub fn position(&self, now: f64) -> f64 {
        match self.state {
            TransportState::Playing => {
                self.offset_at_start + (now - self.anchor_engine_time).max(0.0) * self.playback_rate
            }
            _ => self.paused_offset,
        }
    }

    /// Enters `Playing` from any state. Playing again restarts from `offset`
    /// under the new session.
    pub fn play(&mut self, now: f64, offset: f64, session: SessionId) {
        self.state = TransportState::Playing;
        self.anchor_engine_time = now;
        self.offset_at_start = offset.max(0.0);
        self.paused_offset = self.offset_at_start;
        self.session = Some(session);
    }

    /// Captures the position and leaves `Playing`. Returns the captured
    /// position, or `None` when there was nothing to pause.
    pub fn pause(&mut self, now: f64) -> Option<f64> {
        if !self.is_playing() {
            return None;
        }
        self.paused_offset = self.position(now);
        self.state = TransportState::Paused;
        self.session = None;
        Some(self.paused_offset)
    }

    /// Rewinds to zero. Redundant calls are absorbed.
    pub fn stop(&mut self) -> bool {
        let was_active = self.state != TransportState::Stopped;
        self.state = TransportState::Stopped;
        self.paused_offset = 0.0;
        self.offset_at_start = 0.0;
        self.session = None;
        was_active
    }

    /// Re-anchors at `now` before the rate changes, so position stays continuous.
    pub fn set_playback_rate(&mut self, now: f64, rate: f32) {
        if self.is_playing() {
            self.offset_at_start = self.position(now);
            self.anchor_engine_time = now;
        }
        self.playback_rate = rate as f64;
    }

    /// Moves to `offset`. While playing the caller must start a new source
    /// for the returned session; otherwise only the stored offset changes.
    pub fn seek(&mut self, now: f64, offset: f64, session: SessionId) -> bool {
        if self.is_playing() {
            self.pause(now);
            self.play(now, offset, session);
            true
        } else {
            self.paused_offset = offset.max(0.0);
            false
        }
    }

    /// The source for `session` ran to its end. Only the active session
    /// moves the transport; anything else is a stale completion.
    pub fn complete(&mut self, session: SessionId) -> bool {
        if self.session != Some(session) {
            return false;
        }
        self.stop();
        true
    }
}
