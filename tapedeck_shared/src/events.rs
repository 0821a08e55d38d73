use serde::{Deserialize, Serialize};

/// Identity of one playback session (one `play()` call).
/// Completion messages carry it so a superseded session can be recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Emitted by the render context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// The source for `session` ran past the last frame of the asset.
    Ended { session: SessionId },
}

/// Returned to the control surface after stale completions are filtered out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    Ended { session: SessionId },
}
