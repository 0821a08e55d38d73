pub mod config;
pub mod error;
pub mod events;
pub mod params;

pub use config::EngineConfig;
pub use error::{ConfigError, DecodeError, EngineError, OutOfRange};
pub use events::{EngineEvent, PlaybackEvent, SessionId, TransportState};
pub use params::ParamRange;

/// Frames produced per render-context invocation.
/// Every stage in the chain processes exactly this many samples at a time.
pub const RENDER_QUANTUM: usize = 128;

/// Default grain length for the pitch stage, in samples.
pub const DEFAULT_GRAIN_SIZE: usize = 1024;

/// The pitch stage's circular buffer holds this many grains.
pub const GRAIN_BUFFER_FACTOR: usize = 4;

/// Default time constant for parameter smoothing (seconds).
pub const DEFAULT_SMOOTHING_SECONDS: f32 = 0.01;
