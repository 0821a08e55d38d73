//! Error types shared by the engine and its hosts.

use thiserror::Error;

/// A decoded asset could not be produced from the given bytes.
/// Fatal to that load attempt only; the previous asset stays loaded.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Malformed audio data: {0}")]
    Malformed(String),

    #[error("Unsupported audio format: {0}")]
    Unsupported(String),

    #[error("Audio data contains no frames")]
    Empty,

    #[error("Sample rate conversion failed: {0}")]
    Resample(String),
}

/// Errors surfaced by the playback engine's control surface.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("No asset loaded")]
    NoAssetLoaded,

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Render command queue is full")]
    CommandQueueFull,

    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// A control value fell outside its range.
/// Never returned from public setters; they apply `applied` and log instead.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
#[error("Parameter out of range: requested {requested}, applied {applied}")]
pub struct OutOfRange {
    pub requested: f32,
    pub applied: f32,
}
