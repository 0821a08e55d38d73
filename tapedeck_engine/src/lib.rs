pub mod analysis;
pub mod assets;
pub mod clock;
pub mod commands;
pub mod engine; // PlaybackEngine lives here
pub mod filter;
pub mod graph;
pub mod nodes;
pub mod output;
pub mod pitch;
pub mod render;
pub mod resampler;
pub mod ring;
pub mod smooth;
pub mod source;
pub mod transport;

#[cfg(test)]
mod tests_playback;

// Re-exports
pub use analysis::Analyser;
pub use assets::{AudioAsset, Decoder, WavDecoder, WaveformPeak};
pub use clock::{HostClock, SampleClock};
pub use engine::{EngineContext, PlaybackEngine};
pub use output::{AudioOutput, OutputDevice};
pub use render::Renderer;
pub use tapedeck_shared::{EngineConfig, EngineError, EngineEvent, SessionId, TransportState};
