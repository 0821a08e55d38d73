use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, EngineError};
use crate::{DEFAULT_GRAIN_SIZE, DEFAULT_SMOOTHING_SECONDS};

/// Engine configuration. Every field has a default so partial JSON files work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Grain length of the pitch stage in samples (even, non-zero).
    pub grain_size: usize,
    /// Time constant used by every smoothed control (seconds).
    pub smoothing_time_constant: f32,
    pub initial_cutoff_hz: f32,
    pub initial_gain: f32,
    pub initial_playback_rate: f32,
    /// Whether the pitch stage is part of the chain at startup.
    pub pitch_enabled: bool,
    /// Analysis window length (power of two).
    pub fft_size: usize,
    /// Averaging constant between successive spectra, in [0, 1).
    pub spectrum_smoothing: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
    pub command_capacity: usize,
    pub event_capacity: usize,
    /// Tap capacity, in render quanta.
    pub tap_capacity_quanta: usize,
    /// Start with the engine clock suspended until the first `play()`.
    pub start_suspended: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            grain_size: DEFAULT_GRAIN_SIZE,
            smoothing_time_constant: DEFAULT_SMOOTHING_SECONDS,
            initial_cutoff_hz: 1000.0,
            initial_gain: 1.0,
            initial_playback_rate: 1.0,
            pitch_enabled: true,
            fft_size: 2048,
            spectrum_smoothing: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
            command_capacity: 256,
            event_capacity: 64,
            tap_capacity_quanta: 64,
            start_suspended: false,
        }
    }
}

impl EngineConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.grain_size == 0 || self.grain_size % 2 != 0 {
            return Err(EngineError::InvalidConfig(format!(
                "grain_size must be even and non-zero, got {}",
                self.grain_size
            )));
        }
        if self.fft_size < 32 || !self.fft_size.is_power_of_two() {
            return Err(EngineError::InvalidConfig(format!(
                "fft_size must be a power of two >= 32, got {}",
                self.fft_size
            )));
        }
        if !(self.smoothing_time_constant > 0.0) {
            return Err(EngineError::InvalidConfig(
                "smoothing_time_constant must be positive".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.spectrum_smoothing) {
            return Err(EngineError::InvalidConfig(
                "spectrum_smoothing must be in [0, 1)".to_string(),
            ));
        }
        if self.min_decibels >= self.max_decibels {
            return Err(EngineError::InvalidConfig(
                "min_decibels must be below max_decibels".to_string(),
            ));
        }
        if self.command_capacity == 0 || self.event_capacity == 0 || self.tap_capacity_quanta == 0 {
            return Err(EngineError::InvalidConfig("queue capacities must be non-zero".to_string()));
        }
        Ok(())
    }
}
