//! Engine configuration.
//!
//! Loaded from TOML; every field is optional and falls back to its default:
//!
//! ```toml
//! sample_rate = 48000
//! channels = 2
//! fft_size = 512
//! smoothing = 0.8
//! min_decibels = -100.0
//! max_decibels = -30.0
//! ```

use livefx_host::{AnalyserOptions, ContextOptions, valid_fft_size};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    ReadFile {
        /// Path of the file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Failed to serialize TOML
    #[error("failed to serialize TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// A field holds an unusable value
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Name of the offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

impl ConfigError {
    /// Create a read file error.
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::ReadFile {
            path: path.into(),
            source,
        }
    }

    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Settings of an [`Engine`](crate::Engine) and its render context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count of the graph.
    pub channels: u16,
    /// Analyser FFT size.
    pub fft_size: usize,
    /// Analyser time smoothing in `[0, 1]`.
    pub smoothing: f32,
    /// Level mapped to byte 0.
    pub min_decibels: f32,
    /// Level mapped to byte 255.
    pub max_decibels: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            fft_size: 512,
            smoothing: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

impl EngineConfig {
    /// Reads, parses and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        Self::from_toml(&content)
    }

    /// Parses and validates TOML text.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes to TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Checks every field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(8000..=384_000).contains(&self.sample_rate) {
            return Err(ConfigError::invalid(
                "sample_rate",
                format!("{} Hz is outside 8000..=384000", self.sample_rate),
            ));
        }
        if !(1..=32).contains(&self.channels) {
            return Err(ConfigError::invalid(
                "channels",
                format!("{} is outside 1..=32", self.channels),
            ));
        }
        if !valid_fft_size(self.fft_size) {
            return Err(ConfigError::invalid(
                "fft_size",
                format!("{} is not a power of two in 32..=32768", self.fft_size),
            ));
        }
        self.analyser_options()
            .validate()
            .map_err(|reason| ConfigError::invalid("analyser", reason))
    }

    /// Render-context settings.
    pub fn context_options(&self) -> ContextOptions {
        ContextOptions {
            sample_rate: self.sample_rate as f32,
            channels: usize::from(self.channels),
        }
    }

    /// Analyser settings shared by both taps.
    pub fn analyser_options(&self) -> AnalyserOptions {
        AnalyserOptions {
            fft_size: self.fft_size,
            smoothing_time_constant: self.smoothing,
            min_decibels: self.min_decibels,
            max_decibels: self.max_decibels,
        }
    }
}
