//! Error types for the live-processing engine.

use crate::config::ConfigError;
use livefx_host::{GraphError, LoadError};
use thiserror::Error;

/// Errors that can occur while driving an [`Engine`](crate::Engine).
#[derive(Debug, Error)]
pub enum EngineError {
    /// The generated module failed to load or instantiate. Nothing was changed.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// The host rejected a graph change.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// The engine configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// FFT size is not a power of two in the supported range.
    #[error("unsupported FFT size {0}")]
    InvalidFftSize(usize),
}

impl EngineError {
    /// Whether this error came from loading user code.
    pub fn is_load_error(&self) -> bool {
        matches!(self, Self::Load(_))
    }
}
