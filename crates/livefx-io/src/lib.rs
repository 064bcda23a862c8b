//! Audio I/O for livefx.
//!
//! This crate provides:
//!
//! - **WAV file I/O**: [`read_wav`] and [`write_wav`], plus [`wav_source`] to
//!   turn a file into a media source for an engine
//! - **Offline rendering**: [`render_offline`] and [`render_to_wav`] pull a
//!   [`Renderer`](livefx_host::Renderer) without a device
//! - **Real-time output**: the [`AudioBackend`] trait and its cpal
//!   implementation [`CpalBackend`]; [`renderer_callback`] adapts a renderer
//!   into an output callback
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use livefx_core::{Engine, EngineConfig};
//! use livefx_io::{render_to_wav, wav_source};
//!
//! let (source, spec) = wav_source("input.wav", false)?;
//! let frames = source.len();
//! let (engine, mut renderer) = Engine::new(EngineConfig::default())?;
//! engine.set_source(Some(Box::new(source)))?;
//! engine.compile("output[i] = input[i] * 0.5", &[]).await?;
//! render_to_wav(&mut renderer, frames, "output.wav", 32)?;
//! ```

mod backend;
mod cpal_backend;
mod offline;
mod wav;

pub use backend::{
    AudioBackend, AudioDevice, BackendStreamConfig, ErrorCallback, OutputCallback, StreamHandle,
    renderer_callback,
};
pub use cpal_backend::CpalBackend;
pub use offline::{render_offline, render_to_wav};
pub use wav::{
    WavFormat, WavInfo, WavSpec, deinterleave, interleave, read_wav, read_wav_info, wav_source,
    write_wav,
};

/// Error types for audio I/O operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// WAV file read/write error.
    #[error("WAV file error: {0}")]
    Wav(#[from] hound::Error),

    /// Audio stream setup or runtime error.
    #[error("Audio stream error: {0}")]
    Stream(String),

    /// No audio device available on the system.
    #[error("No audio device available")]
    NoDevice,

    /// The requested sample format is not supported.
    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    /// The requested audio device was not found.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type for audio I/O operations.
pub type Result<T> = std::result::Result<T, Error>;
