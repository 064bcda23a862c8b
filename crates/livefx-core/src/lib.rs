//! livefx core - live recompilation of per-sample audio code
//!
//! Splices a user's per-sample processing snippet into a running audio graph
//! and swaps it out again without stopping the audio.
//!
//! # Pipeline
//!
//! - [`codegen`] - turns code plus [`ParameterDescriptor`]s into a unit module
//!   with a drain handshake
//! - [`ModuleRegistry`] - gives every module a fresh, never-reused name and
//!   loads it into the host
//! - [`wiring`] - the fixed Source -> Dry -> [Unit] -> Wet -> Destination topology
//! - [`Taps`] - byte spectra before and after the unit
//! - [`Engine`] - ties it together: `set_source`, `compile`, `snapshot`
//!
//! # Example
//!
//! ```rust
//! use livefx_core::{Engine, EngineConfig, ParameterDescriptor};
//! use livefx_host::Oscillator;
//!
//! # async fn run() {
//! let (engine, mut renderer) = Engine::new(EngineConfig::default()).unwrap();
//! engine
//!     .set_source(Some(Box::new(Oscillator::new(440.0, 0.5, 48000.0, 2))))
//!     .unwrap();
//! engine
//!     .compile(
//!         "output[i] = input[i] * parameters.gain",
//!         &[ParameterDescriptor::new("gain", 1.0, 0.0, 2.0)],
//!     )
//!     .await
//!     .unwrap();
//!
//! for _ in 0..8 {
//!     renderer.render_quantum();
//! }
//! let snapshot = engine.snapshot();
//! assert!(snapshot.wet().iter().any(|&b| b > 0));
//! # }
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(run());
//! ```

pub mod codegen;
pub mod config;
pub mod engine;
pub mod error;
pub mod params;
pub mod registry;
pub mod taps;
pub mod unit;
pub mod wiring;

pub use config::{ConfigError, EngineConfig};
pub use engine::{CompileOutcome, Endpoint, Engine, GraphState};
pub use error::EngineError;
pub use params::{ParameterDescriptor, parse_descriptors};
pub use registry::{ModuleRegistration, ModuleRegistry};
pub use taps::{Snapshot, Taps};
pub use unit::{ProcessingUnit, UnitPhase};
pub use wiring::{GraphOps, Topology};
