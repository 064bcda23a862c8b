//! livefx host - a block-based real-time render host with a unit-script loader
//!
//! This crate provides the audio engine that live-recompiled processing units
//! run inside. It is split into a control side and a render side that share
//! nothing but lock-free queues and atomics.
//!
//! # Core Abstractions
//!
//! ## Control side
//!
//! - [`RenderContext`] - creates nodes and owns the topology mirror
//! - [`Transaction`] - batched connect/disconnect/message/remove, applied atomically
//! - [`ModuleLoader`] - global, append-only namespace of unit classes
//! - [`UnitHandle`] / [`AnalyserHandle`] - handles to live nodes
//!
//! ## Render side
//!
//! - [`Renderer`] - processes the graph one [`RENDER_QUANTUM`] at a time
//! - [`BlockProcessor`] - the per-block contract units implement
//! - [`MediaSource`] - audio producers behind source nodes
//!
//! ## Unit scripts
//!
//! The [`script`] module holds the language: lexer, parser, resolver, and the
//! interpreter that [`ScriptProcessor`] drives.
//!
//! # Example
//!
//! ```rust
//! use livefx_host::{ContextOptions, Oscillator, RenderContext};
//!
//! let (ctx, mut renderer) = RenderContext::new(ContextOptions::default());
//! ctx.module_loader()
//!     .add_module_blocking(
//!         "unit Half { process { for ch in channels { for i in 0..len(ch.input) { ch.output[i] = ch.input[i] * 0.5 } } } }
//!          register \"half\" Half;",
//!     )
//!     .unwrap();
//! let unit = ctx.create_unit("half").unwrap();
//! let source = ctx
//!     .create_media_source(Box::new(Oscillator::new(440.0, 1.0, 48000.0, 1)))
//!     .unwrap();
//!
//! let mut tx = ctx.transaction();
//! tx.connect(source, unit.node()).unwrap();
//! tx.connect(unit.node(), ctx.destination()).unwrap();
//! tx.commit().unwrap();
//!
//! let block = renderer.render_quantum();
//! assert_eq!(block.channel_count(), 1);
//! ```

pub mod analyser;
pub mod bus;
pub mod context;
pub mod error;
pub mod graph;
pub mod loader;
pub mod media;
pub mod node;
pub mod params;
pub mod processor;
pub mod script;
pub mod unit;

/// Frames per render block.
pub const RENDER_QUANTUM: usize = 128;

pub use analyser::{AnalyserHandle, AnalyserOptions, MAX_FFT_SIZE, MIN_FFT_SIZE, valid_fft_size};
pub use bus::AudioBus;
pub use context::{ContextOptions, RenderContext, Transaction, UnitHandle};
pub use error::{GraphError, LoadError, Position, RuntimeFault};
pub use graph::Renderer;
pub use loader::{ModuleLoader, UnitDefinition};
pub use media::{BufferSource, MediaSource, Oscillator, Silence};
pub use node::{NodeId, NodeKind};
pub use params::{AudioParam, AutomationRate, ParamSet, ParamSpec};
pub use processor::{BlockProcessor, ProcessContext};
pub use unit::{ScriptProcessor, UnitStatus};
