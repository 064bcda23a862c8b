//! The engine: composition root of the live-processing pipeline.
//!
//! Owns the render context, the bound media source, the active processing
//! unit and the two analysis taps. Every compile builds and loads a new module
//! first, then swaps units in one host transaction:
//!
//! 1. post `"disconnect"` to the outgoing unit;
//! 2. disconnect the whole topology;
//! 3. adopt the new unit, or none for bypass;
//! 4. rewire.
//!
//! The outgoing unit drains on the render thread's schedule. The engine never
//! waits for it.
//!
//! # Concurrent compiles
//!
//! Every call to [`Engine::compile`] takes a ticket when it starts. When its
//! load finishes, the result is applied only if no later-started call has
//! been applied already; otherwise the freshly loaded unit is told to
//! disconnect straight away and the call resolves to
//! [`CompileOutcome::Superseded`].

use crate::codegen::{self, DISCONNECT_MESSAGE};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::params::ParameterDescriptor;
use crate::registry::ModuleRegistry;
use crate::taps::{Snapshot, Taps};
use crate::unit::ProcessingUnit;
use crate::wiring::{self, Topology};
use livefx_host::{MediaSource, NodeId, RenderContext, Renderer, UnitHandle, valid_fft_size};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// How a [`compile`](Engine::compile) call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileOutcome {
    /// The graph now runs `module`, or is bypassed when `None`.
    Applied {
        /// Registry name of the new unit's module.
        module: Option<String>,
    },
    /// A later compile was applied first; this one was discarded.
    Superseded,
}

/// A node of the fixed topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// The bound media source.
    Source,
    /// Pre-processing analyser.
    DryTap,
    /// The active processing unit.
    Unit,
    /// Post-processing analyser.
    WetTap,
    /// The context destination.
    Destination,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Source => "source",
            Self::DryTap => "dry",
            Self::Unit => "unit",
            Self::WetTap => "wet",
            Self::Destination => "destination",
        };
        f.write_str(name)
    }
}

/// The engine's connections, in terms of [`Endpoint`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphState {
    /// Every edge among the engine's nodes.
    pub edges: Vec<(Endpoint, Endpoint)>,
}

impl GraphState {
    /// Whether `from -> to` is connected.
    pub fn contains(&self, from: Endpoint, to: Endpoint) -> bool {
        self.edges.contains(&(from, to))
    }

    /// Whether the dry signal bypasses the unit.
    pub fn is_bypassed(&self) -> bool {
        self.contains(Endpoint::DryTap, Endpoint::Destination)
    }
}

impl fmt::Display for GraphState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (from, to)) in self.edges.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{from}->{to}")?;
        }
        Ok(())
    }
}

struct EngineState {
    topology: Topology,
    unit: Option<ProcessingUnit>,
    draining: Vec<ProcessingUnit>,
    applied_ticket: u64,
}

impl EngineState {
    fn prune_released(&mut self) {
        self.draining.retain(|u| !u.is_released());
    }
}

/// Live-recompiling audio processor between a media source and the output.
pub struct Engine {
    context: RenderContext,
    config: EngineConfig,
    registry: ModuleRegistry,
    taps: Mutex<Taps>,
    state: Mutex<EngineState>,
    tickets: AtomicU64,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("active_module", &self.active_module())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Creates an engine and the renderer that produces its audio.
    ///
    /// Starts with no source and no unit: the taps are wired in bypass and
    /// the destination is silent.
    pub fn new(config: EngineConfig) -> Result<(Self, Renderer), EngineError> {
        config.validate()?;
        let (context, renderer) = RenderContext::new(config.context_options());
        let taps = Taps::new(&context, config.analyser_options())?;
        let topology = Topology {
            source: None,
            dry: taps.dry_node(),
            unit: None,
            wet: taps.wet_node(),
            destination: context.destination(),
        };
        let mut tx = context.transaction();
        wiring::rewire(&mut tx, &topology)?;
        tx.commit()?;

        let engine = Self {
            context,
            config,
            registry: ModuleRegistry::new(),
            taps: Mutex::new(taps),
            state: Mutex::new(EngineState {
                topology,
                unit: None,
                draining: Vec::new(),
                applied_ticket: 0,
            }),
            tickets: AtomicU64::new(0),
        };
        Ok((engine, renderer))
    }

    /// Binds a media source. `None` keeps the current binding.
    ///
    /// The previous source node is removed and the graph rewired around the
    /// new one, keeping the active unit if there is one.
    pub fn set_source(&self, source: Option<Box<dyn MediaSource>>) -> Result<(), EngineError> {
        let Some(source) = source else {
            return Ok(());
        };
        let node = self.context.create_media_source(source)?;
        let mut state = self.state.lock();
        let current = state.topology;
        let next = current.with_source(Some(node));

        let mut tx = self.context.transaction();
        wiring::disconnect_all(&mut tx, &current);
        if let Some(old) = current.source {
            tx.remove_node(old)?;
        }
        wiring::rewire(&mut tx, &next)?;
        tx.commit()?;

        state.topology = next;
        tracing::info!(%node, "media source bound");
        Ok(())
    }

    /// Compiles `code` into a new processing unit and swaps it in.
    ///
    /// Empty `code` swaps to bypass without loading anything. A load error
    /// leaves the current unit and graph exactly as they were.
    pub async fn compile(
        &self,
        code: &str,
        params: &[ParameterDescriptor],
    ) -> Result<CompileOutcome, EngineError> {
        let ticket = self.tickets.fetch_add(1, Ordering::AcqRel) + 1;
        let incoming = if code.is_empty() {
            None
        } else {
            let source = codegen::generate(code, params);
            Some(self.registry.load(&self.context, &source).await?)
        };

        let mut state = self.state.lock();
        state.prune_released();
        if state.applied_ticket > ticket {
            if let Some(unit) = incoming {
                tracing::info!(module = unit.module(), "compile superseded");
                self.retire(&mut state, unit);
            }
            return Ok(CompileOutcome::Superseded);
        }

        let current = state.topology;
        let mut tx = self.context.transaction();
        let swapped = wiring::swap_unit(&mut tx, &current, incoming.as_ref().map(ProcessingUnit::node))
            .and_then(|next| tx.commit().map(|()| next));
        let next = match swapped {
            Ok(next) => next,
            Err(err) => {
                if let Some(unit) = incoming {
                    self.retire(&mut state, unit);
                }
                return Err(err.into());
            }
        };

        state.applied_ticket = ticket;
        state.topology = next;
        if let Some(mut outgoing) = state.unit.take() {
            outgoing.begin_drain();
            tracing::debug!(module = outgoing.module(), "unit draining");
            state.draining.push(outgoing);
        }
        let module = incoming.as_ref().map(|u| u.module().to_string());
        state.unit = incoming;
        tracing::info!(module = module.as_deref().unwrap_or("bypass"), "unit swapped");
        Ok(CompileOutcome::Applied { module })
    }

    /// Sends `"disconnect"` to a unit that never made it into the graph.
    fn retire(&self, state: &mut EngineState, mut unit: ProcessingUnit) {
        let mut tx = self.context.transaction();
        tx.post_message(unit.node(), DISCONNECT_MESSAGE);
        if let Err(err) = tx.commit() {
            tracing::warn!(module = unit.module(), %err, "could not retire unit");
        }
        unit.begin_drain();
        state.draining.push(unit);
    }

    /// Reads both taps. Lengths equal the bin count (`fft_size / 2`).
    pub fn snapshot(&self) -> Snapshot<'_> {
        let mut taps = self.taps.lock();
        taps.refresh();
        Snapshot { taps }
    }

    /// Sets a k-rate parameter of the active unit. Returns whether it exists.
    pub fn set_parameter(&self, name: &str, value: f32) -> bool {
        self.state
            .lock()
            .unit
            .as_ref()
            .is_some_and(|u| u.set_parameter(name, value))
    }

    /// Changes both taps' FFT size.
    pub fn set_fft_size(&self, fft_size: usize) -> Result<(), EngineError> {
        if !valid_fft_size(fft_size) || !self.taps.lock().set_fft_size(fft_size) {
            return Err(EngineError::InvalidFftSize(fft_size));
        }
        Ok(())
    }

    /// Current connections among the engine's nodes.
    pub fn graph_state(&self) -> GraphState {
        let topology = self.state.lock().topology;
        let endpoint = |id: NodeId| {
            if Some(id) == topology.source {
                Some(Endpoint::Source)
            } else if id == topology.dry {
                Some(Endpoint::DryTap)
            } else if Some(id) == topology.unit {
                Some(Endpoint::Unit)
            } else if id == topology.wet {
                Some(Endpoint::WetTap)
            } else if id == topology.destination {
                Some(Endpoint::Destination)
            } else {
                None
            }
        };
        let edges = self
            .context
            .connections()
            .into_iter()
            .filter_map(|(from, to)| Some((endpoint(from)?, endpoint(to)?)))
            .collect();
        GraphState { edges }
    }

    /// Registry name of the active unit's module.
    pub fn active_module(&self) -> Option<String> {
        self.state.lock().unit.as_ref().map(|u| u.module().to_string())
    }

    /// Handle to the active unit.
    pub fn active_unit(&self) -> Option<UnitHandle> {
        self.state.lock().unit.as_ref().map(|u| u.handle().clone())
    }

    /// Units told to drain that the host has not released yet.
    pub fn draining_count(&self) -> usize {
        let mut state = self.state.lock();
        state.prune_released();
        state.draining.len()
    }

    /// The module registry.
    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// Engine settings.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The underlying render context.
    pub fn context(&self) -> &RenderContext {
        &self.context
    }
}
