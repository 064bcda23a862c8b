//! Graph wiring around the processing unit.
//!
//! The topology is fixed:
//!
//! ```text
//! Source -> Dry tap -> [Unit] -> Wet tap -> Destination
//! ```
//!
//! With no unit the dry tap feeds the destination directly and the wet tap has
//! no input, so it reads as silence. Every change tears the topology down and
//! rebuilds it; disconnecting is idempotent, so tearing down twice is harmless.

use crate::codegen::DISCONNECT_MESSAGE;
use livefx_host::{GraphError, NodeId, Transaction};

/// The graph operations wiring needs from the host.
pub trait GraphOps {
    /// Posts a control message to a unit.
    fn post_message(&mut self, node: NodeId, message: &str);

    /// Removes every outgoing connection of `node`.
    fn disconnect(&mut self, node: NodeId);

    /// Connects `from`'s output to `to`'s input.
    fn connect(&mut self, from: NodeId, to: NodeId) -> Result<(), GraphError>;
}

impl GraphOps for Transaction<'_> {
    fn post_message(&mut self, node: NodeId, message: &str) {
        Transaction::post_message(self, node, message);
    }

    fn disconnect(&mut self, node: NodeId) {
        Transaction::disconnect(self, node);
    }

    fn connect(&mut self, from: NodeId, to: NodeId) -> Result<(), GraphError> {
        Transaction::connect(self, from, to)
    }
}

/// The nodes making up one wiring of the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Topology {
    /// Media source, once one is bound.
    pub source: Option<NodeId>,
    /// Pre-processing tap.
    pub dry: NodeId,
    /// Processing unit; `None` means bypass.
    pub unit: Option<NodeId>,
    /// Post-processing tap.
    pub wet: NodeId,
    /// Context destination.
    pub destination: NodeId,
}

impl Topology {
    /// The same topology with a different unit.
    pub fn with_unit(self, unit: Option<NodeId>) -> Self {
        Self { unit, ..self }
    }

    /// The same topology with a different source.
    pub fn with_source(self, source: Option<NodeId>) -> Self {
        Self { source, ..self }
    }
}

/// Disconnects every node of `topology`.
pub fn disconnect_all(ops: &mut impl GraphOps, topology: &Topology) {
    if let Some(source) = topology.source {
        ops.disconnect(source);
    }
    ops.disconnect(topology.dry);
    if let Some(unit) = topology.unit {
        ops.disconnect(unit);
    }
    ops.disconnect(topology.wet);
}

/// Connects `topology` from scratch.
pub fn rewire(ops: &mut impl GraphOps, topology: &Topology) -> Result<(), GraphError> {
    if let Some(source) = topology.source {
        ops.connect(source, topology.dry)?;
    }
    match topology.unit {
        Some(unit) => {
            ops.connect(topology.dry, unit)?;
            ops.connect(unit, topology.wet)?;
        }
        None => ops.connect(topology.dry, topology.destination)?,
    }
    ops.connect(topology.wet, topology.destination)
}

/// Replaces the unit of `current` with `next_unit`.
///
/// Signals the outgoing unit first, then tears the old topology down, then
/// wires the new one. Never waits for the outgoing unit to drain.
pub fn swap_unit(
    ops: &mut impl GraphOps,
    current: &Topology,
    next_unit: Option<NodeId>,
) -> Result<Topology, GraphError> {
    if let Some(outgoing) = current.unit {
        ops.post_message(outgoing, DISCONNECT_MESSAGE);
    }
    disconnect_all(ops, current);
    let next = current.with_unit(next_unit);
    rewire(ops, &next)?;
    Ok(next)
}
