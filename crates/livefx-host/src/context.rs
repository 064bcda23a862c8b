//! The control side of a render context.
//!
//! [`RenderContext`] keeps a mirror of the render graph's topology, validates
//! every change against it and forwards accepted changes to the [`Renderer`].
//! Structural edits go through a [`Transaction`]: ops are staged against a
//! copy of the topology and only committed, as one command, when every step
//! succeeded.

use crate::analyser::{AnalyserHandle, AnalyserOptions, AnalyserShared};
use crate::error::{GraphError, LoadError};
use crate::graph::{Command, Garbage, INITIAL_NODE_CAPACITY, NodeBody, Op, Renderer, Slot};
use crate::loader::ModuleLoader;
use crate::media::MediaSource;
use crate::node::{NodeId, NodeKind};
use crate::params::ParamSet;
use crate::unit::{ScriptProcessor, UnitStatus};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, MutexGuard};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Settings fixed for the lifetime of a context.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContextOptions {
    /// Sample rate in Hz.
    pub sample_rate: f32,
    /// Maximum channel count carried between nodes.
    pub channels: usize,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            sample_rate: 48000.0,
            channels: 2,
        }
    }
}

#[derive(Clone)]
struct NodeEntry {
    kind: NodeKind,
    analyser: Option<Arc<AnalyserShared>>,
}

#[derive(Clone, Default)]
struct Topology {
    nodes: BTreeMap<NodeId, NodeEntry>,
    edges: BTreeSet<(NodeId, NodeId)>,
    /// Slots the renderer's node table holds without reallocating.
    table_capacity: usize,
}

impl Topology {
    fn entry(&self, id: NodeId) -> Result<&NodeEntry, GraphError> {
        self.nodes.get(&id).ok_or(GraphError::NodeNotFound(id))
    }

    /// DFS reachability check: can `from` reach `to` via existing edges?
    fn can_reach(&self, from: NodeId, to: NodeId) -> bool {
        let mut visited = BTreeSet::new();
        let mut stack = vec![from];
        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            stack.extend(self.outgoing(current));
        }
        false
    }

    fn outgoing(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.edges
            .range((node, NodeId(0))..=(node, NodeId(u32::MAX)))
            .map(|&(_, to)| to)
    }

    fn has_input(&self, node: NodeId) -> bool {
        self.edges.iter().any(|&(_, to)| to == node)
    }

    fn drop_node(&mut self, id: NodeId) {
        self.nodes.remove(&id);
        self.edges.retain(|&(from, to)| from != id && to != id);
    }

    /// Kahn's algorithm over every node. Ties resolve by ascending id.
    fn processing_order(&self) -> Vec<NodeId> {
        let mut in_degree: BTreeMap<NodeId, usize> = self.nodes.keys().map(|&id| (id, 0)).collect();
        for &(_, to) in &self.edges {
            if let Some(d) = in_degree.get_mut(&to) {
                *d += 1;
            }
        }
        let mut ready: BTreeSet<NodeId> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(&id, _)| id)
            .collect();
        let mut sorted = Vec::with_capacity(self.nodes.len());
        while let Some(id) = ready.pop_first() {
            sorted.push(id);
            for to in self.outgoing(id) {
                if let Some(d) = in_degree.get_mut(&to) {
                    *d -= 1;
                    if *d == 0 {
                        ready.insert(to);
                    }
                }
            }
        }
        sorted
    }
}

struct Shared {
    options: ContextOptions,
    next_id: AtomicU32,
    topology: Mutex<Topology>,
    commands: Sender<Command>,
    garbage: Receiver<Garbage>,
    loader: ModuleLoader,
    destination: NodeId,
}

/// Control-side handle to a render graph. Cheap to clone.
#[derive(Clone)]
pub struct RenderContext {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderContext")
            .field("options", &self.shared.options)
            .field("destination", &self.shared.destination)
            .finish_non_exhaustive()
    }
}

/// A live processing unit instantiated from a registered module.
#[derive(Debug, Clone)]
pub struct UnitHandle {
    node: NodeId,
    module: String,
    params: Arc<ParamSet>,
    status: Arc<UnitStatus>,
}

impl UnitHandle {
    /// The unit's node.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Registration name the unit was instantiated from.
    pub fn module(&self) -> &str {
        &self.module
    }

    /// The unit's k-rate parameters.
    pub fn params(&self) -> &Arc<ParamSet> {
        &self.params
    }

    /// Lifecycle counters.
    pub fn status(&self) -> &Arc<UnitStatus> {
        &self.status
    }

    /// Runtime faults reported so far, caught or not.
    pub fn fault_count(&self) -> u64 {
        self.status.fault_count()
    }

    /// Whether the render graph has removed the unit.
    pub fn is_released(&self) -> bool {
        self.status.is_released()
    }
}

impl RenderContext {
    /// Creates a context and the renderer that drives it.
    pub fn new(options: ContextOptions) -> (Self, Renderer) {
        let (commands, command_rx) = crossbeam_channel::unbounded();
        let (garbage_tx, garbage) = crossbeam_channel::unbounded();
        let destination = NodeId(0);
        let mut topology = Topology {
            table_capacity: INITIAL_NODE_CAPACITY,
            ..Topology::default()
        };
        topology.nodes.insert(
            destination,
            NodeEntry {
                kind: NodeKind::Destination,
                analyser: None,
            },
        );
        let renderer = Renderer::new(
            command_rx,
            garbage_tx,
            destination,
            options.channels,
            options.sample_rate,
        );
        let context = Self {
            shared: Arc::new(Shared {
                options,
                next_id: AtomicU32::new(1),
                topology: Mutex::new(topology),
                commands,
                garbage,
                loader: ModuleLoader::new(),
                destination,
            }),
        };
        (context, renderer)
    }

    /// Context settings.
    pub fn options(&self) -> ContextOptions {
        self.shared.options
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> f32 {
        self.shared.options.sample_rate
    }

    /// The destination node.
    pub fn destination(&self) -> NodeId {
        self.shared.destination
    }

    /// The context's module loader.
    pub fn module_loader(&self) -> &ModuleLoader {
        &self.shared.loader
    }

    /// Creates a source node playing `source`.
    pub fn create_media_source(&self, source: Box<dyn MediaSource>) -> Result<NodeId, GraphError> {
        let id = self.allocate_id();
        self.add_node(id, NodeBody::Source(source), None)?;
        Ok(id)
    }

    /// Creates an analyser node.
    pub fn create_analyser(&self, options: AnalyserOptions) -> Result<AnalyserHandle, GraphError> {
        options.validate().map_err(GraphError::InvalidOptions)?;
        let id = self.allocate_id();
        let shared = Arc::new(AnalyserShared::new());
        self.add_node(id, NodeBody::Analyser(Arc::clone(&shared)), Some(Arc::clone(&shared)))?;
        Ok(AnalyserHandle::new(id, shared, options))
    }

    /// Instantiates the unit registered as `module`.
    pub fn create_unit(&self, module: &str) -> Result<UnitHandle, LoadError> {
        let definition = self
            .shared
            .loader
            .definition(module)
            .ok_or_else(|| LoadError::NotRegistered(module.to_string()))?;
        let params = Arc::new(ParamSet::from_specs(definition.program().params()));
        let status = Arc::new(UnitStatus::default());
        let processor = ScriptProcessor::new(
            &definition,
            Arc::clone(&params),
            Arc::clone(&status),
            self.shared.options.sample_rate,
        )?;
        let id = self.allocate_id();
        let body = NodeBody::Unit {
            processor: Box::new(processor),
            status: Arc::clone(&status),
        };
        self.add_node(id, body, None).map_err(|e| LoadError::Instantiation {
            class: definition.program().class().to_string(),
            message: e.to_string(),
        })?;
        tracing::debug!(%id, module, "unit instantiated");
        Ok(UnitHandle {
            node: id,
            module: module.to_string(),
            params,
            status,
        })
    }

    /// Starts a transaction. Holds the topology lock until committed or dropped,
    /// so nodes must be created before the transaction is opened.
    pub fn transaction(&self) -> Transaction<'_> {
        let mut topology = self.shared.topology.lock();
        self.collect_garbage(&mut topology);
        let staged = topology.clone();
        Transaction {
            context: self,
            topology,
            staged,
            ops: Vec::new(),
        }
    }

    /// Current edges, sorted.
    pub fn connections(&self) -> Vec<(NodeId, NodeId)> {
        let mut topology = self.shared.topology.lock();
        self.collect_garbage(&mut topology);
        topology.edges.iter().copied().collect()
    }

    /// Kind of a live node.
    pub fn node_kind(&self, id: NodeId) -> Option<NodeKind> {
        let mut topology = self.shared.topology.lock();
        self.collect_garbage(&mut topology);
        topology.nodes.get(&id).map(|e| e.kind)
    }

    /// Nodes not yet released by the renderer, the destination included.
    pub fn live_node_count(&self) -> usize {
        let mut topology = self.shared.topology.lock();
        self.collect_garbage(&mut topology);
        topology.nodes.len()
    }

    fn allocate_id(&self) -> NodeId {
        NodeId(self.shared.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn add_node(
        &self,
        id: NodeId,
        body: NodeBody,
        analyser: Option<Arc<AnalyserShared>>,
    ) -> Result<(), GraphError> {
        let slot = Slot::new(id, body, self.shared.options.channels);
        let mut tx = self.transaction();
        tx.staged.nodes.insert(
            id,
            NodeEntry {
                kind: slot.kind(),
                analyser,
            },
        );
        // The renderer never holds more nodes than the topology does, so a
        // table sized for the staged count always suffices.
        let needed = tx.staged.nodes.len();
        if needed > tx.staged.table_capacity {
            let capacity = needed.max(tx.staged.table_capacity * 2);
            tracing::debug!(capacity, "growing render node table");
            tx.ops.push(Op::GrowTable(Vec::with_capacity(capacity)));
            tx.staged.table_capacity = capacity;
        }
        tx.ops.push(Op::AddNode(Some(slot)));
        tx.commit()
    }

    /// Forgets nodes the renderer has handed back and frees them here, along
    /// with any storage it recycled.
    fn collect_garbage(&self, topology: &mut Topology) {
        while let Ok(garbage) = self.shared.garbage.try_recv() {
            if let Garbage::Node(slot) = &garbage {
                tracing::debug!(id = %slot.id(), kind = %slot.kind(), "node released");
                topology.drop_node(slot.id());
            }
            drop(garbage);
        }
    }
}

/// A batch of graph changes applied atomically at a block boundary.
///
/// Changes are validated as they are recorded; a failed step leaves the
/// transaction usable and the staged graph unchanged. Dropping a transaction
/// without [`commit`](Self::commit) discards it.
pub struct Transaction<'a> {
    context: &'a RenderContext,
    topology: MutexGuard<'a, Topology>,
    staged: Topology,
    ops: Vec<Op>,
}

impl Transaction<'_> {
    /// Connects `from`'s output to `to`'s input. Connecting twice is a no-op.
    pub fn connect(&mut self, from: NodeId, to: NodeId) -> Result<(), GraphError> {
        let from_kind = self.staged.entry(from)?.kind;
        let to_kind = self.staged.entry(to)?.kind;
        if !from_kind.produces_output() {
            return Err(GraphError::InvalidConnection(format!(
                "{from_kind} node {from} has no output"
            )));
        }
        if !to_kind.accepts_input() {
            return Err(GraphError::InvalidConnection(format!(
                "{to_kind} node {to} has no input"
            )));
        }
        if self.staged.edges.contains(&(from, to)) {
            return Ok(());
        }
        if from == to || self.staged.can_reach(to, from) {
            return Err(GraphError::CycleDetected(from, to));
        }
        self.staged.edges.insert((from, to));
        self.ops.push(Op::Connect { from, to });
        Ok(())
    }

    /// Removes every outgoing connection of `node`. Idempotent; unknown nodes are ignored.
    pub fn disconnect(&mut self, node: NodeId) {
        if !self.staged.nodes.contains_key(&node) {
            return;
        }
        self.staged.edges.retain(|&(from, _)| from != node);
        self.ops.push(Op::DisconnectOutputs(node));
    }

    /// Posts a control message to a unit. Delivered before its next block.
    ///
    /// There is no acknowledgement; messages to other node kinds or to
    /// released units are dropped.
    pub fn post_message(&mut self, node: NodeId, message: impl Into<String>) {
        if self.staged.nodes.get(&node).is_some_and(|e| e.kind == NodeKind::Unit) {
            self.ops.push(Op::PostMessage {
                node,
                message: message.into(),
            });
        }
    }

    /// Removes a node with all of its connections.
    pub fn remove_node(&mut self, node: NodeId) -> Result<(), GraphError> {
        if node == self.context.shared.destination {
            return Err(GraphError::DestinationRemoval);
        }
        self.staged.entry(node)?;
        self.staged.drop_node(node);
        self.ops.push(Op::RemoveNode(node));
        Ok(())
    }

    /// Number of recorded changes.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Ships the recorded changes to the renderer as one command.
    pub fn commit(mut self) -> Result<(), GraphError> {
        let order = self.staged.processing_order();
        for (&id, entry) in &self.staged.nodes {
            if let Some(analyser) = &entry.analyser {
                analyser.set_has_input(self.staged.has_input(id));
            }
        }
        let ops = std::mem::take(&mut self.ops);
        let count = ops.len();
        self.context
            .shared
            .commands
            .send(Command::Apply { ops, order })
            .map_err(|_| GraphError::ContextClosed)?;
        *self.topology = std::mem::take(&mut self.staged);
        tracing::debug!(ops = count, "graph transaction committed");
        Ok(())
    }
}
