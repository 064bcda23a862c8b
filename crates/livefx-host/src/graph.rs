//! The render side of a context.
//!
//! [`Renderer`] owns every node body and all audio buffers. The control side
//! never touches them directly: it records graph changes as an ordered list of
//! [`Op`]s and ships them, together with a precomputed processing order, as a
//! single [`Command::Apply`]. The renderer drains pending commands at the start
//! of each block, so a transaction is always observed whole.
//!
//! Nothing on the render thread allocates or frees. Node slots, their buses
//! and any larger node table are built by the control side and shipped in the
//! op; consumed op lists, replaced orders, replaced tables and released nodes
//! travel back as [`Garbage`].
//!
//! Units that report "stop" keep their slot until the next block boundary,
//! where they are flagged released, detached from their consumers and sent
//! back to the control side for deallocation.

use crate::RENDER_QUANTUM;
use crate::analyser::AnalyserShared;
use crate::bus::AudioBus;
use crate::media::MediaSource;
use crate::node::{NodeId, NodeKind};
use crate::processor::{BlockProcessor, ProcessContext};
use crate::unit::UnitStatus;
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;

/// Node slots the renderer can hold before the control side ships a larger table.
pub(crate) const INITIAL_NODE_CAPACITY: usize = 16;

/// Inbound connections reserved per node.
const INPUT_RESERVE: usize = 8;

/// What a node does when the renderer reaches it.
pub(crate) enum NodeBody {
    Source(Box<dyn MediaSource>),
    Analyser(Arc<AnalyserShared>),
    Unit {
        processor: Box<dyn BlockProcessor>,
        status: Arc<UnitStatus>,
    },
    Destination,
}

impl NodeBody {
    pub(crate) fn kind(&self) -> NodeKind {
        match self {
            Self::Source(_) => NodeKind::Source,
            Self::Analyser(_) => NodeKind::Analyser,
            Self::Unit { .. } => NodeKind::Unit,
            Self::Destination => NodeKind::Destination,
        }
    }
}

/// A node with its buffers, ready to be installed by the renderer.
pub(crate) struct Slot {
    id: NodeId,
    body: NodeBody,
    inputs: Vec<NodeId>,
    input: AudioBus,
    output: AudioBus,
    stopped: bool,
}

impl Slot {
    pub(crate) fn new(id: NodeId, body: NodeBody, channels: usize) -> Self {
        Self {
            id,
            body,
            inputs: Vec::with_capacity(INPUT_RESERVE),
            input: AudioBus::new(channels, RENDER_QUANTUM),
            output: AudioBus::new(channels, RENDER_QUANTUM),
            stopped: false,
        }
    }

    pub(crate) fn id(&self) -> NodeId {
        self.id
    }

    pub(crate) fn kind(&self) -> NodeKind {
        self.body.kind()
    }
}

/// One graph mutation. Ops naming a node the renderer no longer holds are skipped.
///
/// The renderer applies ops in place and hands the list back intact, so the
/// owned payloads are taken out of their variants rather than moved.
pub(crate) enum Op {
    /// `None` once installed.
    AddNode(Option<Slot>),
    Connect { from: NodeId, to: NodeId },
    DisconnectOutputs(NodeId),
    PostMessage { node: NodeId, message: String },
    RemoveNode(NodeId),
    /// Moves every slot into this empty, larger table; left empty once applied.
    GrowTable(Vec<Slot>),
}

/// Messages from the control side.
pub(crate) enum Command {
    Apply { ops: Vec<Op>, order: Vec<NodeId> },
}

/// Storage handed back for deallocation off the render thread.
// Storage and table payloads are only ever dropped.
#[allow(dead_code)]
pub(crate) enum Garbage {
    /// A removed or released node.
    Node(Slot),
    /// An applied op list and the processing order it replaced.
    Storage { ops: Vec<Op>, order: Vec<NodeId> },
    /// A node table replaced by [`Op::GrowTable`].
    Table(Vec<Slot>),
}

/// Drives a context's render graph one quantum at a time.
///
/// Owned by whichever thread produces audio: a device callback or an offline
/// loop. Never blocks.
pub struct Renderer {
    /// Live nodes sorted by id.
    slots: Vec<Slot>,
    /// Slots that reported stop and wait for the next block boundary.
    stopped: usize,
    order: Vec<NodeId>,
    commands: Receiver<Command>,
    garbage: Sender<Garbage>,
    destination: NodeId,
    channels: usize,
    sample_rate: f32,
    current_frame: u64,
    pending: AudioBus,
    pending_pos: usize,
}

impl Renderer {
    pub(crate) fn new(
        commands: Receiver<Command>,
        garbage: Sender<Garbage>,
        destination: NodeId,
        channels: usize,
        sample_rate: f32,
    ) -> Self {
        let mut slots = Vec::with_capacity(INITIAL_NODE_CAPACITY);
        slots.push(Slot::new(destination, NodeBody::Destination, channels));
        Self {
            slots,
            stopped: 0,
            order: vec![destination],
            commands,
            garbage,
            destination,
            channels,
            sample_rate,
            current_frame: 0,
            pending: AudioBus::new(channels, RENDER_QUANTUM),
            pending_pos: RENDER_QUANTUM,
        }
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Maximum channel count of every bus in the graph.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Frames rendered so far.
    pub fn current_frame(&self) -> u64 {
        self.current_frame
    }

    /// Nodes the renderer currently holds, the destination included.
    pub fn node_count(&self) -> usize {
        self.slots.len()
    }

    /// Renders one quantum and returns the destination's mix.
    pub fn render_quantum(&mut self) -> &AudioBus {
        self.render_block();
        match self.position(self.destination) {
            Some(idx) => &self.slots[idx].output,
            None => &self.pending,
        }
    }

    /// Fills an interleaved device buffer of `device_channels` channels.
    ///
    /// Quanta are rendered as needed and buffered across calls, so any buffer
    /// length works. Device channels beyond the mix wrap around it; a silent
    /// mix (no active channels) writes zeros.
    pub fn render_interleaved(&mut self, out: &mut [f32], device_channels: usize) {
        if device_channels == 0 {
            return;
        }
        for frame in out.chunks_mut(device_channels) {
            if self.pending_pos >= RENDER_QUANTUM {
                self.render_block();
                match self.position(self.destination) {
                    Some(idx) => self.pending.copy_from(&self.slots[idx].output),
                    None => self.pending.clear(),
                }
                self.pending_pos = 0;
            }
            let active = self.pending.channel_count();
            for (ch, sample) in frame.iter_mut().enumerate() {
                *sample = if active == 0 {
                    0.0
                } else {
                    self.pending.channel(ch % active)[self.pending_pos]
                };
            }
            self.pending_pos += 1;
        }
    }

    fn render_block(&mut self) {
        self.drain_commands();
        self.reap_stopped();
        for i in 0..self.order.len() {
            let id = self.order[i];
            self.process_node(id);
        }
        self.current_frame += RENDER_QUANTUM as u64;
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                Command::Apply { mut ops, order } => {
                    for op in &mut ops {
                        self.apply(op);
                    }
                    let order = std::mem::replace(&mut self.order, order);
                    self.recycle(Garbage::Storage { ops, order });
                }
            }
        }
    }

    fn apply(&mut self, op: &mut Op) {
        match op {
            Op::AddNode(slot) => {
                if let Some(slot) = slot.take() {
                    self.add_node(slot);
                }
            }
            Op::Connect { from, to } => {
                let (from, to) = (*from, *to);
                if self.position(from).is_none() {
                    return;
                }
                if let Some(idx) = self.position(to) {
                    let inputs = &mut self.slots[idx].inputs;
                    if !inputs.contains(&from) {
                        inputs.push(from);
                    }
                }
            }
            Op::DisconnectOutputs(node) => self.detach(*node),
            Op::PostMessage { node, message } => {
                if let Some(idx) = self.position(*node)
                    && let Slot {
                        body: NodeBody::Unit { processor, .. },
                        stopped: false,
                        ..
                    } = &mut self.slots[idx]
                {
                    processor.on_message(message);
                }
            }
            Op::RemoveNode(id) => self.remove(*id),
            Op::GrowTable(table) => {
                let mut table = std::mem::take(table);
                table.extend(self.slots.drain(..));
                let old = std::mem::replace(&mut self.slots, table);
                self.recycle(Garbage::Table(old));
            }
        }
    }

    fn add_node(&mut self, slot: Slot) {
        match self.slots.binary_search_by_key(&slot.id, |s| s.id) {
            Ok(idx) => {
                let old = std::mem::replace(&mut self.slots[idx], slot);
                if old.stopped {
                    self.stopped -= 1;
                }
                self.recycle(Garbage::Node(old));
            }
            Err(idx) => self.slots.insert(idx, slot),
        }
    }

    fn position(&self, id: NodeId) -> Option<usize> {
        self.slots.binary_search_by_key(&id, |s| s.id).ok()
    }

    /// Drops every edge leaving `node`.
    fn detach(&mut self, node: NodeId) {
        for slot in &mut self.slots {
            slot.inputs.retain(|&i| i != node);
        }
    }

    fn remove(&mut self, id: NodeId) {
        if id == self.destination {
            return;
        }
        let Some(idx) = self.position(id) else {
            return;
        };
        let slot = self.slots.remove(idx);
        if slot.stopped {
            self.stopped -= 1;
        }
        self.detach(id);
        self.order.retain(|&n| n != id);
        if let NodeBody::Unit { status, .. } = &slot.body {
            status.mark_released();
        }
        self.recycle(Garbage::Node(slot));
    }

    fn reap_stopped(&mut self) {
        let mut idx = 0;
        while self.stopped > 0 && idx < self.slots.len() {
            if self.slots[idx].stopped {
                let id = self.slots[idx].id;
                self.remove(id);
            } else {
                idx += 1;
            }
        }
    }

    fn recycle(&self, garbage: Garbage) {
        // The control side may already be gone; the garbage then drops here.
        let _ = self.garbage.send(garbage);
    }

    fn process_node(&mut self, id: NodeId) {
        let Some(idx) = self.position(id) else {
            return;
        };

        let mut input = std::mem::take(&mut self.slots[idx].input);
        input.clear();
        for from in &self.slots[idx].inputs {
            if let Some(upstream) = self.position(*from) {
                input.accumulate_from(&self.slots[upstream].output);
            }
        }

        let sample_rate = self.sample_rate;
        let current_frame = self.current_frame;
        let slot = &mut self.slots[idx];
        match &mut slot.body {
            NodeBody::Source(source) => {
                slot.output.reset(source.channel_count());
                if !source.is_finished() {
                    source.render(&mut slot.output);
                }
            }
            NodeBody::Analyser(shared) => {
                shared.record(&input);
                slot.output.copy_from(&input);
            }
            NodeBody::Unit { processor, .. } => {
                if slot.stopped {
                    slot.output.clear();
                } else {
                    slot.output.reset(input.channel_count());
                    let keep = processor.process(ProcessContext {
                        input: &input,
                        output: &mut slot.output,
                        sample_rate,
                        current_frame,
                    });
                    if !keep {
                        slot.stopped = true;
                        self.stopped += 1;
                    }
                }
            }
            NodeBody::Destination => slot.output.copy_from(&input),
        }
        self.slots[idx].input = input;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::Oscillator;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Harness {
        tx: Sender<Command>,
        garbage: Receiver<Garbage>,
        renderer: Renderer,
    }

    fn harness() -> Harness {
        let (tx, rx) = crossbeam_channel::unbounded();
        let (gtx, grx) = crossbeam_channel::unbounded();
        Harness {
            tx,
            garbage: grx,
            renderer: Renderer::new(rx, gtx, NodeId(0), 2, 48000.0),
        }
    }

    impl Harness {
        fn apply(&self, ops: Vec<Op>, order: &[u32]) {
            let order = order.iter().map(|&i| NodeId(i)).collect();
            self.tx.send(Command::Apply { ops, order }).unwrap();
        }

        /// Nodes handed back so far, skipping recycled storage.
        fn released(&self) -> Vec<(NodeId, NodeKind)> {
            self.garbage
                .try_iter()
                .filter_map(|g| match g {
                    Garbage::Node(slot) => Some((slot.id(), slot.kind())),
                    _ => None,
                })
                .collect()
        }
    }

    fn add(id: u32, body: NodeBody) -> Op {
        Op::AddNode(Some(Slot::new(NodeId(id), body, 2)))
    }

    /// Doubles its input and stops after `budget` blocks.
    struct Doubler {
        budget: usize,
        messages: Arc<AtomicUsize>,
    }

    impl BlockProcessor for Doubler {
        fn process(&mut self, ctx: ProcessContext<'_>) -> bool {
            for ch in 0..ctx.input.channel_count() {
                let input = ctx.input.channel(ch);
                for (o, i) in ctx.output.channel_mut(ch).iter_mut().zip(input) {
                    *o = 2.0 * i;
                }
            }
            self.budget = self.budget.saturating_sub(1);
            self.budget > 0
        }

        fn on_message(&mut self, _message: &str) {
            self.messages.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn unit(budget: usize) -> (NodeBody, Arc<UnitStatus>, Arc<AtomicUsize>) {
        let status = Arc::new(UnitStatus::default());
        let messages = Arc::new(AtomicUsize::new(0));
        let body = NodeBody::Unit {
            processor: Box::new(Doubler {
                budget,
                messages: Arc::clone(&messages),
            }),
            status: Arc::clone(&status),
        };
        (body, status, messages)
    }

    fn tone() -> NodeBody {
        NodeBody::Source(Box::new(Oscillator::new(440.0, 0.5, 48000.0, 1)))
    }

    #[test]
    fn empty_graph_renders_silence() {
        let mut h = harness();
        let out = h.renderer.render_quantum();
        assert_eq!(out.channel_count(), 0);
        assert_eq!(h.renderer.current_frame(), RENDER_QUANTUM as u64);
    }

    #[test]
    fn source_reaches_destination() {
        let mut h = harness();
        h.apply(
            vec![
                add(1, tone()),
                Op::Connect { from: NodeId(1), to: NodeId(0) },
            ],
            &[1, 0],
        );
        let out = h.renderer.render_quantum();
        assert_eq!(out.channel_count(), 1);
        assert!(out.channel(0).iter().any(|s| s.abs() > 0.1));
    }

    #[test]
    fn unit_processes_its_input() {
        let mut h = harness();
        let (body, _, _) = unit(100);
        h.apply(
            vec![
                add(1, tone()),
                add(2, body),
                Op::Connect { from: NodeId(1), to: NodeId(2) },
                Op::Connect { from: NodeId(2), to: NodeId(0) },
            ],
            &[1, 2, 0],
        );
        let peak = h
            .renderer
            .render_quantum()
            .channel(0)
            .iter()
            .fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak > 0.9 && peak <= 1.0, "peak {peak}");
    }

    #[test]
    fn stopped_unit_is_released_on_next_block() {
        let mut h = harness();
        let (body, status, _) = unit(2);
        h.apply(
            vec![
                add(1, tone()),
                add(2, body),
                Op::Connect { from: NodeId(1), to: NodeId(2) },
                Op::Connect { from: NodeId(2), to: NodeId(0) },
            ],
            &[1, 2, 0],
        );
        h.renderer.render_quantum();
        // Second block reports stop.
        h.renderer.render_quantum();
        assert!(!status.is_released());
        assert!(h.released().is_empty());

        let out = h.renderer.render_quantum();
        assert_eq!(out.channel_count(), 0);
        assert!(status.is_released());
        assert_eq!(h.released(), vec![(NodeId(2), NodeKind::Unit)]);
        assert_eq!(h.renderer.node_count(), 2);
    }

    #[test]
    fn messages_arrive_before_next_process() {
        let mut h = harness();
        let (body, _, messages) = unit(100);
        h.apply(vec![add(1, body)], &[1, 0]);
        h.renderer.render_quantum();
        h.apply(
            vec![Op::PostMessage {
                node: NodeId(1),
                message: "disconnect".into(),
            }],
            &[1, 0],
        );
        assert_eq!(messages.load(Ordering::SeqCst), 0);
        h.renderer.render_quantum();
        assert_eq!(messages.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn ops_on_missing_nodes_are_ignored() {
        let mut h = harness();
        h.apply(
            vec![
                Op::Connect { from: NodeId(7), to: NodeId(0) },
                Op::DisconnectOutputs(NodeId(9)),
                Op::PostMessage {
                    node: NodeId(3),
                    message: "disconnect".into(),
                },
                Op::RemoveNode(NodeId(4)),
            ],
            &[0],
        );
        assert_eq!(h.renderer.render_quantum().channel_count(), 0);
    }

    #[test]
    fn disconnect_outputs_silences_downstream() {
        let mut h = harness();
        h.apply(
            vec![
                add(1, tone()),
                Op::Connect { from: NodeId(1), to: NodeId(0) },
            ],
            &[1, 0],
        );
        assert_eq!(h.renderer.render_quantum().channel_count(), 1);
        h.apply(vec![Op::DisconnectOutputs(NodeId(1))], &[1, 0]);
        assert_eq!(h.renderer.render_quantum().channel_count(), 0);
    }

    #[test]
    fn remove_node_returns_body() {
        let mut h = harness();
        h.apply(vec![add(1, tone())], &[1, 0]);
        h.apply(vec![Op::RemoveNode(NodeId(1))], &[0]);
        h.renderer.render_quantum();
        assert_eq!(h.released(), vec![(NodeId(1), NodeKind::Source)]);
    }

    #[test]
    fn interleaved_output_spans_quanta() {
        let mut h = harness();
        h.apply(
            vec![
                add(1, tone()),
                Op::Connect { from: NodeId(1), to: NodeId(0) },
            ],
            &[1, 0],
        );
        let mut out = vec![0.0f32; 300 * 2];
        h.renderer.render_interleaved(&mut out, 2);
        assert_eq!(h.renderer.current_frame(), 3 * RENDER_QUANTUM as u64);
        // Mono mix is duplicated onto both device channels.
        for frame in out.chunks(2) {
            assert_eq!(frame[0], frame[1]);
        }
        assert!(out.iter().any(|s| s.abs() > 0.1));
    }

    #[test]
    fn applied_commands_come_back_as_storage() {
        let mut h = harness();
        h.apply(
            vec![
                add(1, tone()),
                Op::PostMessage {
                    node: NodeId(1),
                    message: "ping".into(),
                },
            ],
            &[1, 0],
        );
        h.renderer.render_quantum();
        match h.garbage.try_recv().unwrap() {
            Garbage::Storage { ops, order } => {
                assert_eq!(ops.len(), 2);
                assert!(matches!(ops[0], Op::AddNode(None)));
                assert!(matches!(&ops[1], Op::PostMessage { message, .. } if message == "ping"));
                assert_eq!(order, vec![NodeId(0)]);
            }
            _ => panic!("expected recycled storage"),
        }
    }

    #[test]
    fn grow_table_keeps_nodes_and_returns_old_table() {
        let mut h = harness();
        h.apply(
            vec![add(1, tone()), Op::Connect { from: NodeId(1), to: NodeId(0) }],
            &[1, 0],
        );
        h.renderer.render_quantum();
        let _ = h.garbage.try_iter().count();

        h.apply(vec![Op::GrowTable(Vec::with_capacity(64))], &[1, 0]);
        let out = h.renderer.render_quantum();
        assert_eq!(out.channel_count(), 1);
        assert_eq!(h.renderer.node_count(), 2);
        assert!(h.renderer.slots.capacity() >= 64);
        let tables = h
            .garbage
            .try_iter()
            .filter(|g| matches!(g, Garbage::Table(t) if t.is_empty()))
            .count();
        assert_eq!(tables, 1);
    }

    #[test]
    fn out_of_order_adds_stay_sorted() {
        let mut h = harness();
        h.apply(vec![add(5, tone())], &[5, 0]);
        h.apply(vec![add(3, tone()), Op::Connect { from: NodeId(3), to: NodeId(0) }], &[3, 5, 0]);
        let out = h.renderer.render_quantum();
        assert_eq!(out.channel_count(), 1);
        let ids: Vec<_> = h.renderer.slots.iter().map(Slot::id).collect();
        assert_eq!(ids, vec![NodeId(0), NodeId(3), NodeId(5)]);
    }

    #[test]
    fn released_units_leave_the_table() {
        let mut h = harness();
        for round in 0..40u32 {
            let id = round + 1;
            let (body, status, _) = unit(1);
            h.apply(
                vec![add(id, body), Op::Connect { from: NodeId(id), to: NodeId(0) }],
                &[id, 0],
            );
            // Reports stop on its first block, released on the next.
            h.renderer.render_quantum();
            h.renderer.render_quantum();
            assert!(status.is_released());
        }
        assert_eq!(h.renderer.node_count(), 1);
        assert_eq!(h.renderer.stopped, 0);
        assert_eq!(h.released().len(), 40);
    }
}
