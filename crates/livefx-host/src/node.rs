//! Node identifiers and roles in the render graph.
//!
//! Every node carries a [`NodeId`] and a [`NodeKind`]. The kind decides which
//! connections are structurally valid: sources have no inputs, the destination
//! has no outputs, analysers and processing units pass audio through.

use std::fmt;

/// Unique identifier for a node in a render context.
///
/// Node IDs are assigned sequentially and never reused within a context, so a
/// stale ID held by a caller can never alias a newer node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Returns the raw numeric identifier.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// The role of a node in the render graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Pulls audio from a [`MediaSource`](crate::MediaSource). No inputs.
    Source,
    /// Pass-through tap that records the signal for spectral reads.
    Analyser,
    /// Scripted processing unit instantiated from a registered module.
    Unit,
    /// Final output. Exactly one per context; no outputs.
    Destination,
}

impl NodeKind {
    /// Whether edges may arrive at this kind of node.
    pub fn accepts_input(self) -> bool {
        !matches!(self, Self::Source)
    }

    /// Whether edges may leave this kind of node.
    pub fn produces_output(self) -> bool {
        !matches!(self, Self::Destination)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Source => "source",
            Self::Analyser => "analyser",
            Self::Unit => "unit",
            Self::Destination => "destination",
        };
        f.write_str(name)
    }
}
