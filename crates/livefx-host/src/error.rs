//! Error types for module loading, graph mutation, and script execution.

use crate::node::NodeId;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A 1-based line/column position in module source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    /// Line number, starting at 1.
    pub line: u32,
    /// Column number in characters, starting at 1.
    pub column: u32,
}

impl Position {
    /// Computes the position of byte offset `offset` in `source`.
    pub fn at(source: &str, offset: usize) -> Self {
        let offset = offset.min(source.len());
        let before = source.get(..offset).unwrap_or(source);
        let line = before.matches('\n').count() as u32 + 1;
        let line_start = before.rfind('\n').map_or(0, |i| i + 1);
        let column = before[line_start..].chars().count() as u32 + 1;
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Errors raised while loading a module or instantiating a unit.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoadError {
    /// The module text does not parse.
    #[error("syntax error at {pos}: {message}")]
    Syntax {
        /// Where parsing failed.
        pos: Position,
        /// What the parser expected.
        message: String,
    },

    /// The module parses but refers to something that does not exist or is misused.
    #[error("{message} at {pos}")]
    Semantic {
        /// Where the problem is.
        pos: Position,
        /// Description.
        message: String,
    },

    /// A unit's parameter declarations are invalid.
    #[error("invalid parameters in unit '{class}': {message}")]
    InvalidParameters {
        /// The unit class declaring them.
        class: String,
        /// What is wrong.
        message: String,
    },

    /// A `register` statement names a unit class the module does not define.
    #[error("unknown unit class '{class}' at {pos}")]
    UnknownClass {
        /// The class name.
        class: String,
        /// Where it was referenced.
        pos: Position,
    },

    /// The registration name is already taken in the global namespace.
    #[error("module '{0}' is already registered")]
    AlreadyRegistered(String),

    /// No module is registered under this name.
    #[error("no module registered as '{0}'")]
    NotRegistered(String),

    /// A unit's state initializers faulted while creating an instance.
    #[error("unit '{class}' failed to initialise: {message}")]
    Instantiation {
        /// The unit class.
        class: String,
        /// The fault.
        message: String,
    },

    /// The background loading task failed to complete.
    #[error("module loader worker failed: {0}")]
    Worker(String),
}

impl LoadError {
    /// Source position of the error, if it points into module text.
    pub fn position(&self) -> Option<Position> {
        match self {
            Self::Syntax { pos, .. } | Self::Semantic { pos, .. } | Self::UnknownClass { pos, .. } => {
                Some(*pos)
            }
            _ => None,
        }
    }
}

/// Errors that can occur during graph operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The specified node was not found in the context.
    #[error("node {0} not found")]
    NodeNotFound(NodeId),
    /// Adding this edge would create a cycle.
    #[error("connecting {0} to {1} would create a cycle")]
    CycleDetected(NodeId, NodeId),
    /// A structurally invalid connection (e.g. into a source node).
    #[error("invalid connection: {0}")]
    InvalidConnection(String),
    /// Node options out of range.
    #[error("invalid node options: {0}")]
    InvalidOptions(String),
    /// The destination node cannot be removed.
    #[error("the destination node cannot be removed")]
    DestinationRemoval,
    /// The renderer has been dropped; no further changes can be applied.
    #[error("render context is closed")]
    ContextClosed,
}

/// A failure while a unit script runs on the render thread.
///
/// Cheap to clone; carries no heap data besides interned member names.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeFault {
    /// Buffer index negative, fractional, or past the end.
    #[error("index {index} out of range for buffer of length {len}")]
    IndexOutOfRange {
        /// Index that was used.
        index: f32,
        /// Buffer length.
        len: usize,
    },
    /// A buffer handle kept from an earlier block names a channel the
    /// current block does not carry.
    #[error("channel {channel} is not active in this block ({active} active)")]
    InactiveChannel {
        /// Channel the handle refers to.
        channel: usize,
        /// Active channels in the current block.
        active: usize,
    },
    /// An operation received a value of the wrong type.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// What the operation needs.
        expected: &'static str,
        /// What it got.
        found: &'static str,
    },
    /// Write into a read-only value.
    #[error("cannot write to {0}")]
    ReadOnly(&'static str),
    /// Member access on a value that has no such member.
    #[error("{on} has no member '{member}'")]
    UnknownMember {
        /// Kind of the accessed value.
        on: &'static str,
        /// Member name.
        member: Arc<str>,
    },
    /// Script function calls nested too deeply.
    #[error("call depth exceeded {0}")]
    CallDepth(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_from_offset() {
        let src = "ab\ncde\nf";
        assert_eq!(Position::at(src, 0), Position { line: 1, column: 1 });
        assert_eq!(Position::at(src, 4), Position { line: 2, column: 2 });
        assert_eq!(Position::at(src, 7), Position { line: 3, column: 1 });
        assert_eq!(Position::at(src, 999), Position { line: 3, column: 2 });
    }

    #[test]
    fn load_error_position() {
        let err = LoadError::Syntax {
            pos: Position { line: 4, column: 2 },
            message: "expected '}'".into(),
        };
        assert_eq!(err.position(), Some(Position { line: 4, column: 2 }));
        assert_eq!(err.to_string(), "syntax error at 4:2: expected '}'");
        assert_eq!(LoadError::AlreadyRegistered("1".into()).position(), None);
    }

    #[test]
    fn fault_messages() {
        let f = RuntimeFault::IndexOutOfRange { index: 128.0, len: 128 };
        assert_eq!(f.to_string(), "index 128 out of range for buffer of length 128");
        let f = RuntimeFault::InactiveChannel { channel: 1, active: 1 };
        assert_eq!(f.to_string(), "channel 1 is not active in this block (1 active)");
        let f = RuntimeFault::UnknownMember {
            on: "channel",
            member: Arc::from("gain"),
        };
        assert_eq!(f.to_string(), "channel has no member 'gain'");
    }
}
