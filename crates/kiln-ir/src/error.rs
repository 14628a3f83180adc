//! Error types for the kiln IR.

/// Structural invariant violations reported by [`Graph::verify`](crate::Graph::verify).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IrError {
    /// A handle refers to an entity that was destroyed.
    #[error("{kind} handle [{index}] refers to a destroyed entity")]
    DeadHandle { kind: &'static str, index: usize },

    /// A node reads a value that does not dominate it.
    #[error("node [{node}] uses value [{value}] outside the scope of its definition")]
    UseBeforeDef { node: usize, value: usize },

    /// A block returns a value that is not visible at its end.
    #[error("block [{block}] returns value [{value}] outside the scope of its definition")]
    ReturnNotVisible { block: usize, value: usize },

    /// A value's use list disagrees with the inputs and returns that read it.
    #[error("use list of value [{value}] is inconsistent: {reason}")]
    UseListMismatch { value: usize, reason: String },

    /// A value's recorded definition does not match where it appears.
    #[error("value [{value}] has a definition that does not match its position")]
    BadDefinition { value: usize },

    /// Block and node ownership links disagree.
    #[error("ownership mismatch: {0}")]
    OwnerMismatch(String),

    /// Live nodes exist that no block lists.
    #[error("{count} live node(s) are not reachable from the root block")]
    UnlinkedNodes { count: usize },
}
