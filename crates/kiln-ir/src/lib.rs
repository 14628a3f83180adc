//! kiln intermediate representation.
//!
//! An arena-based, block-structured SSA dataflow IR for computation graphs.
//! Nodes may own nested blocks (loop bodies, branch arms, module bodies);
//! values track their uses so consumers can be rewired in place.

pub mod arena;
mod attr;
mod display;
mod error;
pub mod graph;
mod op;
mod types;
mod verify;

pub use arena::{Arena, Handle};
pub use attr::{Attribute, Attributes};
pub use display::dump_graph;
pub use error::IrError;
pub use graph::{
    Block, BlockId, Graph, MODULE_ATTR, Node, NodeId, Use, User, Value, ValueDef, ValueId,
};
pub use op::Op;
pub use types::ValueType;
