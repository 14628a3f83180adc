//! Equivalence keys for CSE candidates.
//!
//! A node's fingerprint hashes its operator, the identities of its inputs in
//! order and its attributes in key order. The fingerprint only selects
//! candidates; [`nodes_equivalent`] is the authority on whether two nodes
//! are interchangeable.

use std::hash::{DefaultHasher, Hash, Hasher};

use kiln_analysis::MutationOracle;
use kiln_ir::{Graph, NodeId};

use crate::opacity::OpacityFilter;

/// Hash a node by operator, input handles and attributes.
pub fn fingerprint(graph: &Graph, node: NodeId) -> u64 {
    let data = graph.node(node);
    let mut hasher = DefaultHasher::new();
    data.op().hash(&mut hasher);
    data.inputs().hash(&mut hasher);
    data.attrs().len().hash(&mut hasher);
    for (key, value) in data.attrs() {
        key.hash(&mut hasher);
        value.hash(&mut hasher);
    }
    hasher.finish()
}

/// Check that two nodes compute the same thing from the same values.
///
/// Inputs are compared by identity, not by the structure of whatever
/// produced them. Output arity and output types must also agree.
pub fn nodes_equivalent(graph: &Graph, a: NodeId, b: NodeId) -> bool {
    let (na, nb) = (graph.node(a), graph.node(b));
    na.op() == nb.op()
        && na.inputs() == nb.inputs()
        && na.attrs() == nb.attrs()
        && na.blocks().is_empty()
        && nb.blocks().is_empty()
        && na.outputs().len() == nb.outputs().len()
        && na
            .outputs()
            .iter()
            .zip(nb.outputs())
            .all(|(&x, &y)| graph.value(x).ty() == graph.value(y).ty())
}

/// Fingerprint of a CSE candidate, or `None` if the node is not cacheable.
///
/// A node is not cacheable when it is an opaque module entry, owns nested
/// blocks, has side effects or is nondeterministic, or touches storage that
/// may be written in place.
pub fn cache_key(
    graph: &Graph,
    oracle: &dyn MutationOracle,
    opacity: &OpacityFilter,
    node: NodeId,
) -> Option<u64> {
    let data = graph.node(node);
    if opacity.is_opaque(data) || !data.blocks().is_empty() {
        return None;
    }
    if oracle.has_side_effects(graph, node) || oracle.has_writers(graph, node) {
        return None;
    }
    Some(fingerprint(graph, node))
}
