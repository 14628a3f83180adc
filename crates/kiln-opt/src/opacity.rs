//! Opacity filter for named module regions.
//!
//! Module regions listed here are kept as distinct units: a region entry is
//! never merged with another instance of the same module, and its body is
//! not opened up for deduplication.

use std::collections::HashSet;

use kiln_ir::Node;

/// Set of module names whose regions must stay opaque.
#[derive(Clone, Debug, Default)]
pub struct OpacityFilter {
    modules: HashSet<String>,
}

impl OpacityFilter {
    /// Creates a filter from module names. Names match exactly.
    pub fn new<I, S>(modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            modules: modules.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns `true` if the node is the entry of an opaque module region.
    pub fn is_opaque(&self, node: &Node) -> bool {
        node.module_name()
            .is_some_and(|name| self.modules.contains(name))
    }
}
