//! Common subexpression elimination pass.
//!
//! Walks every block in order, fingerprints each eligible node and looks it
//! up in a scoped table of canonical nodes. A hit redirects the uses of the
//! duplicate's outputs to the canonical node's outputs and removes the
//! duplicate; a miss makes the node canonical for the rest of its scope.
//! Merged duplicates stay in their block until the block's traversal ends
//! and are then removed in one batch.
//!
//! Nested blocks are visited depth-first before the rest of their parent
//! block. Each nested block gets its own scope, so sibling blocks (the two
//! arms of a conditional) never share candidates while both still see the
//! canonical nodes of every enclosing block. Traversal uses an explicit
//! frame stack, so nesting depth is bounded by memory rather than by the
//! call stack.

use kiln_analysis::{AliasDb, MutationOracle};
use kiln_ir::{BlockId, Graph, NodeId, dump_graph};

use crate::Pass;
use crate::node_key::{cache_key, nodes_equivalent};
use crate::opacity::OpacityFilter;
use crate::scoped_table::ScopedTable;

/// Common subexpression elimination pass.
///
/// Module regions named in the opaque list are left untouched: their entry
/// nodes are never merged and their bodies are not visited.
#[derive(Debug, Default)]
pub struct CommonSubexprElimination {
    opacity: OpacityFilter,
}

impl CommonSubexprElimination {
    /// Creates a pass with no opaque modules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a pass that keeps the named module regions opaque.
    pub fn with_opaque_modules<I, S>(modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            opacity: OpacityFilter::new(modules),
        }
    }
}

impl Pass for CommonSubexprElimination {
    fn name(&self) -> &str {
        "cse"
    }

    fn run(&self, graph: &mut Graph) -> bool {
        let mut oracle = AliasDb::new(graph);
        eliminate_common_subexpression_with(graph, &mut oracle, &self.opacity)
    }
}

/// Eliminate common subexpressions in `graph`.
///
/// `opaque_modules` names module regions that must survive as distinct
/// instances. Returns `true` if at least one node was removed.
pub fn eliminate_common_subexpression(graph: &mut Graph, opaque_modules: &[String]) -> bool {
    let mut oracle = AliasDb::new(graph);
    let opacity = OpacityFilter::new(opaque_modules.iter().cloned());
    eliminate_common_subexpression_with(graph, &mut oracle, &opacity)
}

/// Eliminate common subexpressions using a caller-supplied oracle.
///
/// The oracle is told about every merge through
/// [`MutationOracle::note_merged`] so later answers see the merged storage.
pub fn eliminate_common_subexpression_with(
    graph: &mut Graph,
    oracle: &mut dyn MutationOracle,
    opacity: &OpacityFilter,
) -> bool {
    let mut driver = Driver {
        oracle,
        opacity,
        table: ScopedTable::new(),
        eliminated: 0,
    };
    driver.run(graph);

    if log::log_enabled!(log::Level::Trace) {
        log::trace!("cse: graph after elimination:\n{}", dump_graph(graph));
    }
    log::debug!(
        "cse: eliminated {} node(s), {} remain",
        driver.eliminated,
        graph.node_count()
    );
    driver.eliminated > 0
}

/// Traversal position within one block.
struct Frame {
    block: BlockId,
    cursor: usize,
    entered: bool,
    merged: Vec<NodeId>,
}

impl Frame {
    fn new(block: BlockId) -> Self {
        Self {
            block,
            cursor: 0,
            entered: false,
            merged: Vec::new(),
        }
    }
}

/// Outcome of visiting a single node.
enum Visit {
    /// Node stays; continue with the next one.
    Kept,
    /// Node was merged into a canonical node and is now unused.
    Merged,
    /// Node owns blocks that must be visited before its successors.
    Descend(Vec<BlockId>),
}

struct Driver<'a> {
    oracle: &'a mut dyn MutationOracle,
    opacity: &'a OpacityFilter,
    table: ScopedTable<NodeId>,
    eliminated: usize,
}

impl Driver<'_> {
    fn run(&mut self, graph: &mut Graph) {
        let mut frames = vec![Frame::new(graph.root())];

        while let Some(top) = frames.len().checked_sub(1) {
            if !frames[top].entered {
                self.table.push_scope();
                frames[top].entered = true;
            }

            let (block, cursor) = (frames[top].block, frames[top].cursor);
            let Some(&node) = graph.block(block).nodes().get(cursor) else {
                self.table.pop_scope();
                if let Some(done) = frames.pop()
                    && !done.merged.is_empty()
                {
                    graph.destroy_nodes(done.block, &done.merged);
                }
                continue;
            };

            frames[top].cursor += 1;
            match self.visit(graph, node) {
                Visit::Kept => {}
                Visit::Merged => {
                    frames[top].merged.push(node);
                    self.eliminated += 1;
                }
                Visit::Descend(blocks) => {
                    // Reversed so the first block is visited first.
                    frames.extend(blocks.into_iter().rev().map(Frame::new));
                }
            }
        }

        debug_assert_eq!(self.table.depth(), 0, "unbalanced CSE scopes");
    }

    fn visit(&mut self, graph: &mut Graph, node: NodeId) -> Visit {
        let data = graph.node(node);

        if self.opacity.is_opaque(data) {
            log::trace!(
                "cse: keeping opaque module instance {node:?} ({})",
                data.module_name().unwrap_or_default()
            );
            return Visit::Kept;
        }
        if !data.blocks().is_empty() {
            return Visit::Descend(data.blocks().to_vec());
        }

        let Some(key) = cache_key(graph, &*self.oracle, self.opacity, node) else {
            return Visit::Kept;
        };

        let found = self
            .table
            .lookup(key, |candidate| nodes_equivalent(graph, candidate, node));
        let Some(canonical) = found else {
            self.table.insert(key, node);
            return Visit::Kept;
        };

        let duplicate_outputs = graph.node(node).outputs();
        let canonical_outputs = graph.node(canonical).outputs();
        if !self
            .oracle
            .safe_to_merge(graph, duplicate_outputs, canonical_outputs)
        {
            log::trace!("cse: {node:?} matches {canonical:?} but merging may change aliasing");
            return Visit::Kept;
        }

        log::trace!(
            "cse: replacing {node:?} ({}) with {canonical:?}",
            graph.node(node).op()
        );
        self.oracle
            .note_merged(graph, duplicate_outputs, canonical_outputs);
        graph.replace_node_outputs(node, canonical);
        Visit::Merged
    }
}
