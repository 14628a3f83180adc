//! Optimization passes for kiln IR graphs.
//!
//! Provides a [`Pass`] trait, a [`PassManager`] with fixed-point iteration,
//! and the common subexpression elimination pass with its supporting
//! pieces (scoped candidate table, node equivalence keys, module opacity).

mod cse;
pub mod node_key;
pub mod opacity;
pub mod scoped_table;
mod validation;

pub use cse::{
    CommonSubexprElimination, eliminate_common_subexpression, eliminate_common_subexpression_with,
};
pub use opacity::OpacityFilter;
pub use scoped_table::ScopedTable;
pub use validation::IrValidation;

use std::fmt::Debug;

use kiln_ir::Graph;

/// An optimization pass that transforms a graph.
pub trait Pass: Debug {
    /// Human-readable name of the pass.
    fn name(&self) -> &str;

    /// Run the pass on a graph. Returns `true` if anything was modified.
    fn run(&self, graph: &mut Graph) -> bool;
}

/// Optimization level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptLevel {
    /// No optimizations.
    O0,
    /// Basic optimizations (CSE).
    O1,
    /// Aggressive optimizations (same as O1 for now).
    O2,
}

/// Maximum number of fixed-point iterations before giving up.
pub const MAX_ITERATIONS: usize = 10;

/// Runs passes in sequence with fixed-point iteration.
#[derive(Debug)]
pub struct PassManager {
    passes: Vec<Box<dyn Pass>>,
}

impl Default for PassManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PassManager {
    /// Creates an empty pass manager with no passes.
    pub fn new() -> Self {
        Self { passes: Vec::new() }
    }

    /// Creates a pass manager with passes appropriate for the given level.
    pub fn for_level(level: OptLevel) -> Self {
        let mut pm = Self::new();
        match level {
            OptLevel::O0 => {}
            OptLevel::O1 | OptLevel::O2 => {
                pm.add_pass(Box::new(CommonSubexprElimination::new()));
            }
        }
        pm
    }

    /// Adds a pass to the pipeline.
    pub fn add_pass(&mut self, pass: Box<dyn Pass>) {
        self.passes.push(pass);
    }

    /// Names of the registered passes, in run order.
    pub fn pass_names(&self) -> Vec<&str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Runs all passes until a fixed point is reached or the iteration limit.
    ///
    /// Returns `true` if any pass modified the graph.
    pub fn run(&self, graph: &mut Graph) -> bool {
        let mut modified = false;
        for iteration in 0..MAX_ITERATIONS {
            let mut changed = false;
            for pass in &self.passes {
                let pass_changed = pass.run(graph);
                if pass_changed {
                    log::debug!("pass '{}' changed the graph (iteration {iteration})", pass.name());
                }
                changed |= pass_changed;
            }
            modified |= changed;
            if !changed {
                break;
            }
        }
        modified
    }
}

/// Convenience function: runs O1 optimization passes on a graph.
pub fn optimize(graph: &mut Graph) -> bool {
    PassManager::for_level(OptLevel::O1).run(graph)
}
