//! IR validation pass.
//!
//! Checks structural invariants of the graph and logs a warning for the
//! first problem found. This pass never modifies the graph.

use kiln_ir::Graph;

use crate::Pass;

/// Validates IR structural invariants. Returns `false` (never modifies the graph).
#[derive(Debug)]
pub struct IrValidation;

impl Pass for IrValidation {
    fn name(&self) -> &str {
        "ir-validation"
    }

    fn run(&self, graph: &mut Graph) -> bool {
        if let Err(err) = graph.verify() {
            log::warn!("ir-validation: {err}");
        }
        false
    }
}
