//! Structural verification of a [`Graph`].
//!
//! Checks the invariants the optimizer relies on without trying to repair
//! anything: scoped dominance of every input and block result, use lists
//! that agree in both directions, consistent block ownership, and that
//! every live node is reachable from the root.

use std::collections::HashSet;

use crate::error::IrError;
use crate::graph::{BlockId, Graph, NodeId, Use, User, ValueDef, ValueId};

impl Graph {
    /// Verifies the structural invariants of the graph.
    pub fn verify(&self) -> Result<(), IrError> {
        let mut checker = Checker {
            graph: self,
            scopes: Vec::new(),
            visited: 0,
        };
        checker.check_block(self.root(), None)?;

        if checker.visited != self.node_count() {
            return Err(IrError::UnlinkedNodes {
                count: self.node_count() - checker.visited,
            });
        }

        self.check_use_targets()
    }

    fn check_use_targets(&self) -> Result<(), IrError> {
        for (value, data) in self.values() {
            for u in data.uses() {
                let read = match u.user {
                    User::Node(node) => self
                        .try_node(node)
                        .ok_or(IrError::DeadHandle {
                            kind: "node",
                            index: node.index(),
                        })?
                        .inputs()
                        .get(u.index)
                        .copied(),
                    User::Return(block) => self
                        .try_block(block)
                        .ok_or(IrError::DeadHandle {
                            kind: "block",
                            index: block.index(),
                        })?
                        .returns()
                        .get(u.index)
                        .copied(),
                };
                if read != Some(value) {
                    return Err(IrError::UseListMismatch {
                        value: value.index(),
                        reason: format!("{u:?} does not read this value"),
                    });
                }
            }
        }
        Ok(())
    }
}

struct Checker<'a> {
    graph: &'a Graph,
    scopes: Vec<HashSet<ValueId>>,
    visited: usize,
}

impl Checker<'_> {
    fn visible(&self, value: ValueId) -> bool {
        self.scopes.iter().any(|scope| scope.contains(&value))
    }

    fn expect_use(&self, value: ValueId, expected: Use) -> Result<(), IrError> {
        let data = self.graph.try_value(value).ok_or(IrError::DeadHandle {
            kind: "value",
            index: value.index(),
        })?;
        if data.uses().contains(&expected) {
            Ok(())
        } else {
            Err(IrError::UseListMismatch {
                value: value.index(),
                reason: format!("missing {expected:?}"),
            })
        }
    }

    fn check_block(&mut self, block: BlockId, owner: Option<NodeId>) -> Result<(), IrError> {
        let graph = self.graph;
        let data = graph.try_block(block).ok_or(IrError::DeadHandle {
            kind: "block",
            index: block.index(),
        })?;
        if data.owner() != owner {
            return Err(IrError::OwnerMismatch(format!(
                "block [{}] records owner {:?}, listed under {:?}",
                block.index(),
                data.owner(),
                owner
            )));
        }

        let mut scope = HashSet::new();
        for (index, &param) in data.params().iter().enumerate() {
            let value = graph.try_value(param).ok_or(IrError::DeadHandle {
                kind: "value",
                index: param.index(),
            })?;
            if value.def() != (ValueDef::BlockParam { block, index }) {
                return Err(IrError::BadDefinition {
                    value: param.index(),
                });
            }
            scope.insert(param);
        }
        self.scopes.push(scope);

        for &node in data.nodes() {
            let node_data = graph.try_node(node).ok_or(IrError::DeadHandle {
                kind: "node",
                index: node.index(),
            })?;
            self.visited += 1;

            if node_data.owner() != block {
                return Err(IrError::OwnerMismatch(format!(
                    "node [{}] records owner [{}], listed in block [{}]",
                    node.index(),
                    node_data.owner().index(),
                    block.index()
                )));
            }

            for (index, &input) in node_data.inputs().iter().enumerate() {
                if !self.visible(input) {
                    return Err(IrError::UseBeforeDef {
                        node: node.index(),
                        value: input.index(),
                    });
                }
                self.expect_use(
                    input,
                    Use {
                        user: User::Node(node),
                        index,
                    },
                )?;
            }

            for &nested in node_data.blocks() {
                self.check_block(nested, Some(node))?;
            }

            for (index, &output) in node_data.outputs().iter().enumerate() {
                let value = graph.try_value(output).ok_or(IrError::DeadHandle {
                    kind: "value",
                    index: output.index(),
                })?;
                if value.def() != (ValueDef::NodeOutput { node, index }) {
                    return Err(IrError::BadDefinition {
                        value: output.index(),
                    });
                }
                if let Some(scope) = self.scopes.last_mut() {
                    scope.insert(output);
                }
            }
        }

        for (index, &ret) in data.returns().iter().enumerate() {
            if !self.visible(ret) {
                return Err(IrError::ReturnNotVisible {
                    block: block.index(),
                    value: ret.index(),
                });
            }
            self.expect_use(
                ret,
                Use {
                    user: User::Return(block),
                    index,
                },
            )?;
        }

        self.scopes.pop();
        Ok(())
    }
}
