//! Block-structured dataflow graph.
//!
//! A [`Graph`] owns a root [`Block`]. Blocks are ordered node lists with
//! parameters and returns; nodes may own nested blocks (loop bodies, branch
//! arms, module bodies). Values are single-definition and keep an ordered
//! list of their uses, so rewiring every consumer of a value is a walk over
//! that list rather than a search of the graph.
//!
//! Nodes, values and blocks live in arenas and refer to one another through
//! handles, which keeps the node ↔ value ↔ use cross-links free of
//! ownership cycles.

use std::collections::HashSet;

use crate::arena::{Arena, Handle};
use crate::attr::{Attribute, Attributes};
use crate::op::Op;
use crate::types::ValueType;

/// Handle of a node in a [`Graph`].
pub type NodeId = Handle<Node>;
/// Handle of a value in a [`Graph`].
pub type ValueId = Handle<Value>;
/// Handle of a block in a [`Graph`].
pub type BlockId = Handle<Block>;

/// Attribute key marking a node as the entry of a named module region.
pub const MODULE_ATTR: &str = "module";

/// Where a value is defined.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum ValueDef {
    /// The `index`-th output of `node`.
    NodeOutput { node: NodeId, index: usize },
    /// The `index`-th parameter of `block`.
    BlockParam { block: BlockId, index: usize },
}

/// The consumer side of a [`Use`].
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum User {
    /// A node input.
    Node(NodeId),
    /// A block result.
    Return(BlockId),
}

/// One consumption of a value: `user` reads it at position `index`.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct Use {
    pub user: User,
    pub index: usize,
}

/// A single-definition value.
#[derive(Clone, Debug)]
pub struct Value {
    ty: ValueType,
    def: ValueDef,
    name: Option<String>,
    uses: Vec<Use>,
}

impl Value {
    /// Static type of the value.
    pub fn ty(&self) -> ValueType {
        self.ty
    }

    /// Definition site of the value.
    pub fn def(&self) -> ValueDef {
        self.def
    }

    /// Debug name, if one was assigned.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Uses of the value, in insertion order.
    pub fn uses(&self) -> &[Use] {
        &self.uses
    }

    /// Returns `true` if anything consumes the value.
    pub fn has_uses(&self) -> bool {
        !self.uses.is_empty()
    }

    /// The node producing this value, or `None` for block parameters.
    pub fn producer(&self) -> Option<NodeId> {
        match self.def {
            ValueDef::NodeOutput { node, .. } => Some(node),
            ValueDef::BlockParam { .. } => None,
        }
    }
}

/// A computation in the graph.
#[derive(Clone, Debug)]
pub struct Node {
    op: Op,
    inputs: Vec<ValueId>,
    outputs: Vec<ValueId>,
    attrs: Attributes,
    blocks: Vec<BlockId>,
    owner: BlockId,
}

impl Node {
    /// The operator tag.
    pub fn op(&self) -> &Op {
        &self.op
    }

    /// Ordered input values.
    pub fn inputs(&self) -> &[ValueId] {
        &self.inputs
    }

    /// Ordered output values.
    pub fn outputs(&self) -> &[ValueId] {
        &self.outputs
    }

    /// Static attributes, ordered by key.
    pub fn attrs(&self) -> &Attributes {
        &self.attrs
    }

    /// Looks up a single attribute.
    pub fn attr(&self, key: &str) -> Option<&Attribute> {
        self.attrs.get(key)
    }

    /// Nested blocks owned by this node.
    pub fn blocks(&self) -> &[BlockId] {
        &self.blocks
    }

    /// The block this node is listed in.
    pub fn owner(&self) -> BlockId {
        self.owner
    }

    /// Name of the module region this node is the entry of, if any.
    pub fn module_name(&self) -> Option<&str> {
        self.attr(MODULE_ATTR).and_then(Attribute::as_str)
    }
}

/// An ordered sequence of nodes with parameters and results.
#[derive(Clone, Debug, Default)]
pub struct Block {
    nodes: Vec<NodeId>,
    params: Vec<ValueId>,
    returns: Vec<ValueId>,
    owner: Option<NodeId>,
}

impl Block {
    /// Nodes in execution order.
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Block parameters (graph inputs for the root block).
    pub fn params(&self) -> &[ValueId] {
        &self.params
    }

    /// Block results (graph outputs for the root block).
    pub fn returns(&self) -> &[ValueId] {
        &self.returns
    }

    /// The node owning this block, or `None` for the root block.
    pub fn owner(&self) -> Option<NodeId> {
        self.owner
    }
}

/// A dataflow graph with a single root block.
#[derive(Clone, Debug)]
pub struct Graph {
    nodes: Arena<Node>,
    values: Arena<Value>,
    blocks: Arena<Block>,
    root: BlockId,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    /// Create a new graph with an empty root block.
    pub fn new() -> Self {
        let mut blocks = Arena::new();
        let root = blocks.append(Block::default());
        Self {
            nodes: Arena::new(),
            values: Arena::new(),
            blocks,
            root,
        }
    }

    /// The root block.
    pub fn root(&self) -> BlockId {
        self.root
    }

    /// Returns the node behind a handle.
    ///
    /// # Panics
    ///
    /// Panics if the node was destroyed.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    /// Returns the value behind a handle.
    ///
    /// # Panics
    ///
    /// Panics if the value was destroyed.
    pub fn value(&self, id: ValueId) -> &Value {
        &self.values[id]
    }

    /// Returns the block behind a handle.
    ///
    /// # Panics
    ///
    /// Panics if the block was destroyed.
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id]
    }

    /// Returns `true` if the node has not been destroyed.
    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains(id)
    }

    /// Returns `true` if the value has not been destroyed.
    pub fn contains_value(&self, id: ValueId) -> bool {
        self.values.contains(id)
    }

    pub(crate) fn try_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.try_get(id)
    }

    pub(crate) fn try_value(&self, id: ValueId) -> Option<&Value> {
        self.values.try_get(id)
    }

    pub(crate) fn try_block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.try_get(id)
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = (ValueId, &Value)> {
        self.values.iter()
    }

    /// Graph inputs (parameters of the root block).
    pub fn inputs(&self) -> &[ValueId] {
        self.block(self.root).params()
    }

    /// Graph outputs (results of the root block).
    pub fn outputs(&self) -> &[ValueId] {
        self.block(self.root).returns()
    }

    /// Number of live nodes, counting nodes in nested blocks.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of live values.
    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    /// Adds a graph input of the given type.
    pub fn add_input(&mut self, ty: ValueType) -> ValueId {
        self.add_block_param(self.root, ty)
    }

    /// Adds a parameter to `block`.
    pub fn add_block_param(&mut self, block: BlockId, ty: ValueType) -> ValueId {
        let index = self.blocks[block].params.len();
        let value = self.values.append(Value {
            ty,
            def: ValueDef::BlockParam { block, index },
            name: None,
            uses: Vec::new(),
        });
        self.blocks[block].params.push(value);
        value
    }

    /// Assigns a debug name to a value.
    pub fn set_value_name(&mut self, value: ValueId, name: impl Into<String>) {
        self.values[value].name = Some(name.into());
    }

    /// Appends a node to the end of `block`.
    ///
    /// Creates one output value per entry of `output_types` and registers a
    /// use on every input.
    ///
    /// # Panics
    ///
    /// Panics if `block` or any input refers to a destroyed entity.
    pub fn append_node(
        &mut self,
        block: BlockId,
        op: Op,
        inputs: &[ValueId],
        output_types: &[ValueType],
    ) -> NodeId {
        assert!(
            self.blocks.contains(block),
            "append_node({op}): block {block:?} was destroyed"
        );
        for &input in inputs {
            assert!(
                self.values.contains(input),
                "append_node({op}): input {input:?} was destroyed"
            );
        }

        let node = self.nodes.append(Node {
            op,
            inputs: inputs.to_vec(),
            outputs: Vec::with_capacity(output_types.len()),
            attrs: Attributes::new(),
            blocks: Vec::new(),
            owner: block,
        });

        for (index, &input) in inputs.iter().enumerate() {
            self.values[input].uses.push(Use {
                user: User::Node(node),
                index,
            });
        }

        for (index, &ty) in output_types.iter().enumerate() {
            let value = self.values.append(Value {
                ty,
                def: ValueDef::NodeOutput { node, index },
                name: None,
                uses: Vec::new(),
            });
            self.nodes[node].outputs.push(value);
        }

        self.blocks[block].nodes.push(node);
        node
    }

    /// Sets a static attribute on a node.
    pub fn set_attr(&mut self, node: NodeId, key: impl Into<String>, value: Attribute) {
        self.nodes[node].attrs.insert(key.into(), value);
    }

    /// Marks a node as the entry of the named module region.
    pub fn set_module(&mut self, node: NodeId, name: impl Into<String>) {
        self.set_attr(node, MODULE_ATTR, Attribute::Str(name.into()));
    }

    /// Creates a new empty block owned by `node`.
    pub fn add_block(&mut self, node: NodeId) -> BlockId {
        let block = self.blocks.append(Block {
            owner: Some(node),
            ..Block::default()
        });
        self.nodes[node].blocks.push(block);
        block
    }

    /// Replaces the results of `block`.
    pub fn set_returns(&mut self, block: BlockId, values: &[ValueId]) {
        let old = std::mem::take(&mut self.blocks[block].returns);
        for (index, value) in old.into_iter().enumerate() {
            self.remove_use(
                value,
                Use {
                    user: User::Return(block),
                    index,
                },
            );
        }
        for (index, &value) in values.iter().enumerate() {
            self.values[value].uses.push(Use {
                user: User::Return(block),
                index,
            });
        }
        self.blocks[block].returns = values.to_vec();
    }

    /// Appends a graph output and returns its position.
    pub fn register_output(&mut self, value: ValueId) -> usize {
        let root = self.root;
        let index = self.blocks[root].returns.len();
        self.values[value].uses.push(Use {
            user: User::Return(root),
            index,
        });
        self.blocks[root].returns.push(value);
        index
    }

    /// Redirects every use of `old` to `new`, leaving `old` unused.
    ///
    /// # Panics
    ///
    /// Panics if the two values have different types.
    pub fn replace_all_uses_with(&mut self, old: ValueId, new: ValueId) {
        if old == new {
            return;
        }
        let (old_ty, new_ty) = (self.values[old].ty, self.values[new].ty);
        assert_eq!(
            old_ty, new_ty,
            "replace_all_uses_with: type mismatch between {old:?} and {new:?}"
        );

        let uses = std::mem::take(&mut self.values[old].uses);
        for u in &uses {
            match u.user {
                User::Node(node) => self.nodes[node].inputs[u.index] = new,
                User::Return(block) => self.blocks[block].returns[u.index] = new,
            }
        }
        self.values[new].uses.extend(uses);
    }

    /// Redirects the uses of each output of `node` to the output of
    /// `replacement` at the same position.
    ///
    /// # Panics
    ///
    /// Panics if the nodes have a different number of outputs.
    pub fn replace_node_outputs(&mut self, node: NodeId, replacement: NodeId) {
        let from = self.nodes[node].outputs.clone();
        let to = self.nodes[replacement].outputs.clone();
        assert_eq!(
            from.len(),
            to.len(),
            "replace_node_outputs: arity mismatch between {node:?} and {replacement:?}"
        );
        for (old, new) in from.into_iter().zip(to) {
            self.replace_all_uses_with(old, new);
        }
    }

    /// Removes a node, its owned blocks and its output values.
    ///
    /// # Panics
    ///
    /// Panics if any output of the node is still used.
    pub fn destroy_node(&mut self, node: NodeId) {
        let owner = self.unlink_node(node);
        let siblings = &mut self.blocks[owner].nodes;
        let position = siblings
            .iter()
            .rposition(|&n| n == node)
            .unwrap_or_else(|| panic!("destroy_node: {node:?} missing from its owning block"));
        siblings.remove(position);
    }

    /// Removes several nodes of `block` at once.
    ///
    /// The block's node list is compacted in a single pass, so removing many
    /// nodes costs time linear in the size of the block.
    ///
    /// # Panics
    ///
    /// Panics if a node does not belong to `block` or any of its outputs is
    /// still used.
    pub fn destroy_nodes(&mut self, block: BlockId, nodes: &[NodeId]) {
        for &node in nodes {
            let owner = self.nodes[node].owner;
            assert!(
                owner == block,
                "destroy_nodes: {node:?} belongs to {owner:?}, not {block:?}"
            );
            self.unlink_node(node);
        }
        let dead: HashSet<NodeId> = nodes.iter().copied().collect();
        self.blocks[block].nodes.retain(|n| !dead.contains(n));
    }

    /// Frees a node and everything it owns, except its entry in the owning
    /// block's node list. Returns the owning block.
    fn unlink_node(&mut self, node: NodeId) -> BlockId {
        for &output in &self.nodes[node].outputs {
            let uses = self.values[output].uses.len();
            assert!(
                uses == 0,
                "destroy_node({}): output {output:?} still has {uses} use(s)",
                self.nodes[node].op
            );
        }

        for block in self.nodes[node].blocks.clone() {
            self.destroy_block(block);
        }

        let removed = self.nodes.remove(node);
        for (index, &input) in removed.inputs.iter().enumerate() {
            self.remove_use(
                input,
                Use {
                    user: User::Node(node),
                    index,
                },
            );
        }
        for output in removed.outputs {
            self.values.remove(output);
        }
        removed.owner
    }

    fn destroy_block(&mut self, block: BlockId) {
        self.set_returns(block, &[]);
        while let Some(last) = self.blocks[block].nodes.pop() {
            self.unlink_node(last);
        }
        let removed = self.blocks.remove(block);
        for param in removed.params {
            self.values.remove(param);
        }
    }

    fn remove_use(&mut self, value: ValueId, target: Use) {
        let uses = &mut self.values[value].uses;
        let position = uses
            .iter()
            .position(|u| *u == target)
            .unwrap_or_else(|| panic!("use list of {value:?} is missing {target:?}"));
        uses.remove(position);
    }

    /// All live nodes in pre-order: each node is followed by the contents of
    /// its nested blocks before the next node of its own block.
    pub fn walk(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<NodeId> = self.block(self.root).nodes().iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            order.push(node);
            for &block in self.node(node).blocks().iter().rev() {
                stack.extend(self.block(block).nodes().iter().rev());
            }
        }
        order
    }
}
