//! Alias analysis and the mutation oracle consulted by optimization passes.
//!
//! [`AliasDb`] partitions the mutable values of a graph into alias classes
//! (values that may share storage) and records which classes are written
//! somewhere and which escape the graph through its inputs or outputs. The
//! analysis is flow-insensitive: a write anywhere in the graph taints the
//! whole class.

use std::collections::{HashMap, HashSet};

use kiln_ir::{Graph, NodeId, Op, ValueId};

use crate::effects::OpEffects;

/// Questions an optimization asks before treating two nodes as interchangeable.
///
/// Implementations must answer conservatively: when in doubt, report a side
/// effect, a writer, or an unsafe merge.
pub trait MutationOracle {
    /// The node has observable side effects or is nondeterministic.
    fn has_side_effects(&self, graph: &Graph, node: NodeId) -> bool;

    /// Some mutable input or output of the node may be written in place.
    fn has_writers(&self, graph: &Graph, node: NodeId) -> bool;

    /// Replacing each `duplicate` value by the `canonical` value at the same
    /// position cannot change which storage is observed or mutated.
    fn safe_to_merge(&self, graph: &Graph, duplicate: &[ValueId], canonical: &[ValueId]) -> bool;

    /// Called after `duplicate` values were approved for replacement by
    /// `canonical` values, before the graph is rewired. From then on the
    /// canonical values carry every alias relation the duplicates had.
    fn note_merged(&mut self, _graph: &Graph, _duplicate: &[ValueId], _canonical: &[ValueId]) {}
}

#[derive(Clone, Debug, Default)]
struct UnionFind {
    parent: HashMap<ValueId, ValueId>,
}

impl UnionFind {
    fn insert(&mut self, value: ValueId) {
        self.parent.entry(value).or_insert(value);
    }

    /// Representative of `value` without path compression, if registered.
    fn root(&self, value: ValueId) -> Option<ValueId> {
        let mut current = value;
        loop {
            let parent = *self.parent.get(&current)?;
            if parent == current {
                return Some(current);
            }
            current = parent;
        }
    }

    fn find(&mut self, value: ValueId) -> ValueId {
        let mut root = value;
        while let Some(&parent) = self.parent.get(&root) {
            if parent == root {
                break;
            }
            root = parent;
        }
        let mut current = value;
        while current != root {
            let next = self.parent.insert(current, root).unwrap_or(root);
            current = next;
        }
        root
    }

    /// Joins the classes of `a` and `b`. Returns the surviving and the
    /// absorbed representative when the classes were distinct.
    fn union(&mut self, a: ValueId, b: ValueId) -> Option<(ValueId, ValueId)> {
        self.insert(a);
        self.insert(b);
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return None;
        }
        // Keep the older handle as representative for stable classes.
        let (keep, merge) = if ra < rb { (ra, rb) } else { (rb, ra) };
        self.parent.insert(merge, keep);
        Some((keep, merge))
    }
}

/// Alias classes, written classes and escaping classes of one graph.
#[derive(Clone, Debug, Default)]
pub struct AliasDb {
    sets: UnionFind,
    written: HashSet<ValueId>,
    escaping: HashSet<ValueId>,
    impure: HashMap<NodeId, bool>,
}

impl AliasDb {
    /// Analyze a graph.
    pub fn new(graph: &Graph) -> Self {
        let mutable = |v: ValueId| graph.value(v).ty().is_mutable();
        let mut sets = UnionFind::default();
        let mut writes: Vec<ValueId> = Vec::new();
        let mut impure = HashMap::new();

        for value in graph.inputs().iter().filter(|&&v| mutable(v)) {
            sets.insert(*value);
        }

        for node in graph.walk() {
            let data = graph.node(node);
            let effects = data.op().effects();
            impure.insert(node, effects.side_effects || effects.nondeterministic);

            for &output in data.outputs().iter().filter(|&&v| mutable(v)) {
                sets.insert(output);
            }
            for &block in data.blocks() {
                for &param in graph.block(block).params().iter().filter(|&&v| mutable(v)) {
                    sets.insert(param);
                }
            }

            for &(out, inp) in &effects.aliases {
                if let (Some(&o), Some(&i)) = (data.outputs().get(out), data.inputs().get(inp))
                    && mutable(o)
                    && mutable(i)
                {
                    sets.union(o, i);
                }
            }
            if effects.aliases_any {
                for &o in data.outputs().iter().filter(|&&v| mutable(v)) {
                    for &i in data.inputs().iter().filter(|&&v| mutable(v)) {
                        sets.union(o, i);
                    }
                    writes.push(o);
                }
            }
            for (index, &input) in data.inputs().iter().enumerate() {
                if mutable(input) && effects.writes_input(index) {
                    writes.push(input);
                }
            }

            link_regions(graph, node, &mut sets);
        }

        let written = writes.into_iter().map(|v| sets.find(v)).collect();
        let escaping = graph
            .inputs()
            .iter()
            .chain(graph.outputs())
            .filter(|&&v| mutable(v))
            .map(|&v| sets.find(v))
            .collect();
        let db = Self {
            sets,
            written,
            escaping,
            impure,
        };

        log::debug!(
            "alias-db: {} mutable value(s), {} written class(es), {} escaping class(es)",
            db.sets.parent.len(),
            db.written.len(),
            db.escaping.len()
        );
        db
    }

    fn class_of(&self, value: ValueId) -> Option<ValueId> {
        self.sets.root(value)
    }

    /// Returns `true` if the value's storage may be written somewhere.
    ///
    /// Immutable values are never written; mutable values the analysis has
    /// not seen are assumed written.
    pub fn is_written(&self, graph: &Graph, value: ValueId) -> bool {
        if !graph.value(value).ty().is_mutable() {
            return false;
        }
        self.class_of(value)
            .is_none_or(|class| self.written.contains(&class))
    }

    /// Returns `true` if the value may share storage with a graph input or
    /// graph output.
    pub fn escapes(&self, graph: &Graph, value: ValueId) -> bool {
        if !graph.value(value).ty().is_mutable() {
            return false;
        }
        self.class_of(value)
            .is_none_or(|class| self.escaping.contains(&class))
    }

    /// Returns `true` if the two values may share storage.
    pub fn may_alias(&self, graph: &Graph, a: ValueId, b: ValueId) -> bool {
        if a == b {
            return true;
        }
        if !graph.value(a).ty().is_mutable() || !graph.value(b).ty().is_mutable() {
            return false;
        }
        match (self.class_of(a), self.class_of(b)) {
            (Some(ca), Some(cb)) => ca == cb,
            _ => true,
        }
    }
}

/// Joins the values that flow across region boundaries of `node`.
fn link_regions(graph: &Graph, node: NodeId, sets: &mut UnionFind) {
    let data = graph.node(node);
    if data.blocks().is_empty() {
        return;
    }
    let mutable = |v: ValueId| graph.value(v).ty().is_mutable();
    let mut join = |a: Option<&ValueId>, b: Option<&ValueId>| {
        if let (Some(&a), Some(&b)) = (a, b)
            && mutable(a)
            && mutable(b)
        {
            sets.union(a, b);
        }
    };

    match data.op() {
        Op::If => {
            for &block in data.blocks() {
                let returns = graph.block(block).returns();
                for (i, ret) in returns.iter().enumerate() {
                    join(Some(ret), data.outputs().get(i));
                }
            }
        }
        Op::Loop => {
            // inputs: [trip_count, carried..]; params: [iter, carried..]
            let carried = data.inputs().get(1..).unwrap_or_default();
            for &block in data.blocks() {
                let body = graph.block(block);
                let params = body.params().get(1..).unwrap_or_default();
                for (i, input) in carried.iter().enumerate() {
                    join(Some(input), params.get(i));
                }
                for (i, ret) in body.returns().iter().enumerate() {
                    join(Some(ret), params.get(i));
                    join(Some(ret), data.outputs().get(i));
                }
            }
        }
        Op::ModuleCall => {
            for &block in data.blocks() {
                let body = graph.block(block);
                for (i, param) in body.params().iter().enumerate() {
                    join(Some(param), data.inputs().get(i));
                }
                for (i, ret) in body.returns().iter().enumerate() {
                    join(Some(ret), data.outputs().get(i));
                }
            }
        }
        _ => {
            // Unknown region semantics: everything crossing the boundary
            // may share storage.
            let mut crossing: Vec<ValueId> = data
                .inputs()
                .iter()
                .chain(data.outputs())
                .copied()
                .collect();
            for &block in data.blocks() {
                let body = graph.block(block);
                crossing.extend(body.params().iter().chain(body.returns()));
            }
            for pair in crossing.windows(2) {
                join(Some(&pair[0]), Some(&pair[1]));
            }
        }
    }
}

impl MutationOracle for AliasDb {
    fn has_side_effects(&self, _graph: &Graph, node: NodeId) -> bool {
        self.impure.get(&node).copied().unwrap_or(true)
    }

    fn has_writers(&self, graph: &Graph, node: NodeId) -> bool {
        let data = graph.node(node);
        data.inputs()
            .iter()
            .chain(data.outputs())
            .any(|&v| self.is_written(graph, v))
    }

    fn safe_to_merge(&self, graph: &Graph, duplicate: &[ValueId], canonical: &[ValueId]) -> bool {
        if duplicate.len() != canonical.len() {
            return false;
        }
        let graph_outputs = graph.outputs();
        duplicate.iter().zip(canonical).all(|(&dup, &canon)| {
            if self.is_written(graph, dup) || self.is_written(graph, canon) {
                return false;
            }
            // Each graph output must stay a distinct value.
            if graph_outputs.contains(&dup) && graph_outputs.contains(&canon) {
                return false;
            }
            !(self.escapes(graph, dup) && self.escapes(graph, canon))
        })
    }

    fn note_merged(&mut self, graph: &Graph, duplicate: &[ValueId], canonical: &[ValueId]) {
        for (&dup, &canon) in duplicate.iter().zip(canonical) {
            if !graph.value(dup).ty().is_mutable()
                || self.class_of(dup).is_none()
                || self.class_of(canon).is_none()
            {
                continue;
            }
            if let Some((keep, absorbed)) = self.sets.union(dup, canon) {
                if self.written.remove(&absorbed) {
                    self.written.insert(keep);
                }
                if self.escaping.remove(&absorbed) {
                    self.escaping.insert(keep);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_ir::ValueType;

    fn unary(graph: &mut Graph, op: Op, x: ValueId) -> (NodeId, ValueId) {
        let root = graph.root();
        let node = graph.append_node(root, op, &[x], &[ValueType::Tensor]);
        (node, graph.node(node).outputs()[0])
    }

    #[test]
    fn pure_graph_has_no_writers() {
        let mut graph = Graph::new();
        let x = graph.add_input(ValueType::Tensor);
        let (relu, out) = unary(&mut graph, Op::Relu, x);
        let (neg, _) = unary(&mut graph, Op::Neg, out);

        let db = AliasDb::new(&graph);
        assert!(!db.has_side_effects(&graph, relu));
        assert!(!db.has_writers(&graph, relu));
        assert!(!db.has_writers(&graph, neg));
        assert!(!db.may_alias(&graph, x, out));
    }

    #[test]
    fn in_place_write_taints_views_of_the_same_storage() {
        let mut graph = Graph::new();
        let x = graph.add_input(ValueType::Tensor);
        let y = graph.add_input(ValueType::Tensor);
        let (view, v) = unary(&mut graph, Op::View, x);
        let root = graph.root();
        graph.append_node(root, Op::AddInPlace, &[v, y], &[ValueType::Tensor]);
        let (relu, _) = unary(&mut graph, Op::Relu, x);
        let (untouched, _) = unary(&mut graph, Op::Relu, y);

        let db = AliasDb::new(&graph);
        assert!(db.may_alias(&graph, x, v));
        assert!(db.is_written(&graph, x));
        assert!(db.has_writers(&graph, view));
        assert!(db.has_writers(&graph, relu));
        assert!(!db.has_writers(&graph, untouched));
    }

    #[test]
    fn side_effects_and_nondeterminism_are_reported() {
        let mut graph = Graph::new();
        let x = graph.add_input(ValueType::Tensor);
        let root = graph.root();
        let print = graph.append_node(root, Op::Print, &[x], &[]);
        let (rand, _) = unary(&mut graph, Op::RandNormal, x);

        let db = AliasDb::new(&graph);
        assert!(db.has_side_effects(&graph, print));
        assert!(db.has_side_effects(&graph, rand));
    }

    #[test]
    fn custom_op_inputs_are_written() {
        let mut graph = Graph::new();
        let x = graph.add_input(ValueType::Tensor);
        let (custom, out) = unary(
            &mut graph,
            Op::Custom {
                op_type: "vendor::op".into(),
            },
            x,
        );

        let db = AliasDb::new(&graph);
        assert!(db.has_side_effects(&graph, custom));
        assert!(db.is_written(&graph, x));
        assert!(db.is_written(&graph, out));
    }

    #[test]
    fn scalars_are_never_written() {
        let mut graph = Graph::new();
        let n = graph.add_input(ValueType::Int);
        let root = graph.root();
        let custom = graph.append_node(
            root,
            Op::Custom {
                op_type: "vendor::op".into(),
            },
            &[n],
            &[ValueType::Int],
        );
        let out = graph.node(custom).outputs()[0];

        let db = AliasDb::new(&graph);
        assert!(!db.is_written(&graph, n));
        assert!(!db.is_written(&graph, out));
        assert!(!db.may_alias(&graph, n, out));
    }

    #[test]
    fn if_outputs_alias_arm_results() {
        let mut graph = Graph::new();
        let c = graph.add_input(ValueType::Bool);
        let x = graph.add_input(ValueType::Tensor);
        let root = graph.root();
        let branch = graph.append_node(root, Op::If, &[c], &[ValueType::Tensor]);
        let then_arm = graph.add_block(branch);
        let view = graph.append_node(then_arm, Op::View, &[x], &[ValueType::Tensor]);
        let viewed = graph.node(view).outputs()[0];
        graph.set_returns(then_arm, &[viewed]);
        let else_arm = graph.add_block(branch);
        graph.set_returns(else_arm, &[x]);
        let result = graph.node(branch).outputs()[0];

        let db = AliasDb::new(&graph);
        assert!(db.may_alias(&graph, result, x));
        assert!(db.escapes(&graph, result));
    }

    #[test]
    fn merging_two_graph_outputs_is_unsafe() {
        let mut graph = Graph::new();
        let x = graph.add_input(ValueType::Tensor);
        let (_, a) = unary(&mut graph, Op::Relu, x);
        let (_, b) = unary(&mut graph, Op::Relu, x);
        let (_, c) = unary(&mut graph, Op::Relu, x);
        graph.register_output(a);
        graph.register_output(b);

        let db = AliasDb::new(&graph);
        assert!(!db.safe_to_merge(&graph, &[b], &[a]));
        assert!(db.safe_to_merge(&graph, &[c], &[a]));
        assert!(db.safe_to_merge(&graph, &[b], &[c]));
    }

    #[test]
    fn merged_values_inherit_escape() {
        let mut graph = Graph::new();
        let x = graph.add_input(ValueType::Tensor);
        let (_, a) = unary(&mut graph, Op::Relu, x);
        let (_, b) = unary(&mut graph, Op::Relu, x);
        let (_, c) = unary(&mut graph, Op::Relu, x);
        let (_, vb) = unary(&mut graph, Op::View, b);
        let (_, vc) = unary(&mut graph, Op::View, c);
        graph.register_output(vb);
        graph.register_output(vc);

        let mut db = AliasDb::new(&graph);
        assert!(!db.escapes(&graph, a));
        assert!(db.safe_to_merge(&graph, &[b], &[a]));

        db.note_merged(&graph, &[b], &[a]);
        assert!(db.escapes(&graph, a));
        assert!(db.may_alias(&graph, a, vb));
        assert!(!db.safe_to_merge(&graph, &[c], &[a]));
    }

    #[test]
    fn merging_written_values_is_unsafe() {
        let mut graph = Graph::new();
        let x = graph.add_input(ValueType::Tensor);
        let (_, a) = unary(&mut graph, Op::Relu, x);
        let (_, b) = unary(&mut graph, Op::Relu, x);
        let root = graph.root();
        graph.append_node(root, Op::AddInPlace, &[b, x], &[ValueType::Tensor]);

        let db = AliasDb::new(&graph);
        assert!(!db.safe_to_merge(&graph, &[b], &[a]));
        assert!(!db.safe_to_merge(&graph, &[a], &[]));
    }

    #[test]
    fn unknown_nodes_are_treated_as_impure() {
        let mut graph = Graph::new();
        let x = graph.add_input(ValueType::Tensor);
        let db = AliasDb::new(&graph);
        let (late, _) = unary(&mut graph, Op::Relu, x);
        assert!(db.has_side_effects(&graph, late));
    }
}
