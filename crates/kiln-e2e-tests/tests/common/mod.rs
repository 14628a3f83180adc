//! Shared helpers: generated programs that lower to graphs, and a reference
//! interpreter used to check that optimization preserves results.

use std::collections::HashMap;

use kiln_ir::{Attribute, BlockId, Graph, NodeId, Op, ValueId, ValueType};
use proptest::prelude::*;

/// Module names used by generated module regions.
pub const MODULE_NAMES: [&str; 2] = ["Linear", "Conv"];

/// One instruction of a generated program.
///
/// Operand fields are reduced modulo the number of tensors visible at the
/// point where the step is lowered.
#[derive(Clone, Debug)]
pub enum Step {
    Const(i8),
    Unary { op: Op, a: usize },
    Binary { op: Op, a: usize, b: usize },
    AddInPlace { target: usize, source: usize },
    View { a: usize },
    Print { a: usize },
    Branch { then_steps: Vec<Step>, else_steps: Vec<Step> },
    Module { name: usize, arg: usize, body: Vec<Step> },
    Loop { trips: u8, init: usize, body: Vec<Step> },
}

fn leaf_step() -> impl Strategy<Value = Step> {
    // Small operand ranges keep duplicates frequent.
    prop_oneof![
        1 => (-3i8..4).prop_map(Step::Const),
        2 => (prop::sample::select(vec![Op::Neg, Op::Relu]), 0..4usize)
            .prop_map(|(op, a)| Step::Unary { op, a }),
        5 => (
            prop::sample::select(vec![Op::Add, Op::Sub, Op::Mul]),
            0..4usize,
            0..4usize,
        )
            .prop_map(|(op, a, b)| Step::Binary { op, a, b }),
        1 => (0..4usize, 0..4usize)
            .prop_map(|(target, source)| Step::AddInPlace { target, source }),
        1 => (0..4usize).prop_map(|a| Step::View { a }),
        1 => (0..4usize).prop_map(|a| Step::Print { a }),
    ]
}

/// Strategy for a single step, nested up to three regions deep.
#[allow(dead_code)]
pub fn step() -> impl Strategy<Value = Step> {
    leaf_step().prop_recursive(3, 48, 6, |inner| {
        prop_oneof![
            (
                prop::collection::vec(inner.clone(), 0..6),
                prop::collection::vec(inner.clone(), 0..6),
            )
                .prop_map(|(then_steps, else_steps)| Step::Branch {
                    then_steps,
                    else_steps,
                }),
            (0..MODULE_NAMES.len(), 0..4usize, prop::collection::vec(inner.clone(), 0..6))
                .prop_map(|(name, arg, body)| Step::Module { name, arg, body }),
            (0u8..3, 0..4usize, prop::collection::vec(inner, 0..6))
                .prop_map(|(trips, init, body)| Step::Loop { trips, init, body }),
        ]
    })
}

/// Strategy for a whole program.
#[allow(dead_code)]
pub fn program() -> impl Strategy<Value = Vec<Step>> {
    prop::collection::vec(step(), 1..16)
}

fn pick(pool: &[ValueId], index: usize) -> ValueId {
    pool[index % pool.len()]
}

fn tensor_node(graph: &mut Graph, block: BlockId, op: Op, inputs: &[ValueId]) -> (NodeId, ValueId) {
    let node = graph.append_node(block, op, inputs, &[ValueType::Tensor]);
    (node, graph.node(node).outputs()[0])
}

/// Lowers a program into a graph with inputs `(cond : bool, x : Tensor, y : Tensor)`.
///
/// The most recent tensor is always a graph output; the first computed
/// tensor is a second output when one exists.
#[allow(dead_code)]
pub fn lower(steps: &[Step]) -> Graph {
    let mut graph = Graph::new();
    let cond = graph.add_input(ValueType::Bool);
    let x = graph.add_input(ValueType::Tensor);
    let y = graph.add_input(ValueType::Tensor);
    let root = graph.root();

    let mut pool = vec![x, y];
    emit(&mut graph, cond, root, steps, &mut pool);

    let last = pool[pool.len() - 1];
    graph.register_output(last);
    if pool.len() > 3 && pool[2] != last {
        graph.register_output(pool[2]);
    }
    graph
}

fn emit(graph: &mut Graph, cond: ValueId, block: BlockId, steps: &[Step], pool: &mut Vec<ValueId>) {
    for step in steps {
        let produced = match step {
            Step::Const(v) => {
                let (node, out) = tensor_node(graph, block, Op::Constant, &[]);
                graph.set_attr(node, "value", Attribute::Float(f64::from(*v)));
                out
            }
            Step::Unary { op, a } => tensor_node(graph, block, op.clone(), &[pick(pool, *a)]).1,
            Step::Binary { op, a, b } => {
                let inputs = [pick(pool, *a), pick(pool, *b)];
                tensor_node(graph, block, op.clone(), &inputs).1
            }
            Step::AddInPlace { target, source } => {
                let inputs = [pick(pool, *target), pick(pool, *source)];
                tensor_node(graph, block, Op::AddInPlace, &inputs).1
            }
            Step::View { a } => tensor_node(graph, block, Op::View, &[pick(pool, *a)]).1,
            Step::Print { a } => {
                graph.append_node(block, Op::Print, &[pick(pool, *a)], &[]);
                continue;
            }
            Step::Branch {
                then_steps,
                else_steps,
            } => {
                let branch = graph.append_node(block, Op::If, &[cond], &[ValueType::Tensor]);
                for arm_steps in [then_steps, else_steps] {
                    let arm = graph.add_block(branch);
                    let mut local = pool.clone();
                    emit(graph, cond, arm, arm_steps, &mut local);
                    graph.set_returns(arm, &[local[local.len() - 1]]);
                }
                graph.node(branch).outputs()[0]
            }
            Step::Module { name, arg, body } => {
                let call = graph.append_node(
                    block,
                    Op::ModuleCall,
                    &[pick(pool, *arg)],
                    &[ValueType::Tensor],
                );
                graph.set_module(call, MODULE_NAMES[*name % MODULE_NAMES.len()]);
                let region = graph.add_block(call);
                let param = graph.add_block_param(region, ValueType::Tensor);
                let mut local = pool.clone();
                local.push(param);
                emit(graph, cond, region, body, &mut local);
                graph.set_returns(region, &[local[local.len() - 1]]);
                graph.node(call).outputs()[0]
            }
            Step::Loop { trips, init, body } => {
                let count = graph.append_node(block, Op::Constant, &[], &[ValueType::Int]);
                graph.set_attr(count, "value", Attribute::Int(i64::from(*trips)));
                let count = graph.node(count).outputs()[0];
                let lp = graph.append_node(
                    block,
                    Op::Loop,
                    &[count, pick(pool, *init)],
                    &[ValueType::Tensor],
                );
                let region = graph.add_block(lp);
                graph.add_block_param(region, ValueType::Int);
                let carried = graph.add_block_param(region, ValueType::Tensor);
                let mut local = pool.clone();
                local.push(carried);
                emit(graph, cond, region, body, &mut local);
                graph.set_returns(region, &[local[local.len() - 1]]);
                graph.node(lp).outputs()[0]
            }
        };
        pool.push(produced);
    }
}

/// A runtime value of the reference interpreter.
#[derive(Clone, Copy, Debug)]
pub enum Rt {
    Tensor(f64),
    Int(i64),
    Bool(bool),
}

impl PartialEq for Rt {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Tensor(a), Self::Tensor(b)) => a.to_bits() == b.to_bits(),
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            _ => false,
        }
    }
}

impl Rt {
    fn tensor(self) -> f64 {
        match self {
            Self::Tensor(v) => v,
            other => panic!("expected a tensor, got {other:?}"),
        }
    }
}

/// Everything a caller can observe after running a graph.
#[derive(Debug, PartialEq)]
pub struct Outcome {
    pub outputs: Vec<Rt>,
    pub inputs_after: Vec<Rt>,
    pub printed: Vec<Rt>,
}

/// Runs `graph` on `inputs`. Values are scalars standing in for tensors;
/// views and in-place ops share storage slots.
#[allow(dead_code)]
pub fn interpret(graph: &Graph, inputs: &[Rt]) -> Outcome {
    let mut interp = Interpreter {
        graph,
        storage: Vec::new(),
        binding: HashMap::new(),
        printed: Vec::new(),
    };
    for (&param, &value) in graph.inputs().iter().zip(inputs) {
        interp.bind_fresh(param, value);
    }
    let returns = interp.run_block(graph.root());
    Outcome {
        outputs: returns.iter().map(|&slot| interp.storage[slot]).collect(),
        inputs_after: graph.inputs().iter().map(|&v| interp.read(v)).collect(),
        printed: interp.printed,
    }
}

struct Interpreter<'g> {
    graph: &'g Graph,
    storage: Vec<Rt>,
    binding: HashMap<ValueId, usize>,
    printed: Vec<Rt>,
}

impl Interpreter<'_> {
    fn bind_fresh(&mut self, value: ValueId, rt: Rt) {
        self.storage.push(rt);
        self.binding.insert(value, self.storage.len() - 1);
    }

    fn slot(&self, value: ValueId) -> usize {
        self.binding[&value]
    }

    fn read(&self, value: ValueId) -> Rt {
        self.storage[self.slot(value)]
    }

    fn run_block(&mut self, block: BlockId) -> Vec<usize> {
        let graph = self.graph;
        for &node in graph.block(block).nodes() {
            self.run_node(node);
        }
        graph
            .block(block)
            .returns()
            .iter()
            .map(|&v| self.slot(v))
            .collect()
    }

    fn run_node(&mut self, node: NodeId) {
        let graph = self.graph;
        let data = graph.node(node);
        let input = |i: usize| self.read(data.inputs()[i]);
        let out = data.outputs().first().copied();

        match data.op() {
            Op::Constant => {
                let value = match data.attr("value") {
                    Some(Attribute::Float(v)) => Rt::Tensor(*v),
                    Some(Attribute::Int(v)) => Rt::Int(*v),
                    other => panic!("unsupported constant {other:?}"),
                };
                self.bind_fresh(out.unwrap(), value);
            }
            Op::Add | Op::Sub | Op::Mul | Op::Div => {
                let (a, b) = (input(0).tensor(), input(1).tensor());
                let value = match data.op() {
                    Op::Add => a + b,
                    Op::Sub => a - b,
                    Op::Mul => a * b,
                    _ => a / b,
                };
                self.bind_fresh(out.unwrap(), Rt::Tensor(value));
            }
            Op::Neg => {
                let value = -input(0).tensor();
                self.bind_fresh(out.unwrap(), Rt::Tensor(value));
            }
            Op::Relu => {
                let value = input(0).tensor().max(0.0);
                self.bind_fresh(out.unwrap(), Rt::Tensor(value));
            }
            Op::View => {
                let slot = self.slot(data.inputs()[0]);
                self.binding.insert(out.unwrap(), slot);
            }
            Op::AddInPlace => {
                let addend = input(1).tensor();
                let slot = self.slot(data.inputs()[0]);
                self.storage[slot] = Rt::Tensor(self.storage[slot].tensor() + addend);
                self.binding.insert(out.unwrap(), slot);
            }
            Op::Print => {
                let value = input(0);
                self.printed.push(value);
            }
            Op::If => {
                let Rt::Bool(taken) = input(0) else {
                    panic!("if condition must be a bool");
                };
                let arm = data.blocks()[usize::from(!taken)];
                let results = self.run_block(arm);
                self.bind_outputs(data.outputs(), &results);
            }
            Op::ModuleCall => {
                let body = data.blocks()[0];
                for (&param, &arg) in graph.block(body).params().iter().zip(data.inputs()) {
                    let slot = self.slot(arg);
                    self.binding.insert(param, slot);
                }
                let results = self.run_block(body);
                self.bind_outputs(data.outputs(), &results);
            }
            Op::Loop => {
                let Rt::Int(trips) = input(0) else {
                    panic!("loop trip count must be an int");
                };
                let body = data.blocks()[0];
                let params = graph.block(body).params();
                let mut carried: Vec<usize> =
                    data.inputs()[1..].iter().map(|&v| self.slot(v)).collect();
                for i in 0..trips {
                    self.bind_fresh(params[0], Rt::Int(i));
                    for (&param, &slot) in params[1..].iter().zip(&carried) {
                        self.binding.insert(param, slot);
                    }
                    carried = self.run_block(body);
                }
                self.bind_outputs(data.outputs(), &carried);
            }
            other => panic!("interpreter does not support {other}"),
        }
    }

    fn bind_outputs(&mut self, outputs: &[ValueId], slots: &[usize]) {
        for (&value, &slot) in outputs.iter().zip(slots) {
            self.binding.insert(value, slot);
        }
    }
}

/// Default inputs for lowered programs.
#[allow(dead_code)]
pub fn sample_inputs() -> Vec<Vec<Rt>> {
    vec![
        vec![Rt::Bool(true), Rt::Tensor(1.5), Rt::Tensor(-2.0)],
        vec![Rt::Bool(false), Rt::Tensor(3.0), Rt::Tensor(0.25)],
    ]
}

/// Counts live nodes with the given module name.
#[allow(dead_code)]
pub fn module_instances(graph: &Graph, name: &str) -> Vec<NodeId> {
    graph
        .walk()
        .into_iter()
        .filter(|&n| graph.node(n).module_name() == Some(name))
        .collect()
}
