#![no_main]

use kiln_ir::{Attribute, BlockId, Graph, NodeId, Op, ValueId, ValueType};
use libfuzzer_sys::fuzz_target;

struct Open {
    block: BlockId,
    pool: Vec<ValueId>,
    branch: Option<NodeId>,
}

/// Decodes bytes into a nested graph: each byte picks an operation and its
/// operands from the tensors visible in the innermost open block.
fn build(data: &[u8]) -> Graph {
    let mut graph = Graph::new();
    let cond = graph.add_input(ValueType::Bool);
    let x = graph.add_input(ValueType::Tensor);
    let y = graph.add_input(ValueType::Tensor);
    let mut stack = vec![Open {
        block: graph.root(),
        pool: vec![x, y],
        branch: None,
    }];

    for &byte in data {
        let Some(top) = stack.last_mut() else { break };
        let block = top.block;
        let a = top.pool[usize::from(byte >> 3) % top.pool.len()];
        let b = top.pool[usize::from(byte >> 5) % top.pool.len()];
        let tensor = |graph: &mut Graph, op: Op, inputs: &[ValueId]| {
            let node = graph.append_node(block, op, inputs, &[ValueType::Tensor]);
            (node, graph.node(node).outputs()[0])
        };

        match byte & 7 {
            0 => top.pool.push(tensor(&mut graph, Op::Add, &[a, b]).1),
            1 => top.pool.push(tensor(&mut graph, Op::Mul, &[a, b]).1),
            2 => top.pool.push(tensor(&mut graph, Op::Neg, &[a]).1),
            3 => {
                let (node, out) = tensor(&mut graph, Op::Constant, &[]);
                graph.set_attr(node, "value", Attribute::Int(i64::from(byte >> 6)));
                top.pool.push(out);
            }
            4 => top.pool.push(tensor(&mut graph, Op::AddInPlace, &[a, b]).1),
            5 => top.pool.push(tensor(&mut graph, Op::View, &[a]).1),
            6 => {
                let branch = graph.append_node(block, Op::If, &[cond], &[ValueType::Tensor]);
                let arm = graph.add_block(branch);
                let pool = top.pool.clone();
                stack.push(Open {
                    block: arm,
                    pool,
                    branch: Some(branch),
                });
            }
            _ => close(&mut graph, &mut stack),
        }
    }

    while stack.len() > 1 {
        close(&mut graph, &mut stack);
    }
    if let Some(root) = stack.pop() {
        graph.register_output(root.pool[root.pool.len() - 1]);
    }
    graph
}

fn close(graph: &mut Graph, stack: &mut Vec<Open>) {
    if stack.len() < 2 {
        return;
    }
    let Some(done) = stack.pop() else { return };
    let Some(branch) = done.branch else { return };
    graph.set_returns(done.block, &[done.pool[done.pool.len() - 1]]);

    let Some(parent) = stack.last_mut() else { return };
    if graph.node(branch).blocks().len() < 2 {
        let arm = graph.add_block(branch);
        let pool = parent.pool.clone();
        stack.push(Open {
            block: arm,
            pool,
            branch: Some(branch),
        });
    } else {
        parent.pool.push(graph.node(branch).outputs()[0]);
    }
}

fuzz_target!(|data: &[u8]| {
    let mut graph = build(data);
    if graph.verify().is_err() {
        return;
    }

    kiln_opt::eliminate_common_subexpression(&mut graph, &[]);
    assert_eq!(graph.verify(), Ok(()));
    // A second run must find nothing new.
    assert!(!kiln_opt::eliminate_common_subexpression(&mut graph, &[]));
});
