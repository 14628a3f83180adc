//! Text dump for debugging.

use std::fmt::Write;

use crate::graph::{BlockId, Graph, NodeId, ValueId};

fn value_ref(graph: &Graph, value: ValueId) -> String {
    match graph.value(value).name() {
        Some(name) => format!("%{name}"),
        None => format!("%{}", value.index()),
    }
}

fn value_list(graph: &Graph, values: &[ValueId]) -> String {
    values
        .iter()
        .map(|&v| value_ref(graph, v))
        .collect::<Vec<_>>()
        .join(", ")
}

fn typed_list(graph: &Graph, values: &[ValueId]) -> String {
    values
        .iter()
        .map(|&v| format!("{} : {}", value_ref(graph, v), graph.value(v).ty()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn write_node(out: &mut String, graph: &Graph, node: NodeId, depth: usize) {
    let data = graph.node(node);
    let indent = "  ".repeat(depth);
    let _ = write!(out, "{indent}");
    if !data.outputs().is_empty() {
        let _ = write!(out, "{} = ", typed_list(graph, data.outputs()));
    }
    let _ = write!(out, "{}", data.op());
    if !data.attrs().is_empty() {
        let attrs: Vec<String> = data
            .attrs()
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        let _ = write!(out, "[{}]", attrs.join(", "));
    }
    let _ = writeln!(out, "({})", value_list(graph, data.inputs()));

    for (i, &block) in data.blocks().iter().enumerate() {
        write_block(out, graph, block, i, depth + 1);
    }
}

fn write_block(out: &mut String, graph: &Graph, block: BlockId, ordinal: usize, depth: usize) {
    let data = graph.block(block);
    let indent = "  ".repeat(depth);
    let _ = writeln!(
        out,
        "{indent}block{ordinal}({}):",
        typed_list(graph, data.params())
    );
    for &node in data.nodes() {
        write_node(out, graph, node, depth + 1);
    }
    let _ = writeln!(out, "{indent}  -> ({})", value_list(graph, data.returns()));
}

/// Dump a graph as human-readable text.
///
/// ```text
/// graph(%0 : Tensor, %1 : Tensor):
///   %2 : Tensor = add(%0, %1)
///   return (%2)
/// ```
pub fn dump_graph(graph: &Graph) -> String {
    let mut out = String::new();
    let root = graph.block(graph.root());
    let _ = writeln!(out, "graph({}):", typed_list(graph, root.params()));
    for &node in root.nodes() {
        write_node(&mut out, graph, node, 1);
    }
    let _ = writeln!(out, "  return ({})", value_list(graph, root.returns()));
    out
}
