//! Graph pretty-printer.
//!
//! Emits a human-readable dump of a `Graph`. Output is deterministic: nodes
//! are printed in program order and nested blocks are printed inline under
//! their owning node, indented one level deeper.
//!
//! ```text
//! graph(%x : Tensor, %w : Tensor):
//!   %2 : str = prim::Constant[value="x"]()
//!   %y : Tensor = aten::conv2d(%x, %w)  # features/conv1
//!   return (%y)
//! ```

use std::fmt::{self, Write};

use crate::ir::block::BlockId;
use crate::ir::graph::Graph;
use crate::ir::node::NodeId;
use crate::ir::value::ValueId;

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "graph(")?;
        write_typed_list(f, self, self.inputs())?;
        writeln!(f, "):")?;
        write_block_body(f, self, self.root(), 1)?;
        write!(f, "  return (")?;
        write_value_list(f, self, self.outputs())?;
        writeln!(f, ")")
    }
}

/// Emits a full text dump of the graph.
pub fn emit_graph_text(graph: &Graph) -> String {
    graph.to_string()
}

fn write_block_body(
    out: &mut impl Write,
    graph: &Graph,
    block: BlockId,
    depth: usize,
) -> fmt::Result {
    let Some(b) = graph.block(block) else {
        return Ok(());
    };
    for &node in b.nodes() {
        write_node(out, graph, node, depth)?;
    }
    Ok(())
}

fn write_node(out: &mut impl Write, graph: &Graph, id: NodeId, depth: usize) -> fmt::Result {
    let Some(node) = graph.node(id) else {
        return Ok(());
    };
    let indent = "  ".repeat(depth);
    write!(out, "{}", indent)?;
    if !node.outputs().is_empty() {
        write_typed_list(out, graph, node.outputs())?;
        write!(out, " = ")?;
    }
    write!(out, "{}", node.kind())?;
    if !node.attrs().is_empty() {
        write!(out, "[")?;
        for (i, (key, value)) in node.attrs().iter().enumerate() {
            if i > 0 {
                write!(out, ", ")?;
            }
            write!(out, "{}={}", key, value)?;
        }
        write!(out, "]")?;
    }
    write!(out, "(")?;
    write_value_list(out, graph, node.inputs())?;
    write!(out, ")")?;
    if !node.scope().is_root() {
        write!(out, "  # {}", node.scope())?;
    }
    writeln!(out)?;

    for (i, &child) in node.blocks().iter().enumerate() {
        let Some(block) = graph.block(child) else {
            continue;
        };
        write!(out, "{}  block{}(", indent, i)?;
        write_typed_list(out, graph, block.inputs())?;
        writeln!(out, "):")?;
        write_block_body(out, graph, child, depth + 2)?;
        write!(out, "{}    -> (", indent)?;
        write_value_list(out, graph, block.outputs())?;
        writeln!(out, ")")?;
    }
    Ok(())
}

fn write_value_list(out: &mut impl Write, graph: &Graph, values: &[ValueId]) -> fmt::Result {
    for (i, &v) in values.iter().enumerate() {
        if i > 0 {
            write!(out, ", ")?;
        }
        write!(out, "%{}", graph.unique_name(v))?;
    }
    Ok(())
}

fn write_typed_list(out: &mut impl Write, graph: &Graph, values: &[ValueId]) -> fmt::Result {
    for (i, &v) in values.iter().enumerate() {
        if i > 0 {
            write!(out, ", ")?;
        }
        match graph.value_type(v) {
            Some(ty) => write!(out, "%{} : {}", graph.unique_name(v), ty)?,
            None => write!(out, "%{} : <dead>", graph.unique_name(v))?,
        }
    }
    Ok(())
}
