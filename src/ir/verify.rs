//! Structural verification of a `Graph`.
//!
//! Checks def-use integrity after a rewrite. This check is conservative: it
//! rejects anything it cannot prove consistent.

use std::collections::HashSet;

use crate::error::IrError;
use crate::ir::block::BlockId;
use crate::ir::graph::Graph;
use crate::ir::value::{Use, User, ValueId};

/// Verifies the graph's structural invariants.
///
/// Checks:
/// 1. Every node listed in a block records that block as its owner.
/// 2. Every node input is a live value defined before the node, either
///    earlier in the same block or in an enclosing block. Values defined
///    inside a nested block are not visible after it.
/// 3. Every block output is visible at the end of its block.
/// 4. Use lists mirror the input and output slots exactly, in both
///    directions, for every live value.
pub fn verify(graph: &Graph) -> Result<(), IrError> {
    // Worklist of (block, values visible on entry).
    let mut worklist: Vec<(BlockId, HashSet<ValueId>)> = vec![(graph.root(), HashSet::new())];
    while let Some((block_id, mut visible)) = worklist.pop() {
        let block = graph.get_block(block_id)?;
        visible.extend(block.inputs().iter().copied());

        for &node_id in block.nodes() {
            let node = graph.get_node(node_id)?;
            if node.owning_block() != Some(block_id) {
                return Err(IrError::WrongOwningBlock {
                    node: node_id,
                    block: block_id,
                });
            }
            for (offset, &input) in node.inputs().iter().enumerate() {
                if !visible.contains(&input) {
                    return Err(IrError::UseBeforeDef {
                        value: input,
                        node: node_id,
                    });
                }
                if !graph.uses(input).contains(&Use::node(node_id, offset)) {
                    return Err(IrError::UseListMismatch {
                        value: input,
                        detail: format!("input {} of {} is not recorded", offset, node_id),
                    });
                }
            }
            for &child in node.blocks() {
                worklist.push((child, visible.clone()));
            }
            visible.extend(node.outputs().iter().copied());
        }

        for (offset, &output) in block.outputs().iter().enumerate() {
            if !visible.contains(&output) {
                return Err(IrError::UseListMismatch {
                    value: output,
                    detail: format!("output {} of {} is not visible in the block", offset, block_id),
                });
            }
            if !graph.uses(output).contains(&Use::block_output(block_id, offset)) {
                return Err(IrError::UseListMismatch {
                    value: output,
                    detail: format!("output {} of {} is not recorded", offset, block_id),
                });
            }
        }
    }

    // Reverse direction: every recorded use must point at a slot holding the value.
    for (index, value) in graph.values.iter().enumerate() {
        let Some(value) = value else { continue };
        let id = ValueId(index as u32);
        for u in value.uses() {
            let holds = match u.user {
                User::Node(n) => graph
                    .node(n)
                    .map_or(false, |node| node.inputs().get(u.offset) == Some(&id)),
                User::BlockOutput(b) => graph
                    .block(b)
                    .map_or(false, |block| block.outputs().get(u.offset) == Some(&id)),
            };
            if !holds {
                return Err(IrError::UseListMismatch {
                    value: id,
                    detail: format!("recorded use {:?} is stale", u),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::node::NodeKind;
    use crate::ir::types::IrType;

    #[test]
    fn accepts_well_formed_graph() {
        let mut g = Graph::new();
        let x = g.add_input(Some("x"), IrType::tensor());
        let root = g.root();
        let relu = g
            .append(root, NodeKind::Relu, &[x], vec![IrType::tensor()])
            .unwrap();
        let y = g.node(relu).unwrap().outputs()[0];
        g.register_output(root, y).unwrap();
        assert_eq!(verify(&g), Ok(()));
    }

    #[test]
    fn rejects_use_before_def() {
        let mut g = Graph::new();
        let x = g.add_input(Some("x"), IrType::tensor());
        let root = g.root();
        let first = g
            .append(root, NodeKind::Relu, &[x], vec![IrType::tensor()])
            .unwrap();
        let second = g
            .append(root, NodeKind::Relu, &[x], vec![IrType::tensor()])
            .unwrap();
        let late = g.node(second).unwrap().outputs()[0];
        g.replace_input(first, 0, late).unwrap();
        assert!(matches!(verify(&g), Err(IrError::UseBeforeDef { .. })));
    }

    #[test]
    fn nested_values_do_not_escape() {
        let mut g = Graph::new();
        let c = g.add_input(Some("c"), IrType::Bool);
        let x = g.add_input(Some("x"), IrType::tensor());
        let root = g.root();
        let if_node = g.append(root, NodeKind::If, &[c], vec![]).unwrap();
        let arm = g.add_block(if_node).unwrap();
        let inner = g
            .append(arm, NodeKind::Relu, &[x], vec![IrType::tensor()])
            .unwrap();
        let inner_out = g.node(inner).unwrap().outputs()[0];
        g.append(root, NodeKind::Relu, &[inner_out], vec![IrType::tensor()])
            .unwrap();
        assert!(matches!(verify(&g), Err(IrError::UseBeforeDef { .. })));
    }
}
