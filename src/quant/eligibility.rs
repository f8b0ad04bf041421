//! Which operators the quantization rewrite applies to.

use crate::ir::node::{Node, NodeKind};

/// Operators whose inputs and outputs are wrapped in quantize/dequantize
/// pairs. Extend this table to support more quantizable patterns.
pub const QUANTIZABLE_OPS: [NodeKind; 3] = [NodeKind::Conv2d, NodeKind::Relu, NodeKind::Convolution];

/// Returns `true` iff `kind` is in `QUANTIZABLE_OPS`.
///
/// Compares qualified names, so an `Other("aten::relu")` built by hand
/// matches `Relu`.
pub fn is_quantizable_kind(kind: &NodeKind) -> bool {
    let name = kind.qualified_name();
    QUANTIZABLE_OPS.iter().any(|op| op.qualified_name() == name)
}

/// Returns `true` iff the node's operator is quantizable.
pub fn is_quantizable(node: &Node) -> bool {
    is_quantizable_kind(node.kind())
}
