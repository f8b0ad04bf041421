//! Node synthesis and placement shared by the observer and quantize passes.
//!
//! Every helper here creates nodes detached and places them adjacent to an
//! explicit anchor; nothing is ever inserted "somewhere in the block".

use crate::error::IrError;
use crate::ir::{ConstValue, Graph, InsertPoint, IrType, NodeId, NodeKind, ValueId};
use crate::quant::observer::ObserverTemplate;
use crate::quant::qparams::QuantParams;

/// Places the detached node `new` immediately after (`after == true`) or
/// before `anchor`, in the anchor's block.
pub fn insert_relative_to(
    graph: &mut Graph,
    new: NodeId,
    anchor: NodeId,
    after: bool,
) -> Result<(), IrError> {
    let point = if after {
        InsertPoint::After(anchor)
    } else {
        InsertPoint::Before(anchor)
    };
    graph.insert(new, point)
}

/// Creates a detached node with the template's kind, attributes and scope.
pub fn clone_template(graph: &mut Graph, template: &ObserverTemplate) -> Result<NodeId, IrError> {
    let node = graph.create_node(template.kind().clone());
    for (key, value) in template.attrs() {
        graph.set_attr(node, key.as_str(), value.clone())?;
    }
    graph.set_scope(node, template.scope().clone())?;
    Ok(node)
}

/// Creates a detached `aten::quantize_linear` node for `value`.
///
/// Its single output is named `<value>.quant` and the node takes `anchor`'s
/// scope. Inputs are added by the caller.
pub fn make_quant_node(graph: &mut Graph, value: ValueId, anchor: NodeId) -> Result<NodeId, IrError> {
    make_wrap_node(graph, NodeKind::QuantizeLinear, value, anchor, IrType::tensor(), "quant")
}

/// Creates a detached `aten::dequantize` node for `value`.
///
/// Its single output carries `value`'s type, is named `<value>.dequant`,
/// and the node takes `anchor`'s scope.
pub fn make_dequant_node(
    graph: &mut Graph,
    value: ValueId,
    anchor: NodeId,
) -> Result<NodeId, IrError> {
    let ty = graph
        .value_type(value)
        .cloned()
        .ok_or(IrError::UnknownValue { value })?;
    make_wrap_node(graph, NodeKind::Dequantize, value, anchor, ty, "dequant")
}

fn make_wrap_node(
    graph: &mut Graph,
    kind: NodeKind,
    value: ValueId,
    anchor: NodeId,
    output_ty: IrType,
    suffix: &str,
) -> Result<NodeId, IrError> {
    let scope = graph.get_node(anchor)?.scope().clone();
    let name = format!("{}.{}", graph.unique_name(value), suffix);
    let node = graph.create_node(kind);
    graph.set_scope(node, scope)?;
    let out = graph.add_output(node, output_ty)?;
    graph.set_value_name(out, name)?;
    Ok(node)
}

/// Inserts `scale` and `zero_point` constants immediately before `quant` and
/// appends them as its next two inputs.
///
/// `quant` must already be placed; call after its value input is attached so
/// the inputs read `(value, scale, zero_point)`.
pub fn attach_quant_params(
    graph: &mut Graph,
    quant: NodeId,
    params: &QuantParams,
) -> Result<(), IrError> {
    let (scale, zero_point) = graph.with_insert_point(InsertPoint::Before(quant), |g| {
        let scale = g.insert_constant(ConstValue::Float(f64::from(params.scale)))?;
        let zero_point = g.insert_constant(ConstValue::Int(i64::from(params.zero_point)))?;
        Ok::<_, IrError>((scale, zero_point))
    })?;
    graph.add_node_input(quant, scale)?;
    graph.add_node_input(quant, zero_point)?;
    Ok(())
}
