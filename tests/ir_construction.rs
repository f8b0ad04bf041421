//! Tests that construct graphs through the builder API directly.
//! These verify def-use invariants at the structure level.

use qgraph::ir::{
    verify, ConstValue, DType, Graph, InsertPoint, IrType, Method, NodeKind, Use, User,
};
use qgraph::IrError;

fn conv_relu_graph() -> Graph {
    let mut g = Graph::new();
    let x = g.add_input(Some("x"), IrType::tensor_of(DType::F32));
    let w = g.add_input(Some("w"), IrType::tensor_of(DType::F32));
    let root = g.root();
    let conv = g
        .append(root, NodeKind::Conv2d, &[x, w], vec![IrType::tensor_of(DType::F32)])
        .expect("append conv");
    let c = g.node(conv).unwrap().outputs()[0];
    g.set_value_name(c, "c").unwrap();
    let relu = g
        .append(root, NodeKind::Relu, &[c], vec![IrType::tensor_of(DType::F32)])
        .expect("append relu");
    let r = g.node(relu).unwrap().outputs()[0];
    g.set_value_name(r, "r").unwrap();
    g.register_output(root, r).unwrap();
    g
}

#[test]
fn test_build_conv_relu() {
    let g = conv_relu_graph();
    assert_eq!(g.inputs().len(), 2);
    assert_eq!(g.top_level_nodes().len(), 2);
    assert_eq!(g.outputs().len(), 1);
    assert_eq!(verify(&g), Ok(()));

    let c = g.find_value("c").expect("c is named");
    let relu = g.top_level_nodes()[1];
    assert_eq!(g.uses(c), &[Use::node(relu, 0)]);
    let r = g.find_value("r").expect("r is named");
    assert_eq!(g.uses(r)[0].user, User::BlockOutput(g.root()));
}

#[test]
fn test_value_types_recorded() {
    let g = conv_relu_graph();
    let x = g.find_value("x").unwrap();
    assert_eq!(g.value_type(x), Some(&IrType::tensor_of(DType::F32)));
    assert!(g.is_tensor(x));
    assert_eq!(g.value_type(x).unwrap().to_string(), "Tensor<f32>");
}

#[test]
fn test_nested_blocks_are_reachable() {
    let mut g = Graph::new();
    let cond = g.add_input(Some("cond"), IrType::Bool);
    let x = g.add_input(Some("x"), IrType::tensor());
    let root = g.root();
    let if_node = g
        .append(root, NodeKind::If, &[cond], vec![IrType::tensor()])
        .unwrap();
    let then_arm = g.add_block(if_node).unwrap();
    let else_arm = g.add_block(if_node).unwrap();
    let relu = g
        .append(then_arm, NodeKind::Relu, &[x], vec![IrType::tensor()])
        .unwrap();
    let relu_out = g.node(relu).unwrap().outputs()[0];
    g.register_output(then_arm, relu_out).unwrap();
    g.register_output(else_arm, x).unwrap();

    let loop_node = g.append(else_arm, NodeKind::Loop, &[], vec![]).unwrap();
    let body = g.add_block(loop_node).unwrap();
    let carried = g.add_block_input(body, Some("carried"), IrType::tensor()).unwrap();
    g.append(body, NodeKind::Relu, &[carried], vec![IrType::tensor()])
        .unwrap();

    let blocks = g.reachable_blocks();
    assert_eq!(blocks.len(), 4);
    for b in [root, then_arm, else_arm, body] {
        assert!(blocks.contains(&b));
    }
    assert_eq!(g.nodes_of_kind(&NodeKind::Relu).len(), 2);
    assert_eq!(verify(&g), Ok(()));
}

#[test]
fn test_constants_and_cursor() {
    let mut g = conv_relu_graph();
    let relu = g.top_level_nodes()[1];
    let k = g
        .with_insert_point(InsertPoint::Before(relu), |g| {
            g.insert_constant(ConstValue::Str("c".into()))
        })
        .unwrap();
    assert_eq!(g.const_value(k), Some(&ConstValue::Str("c".into())));
    assert_eq!(g.value_type(k), Some(&IrType::Str));
    assert_eq!(g.top_level_nodes()[1], g.producer(k).unwrap());

    // No cursor: the constant lands at the end of the root block.
    let tail = g.insert_constant(ConstValue::Int(1)).unwrap();
    assert_eq!(g.top_level_nodes().last().copied(), g.producer(tail));
    assert_eq!(verify(&g), Ok(()));
}

#[test]
fn test_destroying_used_node_rejected() {
    let mut g = conv_relu_graph();
    let conv = g.top_level_nodes()[0];
    let err = g.destroy_node(conv).unwrap_err();
    assert!(matches!(err, IrError::ValueInUse { uses: 1, .. }));
    assert_eq!(verify(&g), Ok(()));
}

#[test]
fn test_method_bound_params() {
    let mut g = Graph::new();
    g.add_input(Some("x"), IrType::tensor());
    g.add_input(Some("weight"), IrType::tensor());
    let mut m = Method::new("forward", g);
    m.bind_param("weight", IrType::tensor());
    assert_eq!(m.num_bound_params(), 1);
    assert_eq!(m.graph().inputs().len(), 2);
}

#[test]
fn test_printed_graph() {
    let g = conv_relu_graph();
    let text = g.to_string();
    assert!(text.starts_with("graph(%x : Tensor<f32>, %w : Tensor<f32>):\n"));
    assert!(text.contains("%c : Tensor<f32> = aten::conv2d(%x, %w)"));
    assert!(text.contains("%r : Tensor<f32> = aten::relu(%c)"));
    assert!(text.ends_with("  return (%r)\n"));
}
