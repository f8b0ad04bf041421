//! Property-based tests for the quantization passes.
//!
//! Key invariants:
//! - Observer insertion only adds nodes and uses
//! - An empty parameter table leaves the graph unchanged
//! - A value with a quantizable producer is wrapped once, however many uses it has
//! - Every other edge into a quantizable consumer is wrapped on its own
//! - Every rewritten graph passes `verify`

use proptest::prelude::*;
use qgraph::ir::{emit_graph_text, verify, Graph, IrType, Method, NodeKind, User, ValueId};
use qgraph::quant::{
    insert_observers, insert_quant_dequant, is_quantizable_kind, ObserverTemplate,
    ObserverTemplates, QParamTable, QuantParams,
};

#[derive(Debug, Clone)]
struct GraphShape {
    inputs: usize,
    params: usize,
    ops: Vec<(u8, usize, usize)>,
    outputs: Vec<usize>,
}

fn graph_shape() -> impl Strategy<Value = GraphShape> {
    (
        1usize..4,
        0usize..3,
        prop::collection::vec((0u8..6, any::<usize>(), any::<usize>()), 1..12),
        prop::collection::vec(any::<usize>(), 0..3),
    )
        .prop_map(|(inputs, params, ops, outputs)| GraphShape {
            inputs,
            params: params.min(inputs),
            ops,
            outputs,
        })
}

fn op(tag: u8) -> (NodeKind, usize) {
    match tag {
        0 => (NodeKind::Conv2d, 2),
        1 => (NodeKind::Convolution, 2),
        2 => (NodeKind::Relu, 1),
        3 => (NodeKind::Add, 2),
        4 => (NodeKind::Flatten, 1),
        _ => (NodeKind::MaxPool2d, 1),
    }
}

/// A random DAG of tensor ops over named values `in<i>` / `v<j>`.
fn build(shape: &GraphShape) -> Method {
    let mut g = Graph::new();
    let mut values: Vec<ValueId> = (0..shape.inputs)
        .map(|i| g.add_input(Some(format!("in{}", i).as_str()), IrType::tensor()))
        .collect();
    let root = g.root();
    for (j, &(tag, a, b)) in shape.ops.iter().enumerate() {
        let (kind, arity) = op(tag);
        let operands: Vec<ValueId> = [a, b][..arity]
            .iter()
            .map(|&k| values[k % values.len()])
            .collect();
        let node = g
            .append(root, kind, &operands, vec![IrType::tensor()])
            .unwrap();
        let out = g.node(node).unwrap().outputs()[0];
        g.set_value_name(out, format!("v{}", j)).unwrap();
        values.push(out);
    }
    for &o in &shape.outputs {
        g.register_output(root, values[o % values.len()]).unwrap();
    }
    let mut m = Method::new("forward", g);
    for i in 0..shape.params {
        m.bind_param(format!("p{}", i), IrType::tensor());
    }
    m
}

fn templates() -> ObserverTemplates {
    ObserverTemplates::new()
        .with_activation(ObserverTemplate::foreign_call("observe"))
        .with_param(ObserverTemplate::foreign_call("observe_param"))
}

/// Parameters for every named value in the graph.
fn full_table(g: &Graph) -> QParamTable {
    let mut table = QParamTable::new();
    for (i, _) in g.inputs().iter().enumerate() {
        table.insert(format!("in{}", i), QuantParams::new("quint8", 0.1, 0));
    }
    for j in 0..g.top_level_nodes().len() {
        table.insert(format!("v{}", j), QuantParams::new("quint8", 0.1, 0));
    }
    table
}

fn producer_is_quantizable(g: &Graph, v: ValueId) -> bool {
    g.producer(v)
        .and_then(|p| g.node(p))
        .map_or(false, |n| is_quantizable_kind(n.kind()))
}

proptest! {
    /// Observer insertion never deletes or rewires anything.
    #[test]
    fn observers_are_additive(shape in graph_shape()) {
        let mut m = build(&shape);
        let before = m.graph.clone();
        insert_observers(&mut m, &templates()).unwrap();
        let g = &m.graph;
        prop_assert_eq!(verify(g), Ok(()));

        for &id in before.top_level_nodes() {
            let old = before.node(id).unwrap();
            let new = g.node(id).unwrap();
            prop_assert_eq!(old.inputs(), new.inputs());
            prop_assert_eq!(old.outputs(), new.outputs());
        }
        prop_assert_eq!(g.outputs(), before.outputs());
        for (i, v) in before.inputs().iter().enumerate() {
            let name = format!("in{}", i);
            prop_assert_eq!(g.find_value(&name), Some(*v));
            for u in before.uses(*v) {
                prop_assert!(g.uses(*v).contains(u));
            }
        }
        // Every tensor value gets exactly one observer.
        let values = before.inputs().len() + before.top_level_nodes().len();
        prop_assert_eq!(g.nodes_of_kind(&NodeKind::PythonOp).len(), values);
    }

    /// With no parameters nothing is matched and nothing is wrapped.
    #[test]
    fn empty_table_is_a_no_op(shape in graph_shape()) {
        let mut m = build(&shape);
        insert_observers(&mut m, &templates()).unwrap();
        let before = emit_graph_text(&m.graph);
        insert_quant_dequant(&mut m.graph, &QParamTable::new()).unwrap();
        prop_assert_eq!(emit_graph_text(&m.graph), before);
    }

    /// Producer-side wraps are deduplicated; consumer-side wraps are per edge.
    #[test]
    fn wraps_follow_edges(shape in graph_shape()) {
        let original = build(&shape).graph;
        let mut m = build(&shape);
        insert_observers(&mut m, &templates()).unwrap();
        let table = full_table(&original);
        insert_quant_dequant(&mut m.graph, &table).unwrap();
        let g = &m.graph;
        prop_assert_eq!(verify(g), Ok(()));
        prop_assert_eq!(g.nodes_of_kind(&NodeKind::PythonOp).len(), 0);

        let quant_nodes = g.nodes_of_kind(&NodeKind::QuantizeLinear);
        let outputs = original
            .top_level_nodes()
            .iter()
            .map(|&n| original.node(n).unwrap().outputs()[0]);
        for v in original.inputs().iter().copied().chain(outputs) {
            let wraps = quant_nodes
                .iter()
                .filter(|&&q| g.node(q).unwrap().inputs()[0] == v)
                .count();
            let expected = if producer_is_quantizable(&original, v) {
                usize::from(!original.uses(v).is_empty())
            } else {
                original
                    .uses(v)
                    .iter()
                    .filter(|u| match u.user {
                        User::Node(n) => is_quantizable_kind(original.node(n).unwrap().kind()),
                        User::BlockOutput(_) => false,
                    })
                    .count()
            };
            prop_assert_eq!(wraps, expected, "value {}", original.unique_name(v));
        }

        for &n in original.top_level_nodes() {
            let consumer_ok = is_quantizable_kind(original.node(n).unwrap().kind());
            for (slot, &v) in original.node(n).unwrap().inputs().iter().enumerate() {
                let now = g.node(n).unwrap().inputs()[slot];
                let wrapped = producer_is_quantizable(&original, v) || consumer_ok;
                if wrapped {
                    let dq = g.producer(now).unwrap();
                    prop_assert_eq!(g.node(dq).unwrap().kind(), &NodeKind::Dequantize);
                } else {
                    prop_assert_eq!(now, v);
                }
            }
        }
    }
}
