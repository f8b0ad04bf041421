//! Quantize/dequantize insertion.
//!
//! Replaces the instrumentation left by [`insert_observers`] with explicit
//! `aten::quantize_linear` → `aten::dequantize` pairs around the operands of
//! quantizable operators. The pass runs in two phases: a read-only
//! traversal that matches observers and plans every wrap, then a mutation
//! phase that removes the matched observers and applies the plan.
//!
//! A value produced by a quantizable node is wrapped once, right after its
//! producer, and all of its uses are redirected (producer side). A value
//! produced elsewhere but read by a quantizable node is wrapped per input
//! slot, right before that consumer, and only that slot is rewritten
//! (consumer side).
//!
//! [`insert_observers`]: crate::quant::observer::insert_observers

use std::collections::HashSet;

use crate::error::{ConfigError, IrError, PassError};
use crate::ir::{BlockId, Graph, Method, NodeId, ValueId};
use crate::pass::Pass;
use crate::quant::eligibility::is_quantizable;
use crate::quant::helpers::{
    attach_quant_params, insert_relative_to, make_dequant_node, make_quant_node,
};
use crate::quant::qparams::{ObserverMatch, QParamTable, QuantParams, ValueParamBinding};

/// Which edge a planned wrap sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapSide {
    /// After the producing node; every use is redirected.
    Producer,
    /// Before the consuming node; only input slot `input` is rewritten.
    Consumer { input: usize },
}

/// A planned quantize/dequantize insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertionRecord {
    pub value: ValueId,
    /// The producer for `Producer` wraps, the consumer for `Consumer` wraps.
    pub anchor: NodeId,
    pub side: WrapSide,
}

/// Everything the read-only phase found.
#[derive(Debug, Default)]
struct WrapPlan {
    observers: Vec<ObserverMatch>,
    producer_side: Vec<InsertionRecord>,
    consumer_side: Vec<InsertionRecord>,
    binding: ValueParamBinding,
}

/// Rewrites `graph` using the parameters in `qparams`.
///
/// Values without a matched observer are left unwrapped. The table is
/// validated before anything is touched; later errors are structural and
/// leave the graph partially rewritten.
pub fn insert_quant_dequant(graph: &mut Graph, qparams: &QParamTable) -> Result<(), PassError> {
    qparams.validate().map_err(|e| match e {
        ConfigError::InvalidQuantParams { key, detail } => {
            PassError::InvalidQuantParams { key, detail }
        }
        other => PassError::InvalidQuantParams {
            key: String::new(),
            detail: other.to_string(),
        },
    })?;

    let plan = collect(graph, qparams);

    let removed = remove_observers(graph, &plan.observers)?;

    let mut producer_wraps = 0usize;
    for record in &plan.producer_side {
        if let Some(params) = plan.binding.get(record.value) {
            wrap_producer(graph, record, params)?;
            producer_wraps += 1;
        }
    }

    let mut consumer_wraps = 0usize;
    for record in &plan.consumer_side {
        let WrapSide::Consumer { input } = record.side else {
            continue;
        };
        if let Some(params) = plan.binding.get(record.value) {
            wrap_consumer(graph, record.value, record.anchor, input, params)?;
            consumer_wraps += 1;
        }
    }

    log::debug!(
        "insert-quant-dequant: removed {} observer node(s), {} producer-side and {} consumer-side wrap(s), {} candidate(s) without parameters",
        removed,
        producer_wraps,
        consumer_wraps,
        plan.producer_side.len() + plan.consumer_side.len() - producer_wraps - consumer_wraps
    );
    Ok(())
}

fn collect(graph: &Graph, qparams: &QParamTable) -> WrapPlan {
    let mut plan = WrapPlan::default();
    let mut producer_seen: HashSet<ValueId> = HashSet::new();
    let mut worklist: Vec<BlockId> = vec![graph.root()];

    while let Some(block) = worklist.pop() {
        let Some(b) = graph.block(block) else { continue };

        for &id in b.nodes() {
            if let Some(m) = plan.binding.match_observer(graph, id, qparams) {
                plan.observers.push(m);
                continue;
            }
            let Some(node) = graph.node(id) else { continue };
            let consumer_eligible = is_quantizable(node);
            for (input, &value) in node.inputs().iter().enumerate() {
                if !graph.is_tensor(value) {
                    continue;
                }
                match eligible_producer(graph, value) {
                    Some(producer) => {
                        if producer_seen.insert(value) {
                            plan.producer_side.push(InsertionRecord {
                                value,
                                anchor: producer,
                                side: WrapSide::Producer,
                            });
                        }
                    }
                    None if consumer_eligible => plan.consumer_side.push(InsertionRecord {
                        value,
                        anchor: id,
                        side: WrapSide::Consumer { input },
                    }),
                    None => {}
                }
            }
            worklist.extend_from_slice(node.blocks());
        }

        // Values leaving the block without a consumer inside it.
        for &value in b.outputs() {
            if !graph.is_tensor(value) {
                continue;
            }
            if let Some(producer) = eligible_producer(graph, value) {
                if producer_seen.insert(value) {
                    plan.producer_side.push(InsertionRecord {
                        value,
                        anchor: producer,
                        side: WrapSide::Producer,
                    });
                }
            }
        }
    }
    plan
}

fn eligible_producer(graph: &Graph, value: ValueId) -> Option<NodeId> {
    let producer = graph.producer(value)?;
    graph
        .node(producer)
        .filter(|node| is_quantizable(node))
        .map(|_| producer)
}

/// Destroys matched observers, then their name constants. A name constant
/// that still feeds something else is kept.
fn remove_observers(graph: &mut Graph, observers: &[ObserverMatch]) -> Result<usize, IrError> {
    let mut removed = 0usize;
    for m in observers {
        graph.destroy_node(m.observer)?;
        removed += 1;
    }

    let mut constants_seen: HashSet<NodeId> = HashSet::new();
    for m in observers {
        if !constants_seen.insert(m.name_constant) {
            continue;
        }
        let Some(node) = graph.node(m.name_constant) else { continue };
        let still_used = node.outputs().iter().any(|&out| !graph.uses(out).is_empty());
        if still_used {
            log::warn!(
                "keeping name constant {} for '{}': it has uses outside the removed observers",
                m.name_constant,
                m.key
            );
            continue;
        }
        graph.destroy_node(m.name_constant)?;
        removed += 1;
    }
    Ok(removed)
}

fn single_output(graph: &Graph, node: NodeId) -> Result<ValueId, IrError> {
    graph
        .get_node(node)?
        .output()
        .ok_or(IrError::UnknownNode { node })
}

/// `producer → value` becomes
/// `producer → value → quantize → dequantize`, with every former use of
/// `value` reading the dequantize output.
fn wrap_producer(
    graph: &mut Graph,
    record: &InsertionRecord,
    params: &QuantParams,
) -> Result<(), IrError> {
    let value = record.value;
    let producer = record.anchor;
    let quant = make_quant_node(graph, value, producer)?;
    let dequant = make_dequant_node(graph, value, producer)?;
    insert_relative_to(graph, quant, producer, true)?;
    insert_relative_to(graph, dequant, quant, true)?;

    let dequantized = single_output(graph, dequant)?;
    graph.replace_all_uses_with(value, dequantized)?;
    graph.add_node_input(quant, value)?;
    attach_quant_params(graph, quant, params)?;
    let quantized = single_output(graph, quant)?;
    graph.add_node_input(dequant, quantized)?;

    log::trace!(
        "wrapped %{} after producer {} ({} scale={} zero_point={})",
        graph.unique_name(value),
        producer,
        params.dtype,
        params.scale,
        params.zero_point
    );
    Ok(())
}

/// Rewrites one input slot of a quantizable consumer to read
/// `value → quantize → dequantize`, placed right before the consumer.
fn wrap_consumer(
    graph: &mut Graph,
    value: ValueId,
    consumer: NodeId,
    input: usize,
    params: &QuantParams,
) -> Result<(), IrError> {
    let found = graph.get_node(consumer)?.inputs().get(input).copied();
    match found {
        Some(found) if found == value => {}
        Some(found) => {
            return Err(IrError::InputMismatch {
                node: consumer,
                offset: input,
                expected: value,
                found,
            })
        }
        None => {
            return Err(IrError::InputOutOfRange {
                node: consumer,
                offset: input,
                len: graph.get_node(consumer)?.inputs().len(),
            })
        }
    }

    let quant = make_quant_node(graph, value, consumer)?;
    let dequant = make_dequant_node(graph, value, consumer)?;
    insert_relative_to(graph, dequant, consumer, false)?;
    insert_relative_to(graph, quant, dequant, false)?;

    graph.add_node_input(quant, value)?;
    attach_quant_params(graph, quant, params)?;
    let quantized = single_output(graph, quant)?;
    graph.add_node_input(dequant, quantized)?;
    let dequantized = single_output(graph, dequant)?;
    graph.replace_input(consumer, input, dequantized)?;

    log::trace!(
        "wrapped %{} at input {} of consumer {}",
        graph.unique_name(value),
        input,
        consumer
    );
    Ok(())
}

/// Pipeline wrapper around [`insert_quant_dequant`].
#[derive(Debug, Clone, Default)]
pub struct InsertQuantDequantPass {
    qparams: QParamTable,
}

impl InsertQuantDequantPass {
    pub fn new(qparams: QParamTable) -> Self {
        Self { qparams }
    }
}

impl Pass for InsertQuantDequantPass {
    fn name(&self) -> &'static str {
        "insert-quant-dequant"
    }

    fn run(&mut self, method: &mut Method) -> Result<(), PassError> {
        insert_quant_dequant(method.graph_mut(), &self.qparams)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ConstValue, IrType, NodeKind, ATTR_NAME};

    fn observe(g: &mut Graph, value: ValueId, key: &str) -> NodeId {
        let root = g.root();
        let name = g.insert_constant(ConstValue::Str(key.into())).unwrap();
        let obs = g
            .append(root, NodeKind::PythonOp, &[value, name], vec![IrType::tensor()])
            .unwrap();
        g.set_attr(obs, ATTR_NAME, ConstValue::Str("observe".into()))
            .unwrap();
        obs
    }

    #[test]
    fn collect_dedups_producer_side() {
        let mut g = Graph::new();
        let x = g.add_input(Some("x"), IrType::tensor());
        let root = g.root();
        let relu = g
            .append(root, NodeKind::Relu, &[x], vec![IrType::tensor()])
            .unwrap();
        let y = g.node(relu).unwrap().outputs()[0];
        g.append(root, NodeKind::Flatten, &[y], vec![IrType::tensor()])
            .unwrap();
        g.append(root, NodeKind::Add, &[y, y], vec![IrType::tensor()])
            .unwrap();
        g.register_output(root, y).unwrap();

        let plan = collect(&g, &QParamTable::new());
        assert_eq!(
            plan.producer_side,
            vec![InsertionRecord {
                value: y,
                anchor: relu,
                side: WrapSide::Producer
            }]
        );
        // x has no producer; relu is the eligible consumer.
        assert_eq!(
            plan.consumer_side,
            vec![InsertionRecord {
                value: x,
                anchor: relu,
                side: WrapSide::Consumer { input: 0 }
            }]
        );
    }

    #[test]
    fn shared_name_constant_is_kept() {
        let mut g = Graph::new();
        let x = g.add_input(Some("x"), IrType::tensor());
        let obs = observe(&mut g, x, "x");
        let name = g.node(obs).unwrap().inputs()[1];
        let root = g.root();
        let other = g
            .append(root, NodeKind::Other("aten::format".into()), &[name], vec![IrType::Str])
            .unwrap();

        let table: QParamTable = [("x", QuantParams::new("quint8", 0.1, 0))]
            .into_iter()
            .collect();
        insert_quant_dequant(&mut g, &table).unwrap();

        assert!(g.node(obs).is_none());
        assert!(g.producer(name).is_some());
        assert_eq!(g.node(other).unwrap().inputs(), &[name]);
        assert_eq!(crate::ir::verify(&g), Ok(()));
    }
}
