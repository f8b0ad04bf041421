//! Observer insertion.
//!
//! Instruments a method's graph with calls that record runtime statistics:
//! every tensor graph input and every tensor produced by a regular node gets
//! an observer wired as `observer(value, constant(name)) -> name.observed`.
//! Observers are side taps. No existing consumer is redirected to the
//! observed output; only the later quantize/dequantize rewrite rewires uses.

use std::collections::BTreeMap;

use crate::error::{IrError, PassError};
use crate::ir::{
    BlockId, ConstValue, Graph, InsertPoint, Method, Node, NodeId, NodeKind, Scope, ValueId,
    ATTR_NAME,
};
use crate::pass::Pass;
use crate::quant::helpers::clone_template;

/// Role key for observers of activations and computed values.
pub const ACTIVATION_ROLE: &str = "activation";
/// Role key for observers of bound parameters.
pub const PARAM_ROLE: &str = "param";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObserverRole {
    Activation,
    Param,
}

impl ObserverRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ObserverRole::Activation => ACTIVATION_ROLE,
            ObserverRole::Param => PARAM_ROLE,
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            ACTIVATION_ROLE => Some(ObserverRole::Activation),
            PARAM_ROLE => Some(ObserverRole::Param),
            _ => None,
        }
    }
}

impl std::fmt::Display for ObserverRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Prototype an observer node is cloned from.
///
/// A well-formed template is a `prim::PythonOp` whose `name` attribute is a
/// non-empty string naming the callee.
#[derive(Debug, Clone, PartialEq)]
pub struct ObserverTemplate {
    kind: NodeKind,
    attrs: BTreeMap<String, ConstValue>,
    scope: Scope,
}

impl ObserverTemplate {
    /// A template with an arbitrary kind and no attributes.
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            attrs: BTreeMap::new(),
            scope: Scope::root(),
        }
    }

    /// A foreign call to `callee`; the usual way to build a template.
    pub fn foreign_call(callee: impl Into<String>) -> Self {
        Self::new(NodeKind::PythonOp).with_attr(ATTR_NAME, ConstValue::Str(callee.into()))
    }

    /// Captures kind, attributes and scope of an existing node.
    pub fn from_node(node: &Node) -> Self {
        Self {
            kind: node.kind().clone(),
            attrs: node.attrs().clone(),
            scope: node.scope().clone(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: ConstValue) -> Self {
        self.attrs.insert(key.into(), value);
        self
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn attrs(&self) -> &BTreeMap<String, ConstValue> {
        &self.attrs
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// The callee recorded in the `name` attribute, if it is a string.
    pub fn callee(&self) -> Option<&str> {
        self.attrs.get(ATTR_NAME).and_then(ConstValue::as_str)
    }

    pub fn validate(&self, role: ObserverRole) -> Result<(), PassError> {
        let malformed = |detail: String| PassError::MalformedTemplate {
            role: role.as_str().to_owned(),
            detail,
        };
        if self.kind != NodeKind::PythonOp {
            return Err(malformed(format!(
                "expected kind {}, found {}",
                NodeKind::PythonOp,
                self.kind
            )));
        }
        match self.attrs.get(ATTR_NAME) {
            None => Err(malformed(format!("missing '{}' attribute", ATTR_NAME))),
            Some(ConstValue::Str(s)) if s.is_empty() => {
                Err(malformed(format!("'{}' attribute is empty", ATTR_NAME)))
            }
            Some(ConstValue::Str(_)) => Ok(()),
            Some(other) => Err(malformed(format!(
                "'{}' attribute must be a string, found {}",
                ATTR_NAME, other
            ))),
        }
    }
}

/// At most one observer template per role. A missing template means values
/// of that role are not observed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObserverTemplates {
    pub activation: Option<ObserverTemplate>,
    pub param: Option<ObserverTemplate>,
}

impl ObserverTemplates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_activation(mut self, template: ObserverTemplate) -> Self {
        self.activation = Some(template);
        self
    }

    pub fn with_param(mut self, template: ObserverTemplate) -> Self {
        self.param = Some(template);
        self
    }

    /// Builds the set from role-keyed entries. Keys other than `activation`
    /// and `param` are ignored with a warning; a repeated key keeps the last
    /// template.
    pub fn from_roles<K, I>(entries: I) -> Self
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, ObserverTemplate)>,
    {
        let mut templates = Self::default();
        for (key, template) in entries {
            match ObserverRole::from_key(key.as_ref()) {
                Some(ObserverRole::Activation) => templates.activation = Some(template),
                Some(ObserverRole::Param) => templates.param = Some(template),
                None => log::warn!("ignoring observer template for unknown role '{}'", key.as_ref()),
            }
        }
        templates
    }

    pub fn get(&self, role: ObserverRole) -> Option<&ObserverTemplate> {
        match role {
            ObserverRole::Activation => self.activation.as_ref(),
            ObserverRole::Param => self.param.as_ref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.activation.is_none() && self.param.is_none()
    }

    fn validate(&self) -> Result<(), PassError> {
        for role in [ObserverRole::Activation, ObserverRole::Param] {
            if let Some(template) = self.get(role) {
                template.validate(role)?;
            }
        }
        Ok(())
    }
}

/// Inserts observers into `method`'s graph.
///
/// The trailing `method.num_bound_params()` graph inputs are observed with
/// the `param` template, the others with the `activation` template; their
/// observers go at the start of the root block in input order. Outputs of
/// every node in every reachable block, except constants and foreign calls,
/// are observed with the `activation` template right after their producer.
/// Only tensor-typed values are observed.
pub fn insert_observers(method: &mut Method, observers: &ObserverTemplates) -> Result<(), PassError> {
    observers.validate()?;
    let params = method.num_bound_params();
    let graph = method.graph_mut();
    let num_inputs = graph.inputs().len();
    if params > num_inputs {
        return Err(PassError::ParamCountExceedsInputs {
            params,
            inputs: num_inputs,
        });
    }

    let computed = if observers.activation.is_some() {
        collect_observable_outputs(graph)
    } else {
        Vec::new()
    };

    let root = graph.root();
    let start = match graph.top_level_nodes().first() {
        Some(&first) => InsertPoint::Before(first),
        None => InsertPoint::AtEnd(root),
    };
    let first_param = num_inputs - params;
    let mut inserted = 0usize;
    for (index, value) in graph.inputs().to_vec().into_iter().enumerate() {
        let role = if index >= first_param {
            ObserverRole::Param
        } else {
            ObserverRole::Activation
        };
        let Some(template) = observers.get(role) else {
            continue;
        };
        if !graph.is_tensor(value) {
            continue;
        }
        insert_observer(graph, template, value, start, start)?;
        inserted += 1;
    }

    if let Some(template) = &observers.activation {
        for value in computed {
            if !graph.is_tensor(value) {
                continue;
            }
            let producer = graph.producer(value).ok_or(IrError::NoProducer { value })?;
            insert_observer(
                graph,
                template,
                value,
                InsertPoint::Before(producer),
                InsertPoint::After(producer),
            )?;
            inserted += 1;
        }
    }

    log::debug!("insert-observers: inserted {} observer(s)", inserted);
    Ok(())
}

/// Outputs of every observable node in every reachable block.
fn collect_observable_outputs(graph: &Graph) -> Vec<ValueId> {
    let mut values = Vec::new();
    let mut worklist: Vec<BlockId> = vec![graph.root()];
    while let Some(block) = worklist.pop() {
        let Some(b) = graph.block(block) else { continue };
        for &id in b.nodes() {
            let Some(node) = graph.node(id) else { continue };
            if !should_observe(node) {
                continue;
            }
            values.extend_from_slice(node.outputs());
            worklist.extend_from_slice(node.blocks());
        }
    }
    values
}

fn should_observe(node: &Node) -> bool {
    !matches!(node.kind(), NodeKind::Constant | NodeKind::PythonOp)
}

/// Wires `observer(value, constant(name)) -> name.observed`, placing the
/// name constant at `constant_at` and the observer at `observer_at`.
fn insert_observer(
    graph: &mut Graph,
    template: &ObserverTemplate,
    value: ValueId,
    constant_at: InsertPoint,
    observer_at: InsertPoint,
) -> Result<NodeId, IrError> {
    let name = graph.unique_name(value);
    let ty = graph
        .value_type(value)
        .cloned()
        .ok_or(IrError::UnknownValue { value })?;

    let name_value =
        graph.with_insert_point(constant_at, |g| g.insert_constant(ConstValue::Str(name.clone())))?;
    let observer = clone_template(graph, template)?;
    graph.add_node_input(observer, value)?;
    graph.add_node_input(observer, name_value)?;
    let observed = graph.add_output(observer, ty)?;
    graph.set_value_name(observed, format!("{}.observed", name))?;
    graph.insert(observer, observer_at)?;
    log::trace!("observer {} taps %{}", observer, name);
    Ok(observer)
}

/// Pipeline wrapper around [`insert_observers`].
#[derive(Debug, Clone, Default)]
pub struct InsertObserversPass {
    templates: ObserverTemplates,
}

impl InsertObserversPass {
    pub fn new(templates: ObserverTemplates) -> Self {
        Self { templates }
    }
}

impl Pass for InsertObserversPass {
    fn name(&self) -> &'static str {
        "insert-observers"
    }

    fn run(&mut self, method: &mut Method) -> Result<(), PassError> {
        insert_observers(method, &self.templates)
    }
}
