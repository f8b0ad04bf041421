use crate::ir::graph::Graph;
use crate::ir::types::IrType;

/// A parameter captured by a method (a weight or buffer of the module it
/// was traced from). Bound parameters are passed as the trailing graph
/// inputs, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundParam {
    pub name: String,
    pub ty: IrType,
}

/// A compiled method: its graph plus the parameters bound to it.
///
/// Invariant: `bound_params.len() <= graph.inputs().len()`. The last
/// `bound_params.len()` graph inputs receive the bound parameters; the
/// remaining leading inputs are caller-supplied activations.
#[derive(Debug, Clone)]
pub struct Method {
    pub name: String,
    pub graph: Graph,
    pub bound_params: Vec<BoundParam>,
}

impl Method {
    pub fn new(name: impl Into<String>, graph: Graph) -> Self {
        Self {
            name: name.into(),
            graph,
            bound_params: Vec::new(),
        }
    }

    /// Records a bound parameter. Call once per trailing parameter input.
    pub fn bind_param(&mut self, name: impl Into<String>, ty: IrType) {
        self.bound_params.push(BoundParam {
            name: name.into(),
            ty,
        });
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    pub fn num_bound_params(&self) -> usize {
        self.bound_params.len()
    }
}
