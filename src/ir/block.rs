use crate::ir::node::NodeId;
use crate::ir::value::ValueId;

/// An opaque index identifying a block within a `Graph`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub u32);

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "block{}", self.0)
    }
}

/// An ordered sequence of nodes with its own inputs and outputs.
///
/// Invariants maintained by `Graph`:
/// 1. Every node in `nodes` records this block as its owning block.
/// 2. `inputs` are defined before any node of this block runs.
/// 3. `outputs` only name values visible at the end of the block.
/// 4. The root block has no owning node; every other block has exactly one.
#[derive(Debug, Clone, Default)]
pub struct Block {
    pub(crate) inputs: Vec<ValueId>,
    pub(crate) outputs: Vec<ValueId>,
    /// Nodes in program order.
    pub(crate) nodes: Vec<NodeId>,
    pub(crate) owning_node: Option<NodeId>,
    /// Set once the owning node has been destroyed.
    pub(crate) dead: bool,
}

impl Block {
    pub(crate) fn new(owning_node: Option<NodeId>) -> Self {
        Self {
            owning_node,
            ..Self::default()
        }
    }

    pub fn inputs(&self) -> &[ValueId] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[ValueId] {
        &self.outputs
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn owning_node(&self) -> Option<NodeId> {
        self.owning_node
    }

    /// Position of `node` in program order, if it lives in this block.
    pub fn position(&self, node: NodeId) -> Option<usize> {
        self.nodes.iter().position(|&n| n == node)
    }
}
