use crate::ir::block::BlockId;
use crate::ir::node::NodeId;
use crate::ir::types::IrType;

/// An opaque, index-based reference to a value within a `Graph`.
///
/// Invariant: `ValueId(n)` is only valid within the graph that produced it.
/// Ids are never reused, even after the value is destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValueId(pub u32);

impl std::fmt::Display for ValueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// The definition site of a value. Every live value has exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueDef {
    /// Output `offset` of a node.
    Node { node: NodeId, offset: usize },
    /// Input `offset` of a block (graph inputs are root block inputs).
    BlockInput { block: BlockId, offset: usize },
}

/// Who holds a reference to a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum User {
    /// A node input slot.
    Node(NodeId),
    /// A block output slot (what a branch or loop body yields).
    BlockOutput(BlockId),
}

/// A single `(user, slot)` reference to a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Use {
    pub user: User,
    pub offset: usize,
}

impl Use {
    pub fn node(node: NodeId, offset: usize) -> Self {
        Self {
            user: User::Node(node),
            offset,
        }
    }

    pub fn block_output(block: BlockId, offset: usize) -> Self {
        Self {
            user: User::BlockOutput(block),
            offset,
        }
    }
}

/// A typed SSA value.
#[derive(Debug, Clone)]
pub struct Value {
    pub(crate) ty: IrType,
    pub(crate) name: Option<String>,
    pub(crate) def: ValueDef,
    pub(crate) uses: Vec<Use>,
}

impl Value {
    pub(crate) fn new(ty: IrType, def: ValueDef) -> Self {
        Self {
            ty,
            name: None,
            def,
            uses: Vec::new(),
        }
    }

    pub fn ty(&self) -> &IrType {
        &self.ty
    }

    /// The explicit name, if one was assigned.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn def(&self) -> ValueDef {
        self.def
    }

    pub fn uses(&self) -> &[Use] {
        &self.uses
    }

    /// The producing node, or `None` for block inputs.
    pub fn producer(&self) -> Option<NodeId> {
        match self.def {
            ValueDef::Node { node, .. } => Some(node),
            ValueDef::BlockInput { .. } => None,
        }
    }
}
