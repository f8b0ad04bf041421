//! Arena-backed graph IR.
//!
//! `Graph` owns every node, value and block. Entities are addressed by
//! stable ids (`NodeId`, `ValueId`, `BlockId`) that index flat `Vec`s;
//! destroyed nodes and values leave `None` tombstones so ids are never
//! reused. Def-use information is kept on both sides: a node lists its input
//! values, and each value lists its `(user, slot)` uses. Every mutation below
//! updates both sides together.

use std::collections::HashMap;

use crate::error::IrError;
use crate::ir::block::{Block, BlockId};
use crate::ir::node::{ConstValue, Node, NodeId, NodeKind, Scope, ATTR_VALUE};
use crate::ir::types::IrType;
use crate::ir::value::{Use, User, Value, ValueDef, ValueId};

/// Where a new node is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPoint {
    /// Immediately before the given node, in its block.
    Before(NodeId),
    /// Immediately after the given node, in its block.
    After(NodeId),
    /// At the end of the given block.
    AtEnd(BlockId),
}

/// A computation graph: a root block plus the arenas everything lives in.
///
/// Invariants:
/// - `BlockId(0)` is the root block; its inputs are the graph inputs and its
///   outputs the graph outputs.
/// - Every live value has exactly one `ValueDef`.
/// - A `Use` appears in a value's use list iff the corresponding input or
///   output slot holds that value.
/// - Value names are unique among live values.
#[derive(Debug, Clone)]
pub struct Graph {
    pub(crate) nodes: Vec<Option<Node>>,
    pub(crate) values: Vec<Option<Value>>,
    pub(crate) blocks: Vec<Block>,
    names: HashMap<String, ValueId>,
    insert_point: Option<InsertPoint>,
}

impl Graph {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            values: Vec::new(),
            blocks: vec![Block::new(None)],
            names: HashMap::new(),
            insert_point: None,
        }
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    pub fn root(&self) -> BlockId {
        BlockId(0)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0 as usize)?.as_ref()
    }

    pub fn value(&self, id: ValueId) -> Option<&Value> {
        self.values.get(id.0 as usize)?.as_ref()
    }

    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id.0 as usize).filter(|b| !b.dead)
    }

    pub(crate) fn get_node(&self, id: NodeId) -> Result<&Node, IrError> {
        self.node(id).ok_or(IrError::UnknownNode { node: id })
    }

    pub(crate) fn get_value(&self, id: ValueId) -> Result<&Value, IrError> {
        self.value(id).ok_or(IrError::UnknownValue { value: id })
    }

    pub(crate) fn get_block(&self, id: BlockId) -> Result<&Block, IrError> {
        self.block(id).ok_or(IrError::UnknownBlock { block: id })
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, IrError> {
        self.nodes
            .get_mut(id.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(IrError::UnknownNode { node: id })
    }

    fn value_mut(&mut self, id: ValueId) -> Result<&mut Value, IrError> {
        self.values
            .get_mut(id.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(IrError::UnknownValue { value: id })
    }

    fn block_mut(&mut self, id: BlockId) -> Result<&mut Block, IrError> {
        self.blocks
            .get_mut(id.0 as usize)
            .filter(|b| !b.dead)
            .ok_or(IrError::UnknownBlock { block: id })
    }

    /// Graph inputs (the root block's inputs).
    pub fn inputs(&self) -> &[ValueId] {
        &self.blocks[0].inputs
    }

    /// Graph outputs (the root block's outputs).
    pub fn outputs(&self) -> &[ValueId] {
        &self.blocks[0].outputs
    }

    /// Nodes of the root block in program order.
    pub fn top_level_nodes(&self) -> &[NodeId] {
        &self.blocks[0].nodes
    }

    pub fn value_type(&self, value: ValueId) -> Option<&IrType> {
        self.value(value).map(Value::ty)
    }

    /// True if `value` is live and tensor-typed.
    pub fn is_tensor(&self, value: ValueId) -> bool {
        self.value_type(value).map_or(false, IrType::is_tensor)
    }

    /// The node producing `value`, or `None` for block inputs and dead values.
    pub fn producer(&self, value: ValueId) -> Option<NodeId> {
        self.value(value).and_then(Value::producer)
    }

    pub fn uses(&self, value: ValueId) -> &[Use] {
        self.value(value).map_or(&[][..], Value::uses)
    }

    /// Looks up a live value by its exact name.
    pub fn find_value(&self, name: &str) -> Option<ValueId> {
        self.names.get(name).copied()
    }

    /// The value's name, or its numeric id when it has none.
    pub fn unique_name(&self, value: ValueId) -> String {
        self.value(value)
            .and_then(|v| v.name.clone())
            .unwrap_or_else(|| value.0.to_string())
    }

    /// The literal behind `value` if it is produced by a `prim::Constant`.
    pub fn const_value(&self, value: ValueId) -> Option<&ConstValue> {
        let node = self.node(self.producer(value)?)?;
        if node.kind != NodeKind::Constant {
            return None;
        }
        node.attr(ATTR_VALUE)
    }

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    fn fresh_value(&mut self, ty: IrType, def: ValueDef) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(Some(Value::new(ty, def)));
        id
    }

    /// Adds a graph input. Named inputs go through `set_value_name`.
    pub fn add_input(&mut self, name: Option<&str>, ty: IrType) -> ValueId {
        let offset = self.blocks[0].inputs.len();
        let value = self.fresh_value(
            ty,
            ValueDef::BlockInput {
                block: BlockId(0),
                offset,
            },
        );
        self.blocks[0].inputs.push(value);
        if let Some(name) = name {
            self.assign_name(value, name.to_owned());
        }
        value
    }

    /// Adds an input to a nested block (e.g. a loop-carried value).
    pub fn add_block_input(
        &mut self,
        block: BlockId,
        name: Option<&str>,
        ty: IrType,
    ) -> Result<ValueId, IrError> {
        let offset = self.get_block(block)?.inputs.len();
        let value = self.fresh_value(ty, ValueDef::BlockInput { block, offset });
        self.block_mut(block)?.inputs.push(value);
        if let Some(name) = name {
            self.assign_name(value, name.to_owned());
        }
        Ok(value)
    }

    /// Appends `value` to the outputs of `block`. Returns the output slot.
    pub fn register_output(&mut self, block: BlockId, value: ValueId) -> Result<usize, IrError> {
        self.get_value(value)?;
        let b = self.block_mut(block)?;
        let offset = b.outputs.len();
        b.outputs.push(value);
        self.value_mut(value)?.uses.push(Use::block_output(block, offset));
        Ok(offset)
    }

    /// Creates a detached node with no inputs, outputs or blocks.
    pub fn create_node(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Some(Node::new(kind)));
        id
    }

    /// Appends a new output of type `ty` to `node`.
    pub fn add_output(&mut self, node: NodeId, ty: IrType) -> Result<ValueId, IrError> {
        let offset = self.get_node(node)?.outputs.len();
        let value = self.fresh_value(ty, ValueDef::Node { node, offset });
        self.node_mut(node)?.outputs.push(value);
        Ok(value)
    }

    /// Appends `value` to the inputs of `node`. Returns the input slot.
    pub fn add_node_input(&mut self, node: NodeId, value: ValueId) -> Result<usize, IrError> {
        self.get_value(value)?;
        let n = self.node_mut(node)?;
        let offset = n.inputs.len();
        n.inputs.push(value);
        self.value_mut(value)?.uses.push(Use::node(node, offset));
        Ok(offset)
    }

    pub fn set_attr(
        &mut self,
        node: NodeId,
        key: impl Into<String>,
        value: ConstValue,
    ) -> Result<(), IrError> {
        self.node_mut(node)?.attrs.insert(key.into(), value);
        Ok(())
    }

    pub fn set_scope(&mut self, node: NodeId, scope: Scope) -> Result<(), IrError> {
        self.node_mut(node)?.scope = scope;
        Ok(())
    }

    /// Attaches a new, empty nested block to `node`.
    pub fn add_block(&mut self, node: NodeId) -> Result<BlockId, IrError> {
        self.get_node(node)?;
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block::new(Some(node)));
        self.node_mut(node)?.blocks.push(id);
        Ok(id)
    }

    /// Creates a node of `kind` reading `inputs`, with one output per entry of
    /// `output_types`, and appends it to `block`.
    pub fn append(
        &mut self,
        block: BlockId,
        kind: NodeKind,
        inputs: &[ValueId],
        output_types: Vec<IrType>,
    ) -> Result<NodeId, IrError> {
        self.get_block(block)?;
        let node = self.create_node(kind);
        for &input in inputs {
            self.add_node_input(node, input)?;
        }
        for ty in output_types {
            self.add_output(node, ty)?;
        }
        self.insert(node, InsertPoint::AtEnd(block))?;
        Ok(node)
    }

    // -----------------------------------------------------------------------
    // Placement
    // -----------------------------------------------------------------------

    /// Places a detached node at `point`.
    pub fn insert(&mut self, node: NodeId, point: InsertPoint) -> Result<(), IrError> {
        if let Some(block) = self.get_node(node)?.owning_block {
            return Err(IrError::NodeAlreadyInserted { node, block });
        }
        let (block, index) = match point {
            InsertPoint::Before(anchor) => self.anchor_position(anchor)?,
            InsertPoint::After(anchor) => {
                let (block, index) = self.anchor_position(anchor)?;
                (block, index + 1)
            }
            InsertPoint::AtEnd(block) => (block, self.get_block(block)?.nodes.len()),
        };
        self.block_mut(block)?.nodes.insert(index, node);
        self.node_mut(node)?.owning_block = Some(block);
        Ok(())
    }

    pub fn insert_before(&mut self, node: NodeId, anchor: NodeId) -> Result<(), IrError> {
        self.insert(node, InsertPoint::Before(anchor))
    }

    pub fn insert_after(&mut self, node: NodeId, anchor: NodeId) -> Result<(), IrError> {
        self.insert(node, InsertPoint::After(anchor))
    }

    fn anchor_position(&self, anchor: NodeId) -> Result<(BlockId, usize), IrError> {
        let block = self
            .get_node(anchor)?
            .owning_block
            .ok_or(IrError::NodeNotInserted { node: anchor })?;
        let index = self
            .get_block(block)?
            .position(anchor)
            .ok_or(IrError::WrongOwningBlock { node: anchor, block })?;
        Ok((block, index))
    }

    pub fn insert_point(&self) -> Option<InsertPoint> {
        self.insert_point
    }

    pub fn set_insert_point(&mut self, point: Option<InsertPoint>) {
        self.insert_point = point;
    }

    /// Runs `f` with the insertion cursor set to `point`, restoring the
    /// previous cursor afterwards.
    pub fn with_insert_point<R>(
        &mut self,
        point: InsertPoint,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        let saved = self.insert_point.replace(point);
        let result = f(self);
        self.insert_point = saved;
        result
    }

    /// Inserts a `prim::Constant` holding `value` at the insertion cursor
    /// (end of the root block when no cursor is set) and returns its output.
    pub fn insert_constant(&mut self, value: ConstValue) -> Result<ValueId, IrError> {
        let point = self.insert_point.unwrap_or(InsertPoint::AtEnd(BlockId(0)));
        let ty = value.ty();
        let node = self.create_node(NodeKind::Constant);
        self.set_attr(node, ATTR_VALUE, value)?;
        let output = self.add_output(node, ty)?;
        self.insert(node, point)?;
        Ok(output)
    }

    // -----------------------------------------------------------------------
    // Naming
    // -----------------------------------------------------------------------

    /// Names `value`. If another live value already holds `name`, this value
    /// receives the first free `name.<k>` instead.
    pub fn set_value_name(&mut self, value: ValueId, name: impl Into<String>) -> Result<(), IrError> {
        let name = name.into();
        if self.get_value(value)?.name.as_deref() == Some(name.as_str()) {
            return Ok(());
        }
        self.release_name(value);
        self.assign_name(value, name);
        Ok(())
    }

    fn assign_name(&mut self, value: ValueId, name: String) {
        let unique = if self.names.contains_key(&name) {
            let mut k = 1usize;
            loop {
                let candidate = format!("{}.{}", name, k);
                if !self.names.contains_key(&candidate) {
                    break candidate;
                }
                k += 1;
            }
        } else {
            name
        };
        self.names.insert(unique.clone(), value);
        if let Some(Some(v)) = self.values.get_mut(value.0 as usize) {
            v.name = Some(unique);
        }
    }

    fn release_name(&mut self, value: ValueId) {
        let old = self
            .values
            .get_mut(value.0 as usize)
            .and_then(Option::as_mut)
            .and_then(|v| v.name.take());
        if let Some(old) = old {
            if self.names.get(&old) == Some(&value) {
                self.names.remove(&old);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Rewiring
    // -----------------------------------------------------------------------

    /// Redirects every use of `old` (node inputs and block outputs) to `new`.
    ///
    /// All slots are validated before any is rewritten, so a failure leaves
    /// the graph untouched.
    pub fn replace_all_uses_with(&mut self, old: ValueId, new: ValueId) -> Result<(), IrError> {
        if old == new {
            return Ok(());
        }
        self.get_value(new)?;
        for u in self.get_value(old)?.uses.clone() {
            let holds_old = match u.user {
                User::Node(n) => self.get_node(n)?.inputs.get(u.offset) == Some(&old),
                User::BlockOutput(b) => self.get_block(b)?.outputs.get(u.offset) == Some(&old),
            };
            if !holds_old {
                return Err(IrError::UseListMismatch {
                    value: old,
                    detail: format!("recorded use {:?} does not hold the value", u),
                });
            }
        }

        let uses = std::mem::take(&mut self.value_mut(old)?.uses);
        for u in &uses {
            match u.user {
                User::Node(n) => self.node_mut(n)?.inputs[u.offset] = new,
                User::BlockOutput(b) => self.block_mut(b)?.outputs[u.offset] = new,
            }
        }
        self.value_mut(new)?.uses.extend(uses);
        Ok(())
    }

    /// Rewrites input slot `offset` of `node` to `new`, leaving every other
    /// use of the previous value untouched. Returns the previous value.
    pub fn replace_input(
        &mut self,
        node: NodeId,
        offset: usize,
        new: ValueId,
    ) -> Result<ValueId, IrError> {
        self.get_value(new)?;
        let n = self.node_mut(node)?;
        let len = n.inputs.len();
        let slot = n
            .inputs
            .get_mut(offset)
            .ok_or(IrError::InputOutOfRange { node, offset, len })?;
        let old = std::mem::replace(slot, new);

        let target = Use::node(node, offset);
        let old_uses = &mut self.value_mut(old)?.uses;
        if let Some(pos) = old_uses.iter().position(|u| *u == target) {
            old_uses.remove(pos);
        }
        self.value_mut(new)?.uses.push(target);
        Ok(old)
    }

    /// Removes `node` from the graph.
    ///
    /// Fails if any output is still used. Nested blocks are destroyed with
    /// the node. The node's own input uses are unlinked.
    pub fn destroy_node(&mut self, node: NodeId) -> Result<(), IrError> {
        let n = self.get_node(node)?;
        for &out in &n.outputs {
            let uses = self.uses(out).len();
            if uses > 0 {
                return Err(IrError::ValueInUse {
                    node,
                    value: out,
                    uses,
                });
            }
        }
        let blocks = n.blocks.clone();
        for block in blocks.into_iter().rev() {
            self.destroy_block(block)?;
        }

        let n = self.get_node(node)?;
        let inputs = n.inputs.clone();
        let outputs = n.outputs.clone();
        let owner = n.owning_block;

        for (offset, input) in inputs.into_iter().enumerate() {
            let target = Use::node(node, offset);
            self.value_mut(input)?.uses.retain(|u| *u != target);
        }
        if let Some(block) = owner {
            self.block_mut(block)?.nodes.retain(|&x| x != node);
        }
        for out in outputs {
            self.release_name(out);
            self.values[out.0 as usize] = None;
        }
        self.nodes[node.0 as usize] = None;
        Ok(())
    }

    fn destroy_block(&mut self, block: BlockId) -> Result<(), IrError> {
        let outputs = std::mem::take(&mut self.block_mut(block)?.outputs);
        for (offset, value) in outputs.into_iter().enumerate() {
            let target = Use::block_output(block, offset);
            self.value_mut(value)?.uses.retain(|u| *u != target);
        }
        let nodes = self.get_block(block)?.nodes.clone();
        for node in nodes.into_iter().rev() {
            self.destroy_node(node)?;
        }
        let inputs = std::mem::take(&mut self.block_mut(block)?.inputs);
        for value in inputs {
            self.release_name(value);
            self.values[value.0 as usize] = None;
        }
        self.block_mut(block)?.dead = true;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Traversal
    // -----------------------------------------------------------------------

    /// Every block reachable from the root, each exactly once.
    ///
    /// Uses an explicit worklist, so nesting depth does not grow the stack.
    pub fn reachable_blocks(&self) -> Vec<BlockId> {
        let mut order = Vec::new();
        let mut worklist = vec![BlockId(0)];
        while let Some(b) = worklist.pop() {
            let Some(block) = self.block(b) else { continue };
            order.push(b);
            for &n in &block.nodes {
                if let Some(node) = self.node(n) {
                    worklist.extend(node.blocks.iter().rev().copied());
                }
            }
        }
        order
    }

    /// All nodes reachable from the root block.
    pub fn reachable_nodes(&self) -> Vec<NodeId> {
        self.reachable_blocks()
            .into_iter()
            .filter_map(|b| self.block(b))
            .flat_map(|b| b.nodes.iter().copied())
            .collect()
    }

    /// Reachable nodes of the given kind.
    pub fn nodes_of_kind(&self, kind: &NodeKind) -> Vec<NodeId> {
        self.reachable_nodes()
            .into_iter()
            .filter(|&n| self.node(n).map_or(false, |node| &node.kind == kind))
            .collect()
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}
