use std::collections::BTreeMap;

use crate::ir::block::BlockId;
use crate::ir::types::IrType;
use crate::ir::value::ValueId;

/// Attribute key holding the literal of a `prim::Constant` node.
pub const ATTR_VALUE: &str = "value";
/// Attribute key holding the callee name of a `prim::PythonOp` node.
pub const ATTR_NAME: &str = "name";

/// An opaque index identifying a node within a `Graph`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Operator identity of a node.
///
/// A closed set of the operators the passes reason about, plus `Other` for
/// everything else a model may contain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Compile-time literal; the value lives in the `value` attribute.
    Constant,
    /// Call into embedded foreign code. Observers are calls of this kind.
    PythonOp,
    If,
    Loop,
    Conv2d,
    /// The generic convolution primitive that `conv1d/2d/3d` lower to.
    Convolution,
    Relu,
    Linear,
    Add,
    MaxPool2d,
    Flatten,
    QuantizeLinear,
    Dequantize,
    Other(String),
}

impl NodeKind {
    /// Namespace-qualified operator name, e.g. `aten::conv2d`.
    pub fn qualified_name(&self) -> &str {
        match self {
            NodeKind::Constant => "prim::Constant",
            NodeKind::PythonOp => "prim::PythonOp",
            NodeKind::If => "prim::If",
            NodeKind::Loop => "prim::Loop",
            NodeKind::Conv2d => "aten::conv2d",
            NodeKind::Convolution => "aten::_convolution",
            NodeKind::Relu => "aten::relu",
            NodeKind::Linear => "aten::linear",
            NodeKind::Add => "aten::add",
            NodeKind::MaxPool2d => "aten::max_pool2d",
            NodeKind::Flatten => "aten::flatten",
            NodeKind::QuantizeLinear => "aten::quantize_linear",
            NodeKind::Dequantize => "aten::dequantize",
            NodeKind::Other(name) => name,
        }
    }

    /// Parses a qualified name. Unknown names become `Other`.
    pub fn from_qualified_name(name: &str) -> Self {
        match name {
            "prim::Constant" => NodeKind::Constant,
            "prim::PythonOp" => NodeKind::PythonOp,
            "prim::If" => NodeKind::If,
            "prim::Loop" => NodeKind::Loop,
            "aten::conv2d" => NodeKind::Conv2d,
            "aten::_convolution" => NodeKind::Convolution,
            "aten::relu" => NodeKind::Relu,
            "aten::linear" => NodeKind::Linear,
            "aten::add" => NodeKind::Add,
            "aten::max_pool2d" => NodeKind::MaxPool2d,
            "aten::flatten" => NodeKind::Flatten,
            "aten::quantize_linear" => NodeKind::QuantizeLinear,
            "aten::dequantize" => NodeKind::Dequantize,
            other => NodeKind::Other(other.to_owned()),
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.qualified_name())
    }
}

/// A literal carried by a constant node or an attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    None,
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl ConstValue {
    /// The type a constant node producing this literal outputs.
    pub fn ty(&self) -> IrType {
        match self {
            ConstValue::None => IrType::NoneType,
            ConstValue::Int(_) => IrType::Int,
            ConstValue::Float(_) => IrType::Float,
            ConstValue::Bool(_) => IrType::Bool,
            ConstValue::Str(_) => IrType::Str,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConstValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ConstValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ConstValue::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConstValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConstValue::None => f.write_str("None"),
            ConstValue::Int(n) => write!(f, "{}", n),
            // Widened f32 scales print as written, e.g. `0.1`.
            ConstValue::Float(v) if f64::from(*v as f32) == *v => write!(f, "{:?}", *v as f32),
            ConstValue::Float(v) => write!(f, "{:?}", v),
            ConstValue::Bool(b) => write!(f, "{}", b),
            ConstValue::Str(s) => write!(f, "{:?}", s),
        }
    }
}

/// Debug scope of a node: the module path it was traced from, e.g.
/// `features/conv1`. The root scope is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Scope(String);

impl Scope {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Returns the child scope `self/name`.
    pub fn push(&self, name: &str) -> Self {
        if self.0.is_empty() {
            Self(name.to_owned())
        } else {
            Self(format!("{}/{}", self.0, name))
        }
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An operator node.
///
/// A node is created detached (`owning_block == None`) and becomes part of
/// the program once inserted into a block.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) inputs: Vec<ValueId>,
    pub(crate) outputs: Vec<ValueId>,
    /// Nested blocks (branch arms, loop bodies) in order.
    pub(crate) blocks: Vec<BlockId>,
    pub(crate) attrs: BTreeMap<String, ConstValue>,
    pub(crate) scope: Scope,
    pub(crate) owning_block: Option<BlockId>,
}

impl Node {
    pub(crate) fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            inputs: Vec::new(),
            outputs: Vec::new(),
            blocks: Vec::new(),
            attrs: BTreeMap::new(),
            scope: Scope::root(),
            owning_block: None,
        }
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn inputs(&self) -> &[ValueId] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[ValueId] {
        &self.outputs
    }

    /// The single output of a one-output node.
    pub fn output(&self) -> Option<ValueId> {
        match self.outputs.as_slice() {
            [v] => Some(*v),
            _ => None,
        }
    }

    pub fn blocks(&self) -> &[BlockId] {
        &self.blocks
    }

    pub fn attr(&self, key: &str) -> Option<&ConstValue> {
        self.attrs.get(key)
    }

    pub fn attrs(&self) -> &BTreeMap<String, ConstValue> {
        &self.attrs
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn owning_block(&self) -> Option<BlockId> {
        self.owning_block
    }

    pub fn is_inserted(&self) -> bool {
        self.owning_block.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualified_names_round_trip() {
        for kind in [
            NodeKind::Constant,
            NodeKind::PythonOp,
            NodeKind::Conv2d,
            NodeKind::Convolution,
            NodeKind::Relu,
            NodeKind::QuantizeLinear,
            NodeKind::Dequantize,
        ] {
            assert_eq!(NodeKind::from_qualified_name(kind.qualified_name()), kind);
        }
        assert_eq!(
            NodeKind::from_qualified_name("aten::sigmoid"),
            NodeKind::Other("aten::sigmoid".into())
        );
    }

    #[test]
    fn scope_push_builds_paths() {
        let s = Scope::root().push("features").push("conv1");
        assert_eq!(s.as_str(), "features/conv1");
        assert!(!s.is_root());
        assert!(Scope::root().is_root());
    }

    #[test]
    fn const_value_types() {
        assert_eq!(ConstValue::Str("x".into()).ty(), IrType::Str);
        assert_eq!(ConstValue::Float(0.5).ty(), IrType::Float);
        assert_eq!(ConstValue::Int(3).as_int(), Some(3));
        assert_eq!(ConstValue::Int(3).as_str(), None);
    }

    #[test]
    fn float_constants_print_at_narrowest_exact_precision() {
        assert_eq!(ConstValue::Float(f64::from(0.1f32)).to_string(), "0.1");
        assert_eq!(ConstValue::Float(0.5).to_string(), "0.5");
        assert_eq!(ConstValue::Float(1.0).to_string(), "1.0");
        assert_eq!(ConstValue::Float(0.1).to_string(), "0.1");
        assert_eq!(ConstValue::Float(1e300).to_string(), "1e300");
    }
}
