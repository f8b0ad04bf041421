/// Element type of a tensor value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    F16,
    F32,
    F64,
    I8,
    U8,
    I32,
    I64,
    /// Signed 8-bit quantized.
    QInt8,
    /// Unsigned 8-bit quantized.
    QUInt8,
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DType::F16 => "f16",
            DType::F32 => "f32",
            DType::F64 => "f64",
            DType::I8 => "i8",
            DType::U8 => "u8",
            DType::I32 => "i32",
            DType::I64 => "i64",
            DType::QInt8 => "qint8",
            DType::QUInt8 => "quint8",
        };
        f.write_str(s)
    }
}

/// Static type of a value.
///
/// The quantization passes only ask one question of a type: is it a tensor.
/// Everything else exists so graphs can carry the scalar constants, loop
/// counters and branch conditions real models have.
#[derive(Debug, Clone, PartialEq)]
pub enum IrType {
    /// A tensor, optionally with a known element type.
    Tensor { dtype: Option<DType> },
    Int,
    Float,
    Bool,
    Str,
    NoneType,
    Tuple(Vec<IrType>),
    List(Box<IrType>),
}

impl IrType {
    /// A tensor with unknown element type.
    pub fn tensor() -> Self {
        IrType::Tensor { dtype: None }
    }

    pub fn tensor_of(dtype: DType) -> Self {
        IrType::Tensor { dtype: Some(dtype) }
    }

    /// True for every tensor type, whatever its element type.
    pub fn is_tensor(&self) -> bool {
        matches!(self, IrType::Tensor { .. })
    }
}

impl std::fmt::Display for IrType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IrType::Tensor { dtype: None } => f.write_str("Tensor"),
            IrType::Tensor { dtype: Some(d) } => write!(f, "Tensor<{}>", d),
            IrType::Int => f.write_str("int"),
            IrType::Float => f.write_str("float"),
            IrType::Bool => f.write_str("bool"),
            IrType::Str => f.write_str("str"),
            IrType::NoneType => f.write_str("None"),
            IrType::Tuple(elems) => {
                f.write_str("(")?;
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", e)?;
                }
                f.write_str(")")
            }
            IrType::List(inner) => write!(f, "{}[]", inner),
        }
    }
}
