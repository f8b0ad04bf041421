use thiserror::Error;

use crate::ir::{BlockId, NodeId, ValueId};

/// Top-level error type for the quantization pass pipeline.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{}", format_error_pretty("ir error", &format!("{}", _0)))]
    Ir(#[from] IrError),

    #[error("{}", format_error_pretty("pass error", &format!("{}", _0)))]
    Pass(#[from] PassError),

    #[error("{}", format_error_pretty("config error", &format!("{}", _0)))]
    Config(#[from] ConfigError),
}

/// Formats an error with its category prefix.
fn format_error_pretty(category: &str, msg: &str) -> String {
    format!("[{}] {}", category, msg)
}

// ---------------------------------------------------------------------------
// IR errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum IrError {
    #[error("node {node} does not exist or has been destroyed")]
    UnknownNode { node: NodeId },

    #[error("value {value} does not exist or has been destroyed")]
    UnknownValue { value: ValueId },

    #[error("block {block} does not exist")]
    UnknownBlock { block: BlockId },

    #[error("node {node} is not part of any block; insert it before using it as an anchor")]
    NodeNotInserted { node: NodeId },

    #[error("node {node} is already placed in block {block}")]
    NodeAlreadyInserted { node: NodeId, block: BlockId },

    #[error("cannot destroy node {node}: its output {value} still has {uses} use(s)")]
    ValueInUse {
        node: NodeId,
        value: ValueId,
        uses: usize,
    },

    #[error("node {node} has {len} input(s), slot {offset} is out of range")]
    InputOutOfRange {
        node: NodeId,
        offset: usize,
        len: usize,
    },

    #[error("node {node} input slot {offset} holds {found}, expected {expected}")]
    InputMismatch {
        node: NodeId,
        offset: usize,
        expected: ValueId,
        found: ValueId,
    },

    #[error("value {value} has no producing node")]
    NoProducer { value: ValueId },

    #[error("value {value} is used by node {node} before it is defined")]
    UseBeforeDef { value: ValueId, node: NodeId },

    #[error("use list of value {value} is inconsistent: {detail}")]
    UseListMismatch { value: ValueId, detail: String },

    #[error("node {node} is listed in block {block} but records a different owner")]
    WrongOwningBlock { node: NodeId, block: BlockId },
}

// ---------------------------------------------------------------------------
// Pass errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PassError {
    #[error("observer template for role '{role}' is malformed: {detail}")]
    MalformedTemplate { role: String, detail: String },

    #[error("method binds {params} parameter(s) but its graph only has {inputs} input(s)")]
    ParamCountExceedsInputs { params: usize, inputs: usize },

    #[error("quantization parameters for '{key}' are invalid: {detail}")]
    InvalidQuantParams { key: String, detail: String },

    #[error("{0}")]
    Ir(#[from] IrError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error while reading quantization parameters: {0}")]
    Io(#[from] std::io::Error),

    #[error("quantization parameter table is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("quantization parameters for '{key}' are invalid: {detail}")]
    InvalidQuantParams { key: String, detail: String },
}

impl Error {
    /// Returns a stable diagnostic code for this error.
    pub fn diagnostic_code(&self) -> &'static str {
        match self {
            Error::Ir(e) => e.diagnostic_code(),
            Error::Pass(p) => match p {
                PassError::MalformedTemplate { .. } => "Q0200",
                PassError::ParamCountExceedsInputs { .. } => "Q0201",
                PassError::InvalidQuantParams { .. } => "Q0202",
                PassError::Ir(e) => e.diagnostic_code(),
            },
            Error::Config(c) => match c {
                ConfigError::Io(_) => "Q0300",
                ConfigError::Json(_) => "Q0301",
                ConfigError::InvalidQuantParams { .. } => "Q0302",
            },
        }
    }
}

impl IrError {
    fn diagnostic_code(&self) -> &'static str {
        match self {
            IrError::UnknownNode { .. } => "Q0100",
            IrError::UnknownValue { .. } => "Q0101",
            IrError::UnknownBlock { .. } => "Q0102",
            IrError::NodeNotInserted { .. } => "Q0103",
            IrError::NodeAlreadyInserted { .. } => "Q0104",
            IrError::ValueInUse { .. } => "Q0105",
            IrError::InputOutOfRange { .. } => "Q0106",
            IrError::InputMismatch { .. } => "Q0107",
            IrError::NoProducer { .. } => "Q0108",
            IrError::UseBeforeDef { .. } => "Q0109",
            IrError::UseListMismatch { .. } => "Q0110",
            IrError::WrongOwningBlock { .. } => "Q0111",
        }
    }
}
