//! qgraph: quantization preparation passes over a typed graph IR.
//!
//! Pipeline:
//!
//! ```text
//! Method → InsertObserversPass → [instrumented graph] → (run externally,
//!   derive scale/zero-point per observed name) → QParamTable
//! Method + QParamTable → InsertQuantDequantPass → [quantize/dequantize graph]
//! ```
//!
//! The passes share no in-memory state; they communicate only through the
//! graph contents and the parameter table.

pub mod error;
pub mod ir;
pub mod pass;
pub mod quant;

pub use error::{ConfigError, Error, IrError, PassError};
pub use ir::{Graph, Method};
pub use pass::{Pass, PassManager};
pub use quant::{
    insert_observers, insert_quant_dequant, ObserverTemplate, ObserverTemplates, QParamTable,
    QuantParams,
};
