//! Quantization preparation passes.
//!
//! `observer` instruments a method with statistics-recording calls;
//! `quant_dequant` later consumes those calls together with externally
//! computed parameters and inserts explicit quantize/dequantize pairs.

pub mod eligibility;
pub mod helpers;
pub mod observer;
pub mod qparams;
pub mod quant_dequant;

pub use eligibility::{is_quantizable, is_quantizable_kind, QUANTIZABLE_OPS};
pub use observer::{
    insert_observers, InsertObserversPass, ObserverRole, ObserverTemplate, ObserverTemplates,
    ACTIVATION_ROLE, PARAM_ROLE,
};
pub use qparams::{ObserverMatch, QParamTable, QuantParams, ValueParamBinding};
pub use quant_dequant::{insert_quant_dequant, InsertQuantDequantPass, InsertionRecord, WrapSide};
