//! Quantization parameters and their association with graph values.
//!
//! `QParamTable` is the externally supplied table keyed by the name string an
//! observer recorded. `ValueParamBinding` is built during one
//! quantize/dequantize run by matching observer nodes against that table;
//! keying by `ValueId` rather than by name means later renames cannot
//! misattribute parameters.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::ir::{Graph, NodeId, NodeKind, ValueId};

/// Parameters of one quantize/dequantize pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantParams {
    /// Quantized element type label, e.g. `qint8` or `quint8`.
    pub dtype: String,
    pub scale: f32,
    pub zero_point: i32,
}

impl QuantParams {
    pub fn new(dtype: impl Into<String>, scale: f32, zero_point: i32) -> Self {
        Self {
            dtype: dtype.into(),
            scale,
            zero_point,
        }
    }

    fn validate(&self, key: &str) -> Result<(), ConfigError> {
        if self.dtype.is_empty() {
            return Err(ConfigError::InvalidQuantParams {
                key: key.to_owned(),
                detail: "dtype label is empty".into(),
            });
        }
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(ConfigError::InvalidQuantParams {
                key: key.to_owned(),
                detail: format!("scale must be finite and positive, got {}", self.scale),
            });
        }
        Ok(())
    }
}

/// Observed-name → parameters table supplied by the caller.
///
/// Serialized as a JSON object:
///
/// ```json
/// { "conv1.out": { "dtype": "quint8", "scale": 0.05, "zero_point": 128 } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QParamTable {
    entries: BTreeMap<String, QuantParams>,
}

impl QParamTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, params: QuantParams) -> Option<QuantParams> {
        self.entries.insert(key.into(), params)
    }

    pub fn get(&self, key: &str) -> Option<&QuantParams> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &QuantParams)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Parses and validates a JSON table.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let table: QParamTable = serde_json::from_str(json)?;
        table.validate()?;
        log::debug!("loaded {} quantization parameter entries", table.len());
        Ok(table)
    }

    /// Reads, parses and validates a JSON table from disk.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        log::debug!("reading quantization parameters from {:?}", path);
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Checks every entry: non-empty dtype, finite positive scale.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, params) in &self.entries {
            params.validate(key)?;
        }
        Ok(())
    }
}

impl<K: Into<String>> FromIterator<(K, QuantParams)> for QParamTable {
    fn from_iter<I: IntoIterator<Item = (K, QuantParams)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// An observer node recognised by `ValueParamBinding::match_observer`.
#[derive(Debug, Clone, PartialEq)]
pub struct ObserverMatch {
    pub observer: NodeId,
    /// The `prim::Constant` holding the recorded name.
    pub name_constant: NodeId,
    /// The value the observer watched (its first input).
    pub observed: ValueId,
    pub key: String,
}

/// Value → parameters association for a single pass run.
#[derive(Debug, Clone, Default)]
pub struct ValueParamBinding {
    bindings: HashMap<ValueId, QuantParams>,
}

impl ValueParamBinding {
    pub fn new() -> Self {
        Self::default()
    }

    /// If `node` is an observer whose recorded name is in `table`, binds the
    /// observed value to its parameters and returns the match.
    ///
    /// An observer is a `prim::PythonOp` with at least two inputs whose
    /// second input is a constant string. When a value is observed more than
    /// once the first binding is kept.
    pub fn match_observer(
        &mut self,
        graph: &Graph,
        node: NodeId,
        table: &QParamTable,
    ) -> Option<ObserverMatch> {
        let n = graph.node(node)?;
        if n.kind() != &NodeKind::PythonOp {
            return None;
        }
        let [observed, key_value, ..] = n.inputs() else {
            return None;
        };
        let key = graph.const_value(*key_value)?.as_str()?;
        let params = table.get(key)?;
        let name_constant = graph.producer(*key_value)?;

        self.bindings
            .entry(*observed)
            .or_insert_with(|| params.clone());
        Some(ObserverMatch {
            observer: node,
            name_constant,
            observed: *observed,
            key: key.to_owned(),
        })
    }

    pub fn get(&self, value: ValueId) -> Option<&QuantParams> {
        self.bindings.get(&value)
    }

    pub fn contains(&self, value: ValueId) -> bool {
        self.bindings.contains_key(&value)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ConstValue, IrType, ATTR_NAME};

    #[test]
    fn parses_json_table() {
        let table = QParamTable::from_json_str(
            r#"{ "V1": { "dtype": "qint8", "scale": 0.05, "zero_point": 128 } }"#,
        )
        .unwrap();
        assert_eq!(table.get("V1"), Some(&QuantParams::new("qint8", 0.05, 128)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn rejects_bad_scale() {
        let err = QParamTable::from_json_str(
            r#"{ "V1": { "dtype": "qint8", "scale": 0.0, "zero_point": 0 } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidQuantParams { ref key, .. } if key == "V1"));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            QParamTable::from_json_str("{ \"V1\": [1, 2] }"),
            Err(ConfigError::Json(_))
        ));
    }

    fn observer_graph(key: ConstValue) -> (Graph, NodeId, ValueId) {
        let mut g = Graph::new();
        let x = g.add_input(Some("x"), IrType::tensor());
        let name = g.insert_constant(key).unwrap();
        let root = g.root();
        let obs = g
            .append(root, NodeKind::PythonOp, &[x, name], vec![IrType::tensor()])
            .unwrap();
        g.set_attr(obs, ATTR_NAME, ConstValue::Str("observe".into()))
            .unwrap();
        (g, obs, x)
    }

    #[test]
    fn binds_matching_observer() {
        let (g, obs, x) = observer_graph(ConstValue::Str("x".into()));
        let table: QParamTable = [("x", QuantParams::new("quint8", 0.1, 3))]
            .into_iter()
            .collect();
        let mut binding = ValueParamBinding::new();
        let m = binding.match_observer(&g, obs, &table).unwrap();
        assert_eq!(m.observed, x);
        assert_eq!(m.key, "x");
        assert_eq!(binding.get(x), Some(&QuantParams::new("quint8", 0.1, 3)));
    }

    #[test]
    fn ignores_unknown_key_and_non_string_name() {
        let table: QParamTable = [("x", QuantParams::new("quint8", 0.1, 3))]
            .into_iter()
            .collect();

        let (g, obs, _) = observer_graph(ConstValue::Str("other".into()));
        let mut binding = ValueParamBinding::new();
        assert!(binding.match_observer(&g, obs, &table).is_none());

        let (g, obs, _) = observer_graph(ConstValue::Int(1));
        assert!(binding.match_observer(&g, obs, &table).is_none());
        assert!(binding.is_empty());
    }
}
