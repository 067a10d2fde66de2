//! Box-bounded search space with an explicit index -> hyperparameter table.
//!
//! Each dimension of a particle position is tied to a named hyperparameter
//! and a decode rule, so the positional convention lives in configuration
//! instead of inside the fitness function.

use serde::{Deserialize, Serialize, Serializer};

use crate::error::{Result, TunerError};

/// How a continuous coordinate becomes a hyperparameter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Decode {
    /// Integer part, toward zero (tree depth in the reference space).
    Truncate,
    /// Nearest integer.
    Round,
    #[default]
    Identity,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue { Int(i64), Float(f64) }

impl ParamValue {
    pub fn as_f64(&self) -> f64 { match *self { ParamValue::Int(v) => v as f64, ParamValue::Float(v) => v } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub low: f64,
    pub high: f64,
    #[serde(default)]
    pub decode: Decode,
}

impl ParamSpec {
    pub fn new(name: &str, low: f64, high: f64, decode: Decode) -> Self { Self { name: name.to_string(), low, high, decode } }

    fn decode_value(&self, x: f64) -> ParamValue {
        match self.decode {
            Decode::Truncate => ParamValue::Int(x.trunc() as i64),
            Decode::Round => ParamValue::Int(x.round() as i64),
            Decode::Identity => ParamValue::Float(x),
        }
    }
}

/// Ordered hyperparameter specs; the order defines the position layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchSpace { params: Vec<ParamSpec> }

impl SearchSpace {
    pub fn new(params: Vec<ParamSpec>) -> Result<Self> {
        if params.is_empty() { return Err(TunerError::InvalidConfig("search space has no parameters".into())); }
        for (i, p) in params.iter().enumerate() {
            validate_bound(i, p.low, p.high)?;
            if params[..i].iter().any(|q| q.name == p.name) {
                return Err(TunerError::InvalidConfig(format!("duplicate parameter name '{}'", p.name)));
            }
        }
        Ok(Self { params })
    }

    /// The six-parameter space used to tune the boosted account classifier.
    pub fn boosting_default() -> Self {
        Self { params: vec![
            ParamSpec::new("max_depth", 3.0, 10.0, Decode::Truncate),
            ParamSpec::new("learning_rate", 0.01, 0.1, Decode::Identity),
            ParamSpec::new("subsample", 0.6, 1.0, Decode::Identity),
            ParamSpec::new("colsample_bytree", 0.6, 1.0, Decode::Identity),
            ParamSpec::new("reg_lambda", 0.5, 3.0, Decode::Identity),
            ParamSpec::new("reg_alpha", 0.0, 1.0, Decode::Identity),
        ] }
    }

    pub fn dim(&self) -> usize { self.params.len() }
    pub fn params(&self) -> &[ParamSpec] { &self.params }
    pub fn names(&self) -> impl Iterator<Item = &str> { self.params.iter().map(|p| p.name.as_str()) }
    pub fn bounds(&self) -> Vec<(f64, f64)> { self.params.iter().map(|p| (p.low, p.high)).collect() }

    pub fn decode(&self, position: &[f64]) -> Result<DecodedParams> {
        if position.len() != self.dim() {
            return Err(TunerError::DimensionMismatch { expected: self.dim(), actual: position.len() });
        }
        let values = self.params.iter().zip(position).map(|(p, &x)| (p.name.clone(), p.decode_value(x))).collect();
        Ok(DecodedParams { values })
    }
}

impl Default for SearchSpace { fn default() -> Self { Self::boosting_default() } }

/// Rejects inverted or non-finite bounds, and boxes whose width overflows f64.
/// `low == high` is a collapsed dimension and allowed.
pub fn validate_bound(dim: usize, low: f64, high: f64) -> Result<()> {
    if !low.is_finite() || !high.is_finite() || low > high || !(high - low).is_finite() {
        return Err(TunerError::InvalidBounds { dim, low, high });
    }
    Ok(())
}

/// Decoded values in search-space order; serializes as an ordered map.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedParams { values: Vec<(String, ParamValue)> }

impl Serialize for DecodedParams {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.values.iter().map(|(k, v)| (k, v)))
    }
}

impl DecodedParams {
    pub fn get(&self, name: &str) -> Option<ParamValue> { self.values.iter().find(|(n, _)| n == name).map(|(_, v)| *v) }
    pub fn iter(&self) -> impl Iterator<Item = (&str, ParamValue)> { self.values.iter().map(|(n, v)| (n.as_str(), *v)) }
    pub fn len(&self) -> usize { self.values.len() }
    pub fn is_empty(&self) -> bool { self.values.is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_reference_layout() {
        let space = SearchSpace::boosting_default();
        let decoded = space.decode(&[7.9, 0.05, 0.8, 0.7, 1.2, 0.3]).unwrap();
        assert_eq!(decoded.get("max_depth"), Some(ParamValue::Int(7)));
        assert_eq!(decoded.get("learning_rate"), Some(ParamValue::Float(0.05)));
        assert_eq!(decoded.len(), 6);
        let names: Vec<&str> = decoded.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["max_depth", "learning_rate", "subsample", "colsample_bytree", "reg_lambda", "reg_alpha"]);
    }

    #[test]
    fn round_and_truncate_differ() {
        let space = SearchSpace::new(vec![
            ParamSpec::new("a", 0.0, 10.0, Decode::Truncate),
            ParamSpec::new("b", 0.0, 10.0, Decode::Round),
        ]).unwrap();
        let d = space.decode(&[4.6, 4.6]).unwrap();
        assert_eq!(d.get("a"), Some(ParamValue::Int(4)));
        assert_eq!(d.get("b"), Some(ParamValue::Int(5)));
    }

    #[test]
    fn rejects_bad_specs() {
        assert!(matches!(SearchSpace::new(vec![]), Err(TunerError::InvalidConfig(_))));
        assert!(matches!(SearchSpace::new(vec![ParamSpec::new("a", 2.0, 1.0, Decode::Identity)]), Err(TunerError::InvalidBounds { dim: 0, .. })));
        let dup = vec![ParamSpec::new("a", 0.0, 1.0, Decode::Identity), ParamSpec::new("a", 0.0, 1.0, Decode::Identity)];
        assert!(matches!(SearchSpace::new(dup), Err(TunerError::InvalidConfig(_))));
        assert!(SearchSpace::new(vec![ParamSpec::new("flat", 1.0, 1.0, Decode::Identity)]).is_ok());
        let huge = vec![ParamSpec::new("huge", -1e308, 1e308, Decode::Identity)];
        assert!(matches!(SearchSpace::new(huge), Err(TunerError::InvalidBounds { dim: 0, .. })));
    }

    #[test]
    fn decode_checks_length() {
        let space = SearchSpace::boosting_default();
        assert!(matches!(space.decode(&[1.0]), Err(TunerError::DimensionMismatch { expected: 6, actual: 1 })));
    }

    #[test]
    fn deserializes_from_yaml_list() {
        let yaml = "- { name: max_depth, low: 3, high: 10, decode: truncate }\n- { name: learning_rate, low: 0.01, high: 0.1 }\n";
        let space: SearchSpace = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(space.dim(), 2);
        assert_eq!(space.params()[1].decode, Decode::Identity);
    }
}
