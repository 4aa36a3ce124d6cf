//! # Values and Namespaces
//!
//! A [`Namespace`] is the explicit evaluation context of a calculation: the
//! parameter values, intermediate quantities and derived results that checks
//! and records can refer to by name. It replaces any notion of an ambient
//! interpreter namespace; whoever runs a calculation owns its namespace and
//! passes it down.
//!
//! ```rust
//! use check_core::namespace::{Namespace, Value};
//!
//! let mut ns = Namespace::new();
//! ns.set("edge_distance", 30.0);
//! ns.set("hole_type", "punched");
//!
//! assert_eq!(ns.get("edge_distance"), Some(&Value::Number(30.0)));
//! assert!(ns.require("pitch").is_err());
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{CalcError, CalcResult};
use crate::format::format_value;
use crate::units::Quantity;

/// A dynamically typed value held in a namespace or a record context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Number(f64),
    Quantity(Quantity),
    Text(String),
}

impl Value {
    /// Short type name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Quantity(_) => "quantity",
            Value::Text(_) => "text",
        }
    }

    /// Numeric magnitude in the value's own unit, if the value is numeric
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Quantity(q) => Some(q.magnitude),
            _ => None,
        }
    }

    /// Magnitude used when comparing values of possibly different units.
    ///
    /// Plain numbers compare as-is; quantities compare in SI base units.
    pub fn comparable(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Quantity(q) => Some(q.base_magnitude()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_quantity(&self) -> Option<Quantity> {
        match self {
            Value::Quantity(q) => Some(*q),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Number(_) | Value::Quantity(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_value(self, 4))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Number(f64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Number(f64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Quantity> for Value {
    fn from(v: Quantity) -> Self {
        Value::Quantity(v)
    }
}

/// Anything names can be resolved against.
pub trait Scope {
    fn lookup(&self, name: &str) -> Option<&Value>;
}

/// Name to value mapping used as the evaluation context of a calculation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Namespace {
    values: BTreeMap<String, Value>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Look up a name, failing with `UnknownName` if it is not bound
    pub fn require(&self, name: &str) -> CalcResult<&Value> {
        self.values
            .get(name)
            .ok_or_else(|| CalcError::unknown_name(name))
    }

    /// Look up a numeric value (plain number or quantity magnitude)
    pub fn number(&self, name: &str) -> CalcResult<f64> {
        let value = self.require(name)?;
        value.as_number().ok_or_else(|| {
            CalcError::invalid_input(name, value.to_string(), "Expected a numeric value")
        })
    }

    /// Bind a name, returning the previous value if there was one
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(name.into(), value.into())
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate bindings in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Names in name order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Keep only the bindings for which `keep` returns true
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &Value) -> bool) {
        self.values.retain(|k, v| keep(k, v));
    }
}

impl Scope for Namespace {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Namespace {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut ns = Namespace::new();
        for (k, v) in iter {
            ns.set(k, v);
        }
        ns
    }
}

impl<K: Into<String>, V: Into<Value>> Extend<(K, V)> for Namespace {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.set(k, v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::Unit;

    #[test]
    fn test_set_and_replace() {
        let mut ns = Namespace::new();
        assert_eq!(ns.set("d", 20.0), None);
        assert_eq!(ns.set("d", 22.0), Some(Value::Number(20.0)));
        assert_eq!(ns.number("d").unwrap(), 22.0);
        assert_eq!(ns.len(), 1);
    }

    #[test]
    fn test_require_unknown() {
        let ns = Namespace::new();
        let err = ns.require("pitch").unwrap_err();
        assert_eq!(err, CalcError::unknown_name("pitch"));
    }

    #[test]
    fn test_number_rejects_text() {
        let ns: Namespace = [("bolt_size", "M20")].into_iter().collect();
        assert_eq!(ns.number("bolt_size").unwrap_err().error_code(), "INVALID_INPUT");
    }

    #[test]
    fn test_comparable_uses_base_units() {
        let a = Value::Quantity(Quantity::new(1.0, Unit::Kilonewton));
        let b = Value::Quantity(Quantity::new(1000.0, Unit::Newton));
        assert_eq!(a.comparable(), b.comparable());
        assert_eq!(a.as_number(), Some(1.0));
    }

    #[test]
    fn test_untagged_deserialization() {
        let values: Vec<Value> =
            serde_json::from_str(r#"[true, 345, "M20", {"magnitude": 2.5, "unit": "kN"}]"#).unwrap();
        assert_eq!(values[0], Value::Bool(true));
        assert_eq!(values[1], Value::Number(345.0));
        assert_eq!(values[2], Value::Text("M20".to_string()));
        assert_eq!(values[3], Value::Quantity(Quantity::new(2.5, Unit::Kilonewton)));
    }
}
