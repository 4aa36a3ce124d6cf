//! # Parameter Model
//!
//! Named, typed inputs to a calculation. Each [`Parameter`] has a [`Domain`]
//! that every value it takes must belong to, a default, and an order index
//! assigned when it is declared. A [`ParameterSet`] keeps parameters in
//! declaration order; that order is used for display and for injection into
//! the calculation namespace.
//!
//! ```rust
//! use check_core::parameters::{Domain, ParameterSet};
//! use check_core::namespace::Value;
//!
//! let mut params = ParameterSet::new();
//! params.declare("d", Domain::values([16.0, 20.0, 22.0, 24.0]), 20.0)?;
//! params.declare("Fy", Domain::range(300.0, 450.0, 5.0), 350.0)?;
//!
//! params.override_value("Fy", 400.0)?;
//! assert!(params.override_value("d", 21.0).is_err());
//!
//! let values = params.current_values();
//! assert_eq!(values[1], ("Fy".to_string(), Value::Number(400.0)));
//! # Ok::<(), check_core::errors::CalcError>(())
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{CalcError, CalcResult};
use crate::format::format_value;
use crate::namespace::{Namespace, Value};
use crate::units::{Quantity, Unit};

/// Relative tolerance for numeric domain membership
const DOMAIN_TOLERANCE: f64 = 1e-9;

/// Significant figures used when listing parameter values
const PARAM_SIGFIGS: u32 = 6;

// ============================================================================
// Domain
// ============================================================================

/// The set of values a parameter may take
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Domain {
    /// Numbers from `min` to `max` inclusive, on a grid of `step` starting at `min`
    Range { min: f64, max: f64, step: f64 },
    /// One of a list of discrete values
    Values { values: Vec<Value> },
    /// One of a list of named options; the name may be used in place of the value
    Options { options: Vec<(String, Value)> },
    /// `true` or `false`
    Boolean,
    /// A single constant
    Fixed { value: Value },
}

impl Domain {
    pub fn range(min: f64, max: f64, step: f64) -> Self {
        Domain::Range { min, max, step }
    }

    pub fn values<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        Domain::Values {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn options<K: Into<String>, V: Into<Value>>(options: impl IntoIterator<Item = (K, V)>) -> Self {
        Domain::Options {
            options: options.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    pub fn fixed(value: impl Into<Value>) -> Self {
        Domain::Fixed { value: value.into() }
    }

    /// Human readable description, used in domain errors
    pub fn describe(&self) -> String {
        match self {
            Domain::Range { min, max, step } => format!("range [{min}, {max}] step {step}"),
            Domain::Values { values } => format!(
                "one of [{}]",
                join(values.iter().map(|v| format_value(v, PARAM_SIGFIGS)))
            ),
            Domain::Options { options } => format!(
                "one of options [{}]",
                join(options.iter().map(|(k, v)| format!("{k}={}", format_value(v, PARAM_SIGFIGS))))
            ),
            Domain::Boolean => "true or false".to_string(),
            Domain::Fixed { value } => format!("fixed value {}", format_value(value, PARAM_SIGFIGS)),
        }
    }

    /// Reject domains that no value could satisfy
    fn validate(&self, name: &str) -> CalcResult<()> {
        let bad = |reason: &str| Err(CalcError::invalid_input(name, self.describe(), reason));
        match self {
            Domain::Range { min, max, step } => {
                if !(min.is_finite() && max.is_finite() && step.is_finite()) {
                    return bad("Range bounds must be finite");
                }
                if min > max {
                    return bad("Range minimum exceeds maximum");
                }
                if *step <= 0.0 {
                    return bad("Range step must be positive");
                }
            }
            Domain::Values { values } if values.is_empty() => return bad("Value list is empty"),
            Domain::Options { options } => {
                if options.is_empty() {
                    return bad("Option list is empty");
                }
                for (i, (key, _)) in options.iter().enumerate() {
                    if options[..i].iter().any(|(k, _)| k == key) {
                        return bad("Option names must be unique");
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// If `value` belongs to the domain, return the value to store.
    ///
    /// For option domains, text naming an option maps to that option's value.
    pub fn accept(&self, value: &Value) -> Option<Value> {
        match self {
            Domain::Range { min, max, step } => {
                let Value::Number(n) = value else {
                    return None;
                };
                let tol = DOMAIN_TOLERANCE * min.abs().max(max.abs()).max(1.0);
                if !n.is_finite() || *n < min - tol || *n > max + tol {
                    return None;
                }
                let k = (n - min) / step;
                if (k - k.round()).abs() <= DOMAIN_TOLERANCE * k.abs().max(1.0) {
                    Some(value.clone())
                } else {
                    None
                }
            }
            Domain::Values { values } => values.iter().find(|v| values_equal(v, value)).cloned(),
            Domain::Options { options } => {
                if let Value::Text(name) = value {
                    if let Some((_, v)) = options.iter().find(|(k, _)| k == name) {
                        return Some(v.clone());
                    }
                }
                options
                    .iter()
                    .find(|(_, v)| values_equal(v, value))
                    .map(|(_, v)| v.clone())
            }
            Domain::Boolean => value.as_bool().map(Value::Bool),
            Domain::Fixed { value: fixed } => values_equal(fixed, value).then(|| fixed.clone()),
        }
    }

    pub fn contains(&self, value: &Value) -> bool {
        self.accept(value).is_some()
    }
}

fn join(items: impl Iterator<Item = String>) -> String {
    items.collect::<Vec<_>>().join(", ")
}

fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= DOMAIN_TOLERANCE * a.abs().max(b.abs()).max(1.0)
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => approx_eq(*x, *y),
        (Value::Quantity(x), Value::Quantity(y)) => {
            x.unit.dimension() == y.unit.dimension() && approx_eq(x.base_magnitude(), y.base_magnitude())
        }
        _ => a == b,
    }
}

/// Interpret operator text as a value: boolean, number, `"<number> <unit>"`,
/// or else text (surrounding quotes removed).
pub fn parse_literal(text: &str) -> Value {
    let text = text.trim();
    match text {
        "true" | "True" => return Value::Bool(true),
        "false" | "False" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(n) = text.parse::<f64>() {
        return Value::Number(n);
    }
    if let Some((mag, unit)) = text.split_once(char::is_whitespace) {
        if let (Ok(mag), Ok(unit)) = (mag.parse::<f64>(), unit.parse::<Unit>()) {
            return Value::Quantity(Quantity::new(mag, unit));
        }
    }
    let unquoted = text
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| text.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
        .unwrap_or(text);
    Value::Text(unquoted.to_string())
}

// ============================================================================
// Parameter
// ============================================================================

/// A declared input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub domain: Domain,
    pub default: Value,
    /// Position in declaration order, starting at 0
    pub order: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "override")]
    pub override_value: Option<Value>,
}

impl Parameter {
    /// Override if set, default otherwise
    pub fn current(&self) -> &Value {
        self.override_value.as_ref().unwrap_or(&self.default)
    }

    pub fn describe(&mut self, description: impl Into<String>) -> &mut Self {
        self.description = Some(description.into());
        self
    }
}

// ============================================================================
// Parameter Set
// ============================================================================

/// Parameters of one calculation, in declaration order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    params: Vec<Parameter>,
    next_order: usize,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a parameter.
    ///
    /// Fails with `InvalidInput` for a duplicate name or a malformed domain,
    /// and with `DomainError` if the default is outside the domain.
    pub fn declare(
        &mut self,
        name: impl Into<String>,
        domain: Domain,
        default: impl Into<Value>,
    ) -> CalcResult<&mut Parameter> {
        let name = name.into();
        if self.get(&name).is_some() {
            return Err(CalcError::invalid_input(
                name,
                "",
                "Parameter is already declared",
            ));
        }
        domain.validate(&name)?;

        let default = default.into();
        let Some(default) = domain.accept(&default) else {
            return Err(CalcError::domain_error(
                name,
                format_value(&default, PARAM_SIGFIGS),
                domain.describe(),
            ));
        };

        let order = self.next_order;
        self.next_order += 1;
        self.params.push(Parameter {
            name,
            domain,
            default,
            order,
            description: None,
            override_value: None,
        });
        let index = self.params.len() - 1;
        Ok(&mut self.params[index])
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }

    fn get_mut(&mut self, name: &str) -> CalcResult<&mut Parameter> {
        self.params
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| CalcError::unknown_name(name))
    }

    /// Set an operator value for a parameter; it must lie within the domain
    pub fn override_value(&mut self, name: &str, value: impl Into<Value>) -> CalcResult<()> {
        let value = value.into();
        let param = self.get_mut(name)?;
        let Some(accepted) = param.domain.accept(&value) else {
            return Err(CalcError::domain_error(
                name,
                format_value(&value, PARAM_SIGFIGS),
                param.domain.describe(),
            ));
        };
        debug!(parameter = name, value = %accepted, "parameter overridden");
        param.override_value = Some(accepted);
        Ok(())
    }

    /// Clear an override, returning the parameter to its default
    pub fn reset(&mut self, name: &str) -> CalcResult<()> {
        self.get_mut(name)?.override_value = None;
        Ok(())
    }

    /// Convert operator text into a value suited to the parameter's domain
    pub fn parse_value(&self, name: &str, text: &str) -> CalcResult<Value> {
        let param = self.get(name).ok_or_else(|| CalcError::unknown_name(name))?;
        let trimmed = text.trim();
        match &param.domain {
            Domain::Range { .. } => trimmed
                .parse::<f64>()
                .map(Value::Number)
                .map_err(|_| CalcError::invalid_input(name, trimmed, "Expected a number")),
            Domain::Boolean => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(Value::Bool(true)),
                "false" | "no" | "off" | "0" => Ok(Value::Bool(false)),
                _ => Err(CalcError::invalid_input(name, trimmed, "Expected true or false")),
            },
            Domain::Options { options } if options.iter().any(|(k, _)| k == trimmed) => {
                Ok(Value::Text(trimmed.to_string()))
            }
            _ => Ok(parse_literal(trimmed)),
        }
    }

    /// Parse operator text and apply it as an override
    pub fn set_from_text(&mut self, name: &str, text: &str) -> CalcResult<()> {
        let value = self.parse_value(name, text)?;
        self.override_value(name, value)
    }

    /// `(name, current value)` pairs in declaration order
    pub fn current_values(&self) -> Vec<(String, Value)> {
        self.params
            .iter()
            .map(|p| (p.name.clone(), p.current().clone()))
            .collect()
    }

    /// A fresh namespace holding every current value
    pub fn to_namespace(&self) -> Namespace {
        self.params
            .iter()
            .map(|p| (p.name.clone(), p.current().clone()))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Render the "Parameter Values" block: declaration order, names padded
    /// to the widest name. Empty when there are no parameters.
    pub fn render_parameters(&self) -> String {
        if self.params.is_empty() {
            return String::new();
        }
        let width = self.params.iter().map(|p| p.name.chars().count()).max().unwrap_or(0);
        let mut out = String::from("Parameter Values:\n-----------------\n");
        for p in &self.params {
            out.push_str(&format!(
                "    {:<width$} = {}\n",
                p.name,
                format_value(p.current(), PARAM_SIGFIGS),
                width = width
            ));
        }
        out
    }
}
