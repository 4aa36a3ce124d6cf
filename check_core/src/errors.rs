//! # Error Types
//!
//! Structured error types for check_core. A verification run can fail in
//! three distinct ways and the taxonomy keeps them apart:
//!
//! - a fatal requirement ([`CalcError::RequirementFailed`]) ends the run
//! - an advisory check never produces an error at all; it is recorded as `NG`
//! - everything else is a usage or resolution error (bad table query, empty
//!   result set, duplicate overlay name, out-of-domain parameter, ...)
//!
//! ## Example
//!
//! ```rust
//! use check_core::errors::{CalcError, CalcResult, ErrorKind};
//!
//! fn validate_rows(rows: u32) -> CalcResult<()> {
//!     if rows < 2 {
//!         return Err(CalcError::invalid_input(
//!             "Nrows",
//!             rows.to_string(),
//!             "At least two rows of bolts are required",
//!         ));
//!     }
//!     Ok(())
//! }
//!
//! let err = validate_rows(1).unwrap_err();
//! assert_eq!(err.kind(), ErrorKind::Usage);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for check_core operations
pub type CalcResult<T> = Result<T, CalcError>;

/// Broad classification of a [`CalcError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// A fatal requirement failed; the run is over.
    Fatal,
    /// The engine was used with inputs that violate its preconditions.
    Usage,
}

/// Structured error type for verification operations.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "details")]
pub enum CalcError {
    /// A `require` call failed. Carries the message and the formatted context.
    #[error("FATAL!! {message}: {context}")]
    RequirementFailed { message: String, context: String },

    /// A table query fell outside every bucket of the table
    #[error("Unable to find value {value} in table '{table}'")]
    LookupFailed { table: String, value: String },

    /// A governing value was requested but nothing was recorded
    #[error("No result candidates recorded for '{variable}'")]
    EmptyResultSet { variable: String },

    /// A name was bound twice in the same overlay activation
    #[error("Name '{name}' has been used more than once")]
    NameConflict { name: String },

    /// A parameter value is outside its declared domain
    #[error("Value {value} is outside the domain of '{parameter}': {domain}")]
    DomainError {
        parameter: String,
        value: String,
        domain: String,
    },

    /// A name was referenced that is not defined
    #[error("Name '{name}' is not defined")]
    UnknownName { name: String },

    /// An expression could not be parsed or evaluated
    #[error("Expression error in '{expression}': {reason}")]
    Expression { expression: String, reason: String },

    /// Two units of different dimensions were combined
    #[error("Unit mismatch: cannot convert {from} to {to}")]
    UnitMismatch { from: String, to: String },

    /// A scoped record finished without defining the result variable
    #[error("Result variable '{variable}' is not defined")]
    MissingResult { variable: String },

    /// An input value is invalid (malformed domain, duplicate declaration, etc.)
    #[error("Invalid input for '{field}': {value} - {reason}")]
    InvalidInput {
        field: String,
        value: String,
        reason: String,
    },

    /// A configuration or calc script file could not be read or parsed
    #[error("Configuration error in '{source_name}': {reason}")]
    Config { source_name: String, reason: String },
}

impl CalcError {
    /// Create a RequirementFailed error
    pub fn requirement_failed(message: impl Into<String>, context: impl Into<String>) -> Self {
        CalcError::RequirementFailed {
            message: message.into(),
            context: context.into(),
        }
    }

    /// Create a LookupFailed error
    pub fn lookup_failed(table: impl Into<String>, value: impl Into<String>) -> Self {
        CalcError::LookupFailed {
            table: table.into(),
            value: value.into(),
        }
    }

    /// Create an EmptyResultSet error
    pub fn empty_result_set(variable: impl Into<String>) -> Self {
        CalcError::EmptyResultSet {
            variable: variable.into(),
        }
    }

    /// Create a NameConflict error
    pub fn name_conflict(name: impl Into<String>) -> Self {
        CalcError::NameConflict { name: name.into() }
    }

    /// Create a DomainError
    pub fn domain_error(
        parameter: impl Into<String>,
        value: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        CalcError::DomainError {
            parameter: parameter.into(),
            value: value.into(),
            domain: domain.into(),
        }
    }

    /// Create an UnknownName error
    pub fn unknown_name(name: impl Into<String>) -> Self {
        CalcError::UnknownName { name: name.into() }
    }

    /// Create an Expression error
    pub fn expression(expression: impl Into<String>, reason: impl Into<String>) -> Self {
        CalcError::Expression {
            expression: expression.into(),
            reason: reason.into(),
        }
    }

    /// Create a UnitMismatch error
    pub fn unit_mismatch(from: impl Into<String>, to: impl Into<String>) -> Self {
        CalcError::UnitMismatch {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Create a MissingResult error
    pub fn missing_result(variable: impl Into<String>) -> Self {
        CalcError::MissingResult {
            variable: variable.into(),
        }
    }

    /// Create an InvalidInput error
    pub fn invalid_input(field: impl Into<String>, value: impl Into<String>, reason: impl Into<String>) -> Self {
        CalcError::InvalidInput {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create a Config error
    pub fn config(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        CalcError::Config {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    /// Fatal requirement failures end a run; everything else is a usage error
    pub fn kind(&self) -> ErrorKind {
        match self {
            CalcError::RequirementFailed { .. } => ErrorKind::Fatal,
            _ => ErrorKind::Usage,
        }
    }

    /// Check if this error is a fatal requirement failure
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Fatal
    }

    /// Get a short error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            CalcError::RequirementFailed { .. } => "REQUIREMENT_FAILED",
            CalcError::LookupFailed { .. } => "LOOKUP_FAILED",
            CalcError::EmptyResultSet { .. } => "EMPTY_RESULT_SET",
            CalcError::NameConflict { .. } => "NAME_CONFLICT",
            CalcError::DomainError { .. } => "DOMAIN_ERROR",
            CalcError::UnknownName { .. } => "UNKNOWN_NAME",
            CalcError::Expression { .. } => "EXPRESSION_ERROR",
            CalcError::UnitMismatch { .. } => "UNIT_MISMATCH",
            CalcError::MissingResult { .. } => "MISSING_RESULT",
            CalcError::InvalidInput { .. } => "INVALID_INPUT",
            CalcError::Config { .. } => "CONFIG_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serialization() {
        let error = CalcError::domain_error("Fy", "500", "range [300, 450] step 1");
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("\"type\":\"DomainError\""));
        let roundtrip: CalcError = serde_json::from_str(&json).unwrap();
        assert_eq!(error, roundtrip);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(CalcError::name_conflict("d").error_code(), "NAME_CONFLICT");
        assert_eq!(CalcError::empty_result_set("Tr").error_code(), "EMPTY_RESULT_SET");
        assert_eq!(CalcError::lookup_failed("Table 6", "40").error_code(), "LOOKUP_FAILED");
    }

    #[test]
    fn test_fatal_is_distinguished() {
        let fatal = CalcError::requirement_failed("bolt size unavailable", "bolt_size=M99");
        assert!(fatal.is_fatal());
        assert_eq!(fatal.to_string(), "FATAL!! bolt size unavailable: bolt_size=M99");

        assert_eq!(CalcError::empty_result_set("Tr").kind(), ErrorKind::Usage);
        assert_eq!(CalcError::lookup_failed("UG1", "300").kind(), ErrorKind::Usage);
    }
}
