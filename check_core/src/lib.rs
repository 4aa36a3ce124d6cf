//! # check_core - Limit-State Verification Engine
//!
//! `check_core` is the engine behind Limitcheck. A calculation evaluates a
//! design against a code of practice: it computes several independent
//! candidate capacities (one per failure mode), checks geometric and
//! detailing limits, and reports which candidate *governs*.
//!
//! ## Design Philosophy
//!
//! - **Explicit context**: names are resolved against a [`Namespace`] the
//!   caller owns and passes down, never an ambient global
//! - **Three kinds of outcome**: a failed requirement ends the run, a failed
//!   check is only reported, recorded values compete for governing
//! - **JSON-First**: data types implement Serialize/Deserialize
//! - **Rich Errors**: structured error types, not just strings
//!
//! ## Quick Start
//!
//! ```rust
//! use check_core::ledger::{Context, SessionConfig, VerificationSession};
//! use check_core::report::Summary;
//! use check_core::parameters::ParameterSet;
//!
//! let mut session = VerificationSession::new(SessionConfig::for_result("Tr"));
//! session.record(100.0, "A", Context::new())?;
//! session.record(80.0, "B", Context::new())?;
//! session.record(120.0, "C", Context::new())?;
//!
//! let summary = Summary::from_session(&session, &ParameterSet::new())?;
//! assert!(summary.report.contains("B: Tr = 80    <<<--- GOVERNS"));
//! # Ok::<(), check_core::errors::CalcError>(())
//! ```
//!
//! ## Modules
//!
//! - [`table`] - nearest-bucket search over standard value tables
//! - [`units`] - unit tags and quantities
//! - [`namespace`] - values and the name-to-value evaluation context
//! - [`expr`] - the expression language used for contexts and bindings
//! - [`overlay`] - scoped bindings with guaranteed restore
//! - [`parameters`] - declared, domain-checked inputs
//! - [`ledger`] - requirements, notes, checks and recorded results
//! - [`governing`] - governing-value resolution
//! - [`report`] / [`format`] - text report and number formatting
//! - [`calculation`] - the `Calculation` trait and run driver
//! - [`script`] - calculations declared in TOML
//! - [`config`] - settings file
//! - [`errors`] - structured error types

pub mod calculation;
pub mod config;
pub mod errors;
pub mod expr;
pub mod format;
pub mod governing;
pub mod ledger;
pub mod namespace;
pub mod overlay;
pub mod parameters;
pub mod report;
pub mod script;
pub mod table;
pub mod units;

// Re-export commonly used types at crate root for convenience
pub use calculation::{run_calculation, run_in_session, Calculation, RunOutcome};
pub use errors::{CalcError, CalcResult, ErrorKind};
pub use ledger::{Context, SessionConfig, Selector, TraceSink, VerificationSession};
pub use namespace::{Namespace, Value};
pub use overlay::{Bindings, Overlay};
pub use parameters::{Domain, ParameterSet};
pub use report::Summary;
pub use script::CalcScript;
pub use table::{table_search, StandardTable};
pub use units::{Quantity, Unit};
