//! # Verification Ledger
//!
//! A [`VerificationSession`] collects what a calculation establishes during
//! one run:
//!
//! - **requirements** (`require`): preconditions; a failure is returned as
//!   [`CalcError::RequirementFailed`] and the caller propagates it with `?`
//! - **notes** (`note`): free text
//! - **checks** (`check`): advisory pass/fail assertions, never an error
//! - **records** (`record`, `record_scope`): candidate values of the result
//!   variable, one per failure mode
//!
//! Each entry carries a [`Context`]: the supporting `name=value` pairs shown
//! next to it in the report.
//!
//! ```rust
//! use check_core::ledger::{Context, SessionConfig, VerificationSession};
//! use check_core::namespace::Namespace;
//!
//! let ns: Namespace = [("edge_distance", 30.0), ("min_edge_distance", 28.0)].into_iter().collect();
//! let mut session = VerificationSession::new(SessionConfig::for_result("Tr"));
//!
//! let ctx = Context::capture(&ns, "edge_distance, min_edge_distance")?;
//! session.check(30.0 >= 28.0, "Edge distance", ctx);
//! session.record(412.0, "Bolt shear", Context::new())?;
//!
//! assert!(session.checks()[0].passed);
//! assert_eq!(session.records().len(), 1);
//! # Ok::<(), check_core::errors::CalcError>(())
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::{CalcError, CalcResult};
use crate::expr::parse_list;
use crate::format::{format_pairs, format_value, CONTEXT_SIGFIGS};
use crate::namespace::{Namespace, Scope, Value};
use crate::overlay::{Bindings, Overlay};
use crate::units::Unit;

// ============================================================================
// Configuration
// ============================================================================

/// How the governing value is chosen among the candidates
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Selector {
    /// Smallest value governs (capacities)
    Minimum,
    /// Largest value governs (demands)
    Maximum,
    /// Caller supplied selection over comparable magnitudes. Must return one
    /// of the given values.
    Custom(fn(&[f64]) -> Option<f64>),
}

impl Default for Selector {
    fn default() -> Self {
        Selector::Minimum
    }
}

impl Selector {
    /// Apply the selector. `None` for an empty slice.
    pub fn select(&self, values: &[f64]) -> Option<f64> {
        let cmp = |a: &&f64, b: &&f64| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal);
        match self {
            Selector::Minimum => values.iter().min_by(cmp).copied(),
            Selector::Maximum => values.iter().max_by(cmp).copied(),
            Selector::Custom(f) => {
                if values.is_empty() {
                    None
                } else {
                    f(values)
                }
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Selector::Minimum => "min",
            Selector::Maximum => "max",
            Selector::Custom(_) => "custom",
        }
    }
}

impl FromStr for Selector {
    type Err = CalcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "min" | "minimum" => Ok(Selector::Minimum),
            "max" | "maximum" => Ok(Selector::Maximum),
            other => Err(CalcError::invalid_input("selector", other, "Expected 'min' or 'max'")),
        }
    }
}

/// Per-session settings
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Name of the variable whose candidates are recorded (e.g. `Tr`)
    pub result_var: Option<String>,
    /// Unit every recorded quantity is converted to
    pub display_unit: Option<Unit>,
    pub selector: Selector,
    /// Significant figures for result values in the report
    pub precision: u32,
    pub title: String,
    /// Emit every ledger entry to the trace sink as it is made
    pub trace: bool,
    /// Include the "Parameter Values" block in the report
    pub show_params: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            result_var: None,
            display_unit: None,
            selector: Selector::Minimum,
            precision: 3,
            title: String::new(),
            trace: false,
            show_params: false,
        }
    }
}

impl SessionConfig {
    /// Default settings recording candidates of `var`
    pub fn for_result(var: impl Into<String>) -> Self {
        SessionConfig {
            result_var: Some(var.into()),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.display_unit = Some(unit);
        self
    }

    pub fn with_selector(mut self, selector: Selector) -> Self {
        self.selector = selector;
        self
    }
}

// ============================================================================
// Context
// ============================================================================

/// Supporting `name=value` pairs attached to a ledger entry.
///
/// Captured entries keep the order of the capture list; direct entries
/// render after them, sorted by name without regard to case.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    captured: Vec<(String, Value)>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    direct: Vec<(String, Value)>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate a capture list such as `"d, b, edge = d - g1"` against `scope`
    pub fn capture(scope: &dyn Scope, list: &str) -> CalcResult<Self> {
        Context::new().and_capture(scope, list)
    }

    /// Append the items of another capture list
    pub fn and_capture(mut self, scope: &dyn Scope, list: &str) -> CalcResult<Self> {
        for spec in parse_list(list)? {
            let value = spec.expression.eval(scope)?;
            match self.captured.iter_mut().find(|(n, _)| *n == spec.target) {
                Some(slot) => slot.1 = value,
                None => self.captured.push((spec.target, value)),
            }
        }
        Ok(self)
    }

    /// Add a direct value. A name that is already present keeps its position
    /// and takes the new value.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name.into(), value.into());
        self
    }

    fn insert(&mut self, name: String, value: Value) {
        let existing = self
            .captured
            .iter_mut()
            .chain(self.direct.iter_mut())
            .find(|(n, _)| *n == name);
        match existing {
            Some(slot) => slot.1 = value,
            None => self.direct.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.captured
            .iter()
            .chain(&self.direct)
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.captured.len() + self.direct.len()
    }

    pub fn is_empty(&self) -> bool {
        self.captured.is_empty() && self.direct.is_empty()
    }

    /// Entries in render order
    pub fn entries(&self) -> Vec<(&str, &Value)> {
        let mut direct: Vec<(&str, &Value)> = self.direct.iter().map(|(n, v)| (n.as_str(), v)).collect();
        direct.sort_by_key(|(n, _)| n.to_lowercase());
        self.captured
            .iter()
            .map(|(n, v)| (n.as_str(), v))
            .chain(direct)
            .collect()
    }

    /// Entries in render order, skipping `name`
    pub fn entries_except(&self, name: &str) -> Vec<(&str, &Value)> {
        self.entries().into_iter().filter(|(n, _)| *n != name).collect()
    }

    /// `name=value, ...` with values at `nsigfigs`
    pub fn render(&self, nsigfigs: u32) -> String {
        format_pairs(self.entries(), nsigfigs)
    }
}

// ============================================================================
// Records
// ============================================================================

/// Outcome of one advisory check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckRecord {
    pub passed: bool,
    pub label: String,
    pub context: Context,
}

impl CheckRecord {
    /// Two-line rendering; `width` pads the `label?` column
    pub fn render(&self, width: usize) -> String {
        let label = format!("{}?", self.label);
        let flag = if self.passed { "OK" } else { "NG! *****" };
        format!(
            "    {:<width$}  {}\n      ({})",
            label,
            flag,
            self.context.render(CONTEXT_SIGFIGS),
            width = width
        )
    }
}

/// One candidate value of the result variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultCandidate {
    pub label: String,
    pub value: Value,
    pub context: Context,
}

impl ResultCandidate {
    /// One report row; `width` pads the `label:` column
    pub fn render(&self, width: usize, var: Option<&str>, governs: bool, nsigfigs: u32) -> String {
        let label = format!("{}:", self.label);
        let mut row = format!("    {:<width$} ", label, width = width);
        if let Some(var) = var {
            let value = self.context.get(var).unwrap_or(&self.value);
            row.push_str(&format!("{} = {}", var, format_value(value, nsigfigs)));
            if governs {
                row.push_str("    <<<--- GOVERNS");
            }
        } else {
            row.push_str(&format_value(&self.value, nsigfigs));
        }
        row
    }
}

// ============================================================================
// Trace output
// ============================================================================

/// Destination for live ledger output when tracing is on
pub trait TraceSink: Send {
    fn emit(&mut self, entry: &str);
}

/// Emits each entry as a `tracing` event with target `check_core::trace`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TraceSink for TracingSink {
    fn emit(&mut self, entry: &str) {
        info!(target: "check_core::trace", "{}", entry);
    }
}

// ============================================================================
// Session
// ============================================================================

/// The ledger for one run of a calculation
pub struct VerificationSession {
    config: SessionConfig,
    run_id: Uuid,
    started_at: DateTime<Utc>,
    notes: Vec<String>,
    checks: Vec<CheckRecord>,
    records: Vec<ResultCandidate>,
    values_used: Vec<(String, Value)>,
    sink: Box<dyn TraceSink>,
}

impl fmt::Debug for VerificationSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationSession")
            .field("config", &self.config)
            .field("run_id", &self.run_id)
            .field("started_at", &self.started_at)
            .field("notes", &self.notes)
            .field("checks", &self.checks)
            .field("records", &self.records)
            .field("values_used", &self.values_used)
            .finish_non_exhaustive()
    }
}

impl VerificationSession {
    pub fn new(config: SessionConfig) -> Self {
        VerificationSession {
            config,
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            notes: Vec::new(),
            checks: Vec::new(),
            records: Vec::new(),
            values_used: Vec::new(),
            sink: Box::new(TracingSink),
        }
    }

    /// Replace the trace sink
    pub fn with_sink(mut self, sink: Box<dyn TraceSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut SessionConfig {
        &mut self.config
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    pub fn checks(&self) -> &[CheckRecord] {
        &self.checks
    }

    pub fn records(&self) -> &[ResultCandidate] {
        &self.records
    }

    pub fn values_used(&self) -> &[(String, Value)] {
        &self.values_used
    }

    /// True when every check so far passed
    pub fn all_checks_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    /// Clear all entries and start a new run with a fresh id and timestamp
    pub fn begin_run(&mut self) {
        self.notes.clear();
        self.checks.clear();
        self.records.clear();
        self.values_used.clear();
        self.run_id = Uuid::new_v4();
        self.started_at = Utc::now();
        info!(run_id = %self.run_id, title = %self.config.title, "verification run started");
    }

    fn emit(&mut self, entry: &str) {
        if self.config.trace {
            self.sink.emit(entry);
        }
    }

    /// Fail the run unless `condition` holds.
    ///
    /// An empty message becomes `"Error"`.
    pub fn require(&mut self, condition: bool, message: &str, context: Context) -> CalcResult<()> {
        if condition {
            return Ok(());
        }
        let message = if message.is_empty() { "Error" } else { message };
        let error = CalcError::requirement_failed(message, context.render(CONTEXT_SIGFIGS));
        warn!(run_id = %self.run_id, "{}", error);
        self.emit(&error.to_string());
        Err(error)
    }

    pub fn note(&mut self, message: impl Into<String>) {
        let message = message.into();
        debug!(note = %message, "note added");
        self.emit(&format!("Note: {message}"));
        self.notes.push(message);
    }

    /// Record an advisory check. Never fails.
    pub fn check(&mut self, condition: bool, label: &str, context: Context) {
        let record = CheckRecord {
            passed: condition,
            label: label.to_string(),
            context,
        };
        debug!(label, passed = condition, "check recorded");
        if self.config.trace {
            let entry = record.render(record.label.chars().count() + 1);
            self.sink.emit(&entry);
        }
        self.checks.push(record);
    }

    /// Record a candidate value of the result variable.
    ///
    /// Quantities are converted to the display unit when one is configured.
    pub fn record(&mut self, value: impl Into<Value>, label: &str, context: Context) -> CalcResult<()> {
        let mut value = value.into();
        if !value.is_numeric() {
            return Err(CalcError::invalid_input(
                label,
                value.to_string(),
                "Recorded values must be numeric",
            ));
        }
        if let (Some(unit), Value::Quantity(q)) = (self.config.display_unit, &value) {
            value = Value::Quantity(q.to(unit)?);
        }

        let context = match &self.config.result_var {
            Some(var) => context.with(var.clone(), value.clone()),
            None => context,
        };
        let record = ResultCandidate {
            label: label.to_string(),
            value,
            context,
        };
        debug!(label, value = %record.value, "result recorded");
        if self.config.trace {
            let width = record.label.chars().count() + 1;
            let entry = record.render(width, self.config.result_var.as_deref(), false, self.config.precision);
            self.sink.emit(&entry);
        }
        self.records.push(record);
        Ok(())
    }

    /// Run `body` inside an overlay and record the result variable it leaves
    /// behind.
    ///
    /// The result variable is local to the scope. When `body` returns `Ok`,
    /// its value is recorded under `label` with every value the scope bound or
    /// introduced as context. The namespace is restored in every case.
    pub fn record_scope<F>(
        &mut self,
        ns: &mut Namespace,
        bindings: Bindings,
        label: &str,
        body: F,
    ) -> CalcResult<()>
    where
        F: FnOnce(&mut Overlay<'_>, &mut VerificationSession) -> CalcResult<()>,
    {
        let var = self.config.result_var.clone().ok_or_else(|| {
            CalcError::invalid_input("result_var", "", "A scoped record needs a result variable")
        })?;

        let mut scope = Overlay::enter(ns, bindings.local(var.clone()))?;
        body(&mut scope, self)?;

        let value = scope
            .get(&var)
            .cloned()
            .ok_or_else(|| CalcError::missing_result(&var))?;
        let context = scope
            .scope_values()
            .into_iter()
            .filter(|(name, _)| *name != var)
            .fold(Context::new(), |ctx, (name, v)| ctx.with(name, v));
        drop(scope);

        self.record(value, label, context)
    }

    /// Remember named values for the "Values Used" block of the report
    pub fn use_values(&mut self, scope: &dyn Scope, list: &str) -> CalcResult<()> {
        for spec in parse_list(list)? {
            let value = spec.expression.eval(scope)?;
            match self.values_used.iter_mut().find(|(n, _)| *n == spec.target) {
                Some(slot) => slot.1 = value,
                None => self.values_used.push((spec.target, value)),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::Quantity;
    use std::sync::{Arc, Mutex};

    struct Collect(Arc<Mutex<Vec<String>>>);

    impl TraceSink for Collect {
        fn emit(&mut self, entry: &str) {
            self.0.lock().unwrap().push(entry.to_string());
        }
    }

    fn session() -> VerificationSession {
        VerificationSession::new(SessionConfig::for_result("Tr"))
    }

    #[test]
    fn test_require_passes_and_fails() {
        let mut s = session();
        assert!(s.require(true, "never shown", Context::new()).is_ok());

        let err = s
            .require(false, "", Context::new().with("d", 20.0))
            .unwrap_err();
        assert_eq!(err, CalcError::requirement_failed("Error", "d=20"));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_abort_stops_before_later_records() {
        fn compute(s: &mut VerificationSession) -> CalcResult<()> {
            s.note("starting");
            s.require(false, "Bolt size not available", Context::new())?;
            s.record(100.0, "Unreachable", Context::new())?;
            Ok(())
        }

        let mut s = session();
        let err = compute(&mut s).unwrap_err();
        assert!(err.is_fatal());
        assert!(s.records().is_empty());
        assert_eq!(s.notes(), ["starting".to_string()]);
    }

    #[test]
    fn test_failed_check_is_kept_when_a_later_requirement_fails() {
        fn compute(s: &mut VerificationSession) -> CalcResult<()> {
            s.require(true, "never shown", Context::new())?;
            s.check(false, "Pitch", Context::new().with("pitch", 40.0));
            s.require(false, "Bolt too large", Context::new())?;
            s.record(100.0, "Unreachable", Context::new())?;
            Ok(())
        }

        let mut s = session();
        let err = compute(&mut s).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(s.checks().len(), 1);
        assert!(!s.checks()[0].passed);
        assert!(!s.all_checks_passed());
        assert!(s.records().is_empty());
    }

    #[test]
    fn test_check_never_aborts() {
        let mut s = session();
        s.check(false, "Pitch", Context::new().with("p", 50.0));
        s.check(true, "Gauge", Context::new());
        assert_eq!(s.checks().len(), 2);
        assert!(!s.all_checks_passed());
    }

    #[test]
    fn test_check_render() {
        let ns: Namespace = [("edge_distance", 30.0), ("min_edge_distance", 28.0)].into_iter().collect();
        let ctx = Context::capture(&ns, "edge_distance, min_edge_distance").unwrap();
        let mut s = session();
        s.check(30.0 >= 28.0, "Edge distance", ctx);
        assert_eq!(
            s.checks()[0].render(16),
            "    Edge distance?    OK\n      (edge_distance=30, min_edge_distance=28)"
        );
    }

    #[test]
    fn test_record_adds_result_var() {
        let mut s = session();
        s.record(80.0, "B", Context::new().with("b", 2.0)).unwrap();
        let rec = &s.records()[0];
        assert_eq!(rec.context.get("Tr"), Some(&Value::Number(80.0)));
        assert_eq!(rec.context.render(4), "b=2, Tr=80");
    }

    #[test]
    fn test_record_converts_to_display_unit() {
        let mut s = VerificationSession::new(SessionConfig::for_result("Tr").with_unit(Unit::Kilonewton));
        s.record(Quantity::new(412_000.0, Unit::Newton), "Bolt shear", Context::new()).unwrap();
        let q = s.records()[0].value.as_quantity().unwrap();
        assert_eq!(q.unit, Unit::Kilonewton);
        assert!((q.magnitude - 412.0).abs() < 1e-9);

        let err = s.record(Quantity::new(1.0, Unit::Metre), "Wrong", Context::new()).unwrap_err();
        assert_eq!(err.error_code(), "UNIT_MISMATCH");
        assert!(s.record("text", "Wrong", Context::new()).is_err());
    }

    #[test]
    fn test_context_ordering() {
        let ns: Namespace = [("b", 2.0), ("a", 1.0)].into_iter().collect();
        let ctx = Context::capture(&ns, "b, a")
            .unwrap()
            .with("Zeta", 3.0)
            .with("alpha", 4.0)
            .with("b", 20.0);
        let names: Vec<&str> = ctx.entries().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["b", "a", "alpha", "Zeta"]);
        assert_eq!(ctx.get("b"), Some(&Value::Number(20.0)));
        assert_eq!(ctx.len(), 4);
    }

    #[test]
    fn test_capture_expressions() {
        let ns: Namespace = [("d", 102.0), ("g1", 65.0)].into_iter().collect();
        let ctx = Context::capture(&ns, "edge = d - g1, d > g1").unwrap();
        assert_eq!(ctx.render(4), "edge=37, d > g1=true");
        assert!(Context::capture(&ns, "missing").is_err());
    }

    #[test]
    fn test_record_scope_records_bound_values() {
        let mut ns: Namespace = [("A", 100.0), ("x", 1.0)].into_iter().collect();
        let before = ns.clone();
        let mut s = session();

        s.record_scope(&mut ns, Bindings::new().bind("x", 5.0), "Scaled", |scope, session| {
            let a = scope.number("A")?;
            let x = scope.number("x")?;
            session.note("inside");
            scope.set("Tr", a * x);
            Ok(())
        })
        .unwrap();

        assert_eq!(ns, before);
        let rec = &s.records()[0];
        assert_eq!(rec.value, Value::Number(500.0));
        assert_eq!(rec.context.render(4), "Tr=500, x=5");
        assert_eq!(s.notes().len(), 1);
    }

    #[test]
    fn test_record_scope_errors_restore() {
        let mut ns: Namespace = [("Tr", 1.0)].into_iter().collect();
        let mut s = session();

        let err = s
            .record_scope(&mut ns, Bindings::new(), "Nothing", |_, _| Ok(()))
            .unwrap_err();
        assert_eq!(err, CalcError::missing_result("Tr"));
        assert_eq!(ns.number("Tr").unwrap(), 1.0);

        let err = s
            .record_scope(&mut ns, Bindings::new(), "Fails", |scope, _| {
                scope.set("Tr", 9.0);
                Err(CalcError::lookup_failed("Table 6", "40"))
            })
            .unwrap_err();
        assert_eq!(err.error_code(), "LOOKUP_FAILED");
        assert_eq!(ns.number("Tr").unwrap(), 1.0);
        assert!(s.records().is_empty());
    }

    #[test]
    fn test_trace_sink_receives_entries() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let mut config = SessionConfig::for_result("Tr");
        config.trace = true;
        let mut s = VerificationSession::new(config).with_sink(Box::new(Collect(lines.clone())));

        s.note("hello");
        s.check(true, "Gauge", Context::new());
        s.record(80.0, "B", Context::new()).unwrap();

        let lines = lines.lock().unwrap();
        assert_eq!(lines[0], "Note: hello");
        assert!(lines[1].contains("Gauge?  OK"));
        assert_eq!(lines[2], "    B: Tr = 80");
    }

    #[test]
    fn test_begin_run_resets() {
        let mut s = session();
        s.note("old");
        let first = s.run_id();
        s.begin_run();
        assert!(s.notes().is_empty());
        assert_ne!(s.run_id(), first);
    }

    #[test]
    fn test_selector() {
        let values = [100.0, 80.0, 120.0];
        assert_eq!(Selector::Minimum.select(&values), Some(80.0));
        assert_eq!(Selector::Maximum.select(&values), Some(120.0));
        assert_eq!(Selector::Minimum.select(&[]), None);
        assert_eq!("max".parse::<Selector>().unwrap(), Selector::Maximum);
        assert!("median".parse::<Selector>().is_err());
    }
}
