//! # Calc Scripts
//!
//! A calc script is a TOML file declaring a whole calculation: its
//! parameters, the reference tables it consults, and an ordered list of
//! ledger steps. Loading validates everything that can be validated up
//! front (domains, tables, expression syntax), so a script that loads will
//! only fail at run time on values.
//!
//! ```toml
//! title = "Bolted leg angle"
//! result = "Tr"
//! unit = "kN"
//!
//! [[parameters]]
//! name = "d"
//! values = [16, 20, 22, 24]
//! default = 20
//!
//! [tables.table6]
//! columns = ["min_end", "min_edge"]
//! rows = [[16, 28, 22], [20, 34, 26], [22, 38, 28], [24, 42, 30]]
//!
//! [[steps]]
//! lookup = "table6"
//! key = "d"
//!
//! [[steps]]
//! check = "edge >= min_edge"
//! label = "Edge distance"
//! context = "edge, min_edge"
//! ```
//!
//! ## Step kinds
//!
//! | key       | companions                     | effect                                   |
//! |-----------|--------------------------------|------------------------------------------|
//! | `require` | `message`, `context`           | fatal precondition                       |
//! | `note`    |                                | free text note                           |
//! | `check`   | `label`, `context`             | advisory check                           |
//! | `set`     |                                | evaluate a binding list into the namespace |
//! | `lookup`  | `key`                          | bucket-search a table, bind its columns  |
//! | `record`  | `label`, `context`             | record a candidate value                 |
//! | `scope`   | `label`, `steps`, `export`     | run nested steps in an overlay, record the result |
//! | `show`    |                                | add names to "Values Used"               |

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::calculation::Calculation;
use crate::errors::{CalcError, CalcResult};
use crate::expr::{is_identifier, parse_list, BindingSpec, Expression};
use crate::format::check_precision;
use crate::ledger::{Context, Selector, SessionConfig, VerificationSession};
use crate::namespace::{Namespace, Value};
use crate::overlay::Bindings;
use crate::parameters::{Domain, ParameterSet};
use crate::table::StandardTable;
use crate::units::Unit;

// ============================================================================
// File format
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct ScriptFile {
    title: String,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    unit: Option<Unit>,
    #[serde(default)]
    precision: Option<u32>,
    #[serde(default)]
    selector: Option<String>,
    #[serde(default)]
    parameters: Vec<ParameterEntry>,
    #[serde(default)]
    tables: BTreeMap<String, TableEntry>,
    #[serde(default)]
    steps: Vec<StepEntry>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct ParameterEntry {
    name: String,
    #[serde(default)]
    range: Option<[f64; 3]>,
    #[serde(default)]
    values: Option<Vec<Value>>,
    #[serde(default)]
    options: Option<Vec<(String, Value)>>,
    #[serde(default)]
    boolean: Option<bool>,
    #[serde(default)]
    fixed: Option<Value>,
    #[serde(default)]
    default: Option<Value>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct TableEntry {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct StepEntry {
    require: Option<String>,
    note: Option<String>,
    check: Option<String>,
    set: Option<String>,
    lookup: Option<String>,
    record: Option<String>,
    scope: Option<String>,
    show: Option<String>,
    message: Option<String>,
    label: Option<String>,
    context: Option<String>,
    key: Option<String>,
    export: Option<String>,
    #[serde(default)]
    steps: Vec<StepEntry>,
}

// ============================================================================
// Compiled form
// ============================================================================

/// A reference table whose rows bind several named columns
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptTable {
    pub columns: Vec<String>,
    pub table: StandardTable<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq)]
enum Step {
    Require {
        condition: Expression,
        message: String,
        context: Option<String>,
    },
    Note(String),
    Check {
        condition: Expression,
        label: String,
        context: Option<String>,
    },
    Set(Vec<BindingSpec>),
    Lookup {
        table: String,
        key: Expression,
    },
    Record {
        value: Expression,
        label: String,
        context: Option<String>,
    },
    Scope {
        bind: String,
        export: Vec<String>,
        label: String,
        steps: Vec<Step>,
    },
    Show(String),
}

/// A calculation loaded from a TOML calc script
#[derive(Debug, Clone)]
pub struct CalcScript {
    title: String,
    config: SessionConfig,
    parameters: ParameterSet,
    tables: BTreeMap<String, ScriptTable>,
    steps: Vec<Step>,
}

impl CalcScript {
    /// Parse a calc script. `source_name` appears in error messages.
    pub fn from_toml_str(src: &str, source_name: &str) -> CalcResult<Self> {
        let file: ScriptFile =
            toml::from_str(src).map_err(|e| CalcError::config(source_name, e.to_string()))?;

        let mut config = match &file.result {
            Some(var) => SessionConfig::for_result(var.clone()),
            None => SessionConfig::default(),
        };
        config.title = file.title.clone();
        config.display_unit = file.unit;
        if let Some(precision) = file.precision {
            config.precision = check_precision(precision)?;
        }
        if let Some(selector) = &file.selector {
            config.selector = selector.parse::<Selector>()?;
        }

        let mut parameters = ParameterSet::new();
        for entry in &file.parameters {
            declare_parameter(&mut parameters, entry)?;
        }

        let mut tables = BTreeMap::new();
        for (name, entry) in &file.tables {
            tables.insert(name.clone(), build_table(name, entry)?);
        }

        let steps = compile_steps(&file.steps, &tables)?;
        debug!(
            source = source_name,
            parameters = parameters.len(),
            tables = tables.len(),
            steps = steps.len(),
            "calc script loaded"
        );

        Ok(CalcScript {
            title: file.title,
            config,
            parameters,
            tables,
            steps,
        })
    }

    /// Read and parse a calc script file
    pub fn load(path: impl AsRef<Path>) -> CalcResult<Self> {
        let path = path.as_ref();
        let name = path.display().to_string();
        let src = std::fs::read_to_string(path).map_err(|e| CalcError::config(&name, e.to_string()))?;
        Self::from_toml_str(&src, &name)
    }

    pub fn table(&self, name: &str) -> Option<&ScriptTable> {
        self.tables.get(name)
    }

    fn run_steps(&self, steps: &[Step], ns: &mut Namespace, session: &mut VerificationSession) -> CalcResult<()> {
        for step in steps {
            self.run_step(step, ns, session)?;
        }
        Ok(())
    }

    fn run_step(&self, step: &Step, ns: &mut Namespace, session: &mut VerificationSession) -> CalcResult<()> {
        match step {
            Step::Require {
                condition,
                message,
                context,
            } => {
                let ok = truth(condition, ns)?;
                let context = capture(ns, context.as_deref())?;
                session.require(ok, message, context)
            }
            Step::Note(text) => {
                session.note(text.clone());
                Ok(())
            }
            Step::Check {
                condition,
                label,
                context,
            } => {
                let ok = truth(condition, ns)?;
                let context = capture(ns, context.as_deref())?;
                session.check(ok, label, context);
                Ok(())
            }
            Step::Set(specs) => {
                for spec in specs {
                    let value = spec.expression.eval(ns)?;
                    ns.set(spec.target.clone(), value);
                }
                Ok(())
            }
            Step::Lookup { table, key } => {
                let script_table = self
                    .tables
                    .get(table)
                    .ok_or_else(|| CalcError::unknown_name(table))?;
                let key_value = key.eval(ns)?;
                let v = key_value.as_number().ok_or_else(|| {
                    CalcError::expression(key.source(), "table key must be numeric")
                })?;
                let row = script_table.table.lookup(v)?;
                for (column, value) in script_table.columns.iter().zip(row) {
                    ns.set(column.clone(), value.clone());
                }
                Ok(())
            }
            Step::Record { value, label, context } => {
                let value = value.eval(ns)?;
                let context = capture(ns, context.as_deref())?;
                session.record(value, label, context)
            }
            Step::Scope { bind, export, label, steps } => {
                let bindings = export
                    .iter()
                    .fold(Bindings::new().extract(&*ns, bind)?, |b, name| b.export(name.as_str()));
                session.record_scope(ns, bindings, label, |scope, session| {
                    self.run_steps(steps, scope, session)
                })
            }
            Step::Show(list) => session.use_values(&*ns, list),
        }
    }
}

impl Calculation for CalcScript {
    fn title(&self) -> String {
        self.title.clone()
    }

    fn parameters(&self) -> CalcResult<ParameterSet> {
        Ok(self.parameters.clone())
    }

    fn session_config(&self) -> SessionConfig {
        self.config.clone()
    }

    fn compute(&self, ns: &mut Namespace, session: &mut VerificationSession) -> CalcResult<()> {
        self.run_steps(&self.steps, ns, session)
    }
}

fn truth(condition: &Expression, ns: &Namespace) -> CalcResult<bool> {
    condition
        .eval(ns)?
        .as_bool()
        .ok_or_else(|| CalcError::expression(condition.source(), "condition must be true or false"))
}

fn capture(ns: &Namespace, list: Option<&str>) -> CalcResult<Context> {
    match list {
        Some(list) => Context::capture(ns, list),
        None => Ok(Context::new()),
    }
}

// ============================================================================
// Loading
// ============================================================================

fn declare_parameter(params: &mut ParameterSet, entry: &ParameterEntry) -> CalcResult<()> {
    let mut domains = Vec::new();
    if let Some([min, max, step]) = entry.range {
        domains.push(Domain::range(min, max, step));
    }
    if let Some(values) = &entry.values {
        domains.push(Domain::Values { values: values.clone() });
    }
    if let Some(options) = &entry.options {
        domains.push(Domain::Options { options: options.clone() });
    }
    if entry.boolean == Some(true) {
        domains.push(Domain::Boolean);
    }
    if let Some(value) = &entry.fixed {
        domains.push(Domain::Fixed { value: value.clone() });
    }

    if domains.len() != 1 {
        return Err(CalcError::invalid_input(
            &entry.name,
            format!("{} domains", domains.len()),
            "Declare exactly one of range, values, options, boolean or fixed",
        ));
    }
    let domain = domains.remove(0);

    let default = match &entry.default {
        Some(value) => value.clone(),
        None => match &domain {
            Domain::Range { min, .. } => Value::Number(*min),
            Domain::Values { values } => values.first().cloned().unwrap_or(Value::Number(0.0)),
            Domain::Options { options } => options.first().map(|(_, v)| v.clone()).unwrap_or(Value::Number(0.0)),
            Domain::Boolean => Value::Bool(false),
            Domain::Fixed { value } => value.clone(),
        },
    };

    let param = params.declare(entry.name.clone(), domain, default)?;
    if let Some(description) = &entry.description {
        param.describe(description.clone());
    }
    Ok(())
}

fn build_table(name: &str, entry: &TableEntry) -> CalcResult<ScriptTable> {
    let mut rows = Vec::with_capacity(entry.rows.len());
    for row in &entry.rows {
        let Some((key, data)) = row.split_first() else {
            return Err(CalcError::invalid_input(name, "[]", "Table rows must not be empty"));
        };
        let key = key.as_number().ok_or_else(|| {
            CalcError::invalid_input(name, key.to_string(), "Table keys must be numeric")
        })?;
        if data.len() != entry.columns.len() {
            return Err(CalcError::invalid_input(
                name,
                format!("row {key}"),
                format!("Expected {} values after the key, found {}", entry.columns.len(), data.len()),
            ));
        }
        rows.push((key, data.to_vec()));
    }
    Ok(ScriptTable {
        columns: entry.columns.clone(),
        table: StandardTable::new(name, rows)?,
    })
}

fn compile_steps(entries: &[StepEntry], tables: &BTreeMap<String, ScriptTable>) -> CalcResult<Vec<Step>> {
    entries.iter().map(|e| compile_step(e, tables)).collect()
}

/// Validate an optional capture list at load time
fn check_list(list: Option<&str>) -> CalcResult<Option<String>> {
    match list {
        Some(list) => {
            parse_list(list)?;
            Ok(Some(list.to_string()))
        }
        None => Ok(None),
    }
}

fn export_names(list: Option<&str>) -> CalcResult<Vec<String>> {
    let Some(list) = list else {
        return Ok(Vec::new());
    };
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| {
            if is_identifier(name) {
                Ok(name.to_string())
            } else {
                Err(CalcError::expression(name, "export needs plain names"))
            }
        })
        .collect()
}

fn compile_step(entry: &StepEntry, tables: &BTreeMap<String, ScriptTable>) -> CalcResult<Step> {
    let kinds = [
        ("require", &entry.require),
        ("note", &entry.note),
        ("check", &entry.check),
        ("set", &entry.set),
        ("lookup", &entry.lookup),
        ("record", &entry.record),
        ("scope", &entry.scope),
        ("show", &entry.show),
    ];
    let present: Vec<(&str, &String)> = kinds
        .iter()
        .filter_map(|(kind, value)| value.as_ref().map(|v| (*kind, v)))
        .collect();
    let [(kind, body)] = present.as_slice() else {
        let found: Vec<&str> = present.iter().map(|(k, _)| *k).collect();
        return Err(CalcError::invalid_input(
            "steps",
            format!("[{}]", found.join(", ")),
            "Each step needs exactly one of require, note, check, set, lookup, record, scope or show",
        ));
    };
    let label = || entry.label.clone().unwrap_or_default();

    if !entry.steps.is_empty() && *kind != "scope" {
        return Err(CalcError::invalid_input("steps", *kind, "Only scope steps may contain steps"));
    }
    if entry.export.is_some() && *kind != "scope" {
        return Err(CalcError::invalid_input("export", *kind, "Only scope steps may export names"));
    }

    let step = match *kind {
        "require" => Step::Require {
            condition: Expression::parse(body)?,
            message: entry.message.clone().unwrap_or_default(),
            context: check_list(entry.context.as_deref())?,
        },
        "note" => Step::Note(body.to_string()),
        "check" => Step::Check {
            condition: Expression::parse(body)?,
            label: label(),
            context: check_list(entry.context.as_deref())?,
        },
        "set" => {
            let specs = parse_list(body)?;
            if let Some(bad) = specs.iter().find(|s| !s.is_named()) {
                return Err(CalcError::expression(&bad.target, "a set step needs 'name = expression' items"));
            }
            Step::Set(specs)
        }
        "lookup" => {
            if !tables.contains_key(body.as_str()) {
                return Err(CalcError::unknown_name(body.as_str()));
            }
            let key = entry.key.as_deref().ok_or_else(|| {
                CalcError::invalid_input("lookup", body.as_str(), "A lookup step needs a key expression")
            })?;
            Step::Lookup {
                table: body.to_string(),
                key: Expression::parse(key)?,
            }
        }
        "record" => Step::Record {
            value: Expression::parse(body)?,
            label: label(),
            context: check_list(entry.context.as_deref())?,
        },
        "scope" => {
            parse_list(body)?;
            let export = export_names(entry.export.as_deref())?;
            Step::Scope {
                bind: body.to_string(),
                export,
                label: label(),
                steps: compile_steps(&entry.steps, tables)?,
            }
        }
        _ => {
            parse_list(body)?;
            Step::Show(body.to_string())
        }
    };
    Ok(step)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculation::{run_calculation, RunOutcome};

    const ABC: &str = r#"
title = "Three modes"
result = "Tr"

[[parameters]]
name = "A"
range = [50, 150, 10]
default = 100

[[steps]]
record = "A"
label = "A"

[[steps]]
record = "80"
label = "B"

[[steps]]
record = "120"
label = "C"
"#;

    fn run(script: &CalcScript, params: &ParameterSet) -> RunOutcome {
        run_calculation(script, params, script.session_config()).unwrap()
    }

    #[test]
    fn test_abc_script() {
        let script = CalcScript::from_toml_str(ABC, "abc.toml").unwrap();
        let params = script.parameters().unwrap();
        let outcome = run(&script, &params);
        let summary = outcome.summary().unwrap();
        assert!(summary.report.contains("    B: Tr = 80    <<<--- GOVERNS\n"));
        assert!(summary.report.ends_with("       Tr = 80\n"));
    }

    #[test]
    fn test_override_changes_governing() {
        let script = CalcScript::from_toml_str(ABC, "abc.toml").unwrap();
        let mut params = script.parameters().unwrap();
        params.set_from_text("A", "60").unwrap();
        let outcome = run(&script, &params);
        let summary = outcome.summary().unwrap();
        assert_eq!(summary.governing_records()[0].label, "A");
    }

    #[test]
    fn test_lookup_check_and_scope() {
        let src = r#"
title = "Edge distance"
result = "Tr"
unit = "kN"

[[parameters]]
name = "d"
values = [16, 20, 22]
default = 20

[[parameters]]
name = "edge"
range = [20, 60, 1]
default = 30

[tables.table6]
columns = ["min_end", "min_edge"]
rows = [[16, 28, 22], [20, 34, 26], [22, 38, 28]]

[[steps]]
require = "d <= 22"
message = "Bolt too large"
context = "d"

[[steps]]
lookup = "table6"
key = "d"

[[steps]]
check = "edge >= min_edge"
label = "Edge distance"
context = "edge, min_edge"

[[steps]]
scope = "n = 2"
label = "Bolt shear"

[[steps.steps]]
set = "Tr = qty(n * 50, 'kN')"

[[steps]]
record = "qty(150000, 'N')"
label = "Yield"

[[steps]]
show = "d, edge"
"#;
        let script = CalcScript::from_toml_str(src, "edge.toml").unwrap();
        assert_eq!(script.table("table6").unwrap().columns, vec!["min_end", "min_edge"]);

        let params = script.parameters().unwrap();
        let outcome = run(&script, &params);
        let summary = outcome.summary().unwrap();
        let report = &summary.report;
        assert!(report.contains("    Edge distance?   OK\n      (edge=30, min_edge=26)\n"));
        assert!(report.contains("    Bolt shear: Tr = 100 kN    <<<--- GOVERNS\n"));
        assert!(report.contains("    Yield:      Tr = 150 kN\n"));
        assert!(report.contains("Values Used:\n------------\n    d = 20\n    edge = 30\n"));
        let scoped = &summary.records[0];
        assert_eq!(scoped.context.get("n"), Some(&Value::Number(2.0)));
    }

    #[test]
    fn test_require_failure_aborts() {
        let src = r#"
title = "Abort"
result = "Tr"

[[steps]]
record = "1"
label = "first"

[[steps]]
require = "false"
message = "Bolt size not available"

[[steps]]
record = "2"
label = "never"
"#;
        let script = CalcScript::from_toml_str(src, "abort.toml").unwrap();
        let params = script.parameters().unwrap();
        match run(&script, &params) {
            RunOutcome::Aborted { error, session } => {
                assert_eq!(error.error_code(), "REQUIREMENT_FAILED");
                assert_eq!(session.records().len(), 1);
            }
            RunOutcome::Completed(_) => panic!("expected an aborted run"),
        }
    }

    #[test]
    fn test_load_errors() {
        let bad_toml = "title = ";
        assert_eq!(
            CalcScript::from_toml_str(bad_toml, "x.toml").unwrap_err().error_code(),
            "CONFIG_ERROR"
        );

        let two_kinds = "title = \"t\"\n[[steps]]\nnote = \"a\"\ncheck = \"true\"\n";
        assert_eq!(
            CalcScript::from_toml_str(two_kinds, "x.toml").unwrap_err().error_code(),
            "INVALID_INPUT"
        );

        let bad_expr = "title = \"t\"\n[[steps]]\ncheck = \"a >\"\n";
        assert_eq!(
            CalcScript::from_toml_str(bad_expr, "x.toml").unwrap_err().error_code(),
            "EXPRESSION_ERROR"
        );

        let missing_table = "title = \"t\"\n[[steps]]\nlookup = \"nope\"\nkey = \"1\"\n";
        assert_eq!(
            CalcScript::from_toml_str(missing_table, "x.toml").unwrap_err().error_code(),
            "UNKNOWN_NAME"
        );

        let ragged = "title = \"t\"\n[tables.t]\ncolumns = [\"a\"]\nrows = [[1, 2, 3]]\n";
        assert_eq!(
            CalcScript::from_toml_str(ragged, "x.toml").unwrap_err().error_code(),
            "INVALID_INPUT"
        );

        let two_domains = "title = \"t\"\n[[parameters]]\nname = \"x\"\nboolean = true\nfixed = 1\n";
        assert_eq!(
            CalcScript::from_toml_str(two_domains, "x.toml").unwrap_err().error_code(),
            "INVALID_INPUT"
        );

        assert_eq!(
            CalcScript::load("/nonexistent/calc.toml").unwrap_err().error_code(),
            "CONFIG_ERROR"
        );
    }

    #[test]
    fn test_precision_is_bounded() {
        let huge = "title = \"t\"\nresult = \"Tr\"\nprecision = 3000000000\n[[steps]]\nrecord = \"80\"\n";
        assert_eq!(
            CalcScript::from_toml_str(huge, "x.toml").unwrap_err().error_code(),
            "INVALID_INPUT"
        );

        let zero = "title = \"t\"\nprecision = 0\n";
        assert_eq!(
            CalcScript::from_toml_str(zero, "x.toml").unwrap_err().error_code(),
            "INVALID_INPUT"
        );

        let five = "title = \"t\"\nprecision = 5\n";
        assert_eq!(CalcScript::from_toml_str(five, "x.toml").unwrap().session_config().precision, 5);
    }

    #[test]
    fn test_scope_exports_names() {
        let src = r#"
title = "Export"
result = "Tr"

[[steps]]
scope = "n = 2"
label = "Shear"
export = "area"

[[steps.steps]]
set = "area = n * 10, scratch = 1, Tr = area * 5"

[[steps]]
record = "area"
label = "Area"
"#;
        let script = CalcScript::from_toml_str(src, "export.toml").unwrap();
        let params = script.parameters().unwrap();
        let outcome = run(&script, &params);
        let summary = outcome.summary().unwrap();
        assert_eq!(summary.records[0].value, Value::Number(100.0));
        assert_eq!(summary.records[1].value, Value::Number(20.0));
        assert_eq!(summary.governing_records()[0].label, "Area");

        let misplaced = "title = \"t\"\n[[steps]]\nnote = \"a\"\nexport = \"x\"\n";
        assert_eq!(
            CalcScript::from_toml_str(misplaced, "x.toml").unwrap_err().error_code(),
            "INVALID_INPUT"
        );
        let not_a_name = "title = \"t\"\n[[steps]]\nscope = \"n = 1\"\nexport = \"a + b\"\n";
        assert_eq!(
            CalcScript::from_toml_str(not_a_name, "x.toml").unwrap_err().error_code(),
            "EXPRESSION_ERROR"
        );
    }

    #[test]
    fn test_parameter_defaults_and_options() {
        let src = r#"
title = "Params"

[[parameters]]
name = "hole"
options = [["punched", 2], ["drilled", 0]]
description = "Hole fabrication"

[[parameters]]
name = "threads"
boolean = true

[[parameters]]
name = "phi"
fixed = 0.9
"#;
        let script = CalcScript::from_toml_str(src, "p.toml").unwrap();
        let mut params = script.parameters().unwrap();
        assert_eq!(params.get("hole").unwrap().current(), &Value::Number(2.0));
        assert_eq!(params.get("threads").unwrap().current(), &Value::Bool(false));
        assert_eq!(params.get("phi").unwrap().current(), &Value::Number(0.9));
        params.set_from_text("hole", "drilled").unwrap();
        assert_eq!(params.get("hole").unwrap().current(), &Value::Number(0.0));
    }
}
