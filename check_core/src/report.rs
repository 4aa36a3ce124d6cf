//! # Report Rendering
//!
//! Turns a finished [`VerificationSession`] into the plain-text summary an
//! engineer reads, and into a serializable [`Summary`] for tools.
//!
//! ## Layout
//!
//! ```text
//! Summary of Verification for Tr: Bolted leg angle
//! ================================================
//!
//! Notes:
//! ------
//!     - Bolts are M20 A325
//!
//! Checks:
//! -------
//!     Edge distance?   OK
//!       (edge_distance=30, min_edge_distance=28)
//!
//! Values of Tr:
//! -------------
//!     A: Tr = 100
//!     B: Tr = 80    <<<--- GOVERNS
//!     C: Tr = 120
//!
//!     Governing Value:
//!     ----------------
//!        Tr = 80
//! ```
//!
//! Sections with nothing in them are left out. Output is deterministic:
//! entries appear in the order they were made.
//!
//! "Parameter Values" and "Values Used" are part of the report and sit
//! between the heading and "Notes", so the whole summary is one block of
//! text under a single heading.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::CalcResult;
use crate::format::{format_value, CONTEXT_SIGFIGS};
use crate::governing::{resolve, Governing};
use crate::ledger::{CheckRecord, ResultCandidate, VerificationSession};
use crate::namespace::Value;
use crate::parameters::ParameterSet;
use crate::units::Unit;

/// Everything a run produced, plus the rendered report text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub title: String,
    pub result_var: Option<String>,
    pub display_unit: Option<Unit>,
    pub parameters: Vec<(String, Value)>,
    pub values_used: Vec<(String, Value)>,
    pub notes: Vec<String>,
    pub checks: Vec<CheckRecord>,
    pub records: Vec<ResultCandidate>,
    pub governing: Option<Governing>,
    pub all_checks_passed: bool,
    pub report: String,
}

impl Summary {
    /// Resolve the governing value and render the report.
    ///
    /// With a result variable configured and nothing recorded this fails with
    /// `EmptyResultSet`.
    pub fn from_session(session: &VerificationSession, params: &ParameterSet) -> CalcResult<Summary> {
        let config = session.config();
        let governing = match &config.result_var {
            Some(var) => Some(resolve(session.records(), var, config.selector)?),
            None => None,
        };
        let shown = config.show_params.then_some(params);
        let report = render(session, governing.as_ref(), shown);

        Ok(Summary {
            run_id: session.run_id(),
            started_at: session.started_at(),
            title: config.title.clone(),
            result_var: config.result_var.clone(),
            display_unit: config.display_unit,
            parameters: params.current_values(),
            values_used: session.values_used().to_vec(),
            notes: session.notes().to_vec(),
            checks: session.checks().to_vec(),
            records: session.records().to_vec(),
            governing,
            all_checks_passed: session.all_checks_passed(),
            report,
        })
    }

    /// The governing record(s), if any
    pub fn governing_records(&self) -> Vec<&ResultCandidate> {
        match &self.governing {
            Some(gov) => gov.indices.iter().filter_map(|&i| self.records.get(i)).collect(),
            None => Vec::new(),
        }
    }
}

fn underline(out: &mut String, heading: &str, ch: char) {
    out.push_str(heading);
    out.push('\n');
    out.extend(std::iter::repeat(ch).take(heading.chars().count()));
    out.push('\n');
}

/// Render the text report for a session.
///
/// `params` adds the "Parameter Values" block; `governing` adds the
/// `<<<--- GOVERNS` markers and the trailing "Governing Value" block.
pub fn render(session: &VerificationSession, governing: Option<&Governing>, params: Option<&ParameterSet>) -> String {
    let config = session.config();
    let var = config.result_var.as_deref();
    let mut out = String::new();

    let mut heading = String::from("Summary of Verification");
    if let Some(var) = var {
        heading.push_str(&format!(" for {var}"));
    }
    if !config.title.is_empty() {
        heading.push_str(&format!(": {}", config.title));
    }
    underline(&mut out, &heading, '=');
    out.push('\n');

    if let Some(params) = params.filter(|p| !p.is_empty()) {
        out.push_str(&params.render_parameters());
        out.push('\n');
    }

    if !session.values_used().is_empty() {
        underline(&mut out, "Values Used:", '-');
        for (name, value) in session.values_used() {
            out.push_str(&format!("    {} = {}\n", name, format_value(value, CONTEXT_SIGFIGS)));
        }
        out.push('\n');
    }

    if !session.notes().is_empty() {
        underline(&mut out, "Notes:", '-');
        for note in session.notes() {
            out.push_str(&format!("    - {note}\n"));
        }
        out.push('\n');
    }

    if !session.checks().is_empty() {
        underline(&mut out, "Checks:", '-');
        let width = session
            .checks()
            .iter()
            .map(|c| c.label.chars().count())
            .max()
            .unwrap_or(0);
        for check in session.checks() {
            out.push_str(&check.render(width + 2));
            out.push('\n');
        }
        out.push('\n');
    }

    if !session.records().is_empty() || var.is_some() {
        let heading = match var {
            Some(var) => format!("Values of {var}:"),
            None => "Values:".to_string(),
        };
        underline(&mut out, &heading, '-');
        let width = session
            .records()
            .iter()
            .map(|r| r.label.chars().count())
            .max()
            .unwrap_or(0);
        for (i, record) in session.records().iter().enumerate() {
            let governs = governing.is_some_and(|g| g.governs(i));
            let row = record.render(width + 1, var, governs, config.precision);
            out.push_str(row.trim_end());
            out.push('\n');
        }

        if let (Some(var), Some(gov)) = (var, governing) {
            out.push('\n');
            out.push_str("    Governing Value:\n");
            out.push_str("    ----------------\n");
            out.push_str(&format!("       {} = {}\n", var, format_value(&gov.value, config.precision)));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{Context, SessionConfig};
    use crate::parameters::Domain;

    fn abc_session() -> VerificationSession {
        let mut s = VerificationSession::new(SessionConfig::for_result("Tr").with_title("Tension"));
        s.record(100.0, "A", Context::new()).unwrap();
        s.record(80.0, "B", Context::new()).unwrap();
        s.record(120.0, "C", Context::new()).unwrap();
        s
    }

    #[test]
    fn test_abc_report() {
        let s = abc_session();
        let summary = Summary::from_session(&s, &ParameterSet::new()).unwrap();
        let expected = "\
Summary of Verification for Tr: Tension
=======================================

Values of Tr:
-------------
    A: Tr = 100
    B: Tr = 80    <<<--- GOVERNS
    C: Tr = 120

    Governing Value:
    ----------------
       Tr = 80
";
        assert_eq!(summary.report, expected);
        assert!(summary.report.ends_with("Tr = 80\n"));
        assert_eq!(summary.governing_records()[0].label, "B");
    }

    #[test]
    fn test_checks_and_notes_sections() {
        let mut s = VerificationSession::new(SessionConfig::for_result("Tr"));
        s.note("Bolts are M20 A325");
        s.check(
            true,
            "Edge distance",
            Context::new().with("edge_distance", 30.0).with("min_edge_distance", 28.0),
        );
        s.check(false, "Pitch", Context::new().with("p", 50.0));
        s.record(80.0, "B", Context::new()).unwrap();

        let summary = Summary::from_session(&s, &ParameterSet::new()).unwrap();
        let report = &summary.report;
        assert!(report.contains("Notes:\n------\n    - Bolts are M20 A325\n"));
        assert!(report.contains("    Edge distance?   OK\n      (edge_distance=30, min_edge_distance=28)\n"));
        assert!(report.contains("    Pitch?           NG! *****\n      (p=50)\n"));
        assert!(!summary.all_checks_passed);
    }

    #[test]
    fn test_empty_result_set_fails() {
        let s = VerificationSession::new(SessionConfig::for_result("Tr"));
        let err = Summary::from_session(&s, &ParameterSet::new()).unwrap_err();
        assert_eq!(err.error_code(), "EMPTY_RESULT_SET");
    }

    #[test]
    fn test_no_result_var_omits_values_section() {
        let mut s = VerificationSession::new(SessionConfig::default());
        s.note("only notes");
        let summary = Summary::from_session(&s, &ParameterSet::new()).unwrap();
        assert!(summary.governing.is_none());
        assert!(!summary.report.contains("Values"));
        assert!(summary.report.starts_with("Summary of Verification\n=======================\n"));
    }

    #[test]
    fn test_parameter_and_values_used_blocks() {
        let mut params = ParameterSet::new();
        params.declare("d", Domain::values([20.0, 22.0]), 20.0).unwrap();

        let mut config = SessionConfig::for_result("Tr");
        config.show_params = true;
        let mut s = VerificationSession::new(config);
        let ns = params.to_namespace();
        s.use_values(&ns, "d, area = 3.14159 * d^2 / 4").unwrap();
        s.note("Bolts are M20 A325");
        s.record(80.0, "B", Context::new()).unwrap();

        let report = Summary::from_session(&s, &params).unwrap().report;
        assert!(report.contains("Parameter Values:\n-----------------\n    d = 20\n"));
        assert!(report.contains("Values Used:\n------------\n    d = 20\n    area = 314.2\n"));
        let heading_at = report.find("Summary of Verification").unwrap();
        let params_at = report.find("Parameter Values").unwrap();
        let used_at = report.find("Values Used").unwrap();
        let notes_at = report.find("Notes:").unwrap();
        assert_eq!(heading_at, 0);
        assert!(heading_at < params_at && params_at < used_at && used_at < notes_at);
    }

    #[test]
    fn test_precision_applies_to_results() {
        let mut s = VerificationSession::new(SessionConfig::for_result("Tr"));
        s.config_mut().precision = 4;
        s.record(412.3456, "Bolt shear", Context::new()).unwrap();
        let report = Summary::from_session(&s, &ParameterSet::new()).unwrap().report;
        assert!(report.contains("    Bolt shear: Tr = 412.3    <<<--- GOVERNS\n"));
        assert!(report.ends_with("       Tr = 412.3\n"));
    }

    #[test]
    fn test_summary_serializes() {
        let summary = Summary::from_session(&abc_session(), &ParameterSet::new()).unwrap();
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"result_var\":\"Tr\""));
        let back: Summary = serde_json::from_str(&json).unwrap();
        assert_eq!(back.governing, summary.governing);
    }
}
