//! Calculation driver.
//!
//! A [`Calculation`] declares its parameters and session settings and does
//! its work in `compute`, writing to the namespace and the ledger it is
//! handed. [`run_calculation`] owns the run lifecycle: fresh session, current
//! parameter values injected into a new namespace, compute, resolve, report.
//!
//! ```rust
//! use check_core::calculation::{run_calculation, Calculation, RunOutcome};
//! use check_core::errors::CalcResult;
//! use check_core::ledger::{Context, SessionConfig, VerificationSession};
//! use check_core::namespace::Namespace;
//! use check_core::parameters::{Domain, ParameterSet};
//!
//! struct ThreeModes;
//!
//! impl Calculation for ThreeModes {
//!     fn title(&self) -> String {
//!         "Three failure modes".into()
//!     }
//!
//!     fn parameters(&self) -> CalcResult<ParameterSet> {
//!         let mut params = ParameterSet::new();
//!         params.declare("scale", Domain::range(0.5, 2.0, 0.5), 1.0)?;
//!         Ok(params)
//!     }
//!
//!     fn session_config(&self) -> SessionConfig {
//!         SessionConfig::for_result("Tr")
//!     }
//!
//!     fn compute(&self, ns: &mut Namespace, session: &mut VerificationSession) -> CalcResult<()> {
//!         let k = ns.number("scale")?;
//!         session.record(100.0 * k, "A", Context::new())?;
//!         session.record(80.0 * k, "B", Context::new())?;
//!         session.record(120.0 * k, "C", Context::new())?;
//!         Ok(())
//!     }
//! }
//!
//! let calc = ThreeModes;
//! let params = calc.parameters()?;
//! match run_calculation(&calc, &params, calc.session_config())? {
//!     RunOutcome::Completed(summary) => assert!(summary.report.ends_with("Tr = 80\n")),
//!     RunOutcome::Aborted { error, .. } => panic!("{error}"),
//! }
//! # Ok::<(), check_core::errors::CalcError>(())
//! ```

use tracing::{info, warn};

use crate::errors::{CalcError, CalcResult};
use crate::ledger::{SessionConfig, VerificationSession};
use crate::namespace::Namespace;
use crate::parameters::ParameterSet;
use crate::report::Summary;

/// A verification procedure run by the engine
pub trait Calculation {
    /// Title shown in the report heading
    fn title(&self) -> String;

    /// Declared inputs with their defaults
    fn parameters(&self) -> CalcResult<ParameterSet>;

    /// Result variable, unit, selector and display settings
    fn session_config(&self) -> SessionConfig;

    /// Evaluate the design. Fatal requirements are propagated with `?`.
    fn compute(&self, ns: &mut Namespace, session: &mut VerificationSession) -> CalcResult<()>;
}

/// How a run ended
#[derive(Debug)]
pub enum RunOutcome {
    /// Every step ran; the report is available
    Completed(Box<Summary>),
    /// A requirement failed. No report is produced; the session holds what
    /// was recorded before the failure.
    Aborted {
        error: CalcError,
        session: Box<VerificationSession>,
    },
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }

    pub fn summary(&self) -> Option<&Summary> {
        match self {
            RunOutcome::Completed(summary) => Some(summary.as_ref()),
            RunOutcome::Aborted { .. } => None,
        }
    }
}

/// Run `calc` with `params` in a new session built from `config`
pub fn run_calculation(
    calc: &dyn Calculation,
    params: &ParameterSet,
    config: SessionConfig,
) -> CalcResult<RunOutcome> {
    run_in_session(calc, params, VerificationSession::new(config))
}

/// Run `calc` in a caller supplied session (e.g. one with a custom trace sink).
///
/// The session is reset first. Errors other than a failed requirement are
/// returned as `Err`.
pub fn run_in_session(
    calc: &dyn Calculation,
    params: &ParameterSet,
    mut session: VerificationSession,
) -> CalcResult<RunOutcome> {
    if session.config().title.is_empty() {
        session.config_mut().title = calc.title();
    }
    session.begin_run();

    let mut ns = params.to_namespace();
    match calc.compute(&mut ns, &mut session) {
        Ok(()) => {
            let summary = Summary::from_session(&session, params)?;
            info!(
                run_id = %summary.run_id,
                records = summary.records.len(),
                checks_passed = summary.all_checks_passed,
                "verification run completed"
            );
            Ok(RunOutcome::Completed(Box::new(summary)))
        }
        Err(error) if error.is_fatal() => {
            warn!(run_id = %session.run_id(), error = %error, "verification run aborted");
            Ok(RunOutcome::Aborted {
                error,
                session: Box::new(session),
            })
        }
        Err(error) => Err(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Context;
    use crate::parameters::Domain;

    struct Abc {
        fail_after_a: bool,
    }

    impl Calculation for Abc {
        fn title(&self) -> String {
            "ABC".into()
        }

        fn parameters(&self) -> CalcResult<ParameterSet> {
            let mut params = ParameterSet::new();
            params.declare("B", Domain::values([80.0, 90.0]), 80.0)?;
            Ok(params)
        }

        fn session_config(&self) -> SessionConfig {
            SessionConfig::for_result("Tr")
        }

        fn compute(&self, ns: &mut Namespace, session: &mut VerificationSession) -> CalcResult<()> {
            session.record(100.0, "A", Context::new())?;
            session.require(!self.fail_after_a, "stop here", Context::new())?;
            session.record(ns.number("B")?, "B", Context::new())?;
            session.record(120.0, "C", Context::new())?;
            Ok(())
        }
    }

    #[test]
    fn test_completed_run() {
        let calc = Abc { fail_after_a: false };
        let params = calc.parameters().unwrap();
        let outcome = run_calculation(&calc, &params, calc.session_config()).unwrap();
        let summary = outcome.summary().unwrap();
        assert_eq!(summary.title, "ABC");
        assert_eq!(summary.governing.as_ref().unwrap().indices, vec![1]);
        assert!(summary.report.contains("B: Tr = 80    <<<--- GOVERNS"));
    }

    #[test]
    fn test_overrides_reach_compute() {
        let calc = Abc { fail_after_a: false };
        let mut params = calc.parameters().unwrap();
        params.override_value("B", 90.0).unwrap();
        let outcome = run_calculation(&calc, &params, calc.session_config()).unwrap();
        let summary = outcome.summary().unwrap();
        assert_eq!(summary.governing.as_ref().unwrap().value.as_number(), Some(90.0));
    }

    #[test]
    fn test_aborted_run_keeps_session() {
        let calc = Abc { fail_after_a: true };
        let params = calc.parameters().unwrap();
        match run_calculation(&calc, &params, calc.session_config()).unwrap() {
            RunOutcome::Aborted { error, session } => {
                assert_eq!(error.to_string(), "FATAL!! stop here: ");
                assert_eq!(session.records().len(), 1);
            }
            RunOutcome::Completed(_) => panic!("expected an aborted run"),
        }
    }

    #[test]
    fn test_usage_errors_propagate() {
        struct Broken;
        impl Calculation for Broken {
            fn title(&self) -> String {
                String::new()
            }
            fn parameters(&self) -> CalcResult<ParameterSet> {
                Ok(ParameterSet::new())
            }
            fn session_config(&self) -> SessionConfig {
                SessionConfig::for_result("Tr")
            }
            fn compute(&self, ns: &mut Namespace, _: &mut VerificationSession) -> CalcResult<()> {
                ns.require("missing")?;
                Ok(())
            }
        }

        let err = run_calculation(&Broken, &ParameterSet::new(), Broken.session_config()).unwrap_err();
        assert_eq!(err, CalcError::unknown_name("missing"));
    }

    #[test]
    fn test_failed_check_then_failed_requirement() {
        struct Mixed;
        impl Calculation for Mixed {
            fn title(&self) -> String {
                "Mixed".into()
            }
            fn parameters(&self) -> CalcResult<ParameterSet> {
                Ok(ParameterSet::new())
            }
            fn session_config(&self) -> SessionConfig {
                SessionConfig::for_result("Tr")
            }
            fn compute(&self, _: &mut Namespace, session: &mut VerificationSession) -> CalcResult<()> {
                session.require(true, "never shown", Context::new())?;
                session.check(false, "Pitch", Context::new().with("pitch", 40.0));
                session.require(false, "Bolt too large", Context::new().with("d", 36.0))?;
                session.record(100.0, "Unreachable", Context::new())?;
                Ok(())
            }
        }

        match run_calculation(&Mixed, &ParameterSet::new(), Mixed.session_config()).unwrap() {
            RunOutcome::Aborted { error, session } => {
                assert_eq!(error, CalcError::requirement_failed("Bolt too large", "d=36"));
                assert_eq!(session.checks().len(), 1);
                assert_eq!(session.checks()[0].label, "Pitch");
                assert!(!session.checks()[0].passed);
                assert!(session.records().is_empty());
            }
            RunOutcome::Completed(_) => panic!("expected an aborted run"),
        }
    }

    #[test]
    fn test_nothing_recorded_is_empty_result_set() {
        struct Silent;
        impl Calculation for Silent {
            fn title(&self) -> String {
                "Silent".into()
            }
            fn parameters(&self) -> CalcResult<ParameterSet> {
                Ok(ParameterSet::new())
            }
            fn session_config(&self) -> SessionConfig {
                SessionConfig::for_result("Tr")
            }
            fn compute(&self, _: &mut Namespace, session: &mut VerificationSession) -> CalcResult<()> {
                session.note("nothing to record");
                Ok(())
            }
        }

        let err = run_calculation(&Silent, &ParameterSet::new(), Silent.session_config()).unwrap_err();
        assert_eq!(err.error_code(), "EMPTY_RESULT_SET");
    }
}
