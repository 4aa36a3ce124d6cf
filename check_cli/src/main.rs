//! # Limitcheck CLI
//!
//! Runs calc scripts (or the built-in demo) through `check_core` and prints
//! the verification report.
//!
//! ```text
//! check_cli run calcs/bolted_angle.toml --set bolt_size=M22 --trace
//! check_cli params calcs/bolted_angle.toml
//! check_cli demo --json
//! ```

mod cli;
mod demo;

use std::process::ExitCode;

use check_core::config::Settings;
use check_core::errors::{CalcError, CalcResult};
use check_core::ledger::{TraceSink, VerificationSession};
use check_core::parameters::ParameterSet;
use check_core::{run_in_session, CalcScript, Calculation, RunOutcome};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use cli::{parse_override, Cli, Commands, OutputArgs};
use demo::BoltedLegAngle;

/// Prints trace entries to stdout as they are made
struct StdoutSink;

impl TraceSink for StdoutSink {
    fn emit(&mut self, entry: &str) {
        println!("{entry}");
    }
}

fn init_logging(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.filter));

    Registry::default()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn status_icon(pass: bool) -> &'static str {
    if pass { "[OK]" } else { "[FAIL]" }
}

fn apply_overrides(params: &mut ParameterSet, overrides: &[String]) -> CalcResult<()> {
    for text in overrides {
        let (name, value) = parse_override(text).ok_or_else(|| {
            CalcError::invalid_input("--set", text.as_str(), "Expected NAME=VALUE")
        })?;
        params.set_from_text(name, value)?;
    }
    Ok(())
}

fn run(calc: &dyn Calculation, overrides: &[String], output: &OutputArgs, settings: &Settings) -> CalcResult<bool> {
    let mut params = calc.parameters()?;
    apply_overrides(&mut params, overrides)?;

    let mut config = calc.session_config();
    settings.apply(&mut config)?;
    config.trace |= output.trace;
    config.show_params |= output.show_params;

    let session = VerificationSession::new(config).with_sink(Box::new(StdoutSink));
    match run_in_session(calc, &params, session)? {
        RunOutcome::Completed(summary) => {
            if output.json {
                let json = serde_json::to_string_pretty(&summary)
                    .map_err(|e| CalcError::invalid_input("summary", "", e.to_string()))?;
                println!("{json}");
            } else {
                print!("{}", summary.report);
                println!();
                println!("{} all checks passed", status_icon(summary.all_checks_passed));
            }
            Ok(true)
        }
        RunOutcome::Aborted { error, session } => {
            if output.json {
                let json = serde_json::to_string_pretty(&error)
                    .map_err(|e| CalcError::invalid_input("error", "", e.to_string()))?;
                println!("{json}");
            }
            eprintln!("{error}");
            eprintln!(
                "{} run {} aborted after {} recorded value(s)",
                status_icon(false),
                session.run_id(),
                session.records().len()
            );
            Ok(false)
        }
    }
}

fn list_parameters(script: &CalcScript) -> CalcResult<()> {
    let params = script.parameters()?;
    println!("{}", script.title());
    println!();
    if params.is_empty() {
        println!("(no parameters)");
        return Ok(());
    }
    let width = params.iter().map(|p| p.name.chars().count()).max().unwrap_or(0);
    for param in params.iter() {
        let mut line = format!("  {:<width$}  {}", param.name, param.domain.describe(), width = width);
        line.push_str(&format!("  [default {}]", param.default));
        if let Some(description) = &param.description {
            line.push_str(&format!("  {description}"));
        }
        println!("{line}");
    }
    Ok(())
}

fn dispatch(cli: Cli, settings: &Settings) -> CalcResult<bool> {
    match cli.command {
        Commands::Run { script: path, overrides, output } => {
            let script = CalcScript::load(&path)?;
            info!(path = %path.display(), title = %script.title(), overrides = overrides.len(), "calc script loaded");
            run(&script, &overrides, &output, settings)
        }
        Commands::Params { script } => {
            list_parameters(&CalcScript::load(&script)?)?;
            Ok(true)
        }
        Commands::Demo { overrides, output } => run(&BoltedLegAngle, &overrides, &output, settings),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::from(2);
        }
    };
    init_logging(&settings);

    match dispatch(cli, &settings) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error [{}]: {}", e.error_code(), e);
            ExitCode::from(2)
        }
    }
}
