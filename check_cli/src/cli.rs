use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "check_cli",
    about = "Limitcheck: run limit-state verifications and print the governing value",
    version
)]
pub struct Cli {
    /// Settings file (default: ./limitcheck.toml if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a calc script and print its report
    Run {
        /// Path to the calc script (TOML)
        script: PathBuf,

        /// Override a parameter, e.g. `--set bolt_size=M22`
        #[arg(long = "set", value_name = "NAME=VALUE")]
        overrides: Vec<String>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// List the parameters a calc script declares
    Params {
        /// Path to the calc script (TOML)
        script: PathBuf,
    },

    /// Run the built-in bolted angle calculation
    Demo {
        /// Override a parameter, e.g. `--set Nrows=4`
        #[arg(long = "set", value_name = "NAME=VALUE")]
        overrides: Vec<String>,

        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(clap::Args, Clone, Debug, Default)]
pub struct OutputArgs {
    /// Print each ledger entry as it is made
    #[arg(long)]
    pub trace: bool,

    /// Output the run summary as JSON
    #[arg(long)]
    pub json: bool,

    /// Include the Parameter Values block
    #[arg(long)]
    pub show_params: bool,
}

/// Split `name=value` on the first `=`
pub fn parse_override(text: &str) -> Option<(&str, &str)> {
    let (name, value) = text.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name, value.trim()))
}
