//! Settings file.
//!
//! ```toml
//! [session]
//! precision = 4
//! selector = "min"
//! trace = false
//! show_params = true
//!
//! [logging]
//! filter = "check_core=debug"
//! ```
//!
//! Every key is optional. Settings are read from an explicit path, else from
//! `limitcheck.toml` in the working directory, else the defaults apply.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{CalcError, CalcResult};
use crate::format::check_precision;
use crate::ledger::{Selector, SessionConfig};

/// File looked for in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "limitcheck.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub session: SessionSettings,
    pub logging: LoggingSettings,
}

/// Overrides applied on top of a calculation's own session settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionSettings {
    pub precision: Option<u32>,
    pub selector: Option<String>,
    pub trace: Option<bool>,
    pub show_params: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        LoggingSettings {
            filter: "warn".to_string(),
        }
    }
}

impl Settings {
    /// Parse settings from TOML text
    pub fn from_toml_str(src: &str, source_name: &str) -> CalcResult<Self> {
        let settings: Settings = toml::from_str(src).map_err(|err| {
            tracing::warn!("Failed to parse config at {}: {}", source_name, err);
            CalcError::config(source_name, err.to_string())
        })?;
        if let Some(selector) = &settings.session.selector {
            selector
                .parse::<Selector>()
                .map_err(|err| CalcError::config(source_name, err.to_string()))?;
        }
        Ok(settings)
    }

    /// Load from `path`, or from [`DEFAULT_CONFIG_FILE`] if it exists, or
    /// fall back to defaults.
    ///
    /// An explicit path that cannot be read is an error; a missing default
    /// file is not.
    pub fn load(path: Option<&Path>) -> CalcResult<Self> {
        let path: PathBuf = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.exists() {
                    return Ok(Settings::default());
                }
                default
            }
        };

        let name = path.display().to_string();
        let content = std::fs::read_to_string(&path).map_err(|err| {
            tracing::warn!("Failed to read config at {}: {}", name, err);
            CalcError::config(&name, err.to_string())
        })?;
        Self::from_toml_str(&content, &name)
    }

    /// Apply the session overrides to a calculation's settings
    pub fn apply(&self, config: &mut SessionConfig) -> CalcResult<()> {
        let session = &self.session;
        if let Some(precision) = session.precision {
            config.precision = check_precision(precision)?;
        }
        if let Some(selector) = &session.selector {
            config.selector = selector.parse()?;
        }
        if let Some(trace) = session.trace {
            config.trace = trace;
        }
        if let Some(show_params) = session.show_params {
            config.show_params = show_params;
        }
        Ok(())
    }
}
