//! Layered settings: command-line flag, then environment variable, then
//! default. There is no configuration file.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use pyenvsearch_core::error::PyEnvError;

/// Environment variable naming the preferred LLM tool.
pub const LLM_TOOL_VAR: &str = "PYENVSEARCH_LLM_TOOL";

/// Environment variable holding the LLM timeout in seconds.
pub const LLM_TIMEOUT_VAR: &str = "PYENVSEARCH_LLM_TIMEOUT";

/// Default LLM timeout.
pub const DEFAULT_LLM_TIMEOUT: Duration = Duration::from_secs(300);

/// Errors from settings resolution.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value could not be parsed.
    #[error("invalid value {value:?} for {source_name}: {reason}")]
    InvalidValue {
        source_name: String,
        value: String,
        reason: String,
    },
}

impl From<ConfigError> for PyEnvError {
    fn from(err: ConfigError) -> Self {
        PyEnvError::invalid_args(err.to_string())
    }
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct FlagValues {
    pub python: Option<PathBuf>,
    pub venv: Option<PathBuf>,
    pub llm_tool: Option<String>,
    pub llm_timeout_secs: Option<u64>,
}

/// Resolved settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Explicit interpreter (`--python`).
    pub python: Option<PathBuf>,
    /// Explicit environment directory (`--venv`).
    pub venv: Option<PathBuf>,
    /// Preferred LLM tool name, if any.
    pub llm_tool: Option<String>,
    pub llm_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            python: None,
            venv: None,
            llm_tool: None,
            llm_timeout: DEFAULT_LLM_TIMEOUT,
        }
    }
}

impl Settings {
    /// Resolve from flags and the process environment.
    pub fn from_process(flags: FlagValues) -> Result<Self, ConfigError> {
        Self::resolve(flags, |key| std::env::var(key).ok())
    }

    /// Resolve from flags and an environment lookup function.
    pub fn resolve(
        flags: FlagValues,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let env_value = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let llm_tool = flags.llm_tool.or_else(|| env_value(LLM_TOOL_VAR));

        let llm_timeout = match flags.llm_timeout_secs {
            Some(secs) => parse_timeout("--timeout", &secs.to_string())?,
            None => match env_value(LLM_TIMEOUT_VAR) {
                Some(raw) => parse_timeout(LLM_TIMEOUT_VAR, &raw)?,
                None => DEFAULT_LLM_TIMEOUT,
            },
        };

        Ok(Settings {
            python: flags.python,
            venv: flags.venv,
            llm_tool,
            llm_timeout,
        })
    }
}

fn parse_timeout(source_name: &str, raw: &str) -> Result<Duration, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidValue {
        source_name: source_name.to_string(),
        value: raw.to_string(),
        reason: reason.to_string(),
    };
    let secs: u64 = raw
        .parse()
        .map_err(|_| invalid("expected a whole number of seconds"))?;
    if secs == 0 {
        return Err(invalid("timeout must be at least 1 second"));
    }
    Ok(Duration::from_secs(secs))
}

// ============================================================================
// Tests
// ============================================================================
