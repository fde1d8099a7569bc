//! Error types and exit codes for pyenvsearch.
//!
//! `PyEnvError` is the single error type rendered by the CLI. Subsystem errors
//! (environment resolution, package lookup, search, inspection, LLM bridge)
//! are converted into it with `From` impls living next to the subsystem.
//!
//! ## Exit Codes
//!
//! - `1`: Not found (environment, package, class, method, inspection target)
//! - `2`: Invalid arguments or a malformed search pattern
//! - `3`: External tool unavailable or failed (LLM CLI, interpreter probe)
//! - `10`: Internal errors (I/O, unexpected state)

use std::fmt;

use thiserror::Error;

// ============================================================================
// Output Error Codes
// ============================================================================

/// Process exit codes, also reported in JSON error metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OutputErrorCode {
    /// Something the caller asked for does not exist.
    NotFound = 1,
    /// Bad input from the caller (flags, patterns, environment values).
    InvalidArguments = 2,
    /// An external binary was missing, exited non-zero, or timed out.
    ExternalToolFailure = 3,
    /// Bugs and unexpected I/O failures.
    InternalError = 10,
}

impl OutputErrorCode {
    /// Get the numeric code value.
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for OutputErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ============================================================================
// Unified Error Type
// ============================================================================

/// Unified error type for CLI output.
#[derive(Debug, Error)]
pub enum PyEnvError {
    /// Invalid arguments from caller.
    #[error("invalid arguments: {message}")]
    InvalidArguments { message: String },

    /// A search pattern that does not compile.
    #[error("bad pattern '{pattern}': {reason}")]
    BadPattern { pattern: String, reason: String },

    /// An environment, package, class, method or object that does not exist.
    #[error("{}", format_not_found(.what, .name, .detail))]
    NotFound {
        what: String,
        name: String,
        detail: Option<String>,
    },

    /// An external binary the operation needs is not installed.
    #[error("{tool} unavailable: {message}")]
    ToolUnavailable { tool: String, message: String },

    /// An external binary ran but failed or timed out.
    #[error("{}", format_tool_failure(.tool, .message, .stderr))]
    ToolFailure {
        tool: String,
        message: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// Internal error (bug or unexpected state).
    #[error("internal error: {message}")]
    Internal { message: String },
}

fn format_not_found(what: &str, name: &str, detail: &Option<String>) -> String {
    match detail {
        Some(detail) if detail.contains('\n') => format!("{} not found: {}\n{}", what, name, detail),
        Some(detail) => format!("{} not found: {} ({})", what, name, detail),
        None => format!("{} not found: {}", what, name),
    }
}

fn format_tool_failure(tool: &str, message: &str, stderr: &str) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("{} failed: {}", tool, message)
    } else {
        format!("{} failed: {}\n{}", tool, message, stderr)
    }
}

// ============================================================================
// Error Code Mapping
// ============================================================================

impl From<&PyEnvError> for OutputErrorCode {
    fn from(err: &PyEnvError) -> Self {
        match err {
            PyEnvError::InvalidArguments { .. } => OutputErrorCode::InvalidArguments,
            PyEnvError::BadPattern { .. } => OutputErrorCode::InvalidArguments,
            PyEnvError::NotFound { .. } => OutputErrorCode::NotFound,
            PyEnvError::ToolUnavailable { .. } => OutputErrorCode::ExternalToolFailure,
            PyEnvError::ToolFailure { .. } => OutputErrorCode::ExternalToolFailure,
            PyEnvError::Internal { .. } => OutputErrorCode::InternalError,
        }
    }
}

impl From<PyEnvError> for OutputErrorCode {
    fn from(err: PyEnvError) -> Self {
        OutputErrorCode::from(&err)
    }
}

impl From<std::io::Error> for PyEnvError {
    fn from(err: std::io::Error) -> Self {
        PyEnvError::Internal {
            message: format!("IO error: {}", err),
        }
    }
}

impl From<serde_json::Error> for PyEnvError {
    fn from(err: serde_json::Error) -> Self {
        PyEnvError::Internal {
            message: format!("JSON error: {}", err),
        }
    }
}

// ============================================================================
// Convenience Constructors
// ============================================================================

impl PyEnvError {
    /// Create an invalid arguments error.
    pub fn invalid_args(message: impl Into<String>) -> Self {
        PyEnvError::InvalidArguments {
            message: message.into(),
        }
    }

    /// Create a not-found error for the given kind of thing.
    pub fn not_found(what: impl Into<String>, name: impl Into<String>) -> Self {
        PyEnvError::NotFound {
            what: what.into(),
            name: name.into(),
            detail: None,
        }
    }

    /// Create a not-found error with an explanatory detail.
    pub fn not_found_with_detail(
        what: impl Into<String>,
        name: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        PyEnvError::NotFound {
            what: what.into(),
            name: name.into(),
            detail: Some(detail.into()),
        }
    }

    /// Create a tool-unavailable error.
    pub fn tool_unavailable(tool: impl Into<String>, message: impl Into<String>) -> Self {
        PyEnvError::ToolUnavailable {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        PyEnvError::Internal {
            message: message.into(),
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> OutputErrorCode {
        OutputErrorCode::from(self)
    }

    /// Stable snake_case name of the error category, used in JSON metadata.
    pub fn kind(&self) -> &'static str {
        match self {
            PyEnvError::InvalidArguments { .. } => "invalid_arguments",
            PyEnvError::BadPattern { .. } => "bad_pattern",
            PyEnvError::NotFound { .. } => "not_found",
            PyEnvError::ToolUnavailable { .. } => "tool_unavailable",
            PyEnvError::ToolFailure { .. } => "tool_failure",
            PyEnvError::Internal { .. } => "internal",
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
