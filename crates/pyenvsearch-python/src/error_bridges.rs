//! Conversions from this crate's errors into [`PyEnvError`].
//!
//! The CLI only ever renders `PyEnvError`; these impls decide which exit
//! code each failure gets.

use pyenvsearch_core::error::PyEnvError;

use crate::entities::NavigatorError;
use crate::env::PythonEnvError;
use crate::inspect::InspectError;
use crate::outline::OutlineError;
use crate::packages::PackageError;
use crate::search::SearchError;

// ============================================================================
// Bridge: PythonEnvError -> PyEnvError
// ============================================================================

impl From<PythonEnvError> for PyEnvError {
    fn from(err: PythonEnvError) -> Self {
        match err {
            PythonEnvError::EnvironmentNotFound { .. } => {
                let message = err.to_string();
                // First line repeats "no Python environment found".
                let detail = message
                    .split_once('\n')
                    .map(|(_, rest)| rest.trim_start_matches('\n').trim_end().to_string())
                    .unwrap_or(message);
                PyEnvError::not_found_with_detail("environment", "python", detail)
            }
            PythonEnvError::InvalidEnvironment { path, reason } => {
                PyEnvError::not_found_with_detail("environment", path.display().to_string(), reason)
            }
            PythonEnvError::ExecutionFailed { path, reason } => PyEnvError::ToolFailure {
                tool: path.display().to_string(),
                message: reason,
                exit_code: None,
                stderr: String::new(),
            },
            PythonEnvError::InvalidVersion { version } => {
                PyEnvError::internal(format!("unparsable Python version: {}", version))
            }
            PythonEnvError::Io(e) => PyEnvError::from(e),
            PythonEnvError::Json(e) => PyEnvError::from(e),
        }
    }
}

// ============================================================================
// Bridge: PackageError -> PyEnvError
// ============================================================================

impl From<PackageError> for PyEnvError {
    fn from(err: PackageError) -> Self {
        match err {
            PackageError::NotFound { name, detail } => PyEnvError::NotFound {
                what: "package".to_string(),
                name,
                detail,
            },
            PackageError::InvalidName { name } => {
                PyEnvError::invalid_args(format!("invalid package name: {}", name))
            }
        }
    }
}

// ============================================================================
// Bridge: SearchError -> PyEnvError
// ============================================================================

impl From<SearchError> for PyEnvError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::BadPattern { pattern, reason } => PyEnvError::BadPattern { pattern, reason },
            SearchError::MissingRoot(path) => PyEnvError::not_found("path", path.display().to_string()),
            SearchError::ToolFailed { tool, message } => PyEnvError::ToolFailure {
                tool,
                message,
                exit_code: None,
                stderr: String::new(),
            },
        }
    }
}

// ============================================================================
// Bridge: NavigatorError / OutlineError -> PyEnvError
// ============================================================================

impl From<NavigatorError> for PyEnvError {
    fn from(err: NavigatorError) -> Self {
        match err {
            NavigatorError::NotFound {
                what,
                name,
                files_searched,
            } => PyEnvError::not_found_with_detail(
                what,
                name,
                format!("searched {} files", files_searched),
            ),
            NavigatorError::MissingRoot(path) => {
                PyEnvError::not_found("path", path.display().to_string())
            }
        }
    }
}

impl From<OutlineError> for PyEnvError {
    fn from(err: OutlineError) -> Self {
        match err {
            OutlineError::Syntax { line } => {
                PyEnvError::invalid_args(format!("cannot parse module: syntax error near line {}", line))
            }
            OutlineError::Io(e) => PyEnvError::from(e),
            other => PyEnvError::internal(other.to_string()),
        }
    }
}

// ============================================================================
// Bridge: InspectError -> PyEnvError
// ============================================================================

impl From<InspectError> for PyEnvError {
    fn from(err: InspectError) -> Self {
        match err {
            InspectError::InvalidTarget { .. } => PyEnvError::invalid_args(err.to_string()),
            InspectError::TargetNotFound { target, message } => {
                PyEnvError::not_found_with_detail("object", target, message)
            }
            InspectError::NoInterpreter { target } => PyEnvError::tool_unavailable(
                "python",
                format!("no interpreter in the environment to import {}", target),
            ),
            InspectError::ProbeFailed {
                message,
                exit_code,
                stderr,
            } => PyEnvError::ToolFailure {
                tool: "python".to_string(),
                message,
                exit_code,
                stderr,
            },
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{ResolutionStep, ResolutionTrace};
    use std::path::PathBuf;

    #[test]
    fn environment_not_found_keeps_trace() {
        let mut trace = ResolutionTrace::new();
        trace.add(ResolutionStep::not_set("$VIRTUAL_ENV"));
        let err: PyEnvError = PythonEnvError::EnvironmentNotFound { trace }.into();
        assert_eq!(err.error_code().code(), 1);
        let msg = err.to_string();
        assert!(msg.starts_with("environment not found: python\n"));
        assert!(msg.contains("$VIRTUAL_ENV"));
        assert!(msg.contains("Remediation"));
    }

    #[test]
    fn package_errors() {
        let err: PyEnvError = PackageError::NotFound {
            name: "nonexistent_pkg_xyz".to_string(),
            detail: None,
        }
        .into();
        assert_eq!(err.error_code().code(), 1);
        assert_eq!(err.to_string(), "package not found: nonexistent_pkg_xyz");

        let err: PyEnvError = PackageError::InvalidName {
            name: "a b".to_string(),
        }
        .into();
        assert_eq!(err.error_code().code(), 2);
    }

    #[test]
    fn search_errors() {
        let err: PyEnvError = SearchError::BadPattern {
            pattern: "(".to_string(),
            reason: "unclosed group".to_string(),
        }
        .into();
        assert_eq!(err.error_code().code(), 2);
        assert_eq!(err.kind(), "bad_pattern");

        let err: PyEnvError = SearchError::MissingRoot(PathBuf::from("/nope")).into();
        assert_eq!(err.error_code().code(), 1);
    }

    #[test]
    fn navigator_not_found() {
        let err: PyEnvError = NavigatorError::NotFound {
            what: "class",
            name: "Missing".to_string(),
            files_searched: 4,
        }
        .into();
        assert_eq!(err.error_code().code(), 1);
        assert_eq!(err.to_string(), "class not found: Missing (searched 4 files)");
    }

    #[test]
    fn inspect_errors() {
        let not_found: PyEnvError = InspectError::TargetNotFound {
            target: "nope".to_string(),
            message: "ModuleNotFoundError: No module named 'nope'".to_string(),
        }
        .into();
        assert_eq!(not_found.error_code().code(), 1);

        let invalid: PyEnvError = InspectError::InvalidTarget {
            target: "a..b".to_string(),
            reason: "bad".to_string(),
        }
        .into();
        assert_eq!(invalid.error_code().code(), 2);

        let failed: PyEnvError = InspectError::ProbeFailed {
            message: "exited with status 1".to_string(),
            exit_code: Some(1),
            stderr: "Traceback".to_string(),
        }
        .into();
        assert_eq!(failed.error_code().code(), 3);

        let missing: PyEnvError = InspectError::NoInterpreter {
            target: "json".to_string(),
        }
        .into();
        assert_eq!(missing.error_code().code(), 3);
    }
}
