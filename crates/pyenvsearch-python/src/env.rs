//! Python environment discovery.
//!
//! Locates the environment whose packages the other commands navigate.
//!
//! ## Resolution Order
//!
//! 1. Explicit `--python <interpreter>` or `--venv <dir>` flag
//! 2. `$PYENVSEARCH_PYTHON` environment variable
//! 3. `$VIRTUAL_ENV` (user's active venv)
//! 4. `$CONDA_PREFIX` (user's active conda environment)
//! 5. `.venv` / `venv` in the current directory or any ancestor
//! 6. `python3` / `python` from `$PATH`
//!
//! Steps 1-5 are answered by probing the filesystem (`pyvenv.cfg`,
//! `lib/python3.*/site-packages`). Only when an environment has no
//! site-packages directory on disk, or for the `$PATH` interpreter, is the
//! interpreter itself asked where its packages live.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use pyenvsearch_core::process::{find_executable, is_executable, run_command, CommandSpec};

use crate::metadata::{scan_distributions, InstalledPackage};

// ============================================================================
// Resolution Trace
// ============================================================================

/// A single step in the resolution process.
#[derive(Debug, Clone)]
pub struct ResolutionStep {
    /// Source being checked (e.g., "$VIRTUAL_ENV", "$PATH").
    pub source: String,
    /// What was found (if anything).
    pub found: Option<PathBuf>,
    /// Why this step failed.
    pub failure_reason: String,
}

impl ResolutionStep {
    /// The source was not configured (env var not set, flag not given).
    pub fn not_set(source: impl Into<String>) -> Self {
        ResolutionStep {
            source: source.into(),
            found: None,
            failure_reason: "not set".to_string(),
        }
    }

    /// Nothing usable was found for the source.
    pub fn not_found(source: impl Into<String>) -> Self {
        ResolutionStep {
            source: source.into(),
            found: None,
            failure_reason: "not found".to_string(),
        }
    }

    /// Something was found but rejected.
    pub fn rejected(source: impl Into<String>, path: PathBuf, reason: impl Into<String>) -> Self {
        ResolutionStep {
            source: source.into(),
            found: Some(path),
            failure_reason: reason.into(),
        }
    }
}

impl std::fmt::Display for ResolutionStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: ", self.source)?;
        if let Some(ref path) = self.found {
            write!(f, "found {} - {}", path.display(), self.failure_reason)
        } else {
            write!(f, "{}", self.failure_reason)
        }
    }
}

/// Trace of all resolution steps attempted.
#[derive(Debug, Clone, Default)]
pub struct ResolutionTrace {
    pub steps: Vec<ResolutionStep>,
}

impl ResolutionTrace {
    pub fn new() -> Self {
        ResolutionTrace { steps: Vec::new() }
    }

    pub fn add(&mut self, step: ResolutionStep) {
        self.steps.push(step);
    }

    /// Format the trace for display, one numbered step per line.
    pub fn format_trace(&self) -> String {
        let mut output = String::new();
        for (i, step) in self.steps.iter().enumerate() {
            output.push_str(&format!("  {}. {}\n", i + 1, step));
        }
        output
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during environment discovery.
#[derive(Debug, Error)]
pub enum PythonEnvError {
    /// No environment could be located.
    #[error("{}", format_environment_not_found(.trace))]
    EnvironmentNotFound { trace: ResolutionTrace },

    /// An explicitly requested interpreter or directory is unusable.
    #[error("invalid environment {path}: {reason}")]
    InvalidEnvironment { path: PathBuf, reason: String },

    /// Failed to execute the interpreter.
    #[error("failed to execute Python at {path}: {reason}")]
    ExecutionFailed { path: PathBuf, reason: String },

    /// Invalid Python version string.
    #[error("invalid Python version string: {version}")]
    InvalidVersion { version: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON deserialization error (interpreter query output).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn format_environment_not_found(trace: &ResolutionTrace) -> String {
    let mut msg = String::from("no Python environment found\n\nResolution attempted:\n");
    msg.push_str(&trace.format_trace());
    msg.push_str("\nRemediation:\n");
    msg.push_str("  a) Activate a virtual environment (source .venv/bin/activate)\n");
    msg.push_str("  b) Point at one explicitly: pyenvsearch --venv /path/to/venv ...\n");
    msg.push_str("  c) Or at an interpreter: export PYENVSEARCH_PYTHON=/path/to/python3\n");
    msg
}

/// Result type for environment operations.
pub type PythonEnvResult<T> = Result<T, PythonEnvError>;

// ============================================================================
// Python Version
// ============================================================================

/// Parsed Python version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PythonVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl PythonVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        PythonVersion {
            major,
            minor,
            patch,
        }
    }

    /// Parse a version string like "3.11.4", "Python 3.11.4" or "3.12.0rc1".
    pub fn parse(version_str: &str) -> PythonEnvResult<Self> {
        let version_str = version_str
            .strip_prefix("Python ")
            .unwrap_or(version_str)
            .trim();
        let invalid = || PythonEnvError::InvalidVersion {
            version: version_str.to_string(),
        };

        let parts: Vec<&str> = version_str.split('.').collect();
        if parts.len() < 2 {
            return Err(invalid());
        }

        let major = parts[0].parse::<u32>().map_err(|_| invalid())?;
        let minor = parts[1].parse::<u32>().map_err(|_| invalid())?;

        // Patch might carry a suffix like "4+" or "0rc1"
        let patch_digits: String = parts
            .get(2)
            .unwrap_or(&"0")
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        let patch = patch_digits.parse::<u32>().unwrap_or(0);

        Ok(PythonVersion::new(major, minor, patch))
    }
}

impl std::fmt::Display for PythonVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

// ============================================================================
// Resolution Source
// ============================================================================

/// Where the environment was resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    /// From the `--python` flag.
    CliPython,
    /// From the `--venv` flag.
    CliVenv,
    /// From `$PYENVSEARCH_PYTHON`.
    EnvPyenvsearchPython,
    /// From `$VIRTUAL_ENV`.
    VirtualEnv,
    /// From `$CONDA_PREFIX`.
    CondaPrefix,
    /// From a `.venv`/`venv` directory near the working directory.
    LocalVenv,
    /// From `python3`/`python` in `$PATH`.
    Path,
}

impl std::fmt::Display for ResolutionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolutionSource::CliPython => write!(f, "--python flag"),
            ResolutionSource::CliVenv => write!(f, "--venv flag"),
            ResolutionSource::EnvPyenvsearchPython => write!(f, "$PYENVSEARCH_PYTHON"),
            ResolutionSource::VirtualEnv => write!(f, "$VIRTUAL_ENV"),
            ResolutionSource::CondaPrefix => write!(f, "$CONDA_PREFIX"),
            ResolutionSource::LocalVenv => write!(f, "local venv"),
            ResolutionSource::Path => write!(f, "$PATH"),
        }
    }
}

// ============================================================================
// Environment Info
// ============================================================================

/// A located Python environment.
///
/// Built fresh per command and passed by reference to the components that
/// need it; nothing here is cached across runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    /// Interpreter path, if one exists for this environment.
    pub interpreter: Option<PathBuf>,
    /// Environment prefix (venv or conda directory).
    pub prefix: Option<PathBuf>,
    /// Where the environment was found.
    pub source: ResolutionSource,
    /// Python version, from `pyvenv.cfg` or the interpreter.
    pub version: Option<PythonVersion>,
    /// Site-packages directories, in lookup order.
    pub site_packages: Vec<PathBuf>,
    /// Installed distributions, sorted by normalized name.
    pub packages: Vec<InstalledPackage>,
}

impl EnvironmentInfo {
    /// Find an installed distribution by (normalized) name.
    pub fn distribution(&self, name: &str) -> Option<&InstalledPackage> {
        let wanted = normalize_distribution_name(name);
        self.packages
            .iter()
            .find(|pkg| normalize_distribution_name(&pkg.name) == wanted)
    }
}

/// Normalize a distribution name per PEP 503 (`Foo.Bar_baz` == `foo-bar-baz`).
pub fn normalize_distribution_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_dash = false;
    for c in name.chars() {
        if c == '-' || c == '_' || c == '.' {
            if !last_dash {
                out.push('-');
            }
            last_dash = true;
        } else {
            out.extend(c.to_lowercase());
            last_dash = false;
        }
    }
    out
}

// ============================================================================
// Locate Options
// ============================================================================

/// Environment variables consulted during resolution.
///
/// Captured once by the caller so resolution stays a pure function of its
/// inputs and can be tested without touching the process environment.
#[derive(Debug, Clone, Default)]
pub struct EnvVars {
    pub pyenvsearch_python: Option<PathBuf>,
    pub virtual_env: Option<PathBuf>,
    pub conda_prefix: Option<PathBuf>,
}

impl EnvVars {
    /// Read the relevant variables from the current process.
    pub fn from_process() -> Self {
        let read = |key: &str| {
            std::env::var_os(key)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        };
        EnvVars {
            pyenvsearch_python: read("PYENVSEARCH_PYTHON"),
            virtual_env: read("VIRTUAL_ENV"),
            conda_prefix: read("CONDA_PREFIX"),
        }
    }
}

/// Options for locating an environment.
#[derive(Debug, Clone, Default)]
pub struct LocateOptions {
    /// Explicit interpreter (from `--python`).
    pub python: Option<PathBuf>,
    /// Explicit environment directory (from `--venv`).
    pub venv: Option<PathBuf>,
    /// Directory where the local `.venv` search starts.
    pub cwd: PathBuf,
    /// Captured environment variables.
    pub env: EnvVars,
    /// Whether to fall back to a `$PATH` interpreter.
    pub search_path: bool,
}

impl LocateOptions {
    /// Options for the current process: real env vars, current directory.
    pub fn from_process() -> Self {
        LocateOptions {
            python: None,
            venv: None,
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env: EnvVars::from_process(),
            search_path: true,
        }
    }
}

// ============================================================================
// Platform Constants
// ============================================================================

/// Platform-specific Python binary names.
#[cfg(windows)]
pub(crate) const PYTHON_NAMES: &[&str] = &["python.exe", "python3.exe"];

#[cfg(not(windows))]
pub(crate) const PYTHON_NAMES: &[&str] = &["python3", "python"];

/// Platform-specific directory holding a venv's executables.
#[cfg(windows)]
pub(crate) const VENV_BIN_DIR: &str = "Scripts";

#[cfg(not(windows))]
pub(crate) const VENV_BIN_DIR: &str = "bin";

/// Directory names checked for a project-local environment.
const LOCAL_VENV_NAMES: &[&str] = &[".venv", "venv"];

/// Timeout for interpreter queries.
const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Resolution
// ============================================================================

/// Locate a Python environment following the resolution order.
pub fn locate_environment(options: &LocateOptions) -> PythonEnvResult<EnvironmentInfo> {
    let mut trace = ResolutionTrace::new();

    // 1. Explicit flags fail hard: the user asked for something specific.
    if let Some(ref python) = options.python {
        return env_from_interpreter(python, ResolutionSource::CliPython).map_err(|step| {
            PythonEnvError::InvalidEnvironment {
                path: python.clone(),
                reason: step.failure_reason,
            }
        });
    }
    if let Some(ref venv) = options.venv {
        return env_from_prefix(venv, ResolutionSource::CliVenv).map_err(|step| {
            PythonEnvError::InvalidEnvironment {
                path: venv.clone(),
                reason: step.failure_reason,
            }
        });
    }
    trace.add(ResolutionStep::not_set("--python/--venv flags"));

    // 2. $PYENVSEARCH_PYTHON
    match options.env.pyenvsearch_python {
        Some(ref python) => {
            match env_from_interpreter(python, ResolutionSource::EnvPyenvsearchPython) {
                Ok(env) => return Ok(env),
                Err(step) => trace.add(step),
            }
        }
        None => trace.add(ResolutionStep::not_set("$PYENVSEARCH_PYTHON")),
    }

    // 3. $VIRTUAL_ENV
    match options.env.virtual_env {
        Some(ref prefix) => match env_from_prefix(prefix, ResolutionSource::VirtualEnv) {
            Ok(env) => return Ok(env),
            Err(step) => trace.add(step),
        },
        None => trace.add(ResolutionStep::not_set("$VIRTUAL_ENV")),
    }

    // 4. $CONDA_PREFIX
    match options.env.conda_prefix {
        Some(ref prefix) => match env_from_prefix(prefix, ResolutionSource::CondaPrefix) {
            Ok(env) => return Ok(env),
            Err(step) => trace.add(step),
        },
        None => trace.add(ResolutionStep::not_set("$CONDA_PREFIX")),
    }

    // 5. Local .venv / venv, walking up from the working directory
    match find_local_venv(&options.cwd) {
        Some(prefix) => match env_from_prefix(&prefix, ResolutionSource::LocalVenv) {
            Ok(env) => return Ok(env),
            Err(step) => trace.add(step),
        },
        None => trace.add(ResolutionStep::not_found("local .venv/venv")),
    }

    // 6. python3/python from $PATH
    if options.search_path {
        let mut found_any = false;
        for name in PYTHON_NAMES {
            if let Some(path) = find_executable(name) {
                found_any = true;
                match env_from_interpreter(&path, ResolutionSource::Path) {
                    Ok(env) => return Ok(env),
                    Err(step) => trace.add(step),
                }
            }
        }
        if !found_any {
            trace.add(ResolutionStep::not_found("$PATH (python3/python)"));
        }
    } else {
        trace.add(ResolutionStep::not_set("$PATH lookup disabled"));
    }

    Err(PythonEnvError::EnvironmentNotFound { trace })
}

/// Walk up from `start` looking for a `.venv` or `venv` environment directory.
pub fn find_local_venv(start: &Path) -> Option<PathBuf> {
    let start = start.canonicalize().unwrap_or_else(|_| start.to_path_buf());
    for dir in start.ancestors() {
        for name in LOCAL_VENV_NAMES {
            let candidate = dir.join(name);
            if is_environment_dir(&candidate) {
                return Some(candidate);
            }
        }
    }
    None
}

/// A directory is an environment when it has `pyvenv.cfg` or site-packages.
pub fn is_environment_dir(path: &Path) -> bool {
    path.is_dir() && (path.join("pyvenv.cfg").is_file() || !find_site_packages(path).is_empty())
}

/// Build an environment from a prefix directory (venv or conda root).
fn env_from_prefix(prefix: &Path, source: ResolutionSource) -> Result<EnvironmentInfo, ResolutionStep> {
    let label = source.to_string();
    if !prefix.is_dir() {
        return Err(ResolutionStep::rejected(
            label,
            prefix.to_path_buf(),
            "directory does not exist",
        ));
    }
    let prefix = prefix
        .canonicalize()
        .unwrap_or_else(|_| prefix.to_path_buf());

    let interpreter = find_prefix_interpreter(&prefix);
    let mut site_packages = find_site_packages(&prefix);
    let mut version = read_pyvenv_version(&prefix);

    if site_packages.is_empty() {
        // Nothing on disk; ask the interpreter if there is one.
        let Some(ref python) = interpreter else {
            return Err(ResolutionStep::rejected(
                label,
                prefix,
                "no site-packages directory and no interpreter",
            ));
        };
        match query_interpreter(python) {
            Ok(paths) => {
                site_packages = paths.existing_site_packages();
                version = version.or(paths.version);
            }
            Err(e) => return Err(ResolutionStep::rejected(label, prefix, e.to_string())),
        }
        if site_packages.is_empty() {
            return Err(ResolutionStep::rejected(label, prefix, "no site-packages directory"));
        }
    }

    if version.is_none() {
        if let Some(ref python) = interpreter {
            version = get_python_version(python).ok();
        }
    }

    debug!(prefix = %prefix.display(), %source, "resolved environment from prefix");
    let packages = scan_distributions(&site_packages);
    Ok(EnvironmentInfo {
        interpreter,
        prefix: Some(prefix),
        source,
        version,
        site_packages,
        packages,
    })
}

/// Build an environment from an interpreter path.
///
/// A directory is accepted too and treated as a prefix.
fn env_from_interpreter(
    python: &Path,
    source: ResolutionSource,
) -> Result<EnvironmentInfo, ResolutionStep> {
    let label = source.to_string();
    if python.is_dir() {
        return env_from_prefix(python, source);
    }
    if !python.exists() {
        return Err(ResolutionStep::rejected(
            label,
            python.to_path_buf(),
            "path does not exist",
        ));
    }
    if !is_executable(python) {
        return Err(ResolutionStep::rejected(
            label,
            python.to_path_buf(),
            "not executable",
        ));
    }

    // Venv interpreters are symlinks into a base install; keep the link path
    // so the prefix is the venv, not the base.
    let python = std::path::absolute(python).unwrap_or_else(|_| python.to_path_buf());
    if let Some(prefix) = prefix_for_interpreter(&python) {
        if let Ok(mut env) = env_from_prefix(&prefix, source) {
            env.interpreter = Some(python.clone());
            return Ok(env);
        }
    }

    let paths = query_interpreter(&python)
        .map_err(|e| ResolutionStep::rejected(label.clone(), python.clone(), e.to_string()))?;
    let site_packages = paths.existing_site_packages();
    if site_packages.is_empty() {
        return Err(ResolutionStep::rejected(
            label,
            python,
            "interpreter reports no site-packages directory",
        ));
    }

    debug!(interpreter = %python.display(), %source, "resolved environment from interpreter");
    let packages = scan_distributions(&site_packages);
    Ok(EnvironmentInfo {
        interpreter: Some(python),
        prefix: paths.prefix,
        source,
        version: paths.version,
        site_packages,
        packages,
    })
}

/// The venv directory owning `python`, if it lives in `<prefix>/bin`.
fn prefix_for_interpreter(python: &Path) -> Option<PathBuf> {
    let bin_dir = python.parent()?;
    if bin_dir.file_name()? != VENV_BIN_DIR {
        return None;
    }
    let prefix = bin_dir.parent()?;
    if prefix.join("pyvenv.cfg").is_file() {
        Some(prefix.to_path_buf())
    } else {
        None
    }
}

/// Find the interpreter inside an environment prefix.
fn find_prefix_interpreter(prefix: &Path) -> Option<PathBuf> {
    PYTHON_NAMES
        .iter()
        .flat_map(|name| [prefix.join(VENV_BIN_DIR).join(name), prefix.join(name)])
        .find(|candidate| is_executable(candidate))
}

/// Site-packages directories under a prefix, sorted for determinism.
///
/// Checks both the POSIX (`lib/python3.X/site-packages`) and Windows
/// (`Lib/site-packages`) layouts.
pub fn find_site_packages(prefix: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for lib in ["lib", "lib64"] {
        let Ok(entries) = fs::read_dir(prefix.join(lib)) else {
            continue;
        };
        let mut candidates: Vec<PathBuf> = entries
            .flatten()
            .filter(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name.starts_with("python"))
            })
            .map(|entry| entry.path().join("site-packages"))
            .filter(|path| path.is_dir())
            .collect();
        candidates.sort();
        found.extend(candidates);
    }
    let windows_layout = prefix.join("Lib").join("site-packages");
    if windows_layout.is_dir() {
        found.push(windows_layout);
    }

    let mut unique = Vec::new();
    for path in found {
        let canonical = path.canonicalize().unwrap_or(path);
        if !unique.contains(&canonical) {
            unique.push(canonical);
        }
    }
    unique
}

/// Read the Python version recorded in `<prefix>/pyvenv.cfg`.
pub fn read_pyvenv_version(prefix: &Path) -> Option<PythonVersion> {
    let content = fs::read_to_string(prefix.join("pyvenv.cfg")).ok()?;
    content.lines().find_map(|line| {
        let (key, value) = line.split_once('=')?;
        match key.trim() {
            "version" | "version_info" => PythonVersion::parse(value.trim()).ok(),
            _ => None,
        }
    })
}

// ============================================================================
// Interpreter Queries
// ============================================================================

/// Script printing the interpreter's prefix, version and package directories.
const QUERY_SCRIPT: &str = r#"
import json, site, sys, sysconfig
paths = []
for key in ("purelib", "platlib"):
    p = sysconfig.get_paths().get(key)
    if p and p not in paths:
        paths.append(p)
try:
    for p in site.getsitepackages():
        if p not in paths:
            paths.append(p)
except Exception:
    pass
print(json.dumps({
    "prefix": sys.prefix,
    "version": "%d.%d.%d" % tuple(sys.version_info[:3]),
    "site_packages": paths,
}))
"#;

/// Answer from the interpreter query script.
#[derive(Debug, Clone, Deserialize)]
struct RawInterpreterPaths {
    prefix: Option<PathBuf>,
    version: Option<String>,
    #[serde(default)]
    site_packages: Vec<PathBuf>,
}

/// Package locations reported by an interpreter.
#[derive(Debug, Clone)]
pub struct InterpreterPaths {
    pub prefix: Option<PathBuf>,
    pub version: Option<PythonVersion>,
    pub site_packages: Vec<PathBuf>,
}

impl InterpreterPaths {
    /// Reported site-packages directories that exist on disk.
    pub fn existing_site_packages(&self) -> Vec<PathBuf> {
        self.site_packages
            .iter()
            .filter(|p| p.is_dir())
            .cloned()
            .collect()
    }
}

/// Ask an interpreter for its prefix, version and site-packages.
pub fn query_interpreter(python: &Path) -> PythonEnvResult<InterpreterPaths> {
    let spec = CommandSpec::new(python)
        .args(["-I", "-c", QUERY_SCRIPT])
        .with_timeout(QUERY_TIMEOUT);
    let output = run_command(&spec).map_err(|e| PythonEnvError::ExecutionFailed {
        path: python.to_path_buf(),
        reason: e.to_string(),
    })?;
    if !output.success {
        return Err(PythonEnvError::ExecutionFailed {
            path: python.to_path_buf(),
            reason: format!("{}: {}", output.describe_exit(), output.stderr.trim()),
        });
    }

    let raw: RawInterpreterPaths = serde_json::from_str(output.stdout.trim())?;
    Ok(InterpreterPaths {
        prefix: raw.prefix,
        version: raw.version.and_then(|v| PythonVersion::parse(&v).ok()),
        site_packages: raw.site_packages,
    })
}

/// Get Python version by running `python --version`.
pub fn get_python_version(python: &Path) -> PythonEnvResult<PythonVersion> {
    let spec = CommandSpec::new(python)
        .arg("--version")
        .with_timeout(QUERY_TIMEOUT);
    let output = run_command(&spec).map_err(|e| PythonEnvError::ExecutionFailed {
        path: python.to_path_buf(),
        reason: e.to_string(),
    })?;

    if !output.success {
        return Err(PythonEnvError::ExecutionFailed {
            path: python.to_path_buf(),
            reason: output.stderr.trim().to_string(),
        });
    }

    // Python --version writes to stdout (3.4+) or stderr (older)
    let version_output = if output.stdout.trim().is_empty() {
        output.stderr
    } else {
        output.stdout
    };
    PythonVersion::parse(version_output.trim())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Create `<root>/<name>` laid out like a POSIX venv with one package.
    fn make_venv(root: &Path, name: &str) -> PathBuf {
        let prefix = root.join(name);
        let site = prefix.join("lib").join("python3.11").join("site-packages");
        fs::create_dir_all(site.join("demo")).unwrap();
        fs::write(site.join("demo").join("__init__.py"), "").unwrap();
        fs::create_dir_all(site.join("demo-1.2.0.dist-info")).unwrap();
        fs::write(
            site.join("demo-1.2.0.dist-info").join("METADATA"),
            "Metadata-Version: 2.1\nName: demo\nVersion: 1.2.0\n",
        )
        .unwrap();
        fs::write(
            prefix.join("pyvenv.cfg"),
            "home = /usr/bin\ninclude-system-site-packages = false\nversion = 3.11.4\n",
        )
        .unwrap();
        prefix
    }

    fn options_in(cwd: &Path) -> LocateOptions {
        LocateOptions {
            cwd: cwd.to_path_buf(),
            search_path: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_version_parse() {
        let v = PythonVersion::parse("3.11.4").unwrap();
        assert_eq!(v, PythonVersion::new(3, 11, 4));

        let v = PythonVersion::parse("Python 3.9.0").unwrap();
        assert_eq!(v, PythonVersion::new(3, 9, 0));

        let v = PythonVersion::parse("3.12.0rc1").unwrap();
        assert_eq!(v, PythonVersion::new(3, 12, 0));

        let v = PythonVersion::parse("3.11").unwrap();
        assert_eq!(v, PythonVersion::new(3, 11, 0));
    }

    #[test]
    fn test_invalid_version_parse() {
        assert!(PythonVersion::parse("3").is_err());
        assert!(PythonVersion::parse("abc.def").is_err());
        assert!(PythonVersion::parse("").is_err());
    }

    #[test]
    fn test_version_display() {
        assert_eq!(PythonVersion::new(3, 11, 4).to_string(), "3.11.4");
    }

    #[test]
    fn test_resolution_source_display() {
        assert_eq!(ResolutionSource::CliPython.to_string(), "--python flag");
        assert_eq!(ResolutionSource::VirtualEnv.to_string(), "$VIRTUAL_ENV");
        assert_eq!(ResolutionSource::CondaPrefix.to_string(), "$CONDA_PREFIX");
        assert_eq!(ResolutionSource::LocalVenv.to_string(), "local venv");
        assert_eq!(ResolutionSource::Path.to_string(), "$PATH");
    }

    #[test]
    fn test_normalize_distribution_name() {
        assert_eq!(normalize_distribution_name("Foo.Bar_baz"), "foo-bar-baz");
        assert_eq!(normalize_distribution_name("foo--bar"), "foo-bar");
        assert_eq!(normalize_distribution_name("requests"), "requests");
    }

    #[test]
    fn test_find_site_packages_posix_layout() {
        let temp = TempDir::new().unwrap();
        let prefix = make_venv(temp.path(), ".venv");
        let site = find_site_packages(&prefix);
        assert_eq!(site.len(), 1);
        assert!(site[0].ends_with("lib/python3.11/site-packages"));
    }

    #[test]
    fn test_find_site_packages_windows_layout() {
        let temp = TempDir::new().unwrap();
        let site = temp.path().join("Lib").join("site-packages");
        fs::create_dir_all(&site).unwrap();
        let found = find_site_packages(temp.path());
        assert_eq!(found.len(), 1);
        assert!(found[0].ends_with("site-packages"));
    }

    #[test]
    fn test_read_pyvenv_version() {
        let temp = TempDir::new().unwrap();
        let prefix = make_venv(temp.path(), "env");
        assert_eq!(
            read_pyvenv_version(&prefix),
            Some(PythonVersion::new(3, 11, 4))
        );
    }

    #[test]
    fn test_locate_local_venv() {
        let temp = TempDir::new().unwrap();
        make_venv(temp.path(), ".venv");
        let nested = temp.path().join("src").join("pkg");
        fs::create_dir_all(&nested).unwrap();

        let env = locate_environment(&options_in(&nested)).unwrap();
        assert_eq!(env.source, ResolutionSource::LocalVenv);
        assert_eq!(env.version, Some(PythonVersion::new(3, 11, 4)));
        assert_eq!(env.site_packages.len(), 1);
        assert_eq!(env.packages.len(), 1);
        assert_eq!(env.packages[0].name, "demo");
        assert_eq!(env.packages[0].version.as_deref(), Some("1.2.0"));
    }

    #[test]
    fn test_virtual_env_wins_over_local_venv() {
        let temp = TempDir::new().unwrap();
        make_venv(temp.path(), ".venv");
        let active = make_venv(temp.path(), "active-env");

        let mut options = options_in(temp.path());
        options.env.virtual_env = Some(active.clone());
        let env = locate_environment(&options).unwrap();

        assert_eq!(env.source, ResolutionSource::VirtualEnv);
        assert_eq!(env.prefix, Some(active.canonicalize().unwrap()));
    }

    #[test]
    fn test_stale_virtual_env_falls_through() {
        let temp = TempDir::new().unwrap();
        make_venv(temp.path(), ".venv");

        let mut options = options_in(temp.path());
        options.env.virtual_env = Some(temp.path().join("gone"));
        let env = locate_environment(&options).unwrap();
        assert_eq!(env.source, ResolutionSource::LocalVenv);
    }

    #[test]
    fn test_explicit_venv_flag() {
        let temp = TempDir::new().unwrap();
        let prefix = make_venv(temp.path(), "custom");
        let mut options = options_in(temp.path());
        options.venv = Some(prefix);
        let env = locate_environment(&options).unwrap();
        assert_eq!(env.source, ResolutionSource::CliVenv);
        assert!(env.distribution("DEMO").is_some());
    }

    #[test]
    fn test_explicit_venv_flag_invalid_is_error() {
        let temp = TempDir::new().unwrap();
        let mut options = options_in(temp.path());
        options.venv = Some(temp.path().join("missing"));
        let err = locate_environment(&options).unwrap_err();
        assert!(matches!(err, PythonEnvError::InvalidEnvironment { .. }));
    }

    #[test]
    fn test_nothing_found_reports_trace() {
        let temp = TempDir::new().unwrap();
        let err = locate_environment(&options_in(temp.path())).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("no Python environment found"));
        assert!(msg.contains("$VIRTUAL_ENV: not set"));
        assert!(msg.contains("Remediation"));
    }

    #[test]
    fn test_resolution_step_display() {
        let step = ResolutionStep::rejected("$CONDA_PREFIX", PathBuf::from("/opt/conda"), "no site-packages directory");
        let display = step.to_string();
        assert!(display.contains("$CONDA_PREFIX"));
        assert!(display.contains("/opt/conda"));
        assert!(display.contains("no site-packages"));
    }

    // Integration tests that actually run Python; skipped when absent.

    #[test]
    fn test_get_python_version_integration() {
        if let Some(python) = find_executable("python3") {
            let version = get_python_version(&python).unwrap();
            assert_eq!(version.major, 3);
        }
    }

    #[test]
    fn test_query_interpreter_integration() {
        if let Some(python) = find_executable("python3") {
            let paths = query_interpreter(&python).unwrap();
            assert!(paths.version.is_some());
            assert!(!paths.site_packages.is_empty());
        }
    }
}
