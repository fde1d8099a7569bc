//! Package resolution.
//!
//! Maps a package name (or an explicit path) to the directory or file that
//! holds its source. Site-packages directories are probed first; the
//! environment's import system is the last resort, which also covers the
//! standard library.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use pyenvsearch_core::process::{run_command, CommandSpec};

use crate::env::{normalize_distribution_name, EnvironmentInfo};
use crate::files::is_excluded_dir_name;

/// Timeout for the import-system lookup.
const FIND_SPEC_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Error Types
// ============================================================================

/// Errors from package resolution.
#[derive(Debug, Error)]
pub enum PackageError {
    /// Nothing matched the name.
    #[error("package not found: {name}")]
    NotFound { name: String, detail: Option<String> },

    /// The name is not a valid import name.
    #[error("invalid package name: {name}")]
    InvalidName { name: String },
}

pub type PackageResult<T> = Result<T, PackageError>;

// ============================================================================
// Package Location
// ============================================================================

/// What kind of thing the name resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageKind {
    /// Directory with `__init__.py`.
    Package,
    /// Directory without `__init__.py` (PEP 420).
    Namespace,
    /// Single `.py` file.
    Module,
    /// Compiled extension module (`.so` / `.pyd`).
    Extension,
}

impl std::fmt::Display for PackageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PackageKind::Package => "package",
            PackageKind::Namespace => "namespace package",
            PackageKind::Module => "module",
            PackageKind::Extension => "extension module",
        };
        f.write_str(s)
    }
}

/// How the location was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PackageOrigin {
    SitePackages,
    ImportSystem,
    Path,
}

impl std::fmt::Display for PackageOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PackageOrigin::SitePackages => "site-packages",
            PackageOrigin::ImportSystem => "import-system",
            PackageOrigin::Path => "path",
        };
        f.write_str(s)
    }
}

/// A resolved package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageLocation {
    /// Name as given by the user.
    pub requested: String,
    /// Dotted import name.
    pub import_name: String,
    /// Package directory or module file.
    pub path: PathBuf,
    pub kind: PackageKind,
    /// Version of the owning distribution, if known.
    pub version: Option<String>,
    /// Name of the owning distribution, if known.
    pub distribution: Option<String>,
    pub origin: PackageOrigin,
    /// Direct submodule and subpackage names (directory packages only).
    pub submodules: Vec<String>,
}

impl PackageLocation {
    /// Whether the location is a directory (package or namespace package).
    pub fn is_dir(&self) -> bool {
        matches!(self.kind, PackageKind::Package | PackageKind::Namespace)
    }

    /// The package's own module file: `__init__.py` or the module itself.
    pub fn module_file(&self) -> Option<PathBuf> {
        match self.kind {
            PackageKind::Package => Some(self.path.join("__init__.py")),
            PackageKind::Module => Some(self.path.clone()),
            PackageKind::Namespace | PackageKind::Extension => None,
        }
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Resolve a package name or path.
pub fn resolve_package(name: &str, env: Option<&EnvironmentInfo>) -> PackageResult<PackageLocation> {
    if looks_like_path(name) {
        return resolve_path(name);
    }

    let segments = split_import_name(name)?;
    let site_packages: &[PathBuf] = env.map(|e| e.site_packages.as_slice()).unwrap_or(&[]);

    // Direct import-name match
    if let Some(location) = find_in_dirs(name, &segments, site_packages, env) {
        return Ok(location);
    }

    // Distribution-name match (beautifulsoup4 -> bs4)
    if let Some(env) = env {
        if let Some(dist) = env.distribution(name) {
            for top in dist.top_level_names() {
                let mut mapped = vec![top.clone()];
                mapped.extend(segments.iter().skip(1).cloned());
                if let Some(mut location) = find_in_dirs(name, &mapped, site_packages, Some(env)) {
                    location.version = dist.version.clone();
                    location.distribution = Some(dist.name.clone());
                    return Ok(location);
                }
            }
        }
    }

    // Interpreter import system
    if let Some(python) = env.and_then(|e| e.interpreter.as_deref()) {
        return find_via_import_system(name, python, env);
    }

    Err(PackageError::NotFound {
        name: name.to_string(),
        detail: None,
    })
}

fn looks_like_path(name: &str) -> bool {
    name.contains('/') || name.contains(std::path::MAIN_SEPARATOR) || name.starts_with('.')
}

fn resolve_path(name: &str) -> PackageResult<PackageLocation> {
    let path = PathBuf::from(name);
    let not_found = || PackageError::NotFound {
        name: name.to_string(),
        detail: Some("path does not exist".to_string()),
    };
    if !path.exists() {
        return Err(not_found());
    }
    let path = path.canonicalize().map_err(|_| not_found())?;
    let kind = kind_of(&path).ok_or_else(|| PackageError::NotFound {
        name: name.to_string(),
        detail: Some("not a Python package or module".to_string()),
    })?;
    let import_name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let import_name = match kind {
        PackageKind::Extension => import_name
            .split('.')
            .next()
            .unwrap_or_default()
            .to_string(),
        _ => import_name,
    };
    let submodules = list_submodules(&path);
    Ok(PackageLocation {
        requested: name.to_string(),
        import_name,
        path,
        kind,
        version: None,
        distribution: None,
        origin: PackageOrigin::Path,
        submodules,
    })
}

/// Split a dotted name into import segments, mapping `-` to `_`
/// (`my-pkg.sub` -> `["my_pkg", "sub"]`). Case is matched later.
fn split_import_name(name: &str) -> PackageResult<Vec<String>> {
    let invalid = || PackageError::InvalidName {
        name: name.to_string(),
    };
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(invalid());
    }
    let segments: Vec<String> = trimmed
        .split('.')
        .map(|segment| segment.replace('-', "_"))
        .collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(invalid());
    }
    Ok(segments)
}

fn find_in_dirs(
    requested: &str,
    segments: &[String],
    site_packages: &[PathBuf],
    env: Option<&EnvironmentInfo>,
) -> Option<PackageLocation> {
    let (first, rest) = segments.split_first()?;
    for dir in site_packages {
        let Some(mut path) = find_entry(dir, first) else {
            continue;
        };
        let mut import_parts = vec![import_name_of(&path)];
        for segment in rest {
            if !path.is_dir() {
                path = PathBuf::new();
                break;
            }
            match find_entry(&path, segment) {
                Some(next) => {
                    import_parts.push(import_name_of(&next));
                    path = next;
                }
                None => {
                    path = PathBuf::new();
                    break;
                }
            }
        }
        if path.as_os_str().is_empty() {
            continue;
        }
        let kind = kind_of(&path)?;
        let import_name = import_parts.join(".");
        let dist = env.and_then(|e| owning_distribution(e, &import_parts[0]));
        debug!(name = requested, path = %path.display(), "resolved package in site-packages");
        return Some(PackageLocation {
            requested: requested.to_string(),
            import_name,
            submodules: list_submodules(&path),
            path,
            kind,
            version: dist.as_ref().and_then(|d| d.1.clone()),
            distribution: dist.map(|d| d.0),
            origin: PackageOrigin::SitePackages,
        });
    }
    None
}

/// Find `name` inside `dir`, case-insensitively: a directory, a `.py`
/// module, or an extension module. Exact-case matches win.
fn find_entry(dir: &Path, name: &str) -> Option<PathBuf> {
    let exact_dir = dir.join(name);
    if exact_dir.is_dir() && !is_excluded_dir_name(name) {
        return Some(exact_dir);
    }
    let exact_py = dir.join(format!("{}.py", name));
    if exact_py.is_file() {
        return Some(exact_py);
    }

    let wanted = name.to_lowercase();
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .ok()?
        .flatten()
        .map(|entry| entry.path())
        .collect();
    entries.sort();

    let mut module = None;
    let mut extension = None;
    for path in entries {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let lower = file_name.to_lowercase();
        if path.is_dir() {
            if lower == wanted && !is_excluded_dir_name(file_name) {
                return Some(path);
            }
        } else if lower == format!("{}.py", wanted) {
            module.get_or_insert(path);
        } else if is_extension_file(&lower) && lower.split('.').next() == Some(wanted.as_str()) {
            extension.get_or_insert(path);
        }
    }
    module.or(extension)
}

fn is_extension_file(lower_name: &str) -> bool {
    lower_name.ends_with(".so") || lower_name.ends_with(".pyd")
}

fn kind_of(path: &Path) -> Option<PackageKind> {
    if path.is_dir() {
        if path.join("__init__.py").is_file() {
            Some(PackageKind::Package)
        } else {
            Some(PackageKind::Namespace)
        }
    } else {
        let name = path.file_name()?.to_str()?.to_lowercase();
        if name.ends_with(".py") {
            Some(PackageKind::Module)
        } else if is_extension_file(&name) {
            Some(PackageKind::Extension)
        } else {
            None
        }
    }
}

fn import_name_of(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if path.is_dir() {
        name
    } else {
        name.split('.').next().unwrap_or_default().to_string()
    }
}

/// Direct submodules of a package directory, sorted.
pub fn list_submodules(path: &Path) -> Vec<String> {
    if !path.is_dir() {
        return Vec::new();
    }
    let Ok(entries) = fs::read_dir(path) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                return None;
            }
            if path.is_dir() {
                if is_excluded_dir_name(&name) {
                    return None;
                }
                let has_python = path.join("__init__.py").is_file()
                    || fs::read_dir(&path).ok()?.flatten().any(|e| {
                        e.path().extension().is_some_and(|ext| ext == "py")
                    });
                has_python.then_some(name)
            } else {
                let lower = name.to_lowercase();
                if lower == "__init__.py" {
                    None
                } else if let Some(stem) = name.strip_suffix(".py") {
                    Some(stem.to_string())
                } else if is_extension_file(&lower) {
                    name.split('.').next().map(str::to_string)
                } else {
                    None
                }
            }
        })
        .collect();
    names.sort();
    names.dedup();
    names
}

/// The distribution that installs top-level import `name`, as (name, version).
fn owning_distribution(env: &EnvironmentInfo, import_name: &str) -> Option<(String, Option<String>)> {
    if let Some(dist) = env.distribution(import_name) {
        return Some((dist.name.clone(), dist.version.clone()));
    }
    let normalized = normalize_distribution_name(import_name);
    env.packages
        .iter()
        .find(|pkg| {
            pkg.top_level_names()
                .iter()
                .any(|top| normalize_distribution_name(top) == normalized)
        })
        .map(|pkg| (pkg.name.clone(), pkg.version.clone()))
}

// ============================================================================
// Import System Fallback
// ============================================================================

const FIND_SPEC_SCRIPT: &str = r#"
import importlib.util, json, sys
name = sys.argv[1]
try:
    spec = importlib.util.find_spec(name)
except Exception as exc:
    print(json.dumps({"found": False, "error": "%s: %s" % (type(exc).__name__, exc)}))
    sys.exit(0)
if spec is None:
    print(json.dumps({"found": False}))
else:
    locations = list(spec.submodule_search_locations or [])
    print(json.dumps({
        "found": True,
        "name": spec.name,
        "origin": spec.origin,
        "locations": locations,
    }))
"#;

#[derive(Debug, serde::Deserialize)]
struct FindSpecAnswer {
    found: bool,
    name: Option<String>,
    origin: Option<String>,
    #[serde(default)]
    locations: Vec<PathBuf>,
    error: Option<String>,
}

fn find_via_import_system(
    name: &str,
    python: &Path,
    env: Option<&EnvironmentInfo>,
) -> PackageResult<PackageLocation> {
    let not_found = |detail: Option<String>| PackageError::NotFound {
        name: name.to_string(),
        detail,
    };

    let spec = CommandSpec::new(python)
        .args(["-c", FIND_SPEC_SCRIPT, name])
        .with_timeout(FIND_SPEC_TIMEOUT);
    let output = match run_command(&spec) {
        Ok(output) if output.success => output,
        Ok(output) => {
            debug!(name, exit = %output.describe_exit(), "import-system lookup failed");
            return Err(not_found(None));
        }
        Err(e) => {
            debug!(name, error = %e, "could not run interpreter for import lookup");
            return Err(not_found(None));
        }
    };
    let answer: FindSpecAnswer =
        serde_json::from_str(output.stdout.trim()).map_err(|_| not_found(None))?;
    if !answer.found {
        return Err(not_found(answer.error));
    }

    let path = match answer.origin.as_deref() {
        Some("built-in") | Some("frozen") => {
            return Err(not_found(Some(
                "built-in module has no source location".to_string(),
            )))
        }
        Some(origin) if Path::new(origin).exists() => {
            let origin = PathBuf::from(origin);
            if origin.file_name().is_some_and(|n| n == "__init__.py") {
                origin.parent().map(Path::to_path_buf).unwrap_or(origin)
            } else {
                origin
            }
        }
        _ => match answer.locations.first() {
            Some(location) => location.clone(),
            None => return Err(not_found(None)),
        },
    };
    let kind = kind_of(&path).ok_or_else(|| {
        not_found(Some(format!("unsupported module file {}", path.display())))
    })?;

    let import_name = answer.name.unwrap_or_else(|| name.to_string());
    let top = import_name.split('.').next().unwrap_or(&import_name).to_string();
    let dist = env.and_then(|e| owning_distribution(e, &top));
    debug!(name, path = %path.display(), "resolved package via import system");
    Ok(PackageLocation {
        requested: name.to_string(),
        import_name,
        submodules: list_submodules(&path),
        path,
        kind,
        version: dist.as_ref().and_then(|d| d.1.clone()),
        distribution: dist.map(|d| d.0),
        origin: PackageOrigin::ImportSystem,
    })
}

// ============================================================================
// Tests
// ============================================================================
