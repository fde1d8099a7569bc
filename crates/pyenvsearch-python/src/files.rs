//! Python source file collection.
//!
//! Every walk in the crate (table of contents, entity listing, library search
//! fallback) goes through [`collect_python_files`] so all of them agree on
//! which files exist and in what order.

use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Directory names never descended into.
pub const EXCLUDED_DIRS: &[&str] = &["__pycache__", "node_modules"];

/// Directory suffixes never descended into (distribution metadata).
pub const EXCLUDED_DIR_SUFFIXES: &[&str] = &[".dist-info", ".egg-info"];

/// A Python source file found under a root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PythonFile {
    /// Absolute (or root-joined) path to the file.
    pub path: PathBuf,
    /// Path relative to the walk root, `/`-separated.
    pub rel_path: String,
    /// Dotted module name (`pkg.sub.mod`; `__init__.py` maps to its package).
    pub module: String,
}

impl PythonFile {
    /// Whether this file is a package `__init__.py`.
    pub fn is_package_init(&self) -> bool {
        self.path.file_name().is_some_and(|name| name == "__init__.py")
    }
}

/// Whether a directory name is excluded from walks.
pub fn is_excluded_dir_name(name: &str) -> bool {
    name.starts_with('.')
        || EXCLUDED_DIRS.contains(&name)
        || EXCLUDED_DIR_SUFFIXES
            .iter()
            .any(|suffix| name.ends_with(suffix))
}

/// Hidden entries of any type are skipped; other exclusions apply to
/// directories only. The root itself is never excluded (it may be a temp
/// dir like `.tmpXYZ`).
fn is_excluded(entry: &DirEntry) -> bool {
    if entry.depth() == 0 {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || (entry.file_type().is_dir() && is_excluded_dir_name(&name))
}

/// Collect `.py` files under `root`, sorted by relative path.
///
/// `root` may be a single file, in which case it is returned alone. The
/// module names are computed relative to `root`'s own name, so walking
/// `site-packages/requests` yields `requests`, `requests.api`, ...
pub fn collect_python_files(root: &Path) -> Vec<PythonFile> {
    if root.is_file() {
        let module = root
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let rel_path = root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        return vec![PythonFile {
            path: root.to_path_buf(),
            rel_path,
            module,
        }];
    }

    let root_name = root
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut files: Vec<PythonFile> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| !is_excluded(entry))
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "py"))
        .filter_map(|entry| {
            let rel = entry.path().strip_prefix(root).ok()?;
            let parts: Vec<String> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            Some(PythonFile {
                path: entry.path().to_path_buf(),
                rel_path: parts.join("/"),
                module: module_name(&root_name, &parts),
            })
        })
        .collect();

    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    files
}

/// Dotted module name for a file at `parts` (relative path components)
/// under a root directory named `root_name`.
pub fn module_name(root_name: &str, parts: &[String]) -> String {
    let mut segments: Vec<&str> = Vec::with_capacity(parts.len() + 1);
    if !root_name.is_empty() {
        segments.push(root_name);
    }
    for (i, part) in parts.iter().enumerate() {
        if i + 1 == parts.len() {
            let stem = part.strip_suffix(".py").unwrap_or(part);
            if stem != "__init__" {
                segments.push(stem);
            }
        } else {
            segments.push(part);
        }
    }
    segments.join(".")
}

/// Python visibility rule: a leading underscore marks a private name, except
/// for dunder names such as `__init__` or `__call__`.
pub fn is_private_name(name: &str) -> bool {
    name.starts_with('_') && !is_dunder(name)
}

/// Whether `name` is a dunder (`__x__`) name.
pub fn is_dunder(name: &str) -> bool {
    name.len() > 4 && name.starts_with("__") && name.ends_with("__")
}

/// Whether a module's dotted name has a private segment.
pub fn is_private_module(module: &str) -> bool {
    module.split('.').any(is_private_name)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    #[test]
    fn collects_sorted_and_skips_excluded_dirs() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("pkg");
        touch(&root, "__init__.py");
        touch(&root, "b.py");
        touch(&root, "a.py");
        touch(&root, "sub/__init__.py");
        touch(&root, "sub/deep.py");
        touch(&root, "__pycache__/a.cpython-311.py");
        touch(&root, ".hidden/x.py");
        touch(&root, ".dotfile.py");
        touch(&root, "pkg-1.0.dist-info/x.py");
        touch(&root, "notes.txt");

        let files = collect_python_files(&root);
        let rels: Vec<&str> = files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(
            rels,
            vec!["__init__.py", "a.py", "b.py", "sub/__init__.py", "sub/deep.py"]
        );
        let modules: Vec<&str> = files.iter().map(|f| f.module.as_str()).collect();
        assert_eq!(modules, vec!["pkg", "pkg.a", "pkg.b", "pkg.sub", "pkg.sub.deep"]);
        assert!(files[0].is_package_init());
        assert!(!files[1].is_package_init());
    }

    #[test]
    fn hidden_root_is_still_walked() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join(".tmp-root");
        touch(&root, "m.py");
        assert_eq!(collect_python_files(&root).len(), 1);
    }

    #[test]
    fn single_file_root() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "six.py");
        let files = collect_python_files(&temp.path().join("six.py"));
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].module, "six");
        assert_eq!(files[0].rel_path, "six.py");
    }

    #[test]
    fn visibility_rules() {
        assert!(is_private_name("_helper"));
        assert!(is_private_name("__mangled"));
        assert!(!is_private_name("__init__"));
        assert!(!is_private_name("public"));
        assert!(!is_dunder("____"));
        assert!(is_private_module("pkg._internal.mod"));
        assert!(!is_private_module("pkg.api"));
    }
}
