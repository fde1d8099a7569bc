//! Table of contents for a package.
//!
//! The tree has one tier per depth level:
//!
//! ```text
//! depth 0  package (root)
//! depth 1  sub-packages, modules, and definitions from __init__.py
//! depth 2  classes and functions of those modules
//! depth 3  methods
//! ```
//!
//! Nodes below the requested depth are never built, so a shallow listing of
//! a large package does not parse every file. Raising the depth only ever
//! adds nodes.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::warn;

use crate::files::{is_excluded_dir_name, is_private_name};
use crate::outline::{parse_file, ClassOutline, FunctionOutline, ModuleOutline};

/// Kind of a table-of-contents node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TocKind {
    Package,
    Module,
    Class,
    Enum,
    Function,
    Method,
}

impl TocKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TocKind::Package => "package",
            TocKind::Module => "module",
            TocKind::Class => "class",
            TocKind::Enum => "enum",
            TocKind::Function => "function",
            TocKind::Method => "method",
        }
    }
}

/// One node of the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocNode {
    pub name: String,
    pub kind: TocKind,
    pub depth: usize,
    pub private: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    /// First docstring line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TocNode>,
}

impl TocNode {
    fn new(name: impl Into<String>, kind: TocKind, depth: usize) -> Self {
        let name = name.into();
        TocNode {
            private: is_private_name(&name),
            name,
            kind,
            depth,
            signature: None,
            line: None,
            summary: None,
            children: Vec::new(),
        }
    }

    /// Visit this node and every descendant, depth-first.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a TocNode)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }

    /// Total number of nodes in this subtree.
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        self.walk(&mut |_| count += 1);
        count
    }
}

/// A built table of contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableOfContents {
    pub root: TocNode,
    pub max_depth: usize,
    pub total_modules: usize,
    pub total_classes: usize,
    /// Functions and methods.
    pub total_functions: usize,
    /// Files skipped because they could not be read or parsed.
    pub warnings: Vec<String>,
}

/// Options for [`build_toc`].
#[derive(Debug, Clone, Copy)]
pub struct TocOptions {
    pub max_depth: usize,
    /// Drop private nodes and their subtrees.
    pub public_only: bool,
}

impl Default for TocOptions {
    fn default() -> Self {
        TocOptions {
            max_depth: 3,
            public_only: false,
        }
    }
}

/// Build the table of contents rooted at a package directory or module file.
pub fn build_toc(root: &Path, name: &str, options: TocOptions) -> TableOfContents {
    let mut builder = Builder {
        options,
        warnings: Vec::new(),
    };
    let root_node = if root.is_dir() {
        builder.package_node(root, name, 0)
    } else {
        builder.module_node(root, name, 0)
    };

    let mut toc = TableOfContents {
        root: root_node,
        max_depth: options.max_depth,
        total_modules: 0,
        total_classes: 0,
        total_functions: 0,
        warnings: builder.warnings,
    };
    let (mut modules, mut classes, mut functions) = (0, 0, 0);
    toc.root.walk(&mut |node| match node.kind {
        TocKind::Package | TocKind::Module => modules += 1,
        TocKind::Class | TocKind::Enum => classes += 1,
        TocKind::Function | TocKind::Method => functions += 1,
    });
    toc.total_modules = modules;
    toc.total_classes = classes;
    toc.total_functions = functions;
    toc
}

struct Builder {
    options: TocOptions,
    warnings: Vec<String>,
}

impl Builder {
    fn wants(&self, depth: usize, name: &str) -> bool {
        depth <= self.options.max_depth && !(self.options.public_only && is_private_name(name))
    }

    fn package_node(&mut self, dir: &Path, name: &str, depth: usize) -> TocNode {
        let mut node = TocNode::new(name, TocKind::Package, depth);
        let init = dir.join("__init__.py");
        let child_depth = depth + 1;

        if init.is_file() {
            if let Some(outline) = self.outline(&init, child_depth) {
                node.summary = summary_of(outline.docstring.as_deref());
                self.add_definitions(&mut node, &outline, child_depth);
            }
        }
        if child_depth > self.options.max_depth {
            return node;
        }

        let Ok(entries) = fs::read_dir(dir) else {
            self.warnings.push(format!("{}: cannot read directory", dir.display()));
            return node;
        };
        let mut entries: Vec<_> = entries.flatten().map(|e| e.path()).collect();
        entries.sort();

        for path in entries {
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if file_name.starts_with('.') {
                continue;
            }
            if path.is_dir() {
                if is_excluded_dir_name(file_name) || !contains_python(&path) {
                    continue;
                }
                if self.wants(child_depth, file_name) {
                    let child = self.package_node(&path, file_name, child_depth);
                    node.children.push(child);
                }
            } else if let Some(stem) = file_name.strip_suffix(".py") {
                if stem == "__init__" {
                    continue;
                }
                if self.wants(child_depth, stem) {
                    let child = self.module_node(&path, stem, child_depth);
                    node.children.push(child);
                }
            }
        }
        node
    }

    fn module_node(&mut self, file: &Path, name: &str, depth: usize) -> TocNode {
        let mut node = TocNode::new(name, TocKind::Module, depth);
        if let Some(outline) = self.outline(file, depth + 1) {
            node.summary = summary_of(outline.docstring.as_deref());
            self.add_definitions(&mut node, &outline, depth + 1);
        }
        node
    }

    /// Parse a file only when its definitions would appear.
    fn outline(&mut self, file: &Path, definitions_depth: usize) -> Option<ModuleOutline> {
        if definitions_depth > self.options.max_depth {
            return None;
        }
        match parse_file(file) {
            Ok(outline) => Some(outline),
            Err(e) => {
                warn!(file = %file.display(), error = %e, "skipping unparsable module");
                self.warnings.push(format!("{}: {}", file.display(), e));
                None
            }
        }
    }

    fn add_definitions(&mut self, parent: &mut TocNode, outline: &ModuleOutline, depth: usize) {
        for class in &outline.classes {
            if self.wants(depth, &class.name) {
                parent.children.push(self.class_node(class, depth));
            }
        }
        for func in &outline.functions {
            if self.wants(depth, &func.name) {
                parent
                    .children
                    .push(function_node(func, TocKind::Function, depth));
            }
        }
    }

    fn class_node(&self, class: &ClassOutline, depth: usize) -> TocNode {
        let kind = if class.is_enum() {
            TocKind::Enum
        } else {
            TocKind::Class
        };
        let mut node = TocNode::new(&class.name, kind, depth);
        node.line = Some(class.line);
        node.summary = summary_of(class.docstring.as_deref());
        if !class.bases.is_empty() {
            node.signature = Some(format!("({})", class.bases.join(", ")));
        }
        for method in &class.methods {
            if self.wants(depth + 1, &method.name) {
                node.children
                    .push(function_node(method, TocKind::Method, depth + 1));
            }
        }
        node
    }
}

fn function_node(func: &FunctionOutline, kind: TocKind, depth: usize) -> TocNode {
    let mut node = TocNode::new(&func.name, kind, depth);
    node.line = Some(func.line);
    node.summary = summary_of(func.docstring.as_deref());
    node.signature = Some(if func.is_async {
        format!("async {}", func.signature)
    } else {
        func.signature.clone()
    });
    node
}

fn summary_of(docstring: Option<&str>) -> Option<String> {
    docstring
        .and_then(pyenvsearch_core::text::first_line)
        .map(str::to_string)
}

/// Whether a directory holds any Python source, directly or below.
fn contains_python(dir: &Path) -> bool {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !(e.file_type().is_dir() && is_excluded_dir_name(&e.file_name().to_string_lossy()))
        })
        .filter_map(|e| e.ok())
        .any(|e| e.file_type().is_file() && e.path().extension().is_some_and(|ext| ext == "py"))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn fixture() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("pkg");
        write(&root, "__init__.py", "\"\"\"Demo package.\"\"\"\ndef top():\n    pass\n");
        write(
            &root,
            "mod.py",
            "class Foo:\n    def run(self):\n        pass\n    def _hidden(self):\n        pass\n\ndef bar():\n    pass\n",
        );
        write(&root, "_private.py", "def secret():\n    pass\n");
        write(&root, "broken.py", "def (:\n");
        write(&root, "sub/__init__.py", "");
        write(&root, "sub/leaf.py", "class Color(Enum):\n    RED = 1\n");
        write(&root, "data/readme.txt", "no python here");
        write(&root, "__pycache__/mod.cpython-311.pyc", "");
        temp
    }

    fn names(node: &TocNode) -> Vec<String> {
        let mut out = Vec::new();
        node.walk(&mut |n| out.push(format!("{}:{}", n.depth, n.name)));
        out
    }

    #[test]
    fn depth_zero_is_root_only() {
        let temp = fixture();
        let toc = build_toc(&temp.path().join("pkg"), "pkg", TocOptions { max_depth: 0, public_only: false });
        assert_eq!(toc.root.name, "pkg");
        assert!(toc.root.children.is_empty());
        assert_eq!(toc.total_modules, 1);
        assert!(toc.warnings.is_empty());
    }

    #[test]
    fn depth_one_lists_modules_and_init_definitions() {
        let temp = fixture();
        let toc = build_toc(&temp.path().join("pkg"), "pkg", TocOptions { max_depth: 1, public_only: false });
        let children: Vec<&str> = toc.root.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(children, vec!["top", "_private", "broken", "mod", "sub"]);
        assert_eq!(toc.root.summary.as_deref(), Some("Demo package."));
        // Module bodies are not parsed yet, so the broken file is not reported.
        assert!(toc.warnings.is_empty());
    }

    #[test]
    fn full_depth_reaches_methods_and_reports_broken_files() {
        let temp = fixture();
        let toc = build_toc(&temp.path().join("pkg"), "pkg", TocOptions::default());
        let all = names(&toc.root);
        assert!(all.contains(&"3:run".to_string()));
        assert!(all.contains(&"3:_hidden".to_string()));
        assert!(all.contains(&"3:Color".to_string()));
        assert_eq!(toc.warnings.len(), 1);
        assert!(toc.warnings[0].contains("broken.py"));

        let leaf = &toc.root.children.iter().find(|c| c.name == "sub").unwrap().children[0];
        assert_eq!(leaf.children[0].kind, TocKind::Enum);
    }

    #[test]
    fn totals_count_included_nodes() {
        let temp = fixture();
        let toc = build_toc(&temp.path().join("pkg"), "pkg", TocOptions::default());
        // pkg, _private, broken, mod, sub, leaf
        assert_eq!(toc.total_modules, 6);
        // Foo, Color
        assert_eq!(toc.total_classes, 2);
        // top, secret, bar, run, _hidden
        assert_eq!(toc.total_functions, 5);
    }

    #[test]
    fn depth_is_monotonic() {
        let temp = fixture();
        let root = temp.path().join("pkg");
        let mut previous: Vec<String> = Vec::new();
        for depth in 0..=4 {
            let toc = build_toc(&root, "pkg", TocOptions { max_depth: depth, public_only: false });
            let current = names(&toc.root);
            for name in &previous {
                assert!(current.contains(name), "depth {} dropped {}", depth, name);
            }
            previous = current;
        }
    }

    #[test]
    fn public_only_drops_private_subtrees() {
        let temp = fixture();
        let toc = build_toc(&temp.path().join("pkg"), "pkg", TocOptions { max_depth: 3, public_only: true });
        let all = names(&toc.root);
        assert!(!all.iter().any(|n| n.contains("_private") || n.contains("secret")));
        assert!(!all.iter().any(|n| n.ends_with("_hidden")));
        assert!(all.contains(&"3:run".to_string()));
    }

    #[test]
    fn single_module_root() {
        let temp = fixture();
        let toc = build_toc(&temp.path().join("pkg").join("mod.py"), "mod", TocOptions::default());
        assert_eq!(toc.root.kind, TocKind::Module);
        let children: Vec<&str> = toc.root.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(children, vec!["Foo", "bar"]);
        assert_eq!(toc.root.children[0].children.len(), 2);
    }
}
