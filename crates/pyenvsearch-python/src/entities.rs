//! Class, function, method and enum enumeration.
//!
//! Backs `list-classes`, `list-methods`, `list-enums`, `class` and `method`.
//! Every file under the root is outlined once; entities come back ordered by
//! module, then line.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::files::{collect_python_files, is_private_module, is_private_name, PythonFile};
use crate::outline::{base_simple_name, parse_file, ClassOutline, FunctionOutline, ModuleOutline};

// ============================================================================
// Error Types
// ============================================================================

/// Errors from entity lookups.
#[derive(Debug, Error)]
pub enum NavigatorError {
    /// Nothing matched.
    #[error("{what} not found: {name}")]
    NotFound {
        what: &'static str,
        name: String,
        files_searched: usize,
    },

    /// The search root does not exist.
    #[error("path does not exist: {}", .0.display())]
    MissingRoot(PathBuf),
}

pub type NavigatorResult<T> = Result<T, NavigatorError>;

// ============================================================================
// Entity Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Class,
    Enum,
    Function,
    Method,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Class => "class",
            EntityKind::Enum => "enum",
            EntityKind::Function => "function",
            EntityKind::Method => "method",
        }
    }
}

/// A class, enum, function or method found in source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityInfo {
    pub name: String,
    pub kind: EntityKind,
    /// Dotted module name.
    pub module: String,
    /// Owning class for methods.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    pub file: PathBuf,
    pub line: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bases: Vec<String>,
    pub private: bool,
    /// First docstring line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl EntityInfo {
    /// `module.Class.method` style qualified name.
    pub fn qualified_name(&self) -> String {
        match &self.class {
            Some(class) => format!("{}.{}.{}", self.module, class, self.name),
            None => format!("{}.{}", self.module, self.name),
        }
    }
}

/// Which entities a listing returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityFilter {
    /// All classes, enums included.
    Classes,
    /// Top-level functions and methods.
    Methods,
    /// Enum classes only.
    Enums,
}

/// Listing parameters.
#[derive(Debug, Clone, Default)]
pub struct EntityQuery {
    pub include_private: bool,
    /// Restrict enums to those deriving from this base (`IntEnum`, ...).
    pub enum_type: Option<String>,
}

/// Entities plus the files that had to be skipped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityListing {
    pub entities: Vec<EntityInfo>,
    pub files_scanned: usize,
    pub warnings: Vec<String>,
}

impl EntityListing {
    pub fn names(&self) -> Vec<&str> {
        self.entities.iter().map(|e| e.name.as_str()).collect()
    }
}

// ============================================================================
// Walking
// ============================================================================

/// Outline every file under `root`, calling `visit` for each that parses.
fn scan(root: &Path, mut visit: impl FnMut(&PythonFile, &ModuleOutline)) -> NavigatorResult<(usize, Vec<String>)> {
    if !root.exists() {
        return Err(NavigatorError::MissingRoot(root.to_path_buf()));
    }
    let files = collect_python_files(root);
    let mut warnings = Vec::new();
    for file in &files {
        match parse_file(&file.path) {
            Ok(outline) => visit(file, &outline),
            Err(e) => {
                warn!(file = %file.path.display(), error = %e, "skipping unparsable module");
                warnings.push(format!("{}: {}", file.rel_path, e));
            }
        }
    }
    debug!(root = %root.display(), files = files.len(), "scanned modules");
    Ok((files.len(), warnings))
}

fn summary(docstring: Option<&str>) -> Option<String> {
    docstring
        .and_then(pyenvsearch_core::text::first_line)
        .map(str::to_string)
}

fn class_entity(file: &PythonFile, class: &ClassOutline) -> EntityInfo {
    EntityInfo {
        name: class.name.clone(),
        kind: if class.is_enum() {
            EntityKind::Enum
        } else {
            EntityKind::Class
        },
        module: file.module.clone(),
        class: None,
        file: file.path.clone(),
        line: class.line,
        signature: None,
        bases: class.bases.clone(),
        private: is_private_name(&class.name),
        summary: summary(class.docstring.as_deref()),
    }
}

fn function_entity(file: &PythonFile, func: &FunctionOutline, owner: Option<&str>) -> EntityInfo {
    let signature = if func.is_async {
        format!("async {}", func.signature)
    } else {
        func.signature.clone()
    };
    EntityInfo {
        name: func.name.clone(),
        kind: if owner.is_some() {
            EntityKind::Method
        } else {
            EntityKind::Function
        },
        module: file.module.clone(),
        class: owner.map(str::to_string),
        file: file.path.clone(),
        line: func.line,
        signature: Some(signature),
        bases: Vec::new(),
        private: is_private_name(&func.name),
        summary: summary(func.docstring.as_deref()),
    }
}

fn sort_entities(entities: &mut [EntityInfo]) {
    entities.sort_by(|a, b| a.module.cmp(&b.module).then(a.line.cmp(&b.line)));
}

// ============================================================================
// Listing
// ============================================================================

/// List entities of one kind under `root`.
pub fn list_entities(root: &Path, filter: EntityFilter, query: &EntityQuery) -> NavigatorResult<EntityListing> {
    let mut entities = Vec::new();
    let wanted_enum = query.enum_type.as_deref().map(str::to_lowercase);

    let (files_scanned, warnings) = scan(root, |file, outline| {
        if !query.include_private && is_private_module(&file.module) {
            return;
        }
        let visible = |name: &str| query.include_private || !is_private_name(name);

        match filter {
            EntityFilter::Classes => {
                entities.extend(
                    outline
                        .classes
                        .iter()
                        .filter(|c| visible(&c.name))
                        .map(|c| class_entity(file, c)),
                );
            }
            EntityFilter::Enums => {
                entities.extend(
                    outline
                        .classes
                        .iter()
                        .filter(|c| visible(&c.name) && c.is_enum())
                        .filter(|c| match &wanted_enum {
                            Some(wanted) => c
                                .bases
                                .iter()
                                .any(|b| base_simple_name(b).to_lowercase() == *wanted),
                            None => true,
                        })
                        .map(|c| class_entity(file, c)),
                );
            }
            EntityFilter::Methods => {
                entities.extend(
                    outline
                        .functions
                        .iter()
                        .filter(|f| visible(&f.name))
                        .map(|f| function_entity(file, f, None)),
                );
                for class in outline.classes.iter().filter(|c| visible(&c.name)) {
                    entities.extend(
                        class
                            .methods
                            .iter()
                            .filter(|m| visible(&m.name))
                            .map(|m| function_entity(file, m, Some(&class.name))),
                    );
                }
            }
        }
    })?;

    sort_entities(&mut entities);
    Ok(EntityListing {
        entities,
        files_scanned,
        warnings,
    })
}

// ============================================================================
// Lookup
// ============================================================================

fn name_matches(candidate: &str, wanted: &str) -> bool {
    candidate == wanted || candidate.eq_ignore_ascii_case(wanted)
}

/// Find class definitions named `name` (case-insensitive).
pub fn find_classes(root: &Path, name: &str) -> NavigatorResult<EntityListing> {
    let mut entities = Vec::new();
    let (files_scanned, warnings) = scan(root, |file, outline| {
        entities.extend(
            outline
                .classes
                .iter()
                .filter(|c| name_matches(&c.name, name))
                .map(|c| class_entity(file, c)),
        );
    })?;
    if entities.is_empty() {
        return Err(NavigatorError::NotFound {
            what: "class",
            name: name.to_string(),
            files_searched: files_scanned,
        });
    }
    sort_entities(&mut entities);
    Ok(EntityListing {
        entities,
        files_scanned,
        warnings,
    })
}

/// Find methods (and, without a class filter, top-level functions) named
/// `name`, optionally restricted to classes named `class`.
pub fn find_methods(root: &Path, name: &str, class: Option<&str>) -> NavigatorResult<EntityListing> {
    let mut entities = Vec::new();
    let (files_scanned, warnings) = scan(root, |file, outline| {
        if class.is_none() {
            entities.extend(
                outline
                    .functions
                    .iter()
                    .filter(|f| name_matches(&f.name, name))
                    .map(|f| function_entity(file, f, None)),
            );
        }
        for owner in &outline.classes {
            if class.is_some_and(|wanted| !name_matches(&owner.name, wanted)) {
                continue;
            }
            entities.extend(
                owner
                    .methods
                    .iter()
                    .filter(|m| name_matches(&m.name, name))
                    .map(|m| function_entity(file, m, Some(&owner.name))),
            );
        }
    })?;
    if entities.is_empty() {
        let name = match class {
            Some(class) => format!("{}.{}", class, name),
            None => name.to_string(),
        };
        return Err(NavigatorError::NotFound {
            what: "method",
            name,
            files_searched: files_scanned,
        });
    }
    sort_entities(&mut entities);
    Ok(EntityListing {
        entities,
        files_scanned,
        warnings,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn minimal_pkg() -> (TempDir, PathBuf) {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("pkg");
        write(&root, "__init__.py", "");
        write(&root, "mod.py", "class Foo:\n    pass\n\n\ndef bar():\n    pass\n");
        (temp, root)
    }

    fn rich_pkg() -> (TempDir, PathBuf) {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("rich");
        write(&root, "__init__.py", "");
        write(
            &root,
            "models.py",
            "from enum import Enum, IntEnum\n\n\
             class Color(Enum):\n    RED = 1\n\n\
             class Level(IntEnum):\n    LOW = 1\n\n\
             class Model:\n    \"\"\"A model.\"\"\"\n    def save(self):\n        pass\n    def _validate(self):\n        pass\n    def __init__(self):\n        pass\n\n\
             class _Hidden:\n    def save(self):\n        pass\n\n\
             async def fetch(url):\n    pass\n",
        );
        write(&root, "_internal.py", "class Secret:\n    pass\n");
        write(&root, "broken.py", "class (:\n");
        (temp, root)
    }

    #[test]
    fn minimal_package_classes_and_functions() {
        let (_temp, root) = minimal_pkg();
        let classes = list_entities(&root, EntityFilter::Classes, &EntityQuery::default()).unwrap();
        assert_eq!(classes.names(), vec!["Foo"]);
        let methods = list_entities(&root, EntityFilter::Methods, &EntityQuery::default()).unwrap();
        assert_eq!(methods.names(), vec!["bar"]);
        assert_eq!(methods.entities[0].module, "pkg.mod");
        assert_eq!(methods.entities[0].kind, EntityKind::Function);
    }

    #[test]
    fn private_entities_hidden_by_default() {
        let (_temp, root) = rich_pkg();
        let public = list_entities(&root, EntityFilter::Classes, &EntityQuery::default()).unwrap();
        assert_eq!(public.names(), vec!["Color", "Level", "Model"]);

        let all = list_entities(
            &root,
            EntityFilter::Classes,
            &EntityQuery {
                include_private: true,
                enum_type: None,
            },
        )
        .unwrap();
        assert_eq!(all.names(), vec!["Secret", "Color", "Level", "Model", "_Hidden"]);
        assert_eq!(all.warnings.len(), 1);
    }

    #[test]
    fn methods_include_dunders_but_not_private() {
        let (_temp, root) = rich_pkg();
        let methods = list_entities(&root, EntityFilter::Methods, &EntityQuery::default()).unwrap();
        assert_eq!(methods.names(), vec!["save", "__init__", "fetch"]);
        assert_eq!(methods.entities[0].class.as_deref(), Some("Model"));
        assert_eq!(methods.entities[2].signature.as_deref(), Some("async (url)"));
    }

    #[test]
    fn enums_and_enum_type_filter() {
        let (_temp, root) = rich_pkg();
        let enums = list_entities(&root, EntityFilter::Enums, &EntityQuery::default()).unwrap();
        assert_eq!(enums.names(), vec!["Color", "Level"]);
        assert!(enums.entities.iter().all(|e| e.kind == EntityKind::Enum));

        let int_enums = list_entities(
            &root,
            EntityFilter::Enums,
            &EntityQuery {
                include_private: false,
                enum_type: Some("IntEnum".to_string()),
            },
        )
        .unwrap();
        assert_eq!(int_enums.names(), vec!["Level"]);
    }

    #[test]
    fn find_class_by_name() {
        let (_temp, root) = rich_pkg();
        let found = find_classes(&root, "model").unwrap();
        assert_eq!(found.entities.len(), 1);
        assert_eq!(found.entities[0].summary.as_deref(), Some("A model."));
        assert_eq!(found.entities[0].qualified_name(), "rich.models.Model");

        let err = find_classes(&root, "Nope").unwrap_err();
        assert!(matches!(err, NavigatorError::NotFound { what: "class", .. }));
    }

    #[test]
    fn find_method_with_and_without_class() {
        let (_temp, root) = rich_pkg();
        let all = find_methods(&root, "save", None).unwrap();
        assert_eq!(all.entities.len(), 2);

        let scoped = find_methods(&root, "save", Some("Model")).unwrap();
        assert_eq!(scoped.entities.len(), 1);
        assert_eq!(scoped.entities[0].qualified_name(), "rich.models.Model.save");

        let function = find_methods(&root, "fetch", None).unwrap();
        assert_eq!(function.entities[0].kind, EntityKind::Function);

        let err = find_methods(&root, "fetch", Some("Model")).unwrap_err();
        assert_eq!(err.to_string(), "method not found: Model.fetch");
    }

    #[test]
    fn missing_root_is_error() {
        let temp = TempDir::new().unwrap();
        let err = list_entities(&temp.path().join("nope"), EntityFilter::Classes, &EntityQuery::default())
            .unwrap_err();
        assert!(matches!(err, NavigatorError::MissingRoot(_)));
    }
}
