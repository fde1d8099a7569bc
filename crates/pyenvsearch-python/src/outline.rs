//! Shallow Python module outlines via tree-sitter.
//!
//! Extracts what the navigator needs from a module without executing it:
//! top-level classes (bases, docstring, methods) and functions (signature,
//! async flag, docstring). Decorated definitions are looked through.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;
use tree_sitter::{Language, Node, Parser, Tree};

/// Base class names that make a class an enum.
pub const ENUM_BASES: &[&str] = &["Enum", "IntEnum", "StrEnum", "Flag", "IntFlag", "ReprEnum"];

// ============================================================================
// Error Types
// ============================================================================

/// Errors from outlining a module.
#[derive(Debug, Error)]
pub enum OutlineError {
    /// The source has syntax errors.
    #[error("syntax error near line {line}")]
    Syntax { line: usize },

    /// The grammar could not be loaded.
    #[error("failed to load Python grammar: {0}")]
    Language(String),

    /// The parser returned no tree.
    #[error("parser produced no tree")]
    NoTree,

    /// File could not be read (or is not UTF-8).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type OutlineResult<T> = Result<T, OutlineError>;

// ============================================================================
// Outline Types
// ============================================================================

/// A top-level function or a method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionOutline {
    pub name: String,
    /// 1-based line of the `def` keyword.
    pub line: usize,
    /// `(params) -> ret`, whitespace collapsed.
    pub signature: String,
    pub is_async: bool,
    pub docstring: Option<String>,
    /// Decorator expressions without the `@`.
    pub decorators: Vec<String>,
}

/// A top-level class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassOutline {
    pub name: String,
    /// 1-based line of the `class` keyword.
    pub line: usize,
    /// Positional base expressions (keyword arguments such as `metaclass=`
    /// are dropped).
    pub bases: Vec<String>,
    pub docstring: Option<String>,
    pub methods: Vec<FunctionOutline>,
    pub decorators: Vec<String>,
}

impl ClassOutline {
    /// The enum base this class derives from, if any.
    pub fn enum_base(&self) -> Option<&str> {
        self.bases.iter().map(String::as_str).find(|base| {
            let last = base_simple_name(base);
            ENUM_BASES.contains(&last) || last.ends_with("Enum")
        })
    }

    pub fn is_enum(&self) -> bool {
        self.enum_base().is_some()
    }
}

/// Last dotted segment of a base expression, ignoring subscripts
/// (`enum.IntEnum` -> `IntEnum`, `Generic[T]` -> `Generic`).
pub fn base_simple_name(base: &str) -> &str {
    let head = base.split('[').next().unwrap_or(base);
    head.rsplit('.').next().unwrap_or(head).trim()
}

/// Outline of one module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleOutline {
    pub docstring: Option<String>,
    pub classes: Vec<ClassOutline>,
    pub functions: Vec<FunctionOutline>,
}

// ============================================================================
// Parsing
// ============================================================================

fn python_language() -> Language {
    tree_sitter_python::LANGUAGE.into()
}

/// Parse source into a tree-sitter tree (which may contain error nodes).
pub fn parse_tree(source: &str) -> OutlineResult<Tree> {
    let mut parser = Parser::new();
    parser
        .set_language(&python_language())
        .map_err(|e| OutlineError::Language(e.to_string()))?;
    parser.parse(source, None).ok_or(OutlineError::NoTree)
}

/// Outline a module's source text.
///
/// A source whose tree contains syntax errors is rejected with the line of
/// the first error.
pub fn parse_module(source: &str) -> OutlineResult<ModuleOutline> {
    let tree = parse_tree(source)?;
    let root = tree.root_node();
    if root.has_error() {
        let line = first_error_line(root).unwrap_or(1);
        return Err(OutlineError::Syntax { line });
    }

    let src = source.as_bytes();
    let mut outline = ModuleOutline {
        docstring: block_docstring(root, src),
        ..Default::default()
    };

    let mut cursor = root.walk();
    for child in root.named_children(&mut cursor) {
        let (definition, decorators) = unwrap_decorated(child, src);
        match definition.kind() {
            "class_definition" => {
                if let Some(class) = class_outline(definition, decorators, src) {
                    outline.classes.push(class);
                }
            }
            "function_definition" => {
                if let Some(func) = function_outline(definition, decorators, src) {
                    outline.functions.push(func);
                }
            }
            _ => {}
        }
    }
    Ok(outline)
}

/// Read a source file, replacing invalid UTF-8 (Latin-1 and other legacy
/// encodings) with U+FFFD so line numbers stay intact.
pub fn read_source(path: &Path) -> io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Read and outline a file.
pub fn parse_file(path: &Path) -> OutlineResult<ModuleOutline> {
    let source = read_source(path)?;
    parse_module(&source)
}

fn first_error_line(node: Node) -> Option<usize> {
    if node.is_error() || node.is_missing() {
        return Some(node.start_position().row + 1);
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|child| child.has_error())
        .find_map(first_error_line)
}

pub(crate) fn node_text<'a>(node: Node, src: &'a [u8]) -> &'a str {
    node.utf8_text(src).unwrap_or("")
}

/// Split a `decorated_definition` into its definition and decorator texts.
fn unwrap_decorated<'t>(node: Node<'t>, src: &[u8]) -> (Node<'t>, Vec<String>) {
    if node.kind() != "decorated_definition" {
        return (node, Vec::new());
    }
    let mut decorators = Vec::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() == "decorator" {
            let text = node_text(child, src).trim_start_matches('@').trim();
            decorators.push(collapse(text));
        }
    }
    let definition = node.child_by_field_name("definition").unwrap_or(node);
    (definition, decorators)
}

fn class_outline(node: Node, decorators: Vec<String>, src: &[u8]) -> Option<ClassOutline> {
    let name = node_text(node.child_by_field_name("name")?, src).to_string();
    let bases = node
        .child_by_field_name("superclasses")
        .map(|args| {
            let mut cursor = args.walk();
            args.named_children(&mut cursor)
                .filter(|arg| !matches!(arg.kind(), "keyword_argument" | "comment"))
                .map(|arg| collapse(node_text(arg, src)))
                .collect()
        })
        .unwrap_or_default();

    let body = node.child_by_field_name("body");
    let mut methods = Vec::new();
    if let Some(body) = body {
        let mut cursor = body.walk();
        for child in body.named_children(&mut cursor) {
            let (definition, decorators) = unwrap_decorated(child, src);
            if definition.kind() == "function_definition" {
                if let Some(method) = function_outline(definition, decorators, src) {
                    methods.push(method);
                }
            }
        }
    }

    Some(ClassOutline {
        name,
        line: node.start_position().row + 1,
        bases,
        docstring: body.and_then(|b| block_docstring(b, src)),
        methods,
        decorators,
    })
}

fn function_outline(node: Node, decorators: Vec<String>, src: &[u8]) -> Option<FunctionOutline> {
    let name = node_text(node.child_by_field_name("name")?, src).to_string();
    let params = node
        .child_by_field_name("parameters")
        .map(|p| collapse(node_text(p, src)))
        .unwrap_or_else(|| "()".to_string());
    let signature = match node.child_by_field_name("return_type") {
        Some(ret) => format!("{} -> {}", params, collapse(node_text(ret, src))),
        None => params,
    };
    Some(FunctionOutline {
        name,
        line: node.start_position().row + 1,
        signature,
        is_async: is_async_def(node),
        docstring: node
            .child_by_field_name("body")
            .and_then(|b| block_docstring(b, src)),
        decorators,
    })
}

fn is_async_def(node: Node) -> bool {
    node.child(0).is_some_and(|first| first.kind() == "async")
}

/// Collapse internal whitespace so multi-line parameter lists render on one
/// line, and drop the trailing comma a formatter leaves behind.
fn collapse(text: &str) -> String {
    let joined = text.split_whitespace().collect::<Vec<_>>().join(" ");
    joined.replace("( ", "(").replace(", )", ")").replace(",)", ")")
}

/// Docstring of a module or block: a leading string expression statement.
fn block_docstring(block: Node, src: &[u8]) -> Option<String> {
    let mut cursor = block.walk();
    let first = block
        .named_children(&mut cursor)
        .find(|child| child.kind() != "comment")?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let expr = first.named_child(0)?;
    if expr.kind() != "string" {
        return None;
    }
    let literal = string_literal_value(node_text(expr, src))?;
    let cleaned = clean_docstring(&literal);
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Strip prefix and quotes from a Python string literal. Escapes are left as
/// written; bytes literals are not docstrings.
fn string_literal_value(literal: &str) -> Option<String> {
    let prefix_len = literal
        .find(|c| c == '"' || c == '\'')
        .unwrap_or(literal.len());
    let prefix = literal[..prefix_len].to_ascii_lowercase();
    if prefix.contains('b') {
        return None;
    }
    let body = &literal[prefix_len..];
    for quote in ["\"\"\"", "'''", "\"", "'"] {
        if body.len() >= 2 * quote.len() && body.starts_with(quote) && body.ends_with(quote) {
            return Some(body[quote.len()..body.len() - quote.len()].to_string());
        }
    }
    None
}

/// Leading whitespace, in chars.
fn leading_whitespace(line: &str) -> usize {
    line.chars().take_while(|c| c.is_whitespace()).count()
}

/// Dedent a docstring the way `inspect.cleandoc` does.
pub fn clean_docstring(raw: &str) -> String {
    let lines: Vec<&str> = raw.lines().collect();
    let Some((first, rest)) = lines.split_first() else {
        return String::new();
    };
    let indent = rest
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| leading_whitespace(line))
        .min()
        .unwrap_or(0);

    let mut out: Vec<String> = vec![first.trim().to_string()];
    out.extend(rest.iter().map(|line| {
        let skip = leading_whitespace(line).min(indent);
        line.chars().skip(skip).collect::<String>().trim_end().to_string()
    }));
    while out.first().is_some_and(|l| l.is_empty()) {
        out.remove(0);
    }
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out.join("\n")
}

// ============================================================================
// Definition Spans
// ============================================================================

/// Class or function, for span lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefinitionKind {
    Class,
    Function,
}

/// A (possibly nested) definition and the lines it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionSpan {
    pub kind: DefinitionKind,
    pub name: String,
    /// Dotted path through enclosing definitions (`Outer.Inner.method`).
    pub qualname: String,
    pub is_async: bool,
    /// 1-based first line (the `class`/`def` keyword).
    pub start_line: usize,
    /// 1-based last line.
    pub end_line: usize,
}

/// Every class and function definition in a source, in source order.
///
/// Works on partial trees: syntax errors elsewhere in the file do not hide
/// the definitions tree-sitter could recover.
pub fn definition_spans(source: &str) -> OutlineResult<Vec<DefinitionSpan>> {
    let tree = parse_tree(source)?;
    let mut spans = Vec::new();
    collect_spans(tree.root_node(), source.as_bytes(), "", &mut spans);
    Ok(spans)
}

fn collect_spans(node: Node, src: &[u8], prefix: &str, spans: &mut Vec<DefinitionSpan>) {
    let mut cursor = node.walk();
    let children: Vec<Node> = node.named_children(&mut cursor).collect();
    for child in children {
        let kind = match child.kind() {
            "class_definition" => Some(DefinitionKind::Class),
            "function_definition" => Some(DefinitionKind::Function),
            _ => None,
        };
        let name = child
            .child_by_field_name("name")
            .map(|n| node_text(n, src).to_string());
        match (kind, name) {
            (Some(kind), Some(name)) => {
                let qualname = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{}.{}", prefix, name)
                };
                spans.push(DefinitionSpan {
                    kind,
                    name,
                    qualname: qualname.clone(),
                    is_async: kind == DefinitionKind::Function && is_async_def(child),
                    start_line: child.start_position().row + 1,
                    end_line: child.end_position().row + 1,
                });
                collect_spans(child, src, &qualname, spans);
            }
            _ => collect_spans(child, src, prefix, spans),
        }
    }
}

/// Qualified name of the innermost definition containing `line`.
pub fn enclosing_definition(spans: &[DefinitionSpan], line: usize) -> Option<&str> {
    spans
        .iter()
        .filter(|span| span.start_line <= line && line <= span.end_line)
        .max_by_key(|span| (span.start_line, std::cmp::Reverse(span.end_line)))
        .map(|span| span.qualname.as_str())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#""""Sample module.

More details.
"""
import enum


class Color(enum.Enum):
    """Primary colors."""
    RED = 1

    def describe(self) -> str:
        return self.name


@dataclass(frozen=True)
class Point(Base, metaclass=Meta):
    x: int

    @property
    def norm(self):
        '''Euclidean norm.'''
        return 0

    async def fetch(
        self,
        url: str,
    ) -> bytes:
        pass


def helper(a, b=2, *args, **kwargs):
    """Add things.

    Longer text.
    """
    return a


async def main() -> None:
    pass


def _private():
    def inner():
        pass
"#;

    #[test]
    fn module_docstring() {
        let outline = parse_module(SAMPLE).unwrap();
        assert_eq!(
            outline.docstring.as_deref(),
            Some("Sample module.\n\nMore details.")
        );
    }

    #[test]
    fn classes_and_bases() {
        let outline = parse_module(SAMPLE).unwrap();
        let names: Vec<&str> = outline.classes.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Color", "Point"]);

        let color = &outline.classes[0];
        assert_eq!(color.bases, vec!["enum.Enum"]);
        assert!(color.is_enum());
        assert_eq!(color.docstring.as_deref(), Some("Primary colors."));
        assert_eq!(color.line, 8);

        let point = &outline.classes[1];
        assert_eq!(point.bases, vec!["Base"]);
        assert!(!point.is_enum());
        assert_eq!(point.decorators, vec!["dataclass(frozen=True)"]);
        assert_eq!(point.line, 17);
    }

    #[test]
    fn methods_through_decorators() {
        let outline = parse_module(SAMPLE).unwrap();
        let point = &outline.classes[1];
        let names: Vec<&str> = point.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["norm", "fetch"]);
        assert_eq!(point.methods[0].decorators, vec!["property"]);
        assert_eq!(point.methods[0].docstring.as_deref(), Some("Euclidean norm."));
        assert!(point.methods[1].is_async);
        assert_eq!(point.methods[1].signature, "(self, url: str) -> bytes");
    }

    #[test]
    fn functions_and_signatures() {
        let outline = parse_module(SAMPLE).unwrap();
        let names: Vec<&str> = outline.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["helper", "main", "_private"]);

        let helper = &outline.functions[0];
        assert_eq!(helper.signature, "(a, b=2, *args, **kwargs)");
        assert_eq!(helper.docstring.as_deref(), Some("Add things.\n\nLonger text."));
        assert!(!helper.is_async);

        let main = &outline.functions[1];
        assert!(main.is_async);
        assert_eq!(main.signature, "() -> None");
    }

    #[test]
    fn syntax_error_is_reported() {
        let err = parse_module("def ok():\n    pass\n\nclass (:\n").unwrap_err();
        assert!(matches!(err, OutlineError::Syntax { .. }));
    }

    #[test]
    fn empty_module() {
        let outline = parse_module("").unwrap();
        assert!(outline.classes.is_empty());
        assert!(outline.functions.is_empty());
        assert!(outline.docstring.is_none());
    }

    #[test]
    fn enum_base_detection() {
        let outline =
            parse_module("class A(IntEnum):\n    pass\nclass B(MyEnum):\n    pass\nclass C(Generic[T]):\n    pass\n")
                .unwrap();
        assert_eq!(outline.classes[0].enum_base(), Some("IntEnum"));
        assert_eq!(outline.classes[1].enum_base(), Some("MyEnum"));
        assert_eq!(outline.classes[2].enum_base(), None);
        assert_eq!(base_simple_name("Generic[T]"), "Generic");
    }

    #[test]
    fn clean_docstring_dedents() {
        assert_eq!(clean_docstring("Title.\n    body\n      indented\n    "), "Title.\nbody\n  indented");
        assert_eq!(clean_docstring(""), "");
    }

    #[test]
    fn docstring_indented_with_non_ascii_whitespace() {
        assert_eq!(clean_docstring("Title.\n   a\n\u{a0}\u{a0}b\n"), "Title.\n a\nb");

        let outline = parse_module("def f():\n    \"\"\"Title.\n   a\n\u{a0}\u{a0}b\n\"\"\"\n").unwrap();
        assert_eq!(outline.functions[0].docstring.as_deref(), Some("Title.\n a\nb"));
    }

    #[test]
    fn string_literal_prefixes() {
        assert_eq!(string_literal_value(r#"r"""raw""""#).as_deref(), Some("raw"));
        assert_eq!(string_literal_value("'x'").as_deref(), Some("x"));
        assert_eq!(string_literal_value("b'x'"), None);
    }

    #[test]
    fn spans_and_enclosing() {
        let spans = definition_spans(SAMPLE).unwrap();
        let qualnames: Vec<&str> = spans.iter().map(|s| s.qualname.as_str()).collect();
        assert!(qualnames.contains(&"Color.describe"));
        assert!(qualnames.contains(&"Point.fetch"));
        assert!(qualnames.contains(&"_private.inner"));

        // line 13: "return self.name" inside Color.describe
        assert_eq!(enclosing_definition(&spans, 13), Some("Color.describe"));
        // line 10: "RED = 1" inside Color only
        assert_eq!(enclosing_definition(&spans, 10), Some("Color"));
        // line 5: "import enum" at module level
        assert_eq!(enclosing_definition(&spans, 5), None);
    }
}
