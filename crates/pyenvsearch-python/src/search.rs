//! Source search over Python files.
//!
//! Two interchangeable implementations sit behind [`SearchBackend`]:
//!
//! - **External tools**: `rg` for literal and regex searches, `ast-grep` for
//!   structural ones, both driven through their JSON output.
//! - **Library**: a `walkdir` traversal matching line by line with
//!   `str::contains` / the `regex` crate, and tree-sitter for structural
//!   declaration patterns.
//!
//! Both walk the same files (`*.py`, hidden entries and cache/metadata
//! directories skipped) and return the same records, sorted by path and line.
//! The enclosing definition of every hit is filled in afterwards by one
//! shared tree-sitter pass, so the context never depends on the backend.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use pyenvsearch_core::process::{find_executable, run_command, CommandSpec};

use crate::files::{collect_python_files, EXCLUDED_DIRS, EXCLUDED_DIR_SUFFIXES};
use crate::outline::{definition_spans, enclosing_definition, read_source, DefinitionKind, DefinitionSpan};

/// Timeout for one external search run.
const SEARCH_TIMEOUT: Duration = Duration::from_secs(120);

// ============================================================================
// Error Types
// ============================================================================

/// Errors from searching.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The pattern cannot be compiled.
    #[error("invalid pattern {pattern:?}: {reason}")]
    BadPattern { pattern: String, reason: String },

    /// The search root does not exist.
    #[error("search path does not exist: {}", .0.display())]
    MissingRoot(PathBuf),

    /// An external tool could not run or reported an error.
    #[error("{tool} failed: {message}")]
    ToolFailed { tool: String, message: String },
}

// ============================================================================
// Query and Result Types
// ============================================================================

/// How the pattern is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Plain substring.
    #[default]
    Literal,
    /// Regular expression (Rust `regex` syntax, as used by `rg`).
    Regex,
    /// Syntax-aware pattern in ast-grep notation.
    Structural,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Literal => "literal",
            SearchMode::Regex => "regex",
            SearchMode::Structural => "structural",
        }
    }
}

/// Search parameters.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub mode: SearchMode,
    pub ignore_case: bool,
    /// Keep at most this many results (after sorting).
    pub max_results: Option<usize>,
}

/// One matching line.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SearchResult {
    pub path: PathBuf,
    /// 1-based line number.
    pub line: usize,
    /// Line text without the trailing newline.
    pub text: String,
    /// Innermost enclosing definition (`Class.method`, `function`, `Class`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Search results and how they were produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub results: Vec<SearchResult>,
    /// Name of the backend that produced the results.
    pub backend: String,
    /// Matches before `max_results` was applied.
    pub total_matches: usize,
    pub truncated: bool,
    /// Degradations (tool fell back, files skipped).
    pub warnings: Vec<String>,
}

// ============================================================================
// Backend Trait
// ============================================================================

/// A search implementation.
///
/// Implementations return results in any order and without context; the
/// caller sorts, deduplicates and annotates them.
pub trait SearchBackend {
    /// Short name reported in output metadata.
    fn name(&self) -> &'static str;

    /// Run a search under `root` (a directory or a single file).
    fn search(&self, root: &Path, pattern: &str, options: &SearchOptions) -> Result<Vec<SearchResult>, SearchError>;
}

/// Check a pattern before any backend runs.
pub fn validate_pattern(pattern: &str, options: &SearchOptions) -> Result<(), SearchError> {
    if pattern.is_empty() {
        return Err(SearchError::BadPattern {
            pattern: String::new(),
            reason: "pattern is empty".to_string(),
        });
    }
    if options.mode == SearchMode::Regex {
        build_regex(pattern, options.ignore_case)?;
    }
    Ok(())
}

fn build_regex(pattern: &str, ignore_case: bool) -> Result<Regex, SearchError> {
    RegexBuilder::new(pattern)
        .case_insensitive(ignore_case)
        .build()
        .map_err(|e| SearchError::BadPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
}

fn strip_line_ending(text: &str) -> &str {
    let text = text.strip_suffix('\n').unwrap_or(text);
    text.strip_suffix('\r').unwrap_or(text)
}

// ============================================================================
// Ripgrep Backend
// ============================================================================

/// `rg --json` for literal and regex searches.
#[derive(Debug, Clone)]
pub struct RipgrepBackend {
    binary: PathBuf,
}

#[derive(Debug, Deserialize)]
struct RgLine {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RgMatch {
    path: RgText,
    lines: RgText,
    line_number: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RgText {
    /// Absent when the data is not valid UTF-8 (ripgrep sends `bytes`).
    text: Option<String>,
}

impl RipgrepBackend {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        RipgrepBackend {
            binary: binary.into(),
        }
    }

    /// `rg` from `$PATH`, if installed.
    pub fn detect() -> Option<Self> {
        find_executable("rg").map(Self::new)
    }

    fn command(&self, root: &Path, pattern: &str, options: &SearchOptions) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.binary)
            .args(["--json", "--no-config", "--no-ignore", "--no-messages"])
            .args(["--glob", "*.py"]);
        for dir in EXCLUDED_DIRS {
            spec = spec.args(["--glob".to_string(), format!("!{}/", dir)]);
        }
        for suffix in EXCLUDED_DIR_SUFFIXES {
            spec = spec.args(["--glob".to_string(), format!("!*{}/", suffix)]);
        }
        if options.mode == SearchMode::Literal {
            spec = spec.arg("--fixed-strings");
        }
        if options.ignore_case {
            spec = spec.arg("--ignore-case");
        }
        spec.arg("--regexp")
            .arg(pattern)
            .arg("--")
            .arg(root.as_os_str())
            .with_timeout(SEARCH_TIMEOUT)
    }
}

impl SearchBackend for RipgrepBackend {
    fn name(&self) -> &'static str {
        "ripgrep"
    }

    fn search(&self, root: &Path, pattern: &str, options: &SearchOptions) -> Result<Vec<SearchResult>, SearchError> {
        if options.mode == SearchMode::Structural {
            return Err(SearchError::ToolFailed {
                tool: "rg".to_string(),
                message: "structural patterns are not supported".to_string(),
            });
        }
        let spec = self.command(root, pattern, options);
        let output = run_command(&spec).map_err(|e| SearchError::ToolFailed {
            tool: "rg".to_string(),
            message: e.to_string(),
        })?;

        // 0 = matches, 1 = no matches, 2 = error (possibly with partial output)
        let results = parse_rg_output(&output.stdout, root);
        match output.exit_code {
            Some(0) | Some(1) => Ok(results),
            Some(2) if !results.is_empty() => {
                warn!(stderr = %output.stderr.trim(), "rg reported errors; keeping partial results");
                Ok(results)
            }
            _ => Err(SearchError::ToolFailed {
                tool: "rg".to_string(),
                message: format!("{}: {}", output.describe_exit(), output.stderr.trim()),
            }),
        }
    }
}

fn parse_rg_output(stdout: &str, root: &Path) -> Vec<SearchResult> {
    stdout
        .lines()
        .filter_map(|line| serde_json::from_str::<RgLine>(line).ok())
        .filter(|msg| msg.kind == "match")
        .filter_map(|msg| serde_json::from_value::<RgMatch>(msg.data).ok())
        .filter_map(|m| {
            let path = PathBuf::from(m.path.text?);
            let path = if path.is_relative() { root.join(path) } else { path };
            Some(SearchResult {
                path,
                line: m.line_number?,
                text: strip_line_ending(&m.lines.text?).to_string(),
                context: None,
            })
        })
        .collect()
}

// ============================================================================
// ast-grep Backend
// ============================================================================

/// `ast-grep run --json=stream` for structural searches.
#[derive(Debug, Clone)]
pub struct AstGrepBackend {
    binary: PathBuf,
}

#[derive(Debug, Deserialize)]
struct SgMatch {
    file: String,
    #[serde(default)]
    lines: Option<String>,
    text: String,
    range: SgRange,
}

#[derive(Debug, Deserialize)]
struct SgRange {
    start: SgPosition,
}

#[derive(Debug, Deserialize)]
struct SgPosition {
    /// 0-based.
    line: usize,
}

impl AstGrepBackend {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        AstGrepBackend {
            binary: binary.into(),
        }
    }

    /// `ast-grep` from `$PATH`, or `sg` when it identifies as ast-grep
    /// (on Linux `sg` is usually the shadow-utils group tool).
    pub fn detect() -> Option<Self> {
        if let Some(path) = find_executable("ast-grep") {
            return Some(Self::new(path));
        }
        let sg = find_executable("sg")?;
        let probe = CommandSpec::new(&sg)
            .arg("--version")
            .with_timeout(Duration::from_secs(10));
        match run_command(&probe) {
            Ok(output) if output.success && output.stdout.contains("ast-grep") => Some(Self::new(sg)),
            _ => {
                debug!(path = %sg.display(), "sg is not ast-grep");
                None
            }
        }
    }
}

impl SearchBackend for AstGrepBackend {
    fn name(&self) -> &'static str {
        "ast-grep"
    }

    fn search(&self, root: &Path, pattern: &str, options: &SearchOptions) -> Result<Vec<SearchResult>, SearchError> {
        if options.mode != SearchMode::Structural {
            return Err(SearchError::ToolFailed {
                tool: "ast-grep".to_string(),
                message: "only structural patterns are supported".to_string(),
            });
        }
        let mut spec = CommandSpec::new(&self.binary)
            .args(["run", "--lang", "python", "--json=stream", "--no-ignore", "vcs"])
            .args(["--globs", "*.py"]);
        for dir in EXCLUDED_DIRS {
            spec = spec.args(["--globs".to_string(), format!("!**/{}/**", dir)]);
        }
        let spec = spec
            .arg("--pattern")
            .arg(pattern)
            .arg(root.as_os_str())
            .with_timeout(SEARCH_TIMEOUT);

        let output = run_command(&spec).map_err(|e| SearchError::ToolFailed {
            tool: "ast-grep".to_string(),
            message: e.to_string(),
        })?;
        if !matches!(output.exit_code, Some(0) | Some(1)) {
            return Err(SearchError::ToolFailed {
                tool: "ast-grep".to_string(),
                message: format!("{}: {}", output.describe_exit(), output.stderr.trim()),
            });
        }

        Ok(output
            .stdout
            .lines()
            .filter_map(|line| serde_json::from_str::<SgMatch>(line).ok())
            .map(|m| {
                let path = PathBuf::from(&m.file);
                let path = if path.is_relative() { root.join(path) } else { path };
                let source = m.lines.as_deref().unwrap_or(&m.text);
                SearchResult {
                    path,
                    line: m.range.start.line + 1,
                    text: source.lines().next().unwrap_or("").to_string(),
                    context: None,
                }
            })
            .collect())
    }
}

// ============================================================================
// Library Backend
// ============================================================================

/// Pure-library fallback: walkdir + `contains` / `regex` / tree-sitter.
#[derive(Debug, Clone, Copy, Default)]
pub struct LibraryBackend;

impl SearchBackend for LibraryBackend {
    fn name(&self) -> &'static str {
        "library"
    }

    fn search(&self, root: &Path, pattern: &str, options: &SearchOptions) -> Result<Vec<SearchResult>, SearchError> {
        let matcher = LineMatcher::new(pattern, options)?;
        let mut results = Vec::new();

        for file in collect_python_files(root) {
            let Ok(source) = read_source(&file.path) else {
                debug!(file = %file.path.display(), "skipping unreadable file");
                continue;
            };
            match &matcher {
                LineMatcher::Declaration(decl) => {
                    let Ok(spans) = definition_spans(&source) else {
                        continue;
                    };
                    let lines: Vec<&str> = source.lines().collect();
                    for span in spans.iter().filter(|span| decl.matches(span)) {
                        results.push(SearchResult {
                            path: file.path.clone(),
                            line: span.start_line,
                            text: lines
                                .get(span.start_line - 1)
                                .copied()
                                .unwrap_or_default()
                                .to_string(),
                            context: None,
                        });
                    }
                }
                _ => {
                    for (idx, line) in source.lines().enumerate() {
                        if matcher.is_match(line) {
                            results.push(SearchResult {
                                path: file.path.clone(),
                                line: idx + 1,
                                text: line.to_string(),
                                context: None,
                            });
                        }
                    }
                }
            }
        }
        Ok(results)
    }
}

enum LineMatcher {
    Literal { needle: String, ignore_case: bool },
    Regex(Regex),
    Declaration(DeclarationPattern),
}

impl LineMatcher {
    fn new(pattern: &str, options: &SearchOptions) -> Result<Self, SearchError> {
        Ok(match options.mode {
            SearchMode::Literal => LineMatcher::Literal {
                needle: if options.ignore_case {
                    pattern.to_lowercase()
                } else {
                    pattern.to_string()
                },
                ignore_case: options.ignore_case,
            },
            SearchMode::Regex => LineMatcher::Regex(build_regex(pattern, options.ignore_case)?),
            SearchMode::Structural => match DeclarationPattern::parse(pattern, options.ignore_case) {
                Some(decl) => LineMatcher::Declaration(decl),
                None => LineMatcher::Regex(build_regex(
                    &structural_to_regex(pattern),
                    options.ignore_case,
                )?),
            },
        })
    }

    fn is_match(&self, line: &str) -> bool {
        match self {
            LineMatcher::Literal { needle, ignore_case } => {
                if *ignore_case {
                    line.to_lowercase().contains(needle.as_str())
                } else {
                    line.contains(needle.as_str())
                }
            }
            LineMatcher::Regex(regex) => regex.is_match(line),
            LineMatcher::Declaration(_) => false,
        }
    }
}

/// `class NAME`, `def NAME` or `async def NAME`, optionally followed by a
/// parameter list and colon.
#[derive(Debug, Clone)]
pub struct DeclarationPattern {
    kind: DefinitionKind,
    require_async: bool,
    /// `None` matches any name (`$NAME` metavariable).
    name: Option<Regex>,
}

fn declaration_syntax() -> Option<&'static Regex> {
    static SYNTAX: OnceLock<Option<Regex>> = OnceLock::new();
    SYNTAX
        .get_or_init(|| {
            Regex::new(
                r"^\s*(class|async\s+def|def)\s+(\$\$?\$?[A-Z_][A-Z0-9_]*|[A-Za-z_*][A-Za-z0-9_*]*)\s*(\(.*\))?\s*:?\s*(\$\$\$[A-Z_]*)?\s*$",
            )
            .ok()
        })
        .as_ref()
}

impl DeclarationPattern {
    /// Recognize a declaration pattern; anything else returns `None`.
    pub fn parse(pattern: &str, ignore_case: bool) -> Option<Self> {
        let caps = declaration_syntax()?.captures(pattern)?;
        let keyword = caps.get(1)?.as_str();
        let name = caps.get(2)?.as_str();
        let (kind, require_async) = match keyword {
            "class" => (DefinitionKind::Class, false),
            "def" => (DefinitionKind::Function, false),
            _ => (DefinitionKind::Function, true),
        };
        let name = if name.starts_with('$') {
            None
        } else {
            let escaped = regex::escape(name).replace(r"\*", ".*");
            Some(
                RegexBuilder::new(&format!("^{}$", escaped))
                    .case_insensitive(ignore_case)
                    .build()
                    .ok()?,
            )
        };
        Some(DeclarationPattern {
            kind,
            require_async,
            name,
        })
    }

    fn matches(&self, span: &DefinitionSpan) -> bool {
        span.kind == self.kind
            && (!self.require_async || span.is_async)
            && self.name.as_ref().is_none_or(|re| re.is_match(&span.name))
    }
}

/// Translate an ast-grep style pattern into a line regex.
///
/// `$$$X` matches any text, `$X` one identifier, whitespace is flexible and
/// everything else is literal.
pub fn structural_to_regex(pattern: &str) -> String {
    let chars: Vec<char> = pattern.trim().chars().collect();
    let mut out = String::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '$' {
            let mut dollars = 0;
            while i < chars.len() && chars[i] == '$' {
                dollars += 1;
                i += 1;
            }
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            if dollars >= 3 {
                out.push_str(".*?");
            } else {
                out.push_str("[A-Za-z_][A-Za-z0-9_]*");
            }
        } else if c.is_whitespace() {
            while i < chars.len() && chars[i].is_whitespace() {
                i += 1;
            }
            out.push_str(r"\s*");
        } else {
            out.push_str(&regex::escape(&c.to_string()));
            i += 1;
        }
    }
    out
}

// ============================================================================
// Engine
// ============================================================================

/// Backend selection plus post-processing.
#[derive(Debug, Clone, Default)]
pub struct SearchEngine {
    pub ripgrep: Option<RipgrepBackend>,
    pub ast_grep: Option<AstGrepBackend>,
}

impl SearchEngine {
    /// Use whatever external tools are installed.
    pub fn detect() -> Self {
        let engine = SearchEngine {
            ripgrep: RipgrepBackend::detect(),
            ast_grep: AstGrepBackend::detect(),
        };
        debug!(
            ripgrep = engine.ripgrep.is_some(),
            ast_grep = engine.ast_grep.is_some(),
            "detected search tools"
        );
        engine
    }

    /// Library backend only.
    pub fn library_only() -> Self {
        SearchEngine::default()
    }

    fn external_for(&self, mode: SearchMode) -> Option<&dyn SearchBackend> {
        match mode {
            SearchMode::Literal | SearchMode::Regex => {
                self.ripgrep.as_ref().map(|b| b as &dyn SearchBackend)
            }
            SearchMode::Structural => self.ast_grep.as_ref().map(|b| b as &dyn SearchBackend),
        }
    }

    /// Search `root` for `pattern`.
    pub fn search(&self, root: &Path, pattern: &str, options: &SearchOptions) -> Result<SearchOutcome, SearchError> {
        validate_pattern(pattern, options)?;
        if !root.exists() {
            return Err(SearchError::MissingRoot(root.to_path_buf()));
        }
        let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        let mut warnings = Vec::new();

        let external = self.external_for(options.mode);
        let (backend, raw) = match external.map(|b| (b.name(), b.search(&root, pattern, options))) {
            Some((name, Ok(results))) => (name, results),
            Some((name, Err(e))) => {
                warn!(backend = name, error = %e, "external search failed; using library backend");
                warnings.push(format!("{}; fell back to library search", e));
                (LibraryBackend.name(), LibraryBackend.search(&root, pattern, options)?)
            }
            None => {
                debug!(mode = options.mode.as_str(), "no external search tool; using library backend");
                (LibraryBackend.name(), LibraryBackend.search(&root, pattern, options)?)
            }
        };

        let mut results = raw;
        results.sort();
        results.dedup_by(|a, b| a.path == b.path && a.line == b.line);
        let total_matches = results.len();
        let truncated = options.max_results.is_some_and(|max| total_matches > max);
        if let Some(max) = options.max_results {
            results.truncate(max);
        }
        annotate_context(&mut results);

        Ok(SearchOutcome {
            results,
            backend: backend.to_string(),
            total_matches,
            truncated,
            warnings,
        })
    }
}

/// Fill in the enclosing definition of each result, parsing each file once.
pub fn annotate_context(results: &mut [SearchResult]) {
    let mut spans_by_file: BTreeMap<PathBuf, Option<Vec<DefinitionSpan>>> = BTreeMap::new();
    for result in results.iter_mut() {
        let spans = spans_by_file
            .entry(result.path.clone())
            .or_insert_with(|| {
                read_source(&result.path)
                    .ok()
                    .and_then(|source| definition_spans(&source).ok())
            });
        result.context = spans
            .as_deref()
            .and_then(|spans| enclosing_definition(spans, result.line))
            .map(str::to_string);
    }
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

    fn fixture() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(
            root,
            "pkg/client.py",
            "import json\n\n\nclass Client:\n    def fetch(self, url):\n        return json.loads(url)\n\n    async def close(self):\n        pass\n\n\ndef helper():\n    return json.dumps({})\n",
        );
        write(root, "pkg/util.py", "def parse(data):\n    # JSON parsing\n    return data\n");
        write(root, "pkg/__pycache__/client.py", "json json json\n");
        write(root, "pkg/.hidden.py", "json\n");
        write(root, "pkg/notes.txt", "json\n");
        temp
    }

    fn opts(mode: SearchMode) -> SearchOptions {
        SearchOptions {
            mode,
            ..Default::default()
        }
    }

    fn pairs(outcome: &SearchOutcome) -> Vec<(String, usize)> {
        outcome
            .results
            .iter()
            .map(|r| (r.path.file_name().unwrap().to_string_lossy().into_owned(), r.line))
            .collect()
    }

    #[test]
    fn literal_search_with_context() {
        let temp = fixture();
        let outcome = SearchEngine::library_only()
            .search(temp.path(), "json", &opts(SearchMode::Literal))
            .unwrap();
        assert_eq!(outcome.backend, "library");
        assert_eq!(
            pairs(&outcome),
            vec![
                ("client.py".to_string(), 1),
                ("client.py".to_string(), 6),
                ("client.py".to_string(), 13)
            ]
        );
        assert_eq!(outcome.results[0].context, None);
        assert_eq!(outcome.results[1].context.as_deref(), Some("Client.fetch"));
        assert_eq!(outcome.results[2].context.as_deref(), Some("helper"));
        assert_eq!(outcome.results[1].text, "        return json.loads(url)");
    }

    #[test]
    fn latin1_source_is_searched() {
        let temp = TempDir::new().unwrap();
        let mut bytes = b"# -*- coding: latin-1 -*-\n# caf".to_vec();
        bytes.push(0xE9);
        bytes.extend_from_slice(b"\nimport json\n\ndef load():\n    return json\n");
        fs::write(temp.path().join("legacy.py"), bytes).unwrap();

        let outcome = SearchEngine::library_only()
            .search(temp.path(), "import json", &opts(SearchMode::Literal))
            .unwrap();
        assert_eq!(pairs(&outcome), vec![("legacy.py".to_string(), 3)]);
        assert!(outcome.warnings.is_empty());

        let outcome = SearchEngine::library_only()
            .search(temp.path(), "return json", &opts(SearchMode::Literal))
            .unwrap();
        assert_eq!(outcome.results[0].context.as_deref(), Some("load"));
    }

    #[test]
    fn ignore_case() {
        let temp = fixture();
        let options = SearchOptions {
            mode: SearchMode::Literal,
            ignore_case: true,
            max_results: None,
        };
        let outcome = SearchEngine::library_only()
            .search(temp.path(), "JSON", &options)
            .unwrap();
        assert_eq!(outcome.results.len(), 4);
        assert!(outcome.results.iter().any(|r| r.text.contains("# JSON parsing")));
    }

    #[test]
    fn regex_search() {
        let temp = fixture();
        let outcome = SearchEngine::library_only()
            .search(temp.path(), r"json\.(loads|dumps)", &opts(SearchMode::Regex))
            .unwrap();
        assert_eq!(outcome.results.len(), 2);
    }

    #[test]
    fn bad_regex_is_rejected_before_search() {
        let temp = fixture();
        let err = SearchEngine::library_only()
            .search(temp.path(), "foo(", &opts(SearchMode::Regex))
            .unwrap_err();
        assert!(matches!(err, SearchError::BadPattern { .. }));

        // Validation happens even for a root that does not exist.
        let err = SearchEngine::library_only()
            .search(&temp.path().join("missing"), "foo(", &opts(SearchMode::Regex))
            .unwrap_err();
        assert!(matches!(err, SearchError::BadPattern { .. }));
    }

    #[test]
    fn empty_pattern_rejected() {
        assert!(validate_pattern("", &opts(SearchMode::Literal)).is_err());
    }

    #[test]
    fn missing_root() {
        let temp = TempDir::new().unwrap();
        let err = SearchEngine::library_only()
            .search(&temp.path().join("missing"), "x", &opts(SearchMode::Literal))
            .unwrap_err();
        assert!(matches!(err, SearchError::MissingRoot(_)));
    }

    #[test]
    fn max_results_truncates() {
        let temp = fixture();
        let options = SearchOptions {
            mode: SearchMode::Literal,
            ignore_case: false,
            max_results: Some(2),
        };
        let outcome = SearchEngine::library_only()
            .search(temp.path(), "json", &options)
            .unwrap();
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.total_matches, 3);
        assert!(outcome.truncated);
    }

    #[test]
    fn structural_declarations() {
        let temp = fixture();
        let engine = SearchEngine::library_only();

        let classes = engine
            .search(temp.path(), "class $NAME", &opts(SearchMode::Structural))
            .unwrap();
        assert_eq!(pairs(&classes), vec![("client.py".to_string(), 4)]);

        let defs = engine
            .search(temp.path(), "def $F($$$ARGS)", &opts(SearchMode::Structural))
            .unwrap();
        assert_eq!(defs.results.len(), 4);

        let asyncs = engine
            .search(temp.path(), "async def $F", &opts(SearchMode::Structural))
            .unwrap();
        assert_eq!(pairs(&asyncs), vec![("client.py".to_string(), 8)]);
        assert_eq!(asyncs.results[0].context.as_deref(), Some("Client.close"));

        let wildcard = engine
            .search(temp.path(), "def f*", &opts(SearchMode::Structural))
            .unwrap();
        assert_eq!(pairs(&wildcard), vec![("client.py".to_string(), 5)]);
    }

    #[test]
    fn structural_expression_patterns() {
        let temp = fixture();
        let outcome = SearchEngine::library_only()
            .search(temp.path(), "json.loads($X)", &opts(SearchMode::Structural))
            .unwrap();
        assert_eq!(pairs(&outcome), vec![("client.py".to_string(), 6)]);

        let outcome = SearchEngine::library_only()
            .search(temp.path(), "json.dumps($$$)", &opts(SearchMode::Structural))
            .unwrap();
        assert_eq!(pairs(&outcome), vec![("client.py".to_string(), 13)]);
    }

    #[test]
    fn structural_to_regex_translation() {
        assert_eq!(
            structural_to_regex("foo($A, $$$REST)"),
            r"foo\([A-Za-z_][A-Za-z0-9_]*,\s*.*?\)"
        );
    }

    #[test]
    fn declaration_pattern_parsing() {
        assert!(DeclarationPattern::parse("class Foo", false).is_some());
        assert!(DeclarationPattern::parse("def $F($$$):", false).is_some());
        assert!(DeclarationPattern::parse("async def fetch", false).is_some());
        assert!(DeclarationPattern::parse("print($X)", false).is_none());
        assert!(DeclarationPattern::parse("class Foo: $$$BODY", false).is_some());
    }

    #[test]
    fn single_file_root() {
        let temp = fixture();
        let outcome = SearchEngine::library_only()
            .search(&temp.path().join("pkg/util.py"), "data", &opts(SearchMode::Literal))
            .unwrap();
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.results[0].context.as_deref(), Some("parse"));
    }

    #[test]
    fn parse_rg_json_lines() {
        let stdout = r#"{"type":"begin","data":{"path":{"text":"/r/a.py"}}}
{"type":"match","data":{"path":{"text":"/r/a.py"},"lines":{"text":"x = 1\n"},"line_number":3,"absolute_offset":10,"submatches":[]}}
{"type":"match","data":{"path":{"text":"/r/a.py"},"lines":{"bytes":"/w=="},"line_number":4,"absolute_offset":20,"submatches":[]}}
{"type":"end","data":{}}"#;
        let results = parse_rg_output(stdout, Path::new("/r"));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].line, 3);
        assert_eq!(results[0].text, "x = 1");
        assert_eq!(results[0].path, PathBuf::from("/r/a.py"));
    }

    #[test]
    fn ripgrep_and_library_agree_on_literal_search() {
        let Some(rg) = RipgrepBackend::detect() else {
            return;
        };
        let temp = fixture();
        let with_rg = SearchEngine {
            ripgrep: Some(rg),
            ast_grep: None,
        }
        .search(temp.path(), "json", &opts(SearchMode::Literal))
        .unwrap();
        let library = SearchEngine::library_only()
            .search(temp.path(), "json", &opts(SearchMode::Literal))
            .unwrap();

        assert_eq!(with_rg.backend, "ripgrep");
        let key = |o: &SearchOutcome| {
            o.results
                .iter()
                .map(|r| (r.path.clone(), r.line))
                .collect::<Vec<_>>()
        };
        assert_eq!(key(&with_rg), key(&library));
        assert_eq!(with_rg.results, library.results);
    }

    #[test]
    fn broken_external_tool_falls_back() {
        let engine = SearchEngine {
            ripgrep: Some(RipgrepBackend::new("/nonexistent/rg-binary")),
            ast_grep: None,
        };
        let temp = fixture();
        let outcome = engine
            .search(temp.path(), "json", &opts(SearchMode::Literal))
            .unwrap();
        assert_eq!(outcome.backend, "library");
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.results.len(), 3);
    }
}
