//! Live object inspection.
//!
//! The environment's own interpreter runs an embedded probe script that
//! imports the target and reports raw facts for every attribute in
//! `dir(obj)`. Everything after that is pure Rust:
//!
//! - [`classify`] maps facts to one [`AttributeKind`]
//! - [`type_description`], [`doc_snippet`] and [`value_preview`] shape the
//!   per-attribute display fields
//! - [`build_report`] filters, orders and truncates
//!
//! so the display rules are testable without Python installed.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use pyenvsearch_core::process::{run_command, CommandSpec};
use pyenvsearch_core::text::{collapse_whitespace, first_line, truncate_chars};

/// Probe source, run with `python -c`.
const PROBE_SCRIPT: &str = include_str!("inspect_probe.py");

/// Timeout for one probe run (importing heavy packages can be slow).
const PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// Docstring snippets are cut to this many characters.
pub const DOC_SNIPPET_LIMIT: usize = 100;

/// Value previews longer than this are summarized or cut.
pub const PREVIEW_LIMIT: usize = 50;

/// Stand-in signature for callables that cannot be introspected.
pub const UNKNOWN_SIGNATURE: &str = "(...)";

// ============================================================================
// Error Types
// ============================================================================

/// Errors from object inspection.
///
/// Failures to read a single attribute are not errors; they show up as
/// attributes of kind [`AttributeKind::Error`].
#[derive(Debug, Error)]
pub enum InspectError {
    /// The target expression is malformed.
    #[error("invalid inspection target {target:?}: {reason}")]
    InvalidTarget { target: String, reason: String },

    /// The target could not be imported or an attribute on its path is missing.
    #[error("object not found: {target} ({message})")]
    TargetNotFound { target: String, message: String },

    /// No interpreter is known for the environment.
    #[error("no Python interpreter available to import {target}")]
    NoInterpreter { target: String },

    /// The probe did not run, crashed, or printed something unreadable.
    #[error("inspection probe failed: {message}")]
    ProbeFailed {
        message: String,
        exit_code: Option<i32>,
        stderr: String,
    },
}

pub type InspectResult<T> = Result<T, InspectError>;

// ============================================================================
// Probe Output
// ============================================================================

/// What kind of object the inspected target is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerKind {
    Module,
    Class,
    Instance,
}

impl OwnerKind {
    fn holds_methods(self) -> bool {
        matches!(self, OwnerKind::Class | OwnerKind::Instance)
    }
}

/// Descriptor found by a static (`inspect.getattr_static`) lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaticKind {
    Property,
    CachedProperty,
    Classmethod,
    Staticmethod,
    /// Any other data descriptor that is not a routine (slots, getsets).
    DataDescriptor,
}

/// Raw facts the probe reports about one value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ObjectFacts {
    pub type_name: String,
    pub is_type: bool,
    pub is_exception: bool,
    pub is_abstract: bool,
    pub is_module: bool,
    pub is_function: bool,
    pub is_bound_method: bool,
    pub is_builtin: bool,
    pub is_routine: bool,
    pub is_callable: bool,
    /// `len()` of built-in containers.
    pub length: Option<usize>,
    /// `repr()` of simple values and built-in containers, capped by the probe.
    pub repr: Option<String>,
    pub signature: Option<String>,
    pub signature_unavailable: bool,
    pub doc: Option<String>,
    pub module: Option<String>,
}

/// One attribute as reported by the probe.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProbeAttribute {
    pub name: String,
    #[serde(default)]
    pub static_kind: Option<StaticKind>,
    /// Set when reading the attribute raised.
    #[serde(default)]
    pub error: Option<String>,
    #[serde(flatten)]
    pub facts: ObjectFacts,
}

/// Full probe report for a resolved target.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProbeOutput {
    pub target: String,
    pub name: String,
    pub owner_kind: OwnerKind,
    pub object: ObjectFacts,
    pub attributes: Vec<ProbeAttribute>,
}

#[derive(Debug, Deserialize)]
struct ProbeFailure {
    kind: String,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ProbeResponse {
    Failed { error: ProbeFailure },
    Report(ProbeOutput),
}

// ============================================================================
// Classification
// ============================================================================

/// Display category of an attribute. The declaration order is the group order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    Class,
    Module,
    Function,
    Method,
    Property,
    Data,
    Error,
}

impl AttributeKind {
    pub const ALL: [AttributeKind; 7] = [
        AttributeKind::Class,
        AttributeKind::Module,
        AttributeKind::Function,
        AttributeKind::Method,
        AttributeKind::Property,
        AttributeKind::Data,
        AttributeKind::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeKind::Class => "class",
            AttributeKind::Module => "module",
            AttributeKind::Function => "function",
            AttributeKind::Method => "method",
            AttributeKind::Property => "property",
            AttributeKind::Data => "data",
            AttributeKind::Error => "error",
        }
    }

    /// Heading used when output is grouped.
    pub fn heading(&self) -> &'static str {
        match self {
            AttributeKind::Class => "CLASSES",
            AttributeKind::Module => "MODULES",
            AttributeKind::Function => "FUNCTIONS",
            AttributeKind::Method => "METHODS",
            AttributeKind::Property => "PROPERTIES",
            AttributeKind::Data => "DATA",
            AttributeKind::Error => "ERRORS",
        }
    }
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify one attribute. Total: every input maps to exactly one kind.
pub fn classify(attribute: &ProbeAttribute, owner: OwnerKind) -> AttributeKind {
    if attribute.error.is_some() {
        return AttributeKind::Error;
    }
    let facts = &attribute.facts;
    if facts.is_module {
        return AttributeKind::Module;
    }
    if facts.is_type {
        return AttributeKind::Class;
    }
    match attribute.static_kind {
        Some(StaticKind::Property | StaticKind::CachedProperty | StaticKind::DataDescriptor) => {
            return AttributeKind::Property;
        }
        Some(StaticKind::Classmethod | StaticKind::Staticmethod) => return AttributeKind::Method,
        None => {}
    }
    if facts.is_bound_method {
        return AttributeKind::Method;
    }
    if facts.is_function || facts.is_routine || facts.is_builtin {
        return if owner.holds_methods() {
            AttributeKind::Method
        } else {
            AttributeKind::Function
        };
    }
    if facts.is_callable {
        return AttributeKind::Function;
    }
    AttributeKind::Data
}

/// Human-readable type of a classified attribute (`exception`, `list[3]`, ...).
pub fn type_description(kind: AttributeKind, attribute: &ProbeAttribute) -> String {
    let facts = &attribute.facts;
    match kind {
        AttributeKind::Class => class_description(facts).to_string(),
        AttributeKind::Module => "module".to_string(),
        AttributeKind::Property => match attribute.static_kind {
            Some(StaticKind::CachedProperty) => "cached property".to_string(),
            Some(StaticKind::DataDescriptor) => "descriptor".to_string(),
            _ => "property".to_string(),
        },
        AttributeKind::Method => match attribute.static_kind {
            Some(StaticKind::Classmethod) => "classmethod".to_string(),
            Some(StaticKind::Staticmethod) => "staticmethod".to_string(),
            _ if facts.is_builtin => "builtin method".to_string(),
            _ => "method".to_string(),
        },
        AttributeKind::Function => {
            if facts.is_function {
                "function".to_string()
            } else if facts.is_builtin {
                "builtin".to_string()
            } else {
                "callable".to_string()
            }
        }
        AttributeKind::Data => data_description(facts),
        AttributeKind::Error => "error".to_string(),
    }
}

fn class_description(facts: &ObjectFacts) -> &'static str {
    if facts.is_exception {
        "exception"
    } else if facts.is_abstract {
        "abstract class"
    } else {
        "class"
    }
}

fn data_description(facts: &ObjectFacts) -> String {
    match facts.type_name.as_str() {
        "int" | "float" | "complex" => "number".to_string(),
        "str" => "string".to_string(),
        name => match facts.length {
            Some(len) => format!("{}[{}]", name, len),
            None if name.is_empty() => "object".to_string(),
            None => name.to_string(),
        },
    }
}

/// Description of the inspected object itself.
pub fn object_description(owner: OwnerKind, facts: &ObjectFacts) -> String {
    match owner {
        OwnerKind::Module => "module".to_string(),
        OwnerKind::Class => class_description(facts).to_string(),
        OwnerKind::Instance if facts.is_function => "function".to_string(),
        OwnerKind::Instance if facts.is_bound_method => "method".to_string(),
        OwnerKind::Instance if facts.is_builtin => "builtin".to_string(),
        OwnerKind::Instance if facts.is_callable => "callable".to_string(),
        OwnerKind::Instance => data_description(facts),
    }
}

/// First non-empty docstring line, whitespace collapsed, at most 100 chars.
pub fn doc_snippet(doc: &str) -> Option<String> {
    let line = first_line(doc)?;
    Some(truncate_chars(&collapse_whitespace(line), DOC_SNIPPET_LIMIT))
}

/// Short rendering of a data value, when the probe captured a `repr`.
///
/// Reprs within [`PREVIEW_LIMIT`] are shown as-is. Containers with a long
/// repr, or none at all (the interpreter skips large ones), become
/// `type[N items]`. Anything else long is cut with an ellipsis.
pub fn value_preview(facts: &ObjectFacts) -> Option<String> {
    let sized = facts
        .length
        .map(|len| format!("{}[{} items]", facts.type_name, len));
    let Some(repr) = facts.repr.as_deref() else {
        return sized;
    };
    if repr.chars().count() <= PREVIEW_LIMIT {
        return Some(repr.to_string());
    }
    sized.or_else(|| Some(truncate_chars(repr, PREVIEW_LIMIT)))
}

/// Names starting with `_` (dunders included) are hidden unless asked for.
pub fn is_private_attribute(name: &str) -> bool {
    name.starts_with('_')
}

// ============================================================================
// Report
// ============================================================================

/// Display options for [`build_report`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InspectOptions {
    /// Show at most this many attributes.
    pub max_items: Option<usize>,
    pub show_private: bool,
    pub group_by_kind: bool,
    pub show_docs: bool,
}

impl Default for InspectOptions {
    fn default() -> Self {
        InspectOptions {
            max_items: None,
            show_private: false,
            group_by_kind: true,
            show_docs: true,
        }
    }
}

/// One displayed attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeInfo {
    pub name: String,
    pub kind: AttributeKind,
    pub type_description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    pub private: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AttributeInfo {
    /// Build the display record for one probe attribute.
    pub fn from_probe(attribute: &ProbeAttribute, owner: OwnerKind, show_docs: bool) -> Self {
        let kind = classify(attribute, owner);
        let facts = &attribute.facts;
        let signature = match kind {
            AttributeKind::Function | AttributeKind::Method => match &facts.signature {
                Some(sig) => Some(sig.clone()),
                None => Some(UNKNOWN_SIGNATURE.to_string()),
            },
            _ => None,
        };
        let doc = match kind {
            // Data values would only repeat their type's docstring.
            AttributeKind::Data | AttributeKind::Error => None,
            _ if show_docs => facts.doc.as_deref().and_then(doc_snippet),
            _ => None,
        };
        let preview = match kind {
            AttributeKind::Data => value_preview(facts),
            _ => None,
        };
        AttributeInfo {
            name: attribute.name.clone(),
            kind,
            type_description: type_description(kind, attribute),
            signature,
            doc,
            preview,
            private: is_private_attribute(&attribute.name),
            module: facts.module.clone(),
            error: attribute.error.clone(),
        }
    }

    /// One-line rendering: `name (type)(sig) = preview - doc`.
    pub fn format_compact(&self, max_width: usize) -> String {
        let mut line = format!("{} ({})", self.name, self.type_description);
        if let Some(signature) = &self.signature {
            line.push(' ');
            line.push_str(&truncate_chars(signature, PREVIEW_LIMIT));
        }
        if let Some(preview) = &self.preview {
            line.push_str(" = ");
            line.push_str(preview);
        }
        if let Some(error) = &self.error {
            line.push_str(" ! ");
            line.push_str(error);
        }
        if let Some(doc) = &self.doc {
            line.push_str(" - ");
            line.push_str(doc);
        }
        truncate_chars(&line, max_width)
    }
}

/// Filtered, ordered and truncated inspection result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionReport {
    pub target: String,
    pub name: String,
    /// Type description of the target itself.
    pub description: String,
    pub owner_kind: OwnerKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub attributes: Vec<AttributeInfo>,
    /// Attributes passing the visibility filter, before truncation.
    pub eligible: usize,
    /// `eligible - attributes.len()`.
    pub omitted: usize,
    pub grouped: bool,
}

impl InspectionReport {
    /// Shown attributes of one kind, in display order.
    pub fn group(&self, kind: AttributeKind) -> impl Iterator<Item = &AttributeInfo> {
        self.attributes.iter().filter(move |attr| attr.kind == kind)
    }
}

fn name_order(a: &AttributeInfo, b: &AttributeInfo) -> Ordering {
    a.name
        .to_lowercase()
        .cmp(&b.name.to_lowercase())
        .then_with(|| a.name.cmp(&b.name))
}

/// Turn probe output into a report.
pub fn build_report(probe: &ProbeOutput, options: &InspectOptions) -> InspectionReport {
    let mut attributes: Vec<AttributeInfo> = probe
        .attributes
        .iter()
        .filter(|attr| options.show_private || !is_private_attribute(&attr.name))
        .map(|attr| AttributeInfo::from_probe(attr, probe.owner_kind, options.show_docs))
        .collect();

    if options.group_by_kind {
        attributes.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| name_order(a, b)));
    } else {
        attributes.sort_by(name_order);
    }

    let eligible = attributes.len();
    if let Some(max) = options.max_items {
        attributes.truncate(max);
    }
    let omitted = eligible - attributes.len();

    InspectionReport {
        target: probe.target.clone(),
        name: probe.name.clone(),
        description: object_description(probe.owner_kind, &probe.object),
        owner_kind: probe.owner_kind,
        summary: probe.object.doc.as_deref().and_then(doc_snippet),
        attributes,
        eligible,
        omitted,
        grouped: options.group_by_kind,
    }
}

// ============================================================================
// Running the Probe
// ============================================================================

fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_alphanumeric())
}

/// Check `module`, `module.attr` or `module:attr.path` syntax.
pub fn validate_target(target: &str) -> InspectResult<()> {
    let invalid = |reason: &str| InspectError::InvalidTarget {
        target: target.to_string(),
        reason: reason.to_string(),
    };
    let (module, attrs) = match target.split_once(':') {
        Some((module, attrs)) => (module, Some(attrs)),
        None => (target, None),
    };
    if module.is_empty() {
        return Err(invalid("missing module name"));
    }
    if !module.split('.').all(is_identifier) {
        return Err(invalid("module path must be dotted identifiers"));
    }
    if let Some(attrs) = attrs {
        if attrs.is_empty() || !attrs.split('.').all(is_identifier) {
            return Err(invalid("attribute path after ':' must be dotted identifiers"));
        }
    }
    Ok(())
}

/// Parse the probe's stdout. Imports may print before the report, so only
/// the last non-empty line is read.
pub fn parse_probe_output(target: &str, stdout: &str) -> InspectResult<ProbeOutput> {
    let line = stdout
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .ok_or_else(|| InspectError::ProbeFailed {
            message: "probe printed nothing".to_string(),
            exit_code: None,
            stderr: String::new(),
        })?;
    let response: ProbeResponse =
        serde_json::from_str(line).map_err(|e| InspectError::ProbeFailed {
            message: format!("unreadable probe output: {}", e),
            exit_code: None,
            stderr: String::new(),
        })?;
    match response {
        ProbeResponse::Report(output) => Ok(output),
        ProbeResponse::Failed { error } if error.kind == "not_found" => {
            Err(InspectError::TargetNotFound {
                target: target.to_string(),
                message: error.message,
            })
        }
        ProbeResponse::Failed { error } => Err(InspectError::ProbeFailed {
            message: format!("{}: {}", error.kind, error.message),
            exit_code: None,
            stderr: String::new(),
        }),
    }
}

/// Import `target` with `python` and report its attributes.
pub fn run_probe(python: &Path, target: &str) -> InspectResult<ProbeOutput> {
    validate_target(target)?;
    let spec = CommandSpec::new(python)
        .args(["-c", PROBE_SCRIPT, target])
        .with_timeout(PROBE_TIMEOUT);
    debug!(python = %python.display(), target, "running inspection probe");

    let output = run_command(&spec).map_err(|e| InspectError::ProbeFailed {
        message: format!("cannot run {}: {}", python.display(), e),
        exit_code: None,
        stderr: String::new(),
    })?;
    if !output.success {
        return Err(InspectError::ProbeFailed {
            message: output.describe_exit(),
            exit_code: output.exit_code,
            stderr: output.stderr,
        });
    }
    parse_probe_output(target, &output.stdout)
}

/// Inspect `target` in the environment whose interpreter is `python`.
pub fn inspect_target(
    python: Option<&Path>,
    target: &str,
    options: &InspectOptions,
) -> InspectResult<InspectionReport> {
    validate_target(target)?;
    let python = python.ok_or_else(|| InspectError::NoInterpreter {
        target: target.to_string(),
    })?;
    let probe = run_probe(python, target)?;
    Ok(build_report(&probe, options))
}

// ============================================================================
// Tests
// ============================================================================
