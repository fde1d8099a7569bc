//! Plain-text rendering of command results.
//!
//! `--json` output is the serialized content types themselves; these
//! functions produce the human-readable form of the same data.

use std::fmt::Write as _;

use pyenvsearch_python::docs::PackageDocs;
use pyenvsearch_python::entities::{EntityInfo, EntityKind, EntityListing};
use pyenvsearch_python::env::EnvironmentInfo;
use pyenvsearch_python::inspect::{AttributeKind, InspectionReport};
use pyenvsearch_python::packages::PackageLocation;
use pyenvsearch_python::search::SearchOutcome;
use pyenvsearch_python::toc::{TableOfContents, TocKind, TocNode};

use crate::llm::{LlmTool, ToolStatus};

/// Width of one compact inspector line.
pub const INSPECT_LINE_WIDTH: usize = 120;

pub fn environment(env: &EnvironmentInfo) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Source:        {}", env.source);
    if let Some(python) = &env.interpreter {
        let _ = writeln!(out, "Interpreter:   {}", python.display());
    }
    if let Some(prefix) = &env.prefix {
        let _ = writeln!(out, "Prefix:        {}", prefix.display());
    }
    if let Some(version) = &env.version {
        let _ = writeln!(out, "Python:        {}", version);
    }
    if env.site_packages.is_empty() {
        let _ = writeln!(out, "Site-packages: (none)");
    }
    for (i, dir) in env.site_packages.iter().enumerate() {
        let label = if i == 0 { "Site-packages:" } else { "" };
        let _ = writeln!(out, "{:<14} {}", label, dir.display());
    }
    let _ = writeln!(out, "Packages:      {} installed", env.packages.len());
    out
}

pub fn location(loc: &PackageLocation) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} ({})", loc.import_name, loc.kind);
    let _ = writeln!(out, "  path:    {}", loc.path.display());
    if let Some(dist) = &loc.distribution {
        let _ = writeln!(out, "  dist:    {}", dist);
    }
    if let Some(version) = &loc.version {
        let _ = writeln!(out, "  version: {}", version);
    }
    let _ = writeln!(out, "  origin:  {}", loc.origin);
    if !loc.submodules.is_empty() {
        let _ = writeln!(out, "  submodules: {}", loc.submodules.join(", "));
    }
    out
}

pub fn docs(docs: &PackageDocs) -> String {
    let mut out = String::new();
    match &docs.version {
        Some(version) => {
            let _ = writeln!(out, "{} {}", docs.name, version);
        }
        None => {
            let _ = writeln!(out, "{}", docs.name);
        }
    }
    if let Some(summary) = &docs.summary {
        let _ = writeln!(out, "{}", summary);
    }
    let _ = writeln!(out, "\nLocation: {}", docs.path.display());
    if let Some(home) = &docs.home_page {
        let _ = writeln!(out, "Home page: {}", home);
    }
    for url in &docs.project_urls {
        let _ = writeln!(out, "{}: {}", url.label, url.url);
    }
    if let Some(doc) = &docs.module_doc {
        let _ = writeln!(out, "\nModule docstring:\n  {}", doc);
    }
    if let Some(description) = &docs.description {
        let _ = writeln!(out, "\nDescription:\n{}", description);
    }
    if let Some(readme) = &docs.readme {
        let _ = writeln!(out, "\nREADME ({}):\n{}", readme.path.display(), readme.excerpt);
    }
    if docs.is_empty() {
        let _ = writeln!(out, "\nNo documentation found.");
    }
    out
}

fn toc_marker(kind: TocKind) -> &'static str {
    match kind {
        TocKind::Package => "[pkg]",
        TocKind::Module => "[mod]",
        TocKind::Class => "[class]",
        TocKind::Enum => "[enum]",
        TocKind::Function => "[def]",
        TocKind::Method => "[def]",
    }
}

fn toc_node(out: &mut String, node: &TocNode) {
    let indent = "  ".repeat(node.depth);
    let signature = node.signature.as_deref().unwrap_or("");
    let _ = write!(out, "{}{} {}{}", indent, toc_marker(node.kind), node.name, signature);
    if let Some(line) = node.line {
        let _ = write!(out, "  :{}", line);
    }
    if let Some(summary) = &node.summary {
        let _ = write!(out, "  # {}", summary);
    }
    out.push('\n');
    for child in &node.children {
        toc_node(out, child);
    }
}

/// Tree only, without totals (also used as LLM prompt context).
pub fn toc_tree(toc: &TableOfContents) -> String {
    let mut out = String::new();
    toc_node(&mut out, &toc.root);
    out
}

pub fn toc(toc: &TableOfContents) -> String {
    let mut out = toc_tree(toc);
    let _ = writeln!(
        out,
        "\n{} modules, {} classes, {} functions (depth {})",
        toc.total_modules, toc.total_classes, toc.total_functions, toc.max_depth
    );
    warnings(&mut out, &toc.warnings);
    out
}

pub fn search(outcome: &SearchOutcome) -> String {
    let mut out = String::new();
    for result in &outcome.results {
        let _ = write!(out, "{}:{}: {}", result.path.display(), result.line, result.text.trim_end());
        if let Some(context) = &result.context {
            let _ = write!(out, "  [{}]", context);
        }
        out.push('\n');
    }
    if outcome.results.is_empty() {
        let _ = writeln!(out, "No matches.");
    } else if outcome.truncated {
        let _ = writeln!(
            out,
            "\n{} of {} matches shown ({})",
            outcome.results.len(),
            outcome.total_matches,
            outcome.backend
        );
    } else {
        let _ = writeln!(out, "\n{} matches ({})", outcome.total_matches, outcome.backend);
    }
    warnings(&mut out, &outcome.warnings);
    out
}

fn entity_line(entity: &EntityInfo) -> String {
    let mut line = match entity.kind {
        EntityKind::Class | EntityKind::Enum if !entity.bases.is_empty() => {
            format!("{}({})", entity.qualified_name(), entity.bases.join(", "))
        }
        EntityKind::Function | EntityKind::Method => format!(
            "{}{}",
            entity.qualified_name(),
            entity.signature.as_deref().unwrap_or("()")
        ),
        _ => entity.qualified_name(),
    };
    let _ = write!(line, "  {}:{}", entity.file.display(), entity.line);
    if let Some(summary) = &entity.summary {
        let _ = write!(line, "\n    {}", summary);
    }
    line
}

pub fn entities(listing: &EntityListing) -> String {
    let mut out = String::new();
    for entity in &listing.entities {
        let _ = writeln!(out, "{}", entity_line(entity));
    }
    if listing.entities.is_empty() {
        let _ = writeln!(out, "Nothing found in {} files.", listing.files_scanned);
    } else {
        let _ = writeln!(
            out,
            "\n{} found in {} files",
            listing.entities.len(),
            listing.files_scanned
        );
    }
    warnings(&mut out, &listing.warnings);
    out
}

pub fn inspection(report: &InspectionReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Inspecting {}: {}", report.description, report.name);
    if let Some(summary) = &report.summary {
        let _ = writeln!(out, "{}", summary);
    }
    let _ = writeln!(
        out,
        "Showing {} of {} attributes",
        report.attributes.len(),
        report.eligible
    );
    let _ = writeln!(out, "{}", "=".repeat(60));

    if report.attributes.is_empty() {
        let _ = writeln!(out, "No accessible attributes found.");
    } else if report.grouped {
        for kind in AttributeKind::ALL {
            let mut group = report.group(kind).peekable();
            if group.peek().is_none() {
                continue;
            }
            let _ = writeln!(out, "\n{}:", kind.heading());
            for attr in group {
                let _ = writeln!(out, "  {}", attr.format_compact(INSPECT_LINE_WIDTH - 2));
            }
        }
    } else {
        for attr in &report.attributes {
            let _ = writeln!(out, "{}", attr.format_compact(INSPECT_LINE_WIDTH));
        }
    }

    if report.omitted > 0 {
        let _ = writeln!(out, "\n... {} more omitted (raise --max-items to see them)", report.omitted);
    }
    out
}

pub fn llm_tools(statuses: &[ToolStatus], default: Option<LlmTool>) -> String {
    let mut out = String::new();
    for status in statuses {
        match &status.path {
            Some(path) => {
                let _ = writeln!(out, "{:<8} available  {}", status.tool, path.display());
            }
            None => {
                let _ = writeln!(out, "{:<8} missing", status.tool);
            }
        }
    }
    match default {
        Some(tool) => {
            let _ = writeln!(out, "\nDefault: {}", tool);
        }
        None => {
            let _ = writeln!(out, "\nNo LLM tool available.");
        }
    }
    out
}

fn warnings(out: &mut String, warnings: &[String]) {
    if warnings.is_empty() {
        return;
    }
    let _ = writeln!(out, "\nWarnings:");
    for warning in warnings {
        let _ = writeln!(out, "  {}", warning);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pyenvsearch_python::search::SearchResult;
    use std::path::PathBuf;

    #[test]
    fn search_lines_carry_context() {
        let outcome = SearchOutcome {
            results: vec![SearchResult {
                path: PathBuf::from("/site/pkg/mod.py"),
                line: 3,
                text: "    return 1".to_string(),
                context: Some("Foo.bar".to_string()),
            }],
            backend: "library".to_string(),
            total_matches: 1,
            truncated: false,
            warnings: vec![],
        };
        let text = search(&outcome);
        assert!(text.starts_with("/site/pkg/mod.py:3:     return 1  [Foo.bar]\n"));
        assert!(text.contains("1 matches (library)"));
    }

    #[test]
    fn empty_search() {
        let outcome = SearchOutcome {
            results: vec![],
            backend: "ripgrep".to_string(),
            total_matches: 0,
            truncated: false,
            warnings: vec!["rg failed".to_string()],
        };
        let text = search(&outcome);
        assert!(text.starts_with("No matches."));
        assert!(text.contains("Warnings:\n  rg failed"));
    }

    #[test]
    fn tool_listing() {
        let statuses = vec![
            ToolStatus {
                tool: LlmTool::Claude,
                available: false,
                path: None,
            },
            ToolStatus {
                tool: LlmTool::Llm,
                available: true,
                path: Some(PathBuf::from("/usr/bin/llm")),
            },
        ];
        let text = llm_tools(&statuses, Some(LlmTool::Llm));
        assert!(text.contains("claude   missing"));
        assert!(text.contains("llm      available  /usr/bin/llm"));
        assert!(text.ends_with("Default: llm\n"));
    }
}
