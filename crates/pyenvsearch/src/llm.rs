//! Bridge to external LLM command-line tools.
//!
//! PyEnvSearch never talks to a model service itself. It builds a prompt,
//! optionally enriched with what it knows about the package locally, and
//! hands it to whichever supported CLI is installed.
//!
//! ## Tools
//!
//! | Tool     | Invocation                        |
//! |----------|-----------------------------------|
//! | `claude` | `claude -p <prompt>`              |
//! | `gemini` | `gemini -p <prompt>`              |
//! | `codex`  | `codex exec <prompt>`             |
//! | `goose`  | `goose run -t <prompt>`           |
//! | `q`      | `q chat --no-interactive <prompt>`|
//! | `llm`    | `llm` (prompt on stdin)           |
//!
//! Detection is a `$PATH` lookup in the order above.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use pyenvsearch_core::error::PyEnvError;
use pyenvsearch_core::process::{run_command, CommandSpec};
use pyenvsearch_core::text::excerpt;

/// Cap on the local context block embedded in a prompt.
pub const CONTEXT_LIMIT: usize = 4000;

// ============================================================================
// Error Types
// ============================================================================

/// Errors from the LLM bridge.
#[derive(Debug, Error)]
pub enum LlmError {
    /// None of the supported tools is installed.
    #[error("no LLM tool available (install one of: {})", LlmTool::names().join(", "))]
    NoToolAvailable,

    /// `--tool` names something unsupported.
    #[error("unknown LLM tool {name:?} (supported: {})", LlmTool::names().join(", "))]
    UnknownTool { name: String },

    /// The requested tool is supported but not on `$PATH`.
    #[error("{name} is not installed or not on PATH")]
    ToolNotInstalled { name: String },

    /// The tool ran and failed, timed out, or could not start.
    #[error("{tool} {message}")]
    Failed {
        tool: String,
        message: String,
        exit_code: Option<i32>,
        stderr: String,
    },
}

impl From<LlmError> for PyEnvError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::NoToolAvailable => PyEnvError::tool_unavailable("llm", err.to_string()),
            LlmError::UnknownTool { .. } => PyEnvError::invalid_args(err.to_string()),
            LlmError::ToolNotInstalled { name } => {
                PyEnvError::tool_unavailable(name, "not installed or not on PATH")
            }
            LlmError::Failed {
                tool,
                message,
                exit_code,
                stderr,
            } => PyEnvError::ToolFailure {
                tool,
                message,
                exit_code,
                stderr,
            },
        }
    }
}

// ============================================================================
// Tools
// ============================================================================

/// A supported LLM CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmTool {
    Claude,
    Gemini,
    Codex,
    Goose,
    Q,
    Llm,
}

impl LlmTool {
    /// All tools, in preference order.
    pub const ALL: [LlmTool; 6] = [
        LlmTool::Claude,
        LlmTool::Gemini,
        LlmTool::Codex,
        LlmTool::Goose,
        LlmTool::Q,
        LlmTool::Llm,
    ];

    /// Executable name.
    pub fn binary(&self) -> &'static str {
        match self {
            LlmTool::Claude => "claude",
            LlmTool::Gemini => "gemini",
            LlmTool::Codex => "codex",
            LlmTool::Goose => "goose",
            LlmTool::Q => "q",
            LlmTool::Llm => "llm",
        }
    }

    pub fn from_name(name: &str) -> Option<LlmTool> {
        let name = name.trim().to_ascii_lowercase();
        LlmTool::ALL.into_iter().find(|tool| tool.binary() == name)
    }

    fn names() -> Vec<&'static str> {
        LlmTool::ALL.iter().map(LlmTool::binary).collect()
    }

    /// Command line that sends `prompt` to this tool at `path`.
    pub fn command(&self, path: &Path, prompt: &str) -> CommandSpec {
        let spec = CommandSpec::new(path);
        match self {
            LlmTool::Claude | LlmTool::Gemini => spec.arg("-p").arg(prompt),
            LlmTool::Codex => spec.arg("exec").arg(prompt),
            LlmTool::Goose => spec.args(["run", "-t"]).arg(prompt),
            LlmTool::Q => spec.args(["chat", "--no-interactive"]).arg(prompt),
            LlmTool::Llm => spec.stdin(prompt),
        }
    }
}

impl fmt::Display for LlmTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.binary())
    }
}

/// Availability of one tool, as listed by `llm-tools`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolStatus {
    pub tool: LlmTool,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// An installed tool chosen for a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedTool {
    pub tool: LlmTool,
    pub path: PathBuf,
}

/// Look up every tool with `lookup` (normally a `$PATH` search).
pub fn detect_tools(lookup: impl Fn(&str) -> Option<PathBuf>) -> Vec<ToolStatus> {
    LlmTool::ALL
        .into_iter()
        .map(|tool| {
            let path = lookup(tool.binary());
            ToolStatus {
                tool,
                available: path.is_some(),
                path,
            }
        })
        .collect()
}

/// Choose a tool: the preferred one if given, else the first installed.
pub fn select_tool(
    preferred: Option<&str>,
    lookup: impl Fn(&str) -> Option<PathBuf>,
) -> Result<SelectedTool, LlmError> {
    if let Some(name) = preferred {
        let tool = LlmTool::from_name(name).ok_or_else(|| LlmError::UnknownTool {
            name: name.to_string(),
        })?;
        let path = lookup(tool.binary()).ok_or_else(|| LlmError::ToolNotInstalled {
            name: tool.binary().to_string(),
        })?;
        return Ok(SelectedTool { tool, path });
    }
    detect_tools(lookup)
        .into_iter()
        .find_map(|status| {
            status.path.map(|path| SelectedTool {
                tool: status.tool,
                path,
            })
        })
        .ok_or(LlmError::NoToolAvailable)
}

// ============================================================================
// Prompts
// ============================================================================

/// The kinds of request the CLI can make.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PromptKind {
    Summarize,
    Explain,
    Howto,
    ApiGuide,
}

impl PromptKind {
    /// Subcommand name.
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptKind::Summarize => "summarize",
            PromptKind::Explain => "explain",
            PromptKind::Howto => "howto",
            PromptKind::ApiGuide => "api-guide",
        }
    }
}

/// What is known locally about the package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptContext {
    pub location: Option<String>,
    pub version: Option<String>,
    pub module_doc: Option<String>,
    /// Public table of contents, rendered as text.
    pub outline: Option<String>,
}

impl PromptContext {
    fn render(&self) -> Option<String> {
        let mut block = String::new();
        if let Some(location) = &self.location {
            block.push_str(&format!("Installed at: {}\n", location));
        }
        if let Some(version) = &self.version {
            block.push_str(&format!("Version: {}\n", version));
        }
        if let Some(doc) = &self.module_doc {
            block.push_str(&format!("Module docstring: {}\n", doc));
        }
        if let Some(outline) = &self.outline {
            block.push_str("Public structure:\n");
            block.push_str(outline.trim_end());
            block.push('\n');
        }
        if block.is_empty() {
            None
        } else {
            Some(excerpt(&block, CONTEXT_LIMIT))
        }
    }
}

fn task_sentence(kind: PromptKind, package: &str) -> String {
    match kind {
        PromptKind::Summarize => format!(
            "Give a concise overview of the Python package `{}`: what it is for, \
             its main modules and entry points, and its key dependencies.",
            package
        ),
        PromptKind::Explain => format!(
            "Explain how the Python package `{}` works: its architecture, core \
             abstractions and how the main pieces fit together.",
            package
        ),
        PromptKind::Howto => format!(
            "Write a practical how-to guide for the Python package `{}` with \
             short, runnable examples of the most common tasks.",
            package
        ),
        PromptKind::ApiGuide => format!(
            "Write an API reference guide for the Python package `{}`: the main \
             public classes and functions, their signatures and typical usage.",
            package
        ),
    }
}

/// Build the prompt text for a request.
pub fn build_prompt(
    kind: PromptKind,
    package: &str,
    task: Option<&str>,
    context: Option<&PromptContext>,
) -> String {
    let mut prompt = task_sentence(kind, package);
    if let Some(task) = task.map(str::trim).filter(|t| !t.is_empty()) {
        prompt.push_str(&format!("\n\nFocus on: {}", task));
    }
    if let Some(block) = context.and_then(PromptContext::render) {
        prompt.push_str("\n\nLocal context from the installed package:\n");
        prompt.push_str(&block);
    }
    prompt.push_str("\n\nAnswer in Markdown.");
    prompt
}

// ============================================================================
// Invocation
// ============================================================================

/// Output of a successful LLM run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmResponse {
    pub tool: LlmTool,
    pub kind: PromptKind,
    pub package: String,
    pub used_local_context: bool,
    pub output: String,
    pub duration_ms: u64,
}

/// Send `prompt` to the selected tool and wait at most `timeout`.
///
/// A timed-out child is killed and reaped. Failures are never retried.
pub fn invoke(selected: &SelectedTool, prompt: &str, timeout: Duration) -> Result<(String, Duration), LlmError> {
    let tool = selected.tool.binary().to_string();
    let spec = selected
        .tool
        .command(&selected.path, prompt)
        .with_timeout(timeout);
    info!(tool = %tool, timeout_secs = timeout.as_secs(), "invoking LLM tool");

    let output = run_command(&spec).map_err(|e| LlmError::Failed {
        tool: tool.clone(),
        message: format!("could not start: {}", e),
        exit_code: None,
        stderr: String::new(),
    })?;
    debug!(tool = %tool, duration_ms = output.duration.as_millis() as u64, "LLM tool finished");

    if !output.success {
        return Err(LlmError::Failed {
            message: output.describe_exit(),
            exit_code: output.exit_code,
            stderr: output.stderr,
            tool,
        });
    }
    let text = output.stdout.trim().to_string();
    if text.is_empty() {
        return Err(LlmError::Failed {
            tool,
            message: "returned no output".to_string(),
            exit_code: output.exit_code,
            stderr: output.stderr,
        });
    }
    Ok((text, output.duration))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn only(installed: &'static [&'static str]) -> impl Fn(&str) -> Option<PathBuf> {
        move |name| {
            installed
                .contains(&name)
                .then(|| PathBuf::from(format!("/usr/local/bin/{}", name)))
        }
    }

    mod selection {
        use super::*;

        #[test]
        fn first_installed_in_preference_order() {
            let selected = select_tool(None, only(&["llm", "gemini"])).unwrap();
            assert_eq!(selected.tool, LlmTool::Gemini);
            assert_eq!(selected.path, PathBuf::from("/usr/local/bin/gemini"));
        }

        #[test]
        fn preferred_tool_wins() {
            let selected = select_tool(Some("LLM"), only(&["claude", "llm"])).unwrap();
            assert_eq!(selected.tool, LlmTool::Llm);
        }

        #[test]
        fn preferred_but_missing() {
            let err = select_tool(Some("codex"), only(&["claude"])).unwrap_err();
            assert!(matches!(err, LlmError::ToolNotInstalled { .. }));
            let err: PyEnvError = err.into();
            assert_eq!(err.error_code().code(), 3);
        }

        #[test]
        fn unknown_tool_is_bad_argument() {
            let err = select_tool(Some("chatgpt"), only(&["claude"])).unwrap_err();
            let err: PyEnvError = err.into();
            assert_eq!(err.error_code().code(), 2);
        }

        #[test]
        fn nothing_installed() {
            let err = select_tool(None, only(&[])).unwrap_err();
            assert!(err.to_string().starts_with("no LLM tool available"));
            let err: PyEnvError = err.into();
            assert_eq!(err.error_code().code(), 3);
        }

        #[test]
        fn detection_lists_every_tool() {
            let statuses = detect_tools(only(&["q"]));
            assert_eq!(statuses.len(), LlmTool::ALL.len());
            let available: Vec<LlmTool> = statuses
                .iter()
                .filter(|s| s.available)
                .map(|s| s.tool)
                .collect();
            assert_eq!(available, vec![LlmTool::Q]);
        }
    }

    mod commands {
        use super::*;

        #[test]
        fn invocation_templates() {
            let path = Path::new("/bin/tool");
            let argv = |tool: LlmTool| tool.command(path, "hi").display_command();
            assert_eq!(argv(LlmTool::Claude), vec!["/bin/tool", "-p", "hi"]);
            assert_eq!(argv(LlmTool::Gemini), vec!["/bin/tool", "-p", "hi"]);
            assert_eq!(argv(LlmTool::Codex), vec!["/bin/tool", "exec", "hi"]);
            assert_eq!(argv(LlmTool::Goose), vec!["/bin/tool", "run", "-t", "hi"]);
            assert_eq!(
                argv(LlmTool::Q),
                vec!["/bin/tool", "chat", "--no-interactive", "hi"]
            );
            assert_eq!(argv(LlmTool::Llm), vec!["/bin/tool"]);
        }
    }

    mod prompts {
        use super::*;

        #[test]
        fn prompt_mentions_package_and_task() {
            let prompt = build_prompt(PromptKind::Howto, "requests", Some("retries"), None);
            assert!(prompt.contains("`requests`"));
            assert!(prompt.contains("Focus on: retries"));
            assert!(!prompt.contains("Local context"));
        }

        #[test]
        fn context_block_is_included_and_capped() {
            let context = PromptContext {
                location: Some("/venv/site-packages/requests".to_string()),
                version: Some("2.31.0".to_string()),
                module_doc: Some("HTTP for Humans.".to_string()),
                outline: Some("requests\n  api\n".repeat(2000)),
            };
            let prompt = build_prompt(PromptKind::Summarize, "requests", None, Some(&context));
            assert!(prompt.contains("Version: 2.31.0"));
            assert!(prompt.contains("HTTP for Humans."));
            assert!(prompt.len() < CONTEXT_LIMIT + 1000);
        }

        #[test]
        fn empty_context_is_omitted() {
            let prompt = build_prompt(
                PromptKind::ApiGuide,
                "six",
                Some("  "),
                Some(&PromptContext::default()),
            );
            assert!(!prompt.contains("Local context"));
            assert!(!prompt.contains("Focus on"));
        }
    }

    #[cfg(unix)]
    mod invocation {
        use super::*;
        use std::fs;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::TempDir;

        fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
            let path = dir.join(name);
            fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[test]
        fn passes_prompt_as_argument() {
            let temp = TempDir::new().unwrap();
            let path = script(temp.path(), "claude", r#"echo "got: $2""#);
            let selected = SelectedTool {
                tool: LlmTool::Claude,
                path,
            };
            let (text, _) = invoke(&selected, "hello", Duration::from_secs(10)).unwrap();
            assert_eq!(text, "got: hello");
        }

        #[test]
        fn passes_prompt_on_stdin() {
            let temp = TempDir::new().unwrap();
            let path = script(temp.path(), "llm", "cat");
            let selected = SelectedTool {
                tool: LlmTool::Llm,
                path,
            };
            let (text, _) = invoke(&selected, "from stdin", Duration::from_secs(10)).unwrap();
            assert_eq!(text, "from stdin");
        }

        #[test]
        fn failure_surfaces_stderr() {
            let temp = TempDir::new().unwrap();
            let path = script(temp.path(), "gemini", "echo quota exceeded >&2; exit 4");
            let selected = SelectedTool {
                tool: LlmTool::Gemini,
                path,
            };
            let err = invoke(&selected, "x", Duration::from_secs(10)).unwrap_err();
            match err {
                LlmError::Failed {
                    exit_code, stderr, ..
                } => {
                    assert_eq!(exit_code, Some(4));
                    assert!(stderr.contains("quota exceeded"));
                }
                other => panic!("unexpected error: {other}"),
            }
        }

        #[test]
        fn timeout_kills_the_tool() {
            let temp = TempDir::new().unwrap();
            let path = script(temp.path(), "codex", "exec sleep 30");
            let selected = SelectedTool {
                tool: LlmTool::Codex,
                path,
            };
            let err = invoke(&selected, "x", Duration::from_secs(1)).unwrap_err();
            assert!(err.to_string().contains("timed out"));
        }
    }
}
