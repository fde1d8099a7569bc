//! Binary entry point for the pyenvsearch CLI.
//!
//! ## Usage
//!
//! ```bash
//! # Where is the active environment?
//! pyenvsearch venv
//!
//! # Locate a package and browse its structure
//! pyenvsearch find requests
//! pyenvsearch toc requests --depth 2 --public
//!
//! # Search installed source
//! pyenvsearch search "def get" --package requests --type regex
//!
//! # Inspect a live object with the environment's interpreter
//! pyenvsearch inspect json:JSONDecoder
//!
//! # Ask an installed LLM CLI about a package
//! pyenvsearch summarize httpx --tool claude
//! ```
//!
//! Every command prints text by default and a `{"content", "metadata"}`
//! envelope with `--json`.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{info, warn};

use pyenvsearch::config::{FlagValues, Settings};
use pyenvsearch::llm::{self, LlmResponse, PromptContext, PromptKind};
use pyenvsearch::render;
use pyenvsearch_core::error::{OutputErrorCode, PyEnvError};
use pyenvsearch_core::output::{emit_response, Envelope, ErrorEnvelope, Metadata};
use pyenvsearch_core::process::find_executable;
use pyenvsearch_python::docs::package_docs;
use pyenvsearch_python::entities::{find_classes, find_methods, list_entities, EntityFilter, EntityListing, EntityQuery};
use pyenvsearch_python::env::{locate_environment, EnvironmentInfo, LocateOptions, PythonEnvError};
use pyenvsearch_python::inspect::{inspect_target, InspectOptions};
use pyenvsearch_python::packages::{resolve_package, PackageLocation};
use pyenvsearch_python::search::{SearchEngine, SearchMode, SearchOptions};
use pyenvsearch_python::toc::{build_toc, TocOptions};

/// Table-of-contents depth used for LLM prompt context.
const PROMPT_TOC_DEPTH: usize = 2;

// ============================================================================
// CLI Structure
// ============================================================================

/// Navigate, search and inspect the packages of a Python environment.
///
/// Finds the active virtual environment, resolves installed packages, and
/// lets you browse, search and introspect their source. Output is text by
/// default and JSON with `--json`.
#[derive(Parser, Debug)]
#[command(
    name = "pyenvsearch",
    version,
    about = "Navigate, search and inspect the packages of a Python environment"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

/// Global arguments shared by all subcommands.
#[derive(Parser, Debug, Clone)]
struct GlobalArgs {
    /// Emit JSON (`{"content": ..., "metadata": ...}`) instead of text.
    #[arg(long, global = true)]
    json: bool,

    /// Python interpreter of the environment to use.
    #[arg(long, global = true)]
    python: Option<PathBuf>,

    /// Environment directory (virtualenv or conda prefix) to use.
    #[arg(long, global = true)]
    venv: Option<PathBuf>,

    /// Log level for tracing output (overridden by RUST_LOG).
    #[arg(long, global = true, value_enum, default_value = "warn")]
    log_level: LogLevel,

    /// Format of log lines on stderr.
    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,
}

/// Log level for tracing output.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Log line format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    #[default]
    Text,
    Json,
}

/// How a search pattern is interpreted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum SearchType {
    #[default]
    Literal,
    Regex,
    Structural,
}

impl From<SearchType> for SearchMode {
    fn from(value: SearchType) -> Self {
        match value {
            SearchType::Literal => SearchMode::Literal,
            SearchType::Regex => SearchMode::Regex,
            SearchType::Structural => SearchMode::Structural,
        }
    }
}

/// Arguments shared by the LLM commands.
#[derive(Args, Debug, Clone)]
struct LlmArgs {
    /// Package to ask about.
    package: String,
    /// LLM CLI to use (claude, gemini, codex, goose, q, llm).
    #[arg(long)]
    tool: Option<String>,
    /// Extra focus for the request.
    #[arg(long)]
    task: Option<String>,
    /// Seconds to wait for the LLM CLI (default 300).
    #[arg(long)]
    timeout: Option<u64>,
}

/// Listing flags shared by the list-* commands.
#[derive(Args, Debug, Clone)]
struct ListArgs {
    /// Package to scan.
    package: String,
    /// Include private (`_name`) definitions and modules.
    #[arg(long)]
    include_private: bool,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Show the detected Python environment.
    Venv,
    /// Locate an installed package.
    Find {
        /// Package, module or distribution name (or a path).
        package: String,
    },
    /// Show documentation found for a package.
    Docs {
        /// Package name.
        package: String,
    },
    /// Show a package's table of contents.
    Toc {
        /// Package name.
        package: String,
        /// How many levels to expand (0 = package only).
        #[arg(long, default_value_t = 3)]
        depth: usize,
        /// Hide private modules and definitions.
        #[arg(long)]
        public: bool,
    },
    /// Search Python source.
    Search {
        /// Pattern to look for.
        pattern: String,
        /// Pattern syntax.
        #[arg(long = "type", value_enum, default_value = "literal")]
        search_type: SearchType,
        /// Search inside this package instead of the current directory.
        #[arg(long)]
        package: Option<String>,
        /// Case-insensitive matching.
        #[arg(long, short = 'i')]
        ignore_case: bool,
        /// Stop after this many matches.
        #[arg(long)]
        max_results: Option<usize>,
    },
    /// Find class definitions by name.
    Class {
        /// Class name (case-insensitive).
        name: String,
        /// Search inside this package instead of the current directory.
        #[arg(long)]
        package: Option<String>,
    },
    /// Find method or function definitions by name.
    Method {
        /// Method or function name.
        name: String,
        /// Only methods of this class.
        #[arg(long = "class")]
        class_name: Option<String>,
        /// Search inside this package instead of the current directory.
        #[arg(long)]
        package: Option<String>,
    },
    /// List the classes of a package.
    ListClasses(ListArgs),
    /// List the functions and methods of a package.
    ListMethods(ListArgs),
    /// List the enums of a package.
    ListEnums {
        #[command(flatten)]
        list: ListArgs,
        /// Only enums deriving from this base (IntEnum, StrEnum, ...).
        #[arg(long)]
        enum_type: Option<String>,
    },
    /// Inspect a live object (`module`, `module.attr` or `module:attr.path`).
    Inspect {
        /// Object to import and inspect.
        target: String,
        /// Include `_private` and dunder attributes.
        #[arg(long)]
        show_private: bool,
        /// Show at most this many attributes.
        #[arg(long)]
        max_items: Option<usize>,
        /// List alphabetically instead of grouping by kind.
        #[arg(long)]
        no_group: bool,
        /// Leave out docstring snippets.
        #[arg(long)]
        no_docs: bool,
    },
    /// Ask an LLM CLI for an overview of a package.
    Summarize(LlmArgs),
    /// Ask an LLM CLI how a package works.
    Explain(LlmArgs),
    /// Ask an LLM CLI for a how-to guide.
    Howto(LlmArgs),
    /// Ask an LLM CLI for an API guide.
    ApiGuide(LlmArgs),
    /// List supported LLM CLIs and which are installed.
    LlmTools,
}

impl Command {
    /// Subcommand name used in JSON metadata.
    fn name(&self) -> &'static str {
        match self {
            Command::Venv => "venv",
            Command::Find { .. } => "find",
            Command::Docs { .. } => "docs",
            Command::Toc { .. } => "toc",
            Command::Search { .. } => "search",
            Command::Class { .. } => "class",
            Command::Method { .. } => "method",
            Command::ListClasses(_) => "list-classes",
            Command::ListMethods(_) => "list-methods",
            Command::ListEnums { .. } => "list-enums",
            Command::Inspect { .. } => "inspect",
            Command::Summarize(_) => "summarize",
            Command::Explain(_) => "explain",
            Command::Howto(_) => "howto",
            Command::ApiGuide(_) => "api-guide",
            Command::LlmTools => "llm-tools",
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args_os()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();
    let cli = match Cli::try_parse_from(&args) {
        Ok(cli) => cli,
        // Help and version output, and text-mode usage errors, stay clap's.
        Err(err) if !err.use_stderr() || !json_requested(&args) => err.exit(),
        Err(err) => return report_error(&usage_error(&err), true, subcommand_name(&args)),
    };

    init_tracing(cli.global.log_level, cli.global.log_format);

    let json = cli.global.json;
    let command_name = cli.command.name();
    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report_error(&err, json, command_name),
    }
}

/// Render a failure once and turn it into the process exit code.
fn report_error(err: &PyEnvError, json: bool, command_name: &str) -> ExitCode {
    if json {
        // JSON errors go to stdout so callers parse a single stream.
        let envelope = ErrorEnvelope::from_error(err, command_name);
        let _ = emit_response(&envelope, &mut io::stdout());
        let _ = io::stdout().flush();
    } else {
        eprintln!("error: {}", err);
    }
    ExitCode::from(OutputErrorCode::from(err).code())
}

/// Whether `--json` appears among the raw arguments.
fn json_requested(args: &[String]) -> bool {
    args.iter()
        .skip(1)
        .take_while(|arg| arg.as_str() != "--")
        .any(|arg| arg == "--json")
}

/// First argument naming a subcommand, for error metadata.
fn subcommand_name(args: &[String]) -> &str {
    let cmd = Cli::command();
    args.iter()
        .skip(1)
        .find(|arg| cmd.find_subcommand(arg.as_str()).is_some())
        .map_or("pyenvsearch", String::as_str)
}

/// A clap parse failure as an invalid-arguments error (exit 2).
fn usage_error(err: &clap::Error) -> PyEnvError {
    let rendered = err.render().to_string();
    let message = rendered
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("invalid arguments");
    PyEnvError::invalid_args(message.strip_prefix("error: ").unwrap_or(message))
}

/// Initialize tracing subscriber.
fn init_tracing(level: LogLevel, format: LogFormat) {
    use tracing_subscriber::fmt::format::FmtSpan;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_tracing_level().to_string()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Execute the CLI command.
fn execute(cli: Cli) -> Result<(), PyEnvError> {
    let global = cli.global;
    match cli.command {
        Command::Venv => execute_venv(&global),
        Command::Find { package } => execute_find(&global, &package),
        Command::Docs { package } => execute_docs(&global, &package),
        Command::Toc {
            package,
            depth,
            public,
        } => execute_toc(&global, &package, depth, public),
        Command::Search {
            pattern,
            search_type,
            package,
            ignore_case,
            max_results,
        } => {
            let options = SearchOptions {
                mode: search_type.into(),
                ignore_case,
                max_results,
            };
            execute_search(&global, &pattern, package.as_deref(), &options)
        }
        Command::Class { name, package } => execute_class(&global, &name, package.as_deref()),
        Command::Method {
            name,
            class_name,
            package,
        } => execute_method(&global, &name, class_name.as_deref(), package.as_deref()),
        Command::ListClasses(list) => {
            execute_list(&global, "list-classes", &list, EntityFilter::Classes, None)
        }
        Command::ListMethods(list) => {
            execute_list(&global, "list-methods", &list, EntityFilter::Methods, None)
        }
        Command::ListEnums { list, enum_type } => {
            execute_list(&global, "list-enums", &list, EntityFilter::Enums, enum_type)
        }
        Command::Inspect {
            target,
            show_private,
            max_items,
            no_group,
            no_docs,
        } => {
            let options = InspectOptions {
                max_items,
                show_private,
                group_by_kind: !no_group,
                show_docs: !no_docs,
            };
            execute_inspect(&global, &target, &options)
        }
        Command::Summarize(args) => execute_llm(&global, PromptKind::Summarize, args),
        Command::Explain(args) => execute_llm(&global, PromptKind::Explain, args),
        Command::Howto(args) => execute_llm(&global, PromptKind::Howto, args),
        Command::ApiGuide(args) => execute_llm(&global, PromptKind::ApiGuide, args),
        Command::LlmTools => execute_llm_tools(&global),
    }
}

// ============================================================================
// Output
// ============================================================================

/// Write `content` as a JSON envelope or as rendered text.
fn emit<T: Serialize>(
    global: &GlobalArgs,
    content: &T,
    metadata: Metadata,
    text: impl FnOnce(&T) -> String,
) -> Result<(), PyEnvError> {
    let mut stdout = io::stdout().lock();
    if global.json {
        emit_response(&Envelope::new(content, metadata), &mut stdout)?;
    } else {
        stdout.write_all(text(content).as_bytes())?;
    }
    stdout.flush()?;
    Ok(())
}

// ============================================================================
// Environment and Package Helpers
// ============================================================================

fn locate_options(global: &GlobalArgs) -> LocateOptions {
    LocateOptions {
        python: global.python.clone(),
        venv: global.venv.clone(),
        ..LocateOptions::from_process()
    }
}

/// Locate the environment; failing to find one is an error.
fn require_environment(global: &GlobalArgs) -> Result<EnvironmentInfo, PyEnvError> {
    Ok(locate_environment(&locate_options(global))?)
}

/// Locate the environment when possible.
///
/// An explicit `--python`/`--venv` that does not work is still an error;
/// automatic detection coming up empty is not.
fn optional_environment(global: &GlobalArgs) -> Result<Option<EnvironmentInfo>, PyEnvError> {
    match locate_environment(&locate_options(global)) {
        Ok(env) => Ok(Some(env)),
        Err(PythonEnvError::EnvironmentNotFound { .. }) => {
            warn!("no Python environment found; continuing without one");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

fn resolve(global: &GlobalArgs, package: &str) -> Result<(PackageLocation, Option<EnvironmentInfo>), PyEnvError> {
    let env = optional_environment(global)?;
    let location = resolve_package(package, env.as_ref())?;
    info!(package, path = %location.path.display(), "resolved package");
    Ok((location, env))
}

/// Root for `search`, `class` and `method`: a package or the current directory.
fn search_root(global: &GlobalArgs, package: Option<&str>) -> Result<PathBuf, PyEnvError> {
    match package {
        Some(name) => Ok(resolve(global, name)?.0.path),
        None => Ok(std::env::current_dir()?),
    }
}

fn location_metadata(metadata: Metadata, location: &PackageLocation) -> Metadata {
    metadata
        .with("package", location.import_name.as_str())
        .with("path", location.path.display().to_string())
}

// ============================================================================
// Command Executors
// ============================================================================

fn execute_venv(global: &GlobalArgs) -> Result<(), PyEnvError> {
    let env = require_environment(global)?;
    let metadata = Metadata::for_command("venv").with("source", env.source.to_string());
    emit(global, &env, metadata, render::environment)
}

fn execute_find(global: &GlobalArgs, package: &str) -> Result<(), PyEnvError> {
    let (location, env) = resolve(global, package)?;
    let mut metadata = Metadata::for_command("find");
    if let Some(env) = &env {
        metadata.insert("environment", env.source.to_string());
    }
    emit(global, &location, metadata, render::location)
}

fn execute_docs(global: &GlobalArgs, package: &str) -> Result<(), PyEnvError> {
    let (location, env) = resolve(global, package)?;
    let docs = package_docs(&location, env.as_ref());
    let metadata = location_metadata(Metadata::for_command("docs"), &location);
    emit(global, &docs, metadata, render::docs)
}

fn execute_toc(global: &GlobalArgs, package: &str, depth: usize, public: bool) -> Result<(), PyEnvError> {
    let (location, _env) = resolve(global, package)?;
    let options = TocOptions {
        max_depth: depth,
        public_only: public,
    };
    let toc = build_toc(&location.path, &location.import_name, options);
    let metadata = location_metadata(Metadata::for_command("toc"), &location)
        .with("depth", depth)
        .with("public_only", public);
    emit(global, &toc, metadata, render::toc)
}

fn execute_search(
    global: &GlobalArgs,
    pattern: &str,
    package: Option<&str>,
    options: &SearchOptions,
) -> Result<(), PyEnvError> {
    let root = search_root(global, package)?;
    let engine = SearchEngine::detect();
    let outcome = engine.search(&root, pattern, options)?;
    let metadata = Metadata::for_command("search")
        .with("pattern", pattern)
        .with("mode", options.mode.as_str())
        .with("root", root.display().to_string())
        .with("backend", outcome.backend.as_str())
        .with("total_matches", outcome.total_matches)
        .with("truncated", outcome.truncated);
    emit(global, &outcome, metadata, render::search)
}

fn emit_listing(global: &GlobalArgs, command: &str, root: &Path, listing: &EntityListing) -> Result<(), PyEnvError> {
    let metadata = Metadata::for_command(command)
        .with("root", root.display().to_string())
        .with("count", listing.entities.len())
        .with("files_scanned", listing.files_scanned);
    emit(global, listing, metadata, render::entities)
}

fn execute_class(global: &GlobalArgs, name: &str, package: Option<&str>) -> Result<(), PyEnvError> {
    let root = search_root(global, package)?;
    let listing = find_classes(&root, name)?;
    emit_listing(global, "class", &root, &listing)
}

fn execute_method(
    global: &GlobalArgs,
    name: &str,
    class_name: Option<&str>,
    package: Option<&str>,
) -> Result<(), PyEnvError> {
    let root = search_root(global, package)?;
    let listing = find_methods(&root, name, class_name)?;
    emit_listing(global, "method", &root, &listing)
}

fn execute_list(
    global: &GlobalArgs,
    command: &str,
    list: &ListArgs,
    filter: EntityFilter,
    enum_type: Option<String>,
) -> Result<(), PyEnvError> {
    let (location, _env) = resolve(global, &list.package)?;
    let query = EntityQuery {
        include_private: list.include_private,
        enum_type,
    };
    let listing = list_entities(&location.path, filter, &query)?;
    emit_listing(global, command, &location.path, &listing)
}

fn execute_inspect(global: &GlobalArgs, target: &str, options: &InspectOptions) -> Result<(), PyEnvError> {
    let env = optional_environment(global)?;
    let python = env.as_ref().and_then(|e| e.interpreter.as_deref());
    let report = inspect_target(python, target, options)?;
    let metadata = Metadata::for_command("inspect")
        .with("target", target)
        .with("eligible", report.eligible)
        .with("omitted", report.omitted);
    emit(global, &report, metadata, render::inspection)
}

/// Local knowledge about a package for the prompt, or `None` if the package
/// cannot be resolved.
fn prompt_context(global: &GlobalArgs, package: &str) -> Option<PromptContext> {
    let (location, env) = match resolve(global, package) {
        Ok(found) => found,
        Err(e) => {
            warn!(package, error = %e, "sending prompt without local context");
            return None;
        }
    };
    let docs = package_docs(&location, env.as_ref());
    let toc = build_toc(
        &location.path,
        &location.import_name,
        TocOptions {
            max_depth: PROMPT_TOC_DEPTH,
            public_only: true,
        },
    );
    Some(PromptContext {
        location: Some(location.path.display().to_string()),
        version: location.version.clone(),
        module_doc: docs.module_doc,
        outline: Some(render::toc_tree(&toc)),
    })
}

fn execute_llm(global: &GlobalArgs, kind: PromptKind, args: LlmArgs) -> Result<(), PyEnvError> {
    let settings = Settings::from_process(FlagValues {
        python: global.python.clone(),
        venv: global.venv.clone(),
        llm_tool: args.tool,
        llm_timeout_secs: args.timeout,
    })?;

    // Tool availability is checked before any package work.
    let selected = llm::select_tool(settings.llm_tool.as_deref(), find_executable)?;

    let context = prompt_context(global, &args.package);
    let prompt = llm::build_prompt(kind, &args.package, args.task.as_deref(), context.as_ref());
    let (output, duration) = llm::invoke(&selected, &prompt, settings.llm_timeout)?;

    let response = LlmResponse {
        tool: selected.tool,
        kind,
        package: args.package,
        used_local_context: context.is_some(),
        output,
        duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
    };
    let metadata = Metadata::for_command(kind.as_str())
        .with("tool", selected.tool.binary())
        .with("package", response.package.as_str());
    emit(global, &response, metadata, |r| format!("{}\n", r.output))
}

#[derive(Serialize)]
struct LlmToolsContent {
    tools: Vec<llm::ToolStatus>,
    default: Option<llm::LlmTool>,
}

fn execute_llm_tools(global: &GlobalArgs) -> Result<(), PyEnvError> {
    let settings = Settings::from_process(FlagValues::default())?;
    let tools = llm::detect_tools(find_executable);
    let default = llm::select_tool(settings.llm_tool.as_deref(), find_executable)
        .ok()
        .map(|selected| selected.tool);
    let available = tools.iter().filter(|t| t.available).count();
    let content = LlmToolsContent { tools, default };
    let metadata = Metadata::for_command("llm-tools").with("available", available);
    emit(global, &content, metadata, |c| render::llm_tools(&c.tools, c.default))
}

// ============================================================================
// Tests
// ============================================================================
