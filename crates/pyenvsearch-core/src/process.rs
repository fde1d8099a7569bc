//! Bounded subprocess execution for external collaborators.
//!
//! Every external binary (interpreter probes, `rg`, `ast-grep`, LLM CLIs) is
//! run through [`run_command`]: stdin is written and stdout/stderr are drained
//! on helper threads while the parent waits with an OS-level timeout, so a
//! chatty child can never fill a pipe and stall. On timeout the child is
//! killed and reaped. Pipes still held open by grandchildren after the child
//! exits count against the same deadline.

use std::ffi::OsString;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// Default timeout for short helper commands (interpreter queries, searches).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

// ============================================================================
// Command Specification
// ============================================================================

/// A fully described external command.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Program to execute (absolute path or name resolved by the OS).
    pub program: PathBuf,
    /// Arguments, passed verbatim.
    pub args: Vec<OsString>,
    /// Text written to the child's stdin (stdin is closed when `None`).
    pub stdin: Option<String>,
    /// Working directory for the child.
    pub current_dir: Option<PathBuf>,
    /// Maximum wall-clock time before the child is killed.
    pub timeout: Duration,
}

impl CommandSpec {
    /// Create a spec with no arguments and the default timeout.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        CommandSpec {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            current_dir: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Feed `input` to the child's stdin.
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Run the child in `dir`.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Set the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Program and arguments as display strings (for logs and reports).
    pub fn display_command(&self) -> Vec<String> {
        std::iter::once(self.program.to_string_lossy().into_owned())
            .chain(self.args.iter().map(|a| a.to_string_lossy().into_owned()))
            .collect()
    }
}

// ============================================================================
// Process Output
// ============================================================================

/// Result of running an external command to completion (or timeout).
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Whether the command exited with status 0.
    pub success: bool,
    /// Exit code if the process exited normally.
    pub exit_code: Option<i32>,
    /// Captured stdout (lossy UTF-8).
    pub stdout: String,
    /// Captured stderr (lossy UTF-8).
    pub stderr: String,
    /// How long the command ran.
    pub duration: Duration,
    /// Whether the command was killed for exceeding its timeout.
    pub timed_out: bool,
}

impl ProcessOutput {
    /// Short description of how the process ended, for error messages.
    pub fn describe_exit(&self) -> String {
        if self.timed_out {
            format!("timed out after {:.1}s", self.duration.as_secs_f64())
        } else {
            match self.exit_code {
                Some(code) => format!("exited with status {}", code),
                None => "terminated by signal".to_string(),
            }
        }
    }
}

// ============================================================================
// Execution
// ============================================================================

/// Run a command, waiting at most `spec.timeout`.
///
/// Returns `Err` only when the process cannot be spawned (missing binary,
/// permission denied); a non-zero exit or a timeout is reported in the
/// returned [`ProcessOutput`].
pub fn run_command(spec: &CommandSpec) -> io::Result<ProcessOutput> {
    let start = Instant::now();

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .stdin(if spec.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = &spec.current_dir {
        cmd.current_dir(dir);
    }

    debug!(command = ?spec.display_command(), "spawning external command");
    let mut child = cmd.spawn()?;

    // Nobody waits on the writer: a child that never reads stdin must not
    // hold up the deadline.
    if let (Some(input), Some(mut pipe)) = (spec.stdin.clone(), child.stdin.take()) {
        thread::spawn(move || {
            // A child that exits without reading stdin closes the pipe early;
            // that is not an error for us.
            let _ = pipe.write_all(input.as_bytes());
        });
    }
    let stdout_reader = child.stdout.take().map(spawn_reader);
    let stderr_reader = child.stderr.take().map(spawn_reader);

    let deadline = start + spec.timeout;
    let Some(status) = child.wait_timeout(spec.timeout)? else {
        let _ = child.kill();
        let _ = child.wait();
        return Ok(timed_out(spec, start.elapsed()));
    };

    // Grandchildren that inherited the pipes keep them open after the child
    // exits, so the readers are bounded by the same deadline.
    let (Some(stdout), Some(stderr)) = (
        collect_reader(stdout_reader, deadline),
        collect_reader(stderr_reader, deadline),
    ) else {
        return Ok(timed_out(spec, start.elapsed()));
    };

    Ok(ProcessOutput {
        success: status.success(),
        exit_code: status.code(),
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        duration: start.elapsed(),
        timed_out: false,
    })
}

fn timed_out(spec: &CommandSpec, duration: Duration) -> ProcessOutput {
    warn!(
        "command timed out after {:?} (limit: {:?}): {:?}",
        duration,
        spec.timeout,
        spec.display_command()
    );
    // Reader threads still blocked on open pipes are detached.
    ProcessOutput {
        success: false,
        exit_code: None,
        stdout: String::new(),
        stderr: format!("command timed out after {:?} (limit: {:?})", duration, spec.timeout),
        duration,
        timed_out: true,
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        let _ = tx.send(buf);
    });
    rx
}

/// Output of one reader, or `None` if the pipe is still open at `deadline`.
fn collect_reader(reader: Option<Receiver<Vec<u8>>>, deadline: Instant) -> Option<Vec<u8>> {
    let Some(rx) = reader else {
        return Some(Vec::new());
    };
    match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(buf) => Some(buf),
        Err(RecvTimeoutError::Timeout) => None,
        Err(RecvTimeoutError::Disconnected) => Some(Vec::new()),
    }
}

// ============================================================================
// Executable Discovery
// ============================================================================

/// Locate an executable on `$PATH`.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}

/// Check whether `path` points at an executable file.
pub fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::metadata(path)
            .map(|metadata| metadata.is_file() && metadata.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }

    #[cfg(windows)]
    {
        path.is_file()
            && path
                .extension()
                .map(|ext| {
                    let ext = ext.to_string_lossy().to_lowercase();
                    ext == "exe" || ext == "bat" || ext == "cmd"
                })
                .unwrap_or(false)
    }

    #[cfg(not(any(unix, windows)))]
    {
        path.is_file()
    }
}

// ============================================================================
// Tests
// ============================================================================
