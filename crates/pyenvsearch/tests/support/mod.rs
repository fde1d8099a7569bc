//! Shared test support utilities.
//!
//! Runs the `pyenvsearch` binary in a controlled environment and builds
//! throwaway virtual environments on disk.

pub mod fixtures;

use std::ffi::OsStr;
use std::path::Path;
use std::process::Command;

/// Variables that would let the binary find the developer's own setup.
const SCRUBBED_VARS: &[&str] = &[
    "VIRTUAL_ENV",
    "CONDA_PREFIX",
    "PYENVSEARCH_PYTHON",
    "PYENVSEARCH_LLM_TOOL",
    "PYENVSEARCH_LLM_TIMEOUT",
    "RUST_LOG",
];

/// Output of one run.
#[derive(Debug)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl RunOutput {
    /// Parse stdout as JSON.
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.stdout)
            .unwrap_or_else(|e| panic!("stdout should be valid JSON ({}):\n{}", e, self.stdout))
    }
}

/// Run pyenvsearch in `cwd` with the given arguments.
pub fn run(cwd: &Path, args: &[&str]) -> RunOutput {
    run_with_env::<&str, &str>(cwd, args, &[])
}

/// Run pyenvsearch with extra environment variables set.
pub fn run_with_env<K: AsRef<OsStr>, V: AsRef<OsStr>>(cwd: &Path, args: &[&str], vars: &[(K, V)]) -> RunOutput {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_pyenvsearch"));
    cmd.args(args).current_dir(cwd);
    for var in SCRUBBED_VARS {
        cmd.env_remove(var);
    }
    for (key, value) in vars {
        cmd.env(key, value);
    }
    let output = cmd.output().expect("failed to execute pyenvsearch");

    RunOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code().unwrap_or(-1),
    }
}
