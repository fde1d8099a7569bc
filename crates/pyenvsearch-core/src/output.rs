//! JSON output envelopes for `--json` mode.
//!
//! Every successful command emits `{"content": ..., "metadata": {...}}`; every
//! failure emits `{"error": "...", "metadata": {...}}` with no `content` key.
//! Metadata keys are kept in a `BTreeMap` so output is deterministic.

use std::collections::BTreeMap;
use std::io::{self, Write};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{OutputErrorCode, PyEnvError};

/// Current schema version reported in all metadata blocks.
pub const SCHEMA_VERSION: &str = "1";

/// Key/value metadata attached to every envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, Value>);

impl Metadata {
    /// Metadata for the named command, with the schema version pre-filled.
    pub fn for_command(command: &str) -> Self {
        let mut map = BTreeMap::new();
        map.insert("command".to_string(), Value::from(command));
        map.insert("schema_version".to_string(), Value::from(SCHEMA_VERSION));
        Metadata(map)
    }

    /// Add or replace a key.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    /// Add or replace a key in place.
    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    /// Look up a key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

/// Successful response: command content plus metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub content: T,
    pub metadata: Metadata,
}

impl<T: Serialize> Envelope<T> {
    pub fn new(content: T, metadata: Metadata) -> Self {
        Envelope { content, metadata }
    }
}

/// Failure response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Human-readable message.
    pub error: String,
    pub metadata: Metadata,
}

impl ErrorEnvelope {
    /// Build from a `PyEnvError`, recording its exit code and category.
    pub fn from_error(err: &PyEnvError, command: &str) -> Self {
        let code = OutputErrorCode::from(err).code();
        let mut metadata = Metadata::for_command(command)
            .with("code", code)
            .with("kind", err.kind());
        if let PyEnvError::ToolFailure {
            tool, exit_code, ..
        } = err
        {
            metadata.insert("tool", tool.as_str());
            metadata.insert("tool_exit_code", exit_code.map(Value::from).unwrap_or(Value::Null));
        }
        ErrorEnvelope {
            error: err.to_string(),
            metadata,
        }
    }
}

/// Emit a response as pretty-printed JSON to a writer.
///
/// This is the single JSON output path for the CLI.
pub fn emit_response<T: Serialize>(response: &T, writer: &mut impl Write) -> io::Result<()> {
    let json = serde_json::to_string_pretty(response)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(writer, "{}", json)
}

// ============================================================================
// Tests
// ============================================================================
