//! PyEnvSearch - navigate, search and inspect a Python environment.
//!
//! This crate provides the `pyenvsearch` binary and its front-end helpers.
//!
//! ## Modules
//!
//! - `config` - Layered settings (flag, environment variable, default)
//! - `llm` - LLM CLI detection, prompts and invocation
//! - `render` - Plain-text output

pub mod config;
pub mod llm;
pub mod render;

// Re-export core types for convenience
pub use pyenvsearch_core::error::{OutputErrorCode, PyEnvError};
pub use pyenvsearch_core::output::{Envelope, ErrorEnvelope, Metadata, SCHEMA_VERSION};
