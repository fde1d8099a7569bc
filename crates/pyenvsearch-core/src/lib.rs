//! Core infrastructure for pyenvsearch.
//!
//! This crate provides the language-agnostic pieces:
//! - Error type and exit codes
//! - JSON output envelopes
//! - Bounded subprocess execution and executable discovery
//! - Text truncation helpers

pub mod error;
pub mod output;
pub mod process;
pub mod text;
