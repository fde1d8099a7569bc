//! Python environment support for pyenvsearch.
//!
//! This crate provides everything that knows about Python:
//! - Environment resolution and installed distributions
//! - Package resolution (site-packages, distribution names, import system)
//! - Source search backends (external tools and a library fallback)
//! - Tree-sitter outlines, tables of contents and entity listings
//! - Live object inspection through the environment's interpreter
//! - Documentation summaries from package metadata

pub mod docs;
pub mod entities;
pub mod env;
pub mod error_bridges;
pub mod files;
pub mod inspect;
pub mod metadata;
pub mod outline;
pub mod packages;
pub mod search;
pub mod toc;
