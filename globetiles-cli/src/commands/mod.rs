//! CLI command implementations.
//!
//! # Command Modules
//!
//! - [`cache`] - File store management (list, prune, clear)
//! - [`compose`] - Blocking elevation grid over a sector
//! - [`config`] - Configuration management (init, show, path)
//! - [`elevation`] - Point elevation lookup

pub mod cache;
pub mod common;
pub mod compose;
pub mod config;
pub mod elevation;
