//! # Error Handling
//!
//! Error types for the keystash storage core, built on `thiserror`.
//!
//! Every repository, adapter, and evaluator function returns [`Result`], so a
//! caller sees one error type regardless of which physical backend failed.

pub mod types;

pub use types::{KeystashError, Result};
