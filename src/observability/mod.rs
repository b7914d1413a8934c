//! # Observability
//!
//! Structured logging for the storage core and the binary.

pub mod logging;

pub use logging::{init_logging, log_config_info};
