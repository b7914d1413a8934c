//! Domain services
//!
//! The facade callers use instead of talking to repositories directly.

pub mod secret_service;

pub use secret_service::SecretService;
