//! # Structured Logging
//!
//! Subscriber setup and span helpers on top of the `tracing` ecosystem.
//!
//! `RUST_LOG` takes precedence over the configured level. JSON output puts
//! span fields on every record, so a storage span's `backend`, `entity` and
//! `operation` travel with the events logged inside it.

use crate::config::ObservabilityConfig;
use crate::errors::{KeystashError, Result};
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

static INITIALIZED: OnceLock<()> = OnceLock::new();

/// Create a tracing span for ad-hoc storage work.
///
/// ```rust,ignore
/// let span = repo_span!("database", "secret", "resync");
/// let span = repo_span!("file", "folder", "rewrite", records = 12);
/// ```
#[macro_export]
macro_rules! repo_span {
    ($backend:expr, $entity:expr, $operation:expr) => {
        tracing::debug_span!(
            "storage_operation",
            backend = %$backend,
            entity = %$entity,
            operation = %$operation,
            operation_id = %uuid::Uuid::new_v4()
        )
    };
    ($backend:expr, $entity:expr, $operation:expr, $($field:tt)*) => {
        tracing::debug_span!(
            "storage_operation",
            backend = %$backend,
            entity = %$entity,
            operation = %$operation,
            operation_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

fn env_filter(config: &ObservabilityConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.log_level).map_err(|e| KeystashError::Config {
            message: format!("Invalid log level '{}'", config.log_level),
            source: Some(Box::new(e)),
        }),
    }
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    if INITIALIZED.get().is_some() {
        return Ok(());
    }

    let filter = env_filter(config)?;
    let installed = if config.json_logging {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).with_target(false).compact().try_init()
    };

    // Another subscriber (a test harness, an embedding binary) may already own
    // the global slot; keep it rather than failing.
    if let Err(e) = installed {
        tracing::debug!(error = %e, "Global subscriber already installed");
    }
    let _ = INITIALIZED.set(());

    tracing::info!(
        service_name = %config.service_name,
        log_level = %config.log_level,
        json = config.json_logging,
        "Logging initialized"
    );
    Ok(())
}

/// Log the effective configuration at startup
pub fn log_config_info(config: &crate::config::AppConfig) {
    tracing::info!(
        backend = %config.storage.backend,
        mirror = config.storage.mirror,
        json_logging = config.observability.json_logging,
        "Keystash configuration"
    );
}
