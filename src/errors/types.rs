//! # Error Types
//!
//! Error kinds shared by every storage backend and the secret evaluator.

/// Custom result type for keystash operations
pub type Result<T> = std::result::Result<T, KeystashError>;

/// Boxed source error carried by backend failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for keystash
#[derive(thiserror::Error, Debug)]
pub enum KeystashError {
    /// No live record matches the requested key
    #[error("Resource not found: {resource_type} with ID '{id}'")]
    NotFound { resource_type: String, id: String },

    /// Uniqueness violation on create
    #[error("Resource already exists: {message}")]
    AlreadyExists { message: String, resource_type: String },

    /// Unsupported encoding or a capability the chosen backend does not provide
    #[error("Not implemented: {feature}")]
    NotImplemented { feature: String },

    /// Malformed query descriptor or request parameter
    #[error("Invalid parameter: {message}")]
    InvalidParameter { message: String, field: Option<String> },

    /// Secret expression failed to parse, evaluate, or produce a string
    #[error("Evaluation failed: {message}")]
    Evaluation { message: String },

    /// Physical store failure with operation context
    #[error("Backend failure: {action} {entity} '{id}'")]
    Backend {
        entity: String,
        id: String,
        action: String,
        #[source]
        source: BoxError,
    },

    /// Database errors
    #[error("Database error: {context}")]
    Database {
        #[source]
        source: sqlx::Error,
        context: String,
    },

    /// I/O errors with additional context
    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {context}")]
    Serialization {
        context: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl KeystashError {
    /// Create a not found error
    pub fn not_found<R: Into<String>, I: ToString>(resource_type: R, id: I) -> Self {
        Self::NotFound { resource_type: resource_type.into(), id: id.to_string() }
    }

    /// Create an already-exists error
    pub fn already_exists<M: Into<String>, R: Into<String>>(message: M, resource_type: R) -> Self {
        Self::AlreadyExists { message: message.into(), resource_type: resource_type.into() }
    }

    /// Create a not implemented error
    pub fn not_implemented<S: Into<String>>(feature: S) -> Self {
        Self::NotImplemented { feature: feature.into() }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter<S: Into<String>>(message: S) -> Self {
        Self::InvalidParameter { message: message.into(), field: None }
    }

    /// Create an invalid parameter error naming the offending field
    pub fn invalid_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::InvalidParameter { message: message.into(), field: Some(field.into()) }
    }

    /// Create an evaluation error
    pub fn evaluation<S: Into<String>>(message: S) -> Self {
        Self::Evaluation { message: message.into() }
    }

    /// Wrap a physical store failure with the entity, record id and action
    pub fn backend<E, I, A, S>(entity: E, id: I, action: A, source: S) -> Self
    where
        E: Into<String>,
        I: ToString,
        A: Into<String>,
        S: Into<BoxError>,
    {
        Self::Backend {
            entity: entity.into(),
            id: id.to_string(),
            action: action.into(),
            source: source.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization<S: Into<String>>(context: S) -> Self {
        Self::Serialization { context: context.into(), source: None }
    }

    /// Create a serialization error with source
    pub fn serialization_with_source<S: Into<String>, E: Into<BoxError>>(
        context: S,
        source: E,
    ) -> Self {
        Self::Serialization { context: context.into(), source: Some(source.into()) }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into() }
    }

    /// True for the not-found kind
    pub fn is_not_found(&self) -> bool {
        matches!(self, KeystashError::NotFound { .. })
    }

    /// True for the already-exists kind
    pub fn is_already_exists(&self) -> bool {
        matches!(self, KeystashError::AlreadyExists { .. })
    }

    /// Get the HTTP status code a transport layer should map this error to
    pub fn status_code(&self) -> u16 {
        match self {
            KeystashError::NotFound { .. } => 404,
            KeystashError::AlreadyExists { .. } => 409,
            KeystashError::NotImplemented { .. } => 501,
            KeystashError::InvalidParameter { .. } => 400,
            KeystashError::Evaluation { .. } => 422,
            KeystashError::Serialization { .. } => 400,
            KeystashError::Backend { .. }
            | KeystashError::Database { .. }
            | KeystashError::Io { .. }
            | KeystashError::Config { .. }
            | KeystashError::Internal { .. } => 500,
        }
    }

    /// Check if this error may succeed on a later attempt.
    ///
    /// Nothing in the core retries; this is a hint for callers.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            KeystashError::Backend { .. }
                | KeystashError::Database { .. }
                | KeystashError::Io { .. }
        )
    }
}

// Error conversions for common external error types
impl From<sqlx::Error> for KeystashError {
    fn from(error: sqlx::Error) -> Self {
        Self::Database { source: error, context: "Database operation failed".to_string() }
    }
}

impl From<std::io::Error> for KeystashError {
    fn from(error: std::io::Error) -> Self {
        Self::Io { source: error, context: "I/O operation failed".to_string() }
    }
}

impl From<serde_json::Error> for KeystashError {
    fn from(error: serde_json::Error) -> Self {
        Self::serialization_with_source("JSON serialization failed", error)
    }
}

impl From<config::ConfigError> for KeystashError {
    fn from(error: config::ConfigError) -> Self {
        Self::Config {
            message: "Configuration loading failed".to_string(),
            source: Some(Box::new(error)),
        }
    }
}

impl From<validator::ValidationErrors> for KeystashError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::config(format!("Validation failed: {}", message))
    }
}
