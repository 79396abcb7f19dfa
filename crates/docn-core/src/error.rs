//! Error types for the retrieval core.
//!
//! Blank input and an empty corpus are not errors: they resolve to empty
//! results or zero scores at the call site.

use thiserror::Error;

/// Result type alias using DocnError.
pub type Result<T> = std::result::Result<T, DocnError>;

/// Errors that can occur in the retrieval core.
#[derive(Error, Debug)]
pub enum DocnError {
    /// A call was made with parameters that can never succeed.
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// Vector dimension does not match the index dimension.
    #[error("Dimension mismatch: index has {expected} dimensions, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The store does not implement the requested index kind.
    #[error("Unsupported index type: {kind}")]
    UnsupportedIndex { kind: String },

    /// The external vector store could not be reached or failed.
    #[error("Vector store unavailable: {message}")]
    StoreUnavailable { message: String },

    /// A batch write failed and was rolled back in full.
    #[error("Batch of {attempted} vectors rolled back: {reason}")]
    BatchRejected { attempted: usize, reason: String },

    /// The operation observed a cancellation request.
    #[error("Operation cancelled")]
    Cancelled,

    /// Database error.
    #[error("Database error: {message}")]
    Database { message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration file error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Internal error (unexpected).
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DocnError {
    /// Create an invalid configuration error.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Create a store unavailable error.
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
        }
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    /// Create a batch rejection error.
    pub fn batch_rejected(attempted: usize, reason: impl Into<String>) -> Self {
        Self::BatchRejected {
            attempted,
            reason: reason.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the call should be rejected rather than retried.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfiguration { .. }
                | Self::DimensionMismatch { .. }
                | Self::UnsupportedIndex { .. }
                | Self::Config { .. }
        )
    }

    /// Get the stable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidConfiguration { .. }
            | Self::DimensionMismatch { .. }
            | Self::UnsupportedIndex { .. } => "INVALID_CONFIGURATION",
            Self::StoreUnavailable { .. } => "STORE_UNAVAILABLE",
            Self::BatchRejected { .. } => "BATCH_REJECTED",
            Self::Cancelled => "CANCELLED",
            Self::Database { .. } => "DATABASE_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}
