//! Shared error types for couplingmap
//!
//! Structural problems (pattern arity, malformed worker output, broken
//! configuration) surface as errors. Missing data never does: unknown nodes
//! and views resolve to the neutral coupling value `0` at the graph layer,
//! and numeric hull failures are absorbed inside trimming.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for couplingmap operations
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid patterns, view lists or other caller input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Malformed or unexpected message on the worker channel
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// Worker process failures that exhausted the retry budget
    #[error("Worker error: {0}")]
    Worker(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Result cache errors
    #[error("Cache error: {message}")]
    Cache {
        message: String,
        path: Option<PathBuf>,
    },

    /// Graph documents that cannot be turned into a coupling graph
    #[error("Graph error: {0}")]
    Graph(String),

    /// Generic errors with context
    #[error("{context}: {message}")]
    WithContext { context: String, message: String },

    /// IO errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Binary cache encoding errors
    #[error(transparent)]
    Encoding(#[from] postcard::Error),

    /// TOML configuration parse errors
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a protocol violation
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Create a cache error with path context
    pub fn cache(message: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::Cache {
            message: message.into(),
            path: Some(path.into()),
        }
    }

    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            message: self.to_string(),
        }
    }

    /// Whether the error stems from caller input rather than the environment
    pub fn is_user_fixable(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Configuration(_))
    }
}

/// Result type alias using our error type
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}
