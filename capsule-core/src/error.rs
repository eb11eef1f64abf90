//! Error types for Capsule

use thiserror::Error;

/// Capsule error types
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Error message
        message: String,
    },

    /// Malformed init configuration payload
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for Capsule operations
pub type Result<T> = std::result::Result<T, Error>;
