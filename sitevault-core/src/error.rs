/*!
Error types for the sitevault core engine.
*/

use thiserror::Error;

/// Result type used throughout the sitevault core.
pub type Result<T> = std::result::Result<T, VaultError>;

/// Errors that can occur during snapshot and restore operations.
#[derive(Error, Debug)]
pub enum VaultError {
    /// I/O errors during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Archive creation/extraction errors
    #[error("Archive error: {0}")]
    Archive(String),

    /// Database export failures (all tiers exhausted)
    #[error("Export error: {0}")]
    Export(String),

    /// Database import failures (all tiers exhausted)
    #[error("Import error: {0}")]
    Import(String),

    /// Errors from the database client library
    #[error("Database error: {0}")]
    Database(#[from] mysql::Error),

    /// Validation errors (bad or missing input)
    #[error("Validation error: {0}")]
    Validation(String),

    /// A named step of an orchestrated operation failed
    #[error("{step}: {message}")]
    Step { step: &'static str, message: String },
}

impl VaultError {
    /// Create a new archive error
    pub fn archive<S: Into<String>>(msg: S) -> Self {
        Self::Archive(msg.into())
    }

    /// Create a new export error
    pub fn export<S: Into<String>>(msg: S) -> Self {
        Self::Export(msg.into())
    }

    /// Create a new import error
    pub fn import<S: Into<String>>(msg: S) -> Self {
        Self::Import(msg.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new step-failure error
    pub fn step<S: Into<String>>(step: &'static str, msg: S) -> Self {
        Self::Step {
            step,
            message: msg.into(),
        }
    }
}
