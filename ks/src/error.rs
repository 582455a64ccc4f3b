//! Store error types

use thiserror::Error;

/// Errors that can occur in a store backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid key '{0}': keys must be non-empty and use only [A-Za-z0-9._-]")]
    InvalidKey(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Backend lock poisoned")]
    Poisoned,
}
