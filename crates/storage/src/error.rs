//! Storage error types.

use thiserror::Error;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("refusing to store empty object: {0}")]
    EmptyObject(String),

    #[error("object exceeds maximum size of {max} bytes: {key}")]
    ObjectTooLarge { key: String, max: u64 },

    #[error("configuration error: {0}")]
    Config(String),
}

impl StorageError {
    /// Classify an I/O error raised while operating on `key`.
    pub fn from_io(key: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(key.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(key.to_string()),
            _ => Self::Io(err),
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
