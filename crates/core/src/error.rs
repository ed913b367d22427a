//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid size literal: {0}")]
    InvalidSize(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("invalid sort order: {0}")]
    InvalidSort(String),

    #[error("invalid chunk size: {size} (must be between {min} and {max})")]
    InvalidChunkSize { size: u64, min: u64, max: u64 },

    #[error("storage exhausted: requested {requested} bytes, {available} available")]
    QuotaExhausted { requested: u64, available: u64 },

    #[error("invalid quota release: releasing {released} bytes with only {used} in use")]
    InvalidRelease { released: u64, used: u64 },

    #[error("upload session error: {0}")]
    UploadSession(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
