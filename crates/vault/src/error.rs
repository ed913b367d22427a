//! Vault error types.
//!
//! Every failure belongs to one [`ErrorKind`] and carries a stable code, so a
//! caller can map it to a response without matching on messages.

use burrow_core::{AccountId, UploadId};
use burrow_metadata::MetadataError;
use burrow_storage::StorageError;
use serde::Serialize;

/// Abstract failure category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    QuotaExceeded,
    InvalidArgument,
    Conflict,
    IoFailure,
    IncompleteUpload,
}

/// Serializable (code, message) pair for callers.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// Vault operation errors.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("account {0} not found")]
    AccountNotFound(AccountId),

    #[error("upload session {0} not found")]
    UploadNotFound(UploadId),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("storage quota exceeded: requested {requested} bytes, {available} available")]
    QuotaExceeded { requested: u64, available: u64 },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("file is empty")]
    FileEmpty,

    #[error("file of {size} bytes exceeds the maximum of {max} bytes")]
    FileTooLarge { size: u64, max: u64 },

    #[error("chunk index {index} out of range 0..{total}")]
    InvalidChunkIndex { index: u32, total: u32 },

    #[error("folder is not empty: {0}")]
    FolderNotEmpty(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("account {0} already exists")]
    AccountExists(AccountId),

    #[error("path already exists: {0}")]
    PathExists(String),

    #[error("incomplete upload: missing {} of {total} chunks", .missing.len())]
    IncompleteUpload { missing: Vec<u32>, total: u32 },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("{0}")]
    Core(#[from] burrow_core::Error),
}

impl VaultError {
    /// Failure category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) | Self::AccountNotFound(_) | Self::UploadNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::QuotaExceeded { .. } => ErrorKind::QuotaExceeded,
            Self::InvalidArgument(_)
            | Self::FileEmpty
            | Self::FileTooLarge { .. }
            | Self::InvalidChunkIndex { .. }
            | Self::FolderNotEmpty(_) => ErrorKind::InvalidArgument,
            Self::Conflict(_) | Self::AccountExists(_) | Self::PathExists(_) => {
                ErrorKind::Conflict
            }
            Self::IncompleteUpload { .. } => ErrorKind::IncompleteUpload,
            Self::Storage(e) => match e {
                StorageError::NotFound(_) => ErrorKind::NotFound,
                StorageError::InvalidKey(_)
                | StorageError::EmptyObject(_)
                | StorageError::ObjectTooLarge { .. } => ErrorKind::InvalidArgument,
                StorageError::PermissionDenied(_)
                | StorageError::Io(_)
                | StorageError::Config(_) => ErrorKind::IoFailure,
            },
            Self::Metadata(e) => match e {
                MetadataError::NotFound(_) => ErrorKind::NotFound,
                MetadataError::AlreadyExists(_) | MetadataError::Conflict(_) => {
                    ErrorKind::Conflict
                }
                _ => ErrorKind::IoFailure,
            },
            Self::Core(e) => match e {
                burrow_core::Error::QuotaExhausted { .. } => ErrorKind::QuotaExceeded,
                _ => ErrorKind::InvalidArgument,
            },
        }
    }

    /// Stable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::AccountNotFound(_) => "account_not_found",
            Self::UploadNotFound(_) => "upload_not_found",
            Self::Forbidden(_) => "forbidden",
            Self::QuotaExceeded { .. } => "quota_exceeded",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::FileEmpty => "file_empty",
            Self::FileTooLarge { .. } => "file_too_large",
            Self::InvalidChunkIndex { .. } => "invalid_chunk_index",
            Self::FolderNotEmpty(_) => "folder_not_empty",
            Self::Conflict(_) => "conflict",
            Self::AccountExists(_) => "account_exists",
            Self::PathExists(_) => "path_exists",
            Self::IncompleteUpload { .. } => "incomplete_upload",
            Self::Storage(e) => match e {
                StorageError::NotFound(_) => "not_found",
                StorageError::PermissionDenied(_) => "permission_denied",
                StorageError::EmptyObject(_) => "file_empty",
                StorageError::ObjectTooLarge { .. } => "file_too_large",
                StorageError::InvalidKey(_) => "invalid_argument",
                StorageError::Io(_) | StorageError::Config(_) => "io_failure",
            },
            Self::Metadata(e) => match e {
                MetadataError::NotFound(_) => "not_found",
                MetadataError::AlreadyExists(_) | MetadataError::Conflict(_) => "conflict",
                _ => "io_failure",
            },
            Self::Core(e) => match e {
                burrow_core::Error::QuotaExhausted { .. } => "quota_exceeded",
                burrow_core::Error::InvalidSize(_) => "invalid_size",
                _ => "invalid_argument",
            },
        }
    }

    /// The (code, message) pair shown to callers.
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}

/// Result type for vault operations.
pub type VaultResult<T> = std::result::Result<T, VaultError>;
