//! Core domain types and shared logic for Burrow.
//!
//! This crate defines the data model used across all other crates:
//! - Content hashes and the streaming hasher
//! - Byte-size literals used in configuration
//! - Virtual path resolution and file name sanitizing
//! - File records, their status and listing order
//! - Quota arithmetic
//! - Chunked upload session state

pub mod config;
pub mod error;
pub mod file;
pub mod hash;
pub mod path;
pub mod quota;
pub mod size;
pub mod upload;

pub use error::{Error, Result};
pub use file::{AccountId, FileId, FileKind, FileRecord, FileStatus, SortKey, SortOrder, SortSpec};
pub use hash::{ContentHash, ContentHasher};
pub use quota::QuotaUsage;
pub use size::ByteSize;
pub use upload::{ChunkProgress, UploadId, UploadSession, UploadState};

/// Maximum chunk size: 32 MiB
pub const MAX_CHUNK_SIZE: u64 = 32 * 1024 * 1024;

/// Minimum chunk size: 64 KiB
pub const MIN_CHUNK_SIZE: u64 = 64 * 1024;

/// Default per-account capacity: 10 GiB
pub const DEFAULT_QUOTA_BYTES: u64 = 10 * 1024 * 1024 * 1024;
