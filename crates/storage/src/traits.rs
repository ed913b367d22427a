//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

/// A boxed stream of bytes for streaming reads.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Flat key/value object store.
///
/// Keys are relative, slash-separated and never escape the backend root.
/// Every write is atomic: readers observe either the previous object or the
/// complete new one, never a partial write.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Check if an object exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Get an object's size without fetching content.
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta>;

    /// Get an object's content.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Get an object as a byte stream.
    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream>;

    /// Put an object atomically.
    ///
    /// Rejects empty payloads and payloads above the backend's size limit.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Start a streaming upload that publishes atomically on `finish`.
    async fn put_stream(&self, key: &str) -> StorageResult<Box<dyn StreamingUpload>>;

    /// Delete an object. Returns whether anything was removed.
    async fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Delete every object under `prefix`. Returns whether anything was removed.
    async fn delete_prefix(&self, prefix: &str) -> StorageResult<bool>;

    /// List all keys under `prefix`.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Move an object to a new key atomically.
    async fn rename(&self, from: &str, to: &str) -> StorageResult<()>;

    /// Get the backend name for logging.
    fn backend_name(&self) -> &'static str;

    /// Check backend connectivity and health.
    ///
    /// Returns an error if the backend is not reachable or misconfigured.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Metadata about a stored object.
#[derive(Clone, Debug)]
pub struct ObjectMeta {
    /// Object size in bytes.
    pub size: u64,
    /// Last modification time (if available).
    pub last_modified: Option<time::OffsetDateTime>,
}

/// Trait for streaming uploads.
#[async_trait]
pub trait StreamingUpload: Send {
    /// Write a chunk of data.
    async fn write(&mut self, data: Bytes) -> StorageResult<()>;

    /// Bytes accepted so far.
    fn bytes_written(&self) -> u64;

    /// Finish the upload and return the total bytes written.
    async fn finish(self: Box<Self>) -> StorageResult<u64>;

    /// Abort the upload, discarding everything written.
    async fn abort(self: Box<Self>) -> StorageResult<()>;
}
