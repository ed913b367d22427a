//! Physical storage for Burrow.
//!
//! This crate provides:
//! - The `ObjectStore` abstraction with atomic writes and streaming reads
//! - A local filesystem backend that rejects keys escaping its root
//! - `BlobStore`, which places file content under per-account prefixes
//! - `StagingArea`, which holds and assembles chunked uploads

pub mod backends;
pub mod blob;
pub mod error;
pub mod staging;
pub mod traits;

pub use backends::filesystem::FilesystemBackend;
pub use blob::BlobStore;
pub use error::{StorageError, StorageResult};
pub use staging::{AssembledBlob, StagingArea};
pub use traits::{ByteStream, ObjectMeta, ObjectStore, StreamingUpload};

use burrow_core::config::StorageConfig;
use std::sync::Arc;

/// Create an object store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::Filesystem {
            path,
            max_file_size,
        } => {
            let backend =
                FilesystemBackend::with_max_object_size(path, max_file_size.as_u64()).await?;
            backend.health_check().await?;
            tracing::info!(
                backend = backend.backend_name(),
                root = %path.display(),
                max_object_size = backend.max_object_size(),
                "object store ready"
            );
            Ok(Arc::new(backend))
        }
    }
}
