//! Staging area for chunked uploads.
//!
//! Each upload owns the prefix `staging/<upload_id>/`. Chunks are stored as
//! `chunk-<index>` with a zero-padded index, and assembly streams them in
//! index order into `staging/<upload_id>/assembled`, hashing in the same pass.

use crate::error::StorageResult;
use crate::traits::ObjectStore;
use burrow_core::{ContentHash, UploadId};
use bytes::Bytes;
use futures::StreamExt;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Top-level prefix for staged upload data.
pub const STAGING_PREFIX: &str = "staging";

/// Result of assembling an upload's chunks.
#[derive(Clone, Debug)]
pub struct AssembledBlob {
    /// Staging key of the assembled object.
    pub key: String,
    pub size: u64,
    pub hash: ContentHash,
}

/// Chunk staging on top of an [`ObjectStore`].
#[derive(Clone)]
pub struct StagingArea {
    store: Arc<dyn ObjectStore>,
}

impl StagingArea {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub fn upload_prefix(upload_id: &UploadId) -> String {
        format!("{STAGING_PREFIX}/{upload_id}")
    }

    pub fn chunk_key(upload_id: &UploadId, index: u32) -> String {
        format!("{}/chunk-{index:08}", Self::upload_prefix(upload_id))
    }

    pub fn assembled_key(upload_id: &UploadId) -> String {
        format!("{}/assembled", Self::upload_prefix(upload_id))
    }

    /// Persist one chunk atomically.
    pub async fn write_chunk(
        &self,
        upload_id: &UploadId,
        index: u32,
        data: Bytes,
    ) -> StorageResult<()> {
        self.store
            .put(&Self::chunk_key(upload_id, index), data)
            .await
    }

    /// Concatenate chunks `0..total_chunks` into one staged object.
    ///
    /// Chunks are streamed, so memory use is bounded by the backend's read
    /// size rather than the upload size. A missing chunk fails with
    /// `NotFound` and leaves no assembled object behind.
    #[instrument(skip(self), fields(upload_id = %upload_id))]
    pub async fn assemble(
        &self,
        upload_id: &UploadId,
        total_chunks: u32,
    ) -> StorageResult<AssembledBlob> {
        let key = Self::assembled_key(upload_id);
        let mut upload = self.store.put_stream(&key).await?;
        let mut hasher = ContentHash::hasher();

        for index in 0..total_chunks {
            let chunk_key = Self::chunk_key(upload_id, index);
            let mut parts = match self.store.get_stream(&chunk_key).await {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = upload.abort().await;
                    return Err(e);
                }
            };
            while let Some(part) = parts.next().await {
                let written = match part {
                    Ok(bytes) => {
                        hasher.update(&bytes);
                        upload.write(bytes).await
                    }
                    Err(e) => Err(e),
                };
                if let Err(e) = written {
                    let _ = upload.abort().await;
                    return Err(e);
                }
            }
        }

        let size = upload.finish().await?;
        let hash = hasher.finalize();
        debug!(size, hash = %hash, "chunks assembled");
        Ok(AssembledBlob { key, size, hash })
    }

    /// Remove everything staged for an upload. Returns whether anything existed.
    pub async fn purge(&self, upload_id: &UploadId) -> StorageResult<bool> {
        self.store.delete_prefix(&Self::upload_prefix(upload_id)).await
    }

    /// Upload ids that currently have data in the staging area.
    ///
    /// Entries whose directory name is not an upload id are reported and
    /// skipped.
    pub async fn staged_upload_ids(&self) -> StorageResult<BTreeSet<UploadId>> {
        let mut ids = BTreeSet::new();
        for key in self.store.list(STAGING_PREFIX).await? {
            let Some(name) = key
                .strip_prefix(STAGING_PREFIX)
                .and_then(|rest| rest.trim_start_matches('/').split('/').next())
            else {
                continue;
            };
            match UploadId::parse(name) {
                Ok(id) => {
                    ids.insert(id);
                }
                Err(_) => warn!(key = %key, "unexpected entry in staging area"),
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FilesystemBackend;
    use crate::error::StorageError;

    async fn staging(max: u64) -> (tempfile::TempDir, StagingArea) {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::with_max_object_size(dir.path(), max)
            .await
            .unwrap();
        (dir, StagingArea::new(Arc::new(backend)))
    }

    #[test]
    fn test_chunk_keys_sort_by_index() {
        let id = UploadId::new();
        let mut keys: Vec<String> = [10, 2, 0, 1]
            .into_iter()
            .map(|i| StagingArea::chunk_key(&id, i))
            .collect();
        keys.sort();
        assert!(keys[0].ends_with("chunk-00000000"));
        assert!(keys[3].ends_with("chunk-00000010"));
    }

    #[tokio::test]
    async fn test_assemble_in_index_order_regardless_of_write_order() {
        let (_dir, staging) = staging(1024).await;
        let id = UploadId::new();

        staging.write_chunk(&id, 2, Bytes::from_static(b"ccc")).await.unwrap();
        staging.write_chunk(&id, 0, Bytes::from_static(b"aaa")).await.unwrap();
        staging.write_chunk(&id, 1, Bytes::from_static(b"bbb")).await.unwrap();

        let assembled = staging.assemble(&id, 3).await.unwrap();
        assert_eq!(assembled.size, 9);
        assert_eq!(assembled.hash, ContentHash::compute(b"aaabbbccc"));
        assert_eq!(
            staging.store.get(&assembled.key).await.unwrap(),
            Bytes::from_static(b"aaabbbccc")
        );
    }

    #[tokio::test]
    async fn test_assemble_missing_chunk_leaves_no_output() {
        let (_dir, staging) = staging(1024).await;
        let id = UploadId::new();
        staging.write_chunk(&id, 0, Bytes::from_static(b"aaa")).await.unwrap();

        assert!(matches!(
            staging.assemble(&id, 2).await,
            Err(StorageError::NotFound(_))
        ));
        assert!(
            !staging
                .store
                .exists(&StagingArea::assembled_key(&id))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_assemble_respects_size_limit() {
        let (_dir, staging) = staging(5).await;
        let id = UploadId::new();
        staging.write_chunk(&id, 0, Bytes::from_static(b"aaa")).await.unwrap();
        staging.write_chunk(&id, 1, Bytes::from_static(b"bbb")).await.unwrap();

        assert!(matches!(
            staging.assemble(&id, 2).await,
            Err(StorageError::ObjectTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_purge_and_staged_ids() {
        let (_dir, staging) = staging(1024).await;
        let a = UploadId::new();
        let b = UploadId::new();
        staging.write_chunk(&a, 0, Bytes::from_static(b"a")).await.unwrap();
        staging.write_chunk(&a, 1, Bytes::from_static(b"a")).await.unwrap();
        staging.write_chunk(&b, 0, Bytes::from_static(b"b")).await.unwrap();

        let ids = staging.staged_upload_ids().await.unwrap();
        assert_eq!(ids, BTreeSet::from([a, b]));

        assert!(staging.purge(&a).await.unwrap());
        assert!(!staging.purge(&a).await.unwrap());
        assert_eq!(staging.staged_upload_ids().await.unwrap(), BTreeSet::from([b]));
    }

    #[tokio::test]
    async fn test_staged_ids_empty_when_nothing_staged() {
        let (_dir, staging) = staging(1024).await;
        assert!(staging.staged_upload_ids().await.unwrap().is_empty());
    }
}
