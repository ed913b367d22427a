//! Content-hash deduplication.
//!
//! Two lookups back an upload: whether the uploading account already holds
//! the content (the upload becomes a no-op), and whether any record anywhere
//! still points at a blob with that content (the new record shares it).

use crate::error::VaultResult;
use burrow_core::{AccountId, ContentHash, FileRecord};
use burrow_metadata::{FileRepo, MetadataStore};
use burrow_storage::BlobStore;
use std::sync::Arc;
use tracing::warn;

/// Lookup from content hash to existing records and blobs.
#[derive(Clone)]
pub struct DedupIndex {
    metadata: Arc<dyn MetadataStore>,
    blobs: BlobStore,
}

impl DedupIndex {
    pub fn new(metadata: Arc<dyn MetadataStore>, blobs: BlobStore) -> Self {
        Self { metadata, blobs }
    }

    /// Active file of `account_id` holding `hash`, if any.
    pub async fn find_active(
        &self,
        account_id: AccountId,
        hash: &ContentHash,
    ) -> VaultResult<Option<FileRecord>> {
        match self
            .metadata
            .find_active_by_hash_for_account(account_id, &hash.to_hex())
            .await?
        {
            Some(row) => Ok(Some(row.try_into()?)),
            None => Ok(None),
        }
    }

    /// Blob key of the most recent record holding `hash`, if its blob still
    /// exists.
    ///
    /// The caller must hold the hash lock until the new record referencing
    /// the key is saved.
    pub async fn find_reusable_blob(&self, hash: &ContentHash) -> VaultResult<Option<String>> {
        let Some(key) = self
            .metadata
            .find_file_by_hash(&hash.to_hex())
            .await?
            .and_then(|row| row.blob_key)
        else {
            return Ok(None);
        };
        if self.blobs.exists(&key).await? {
            Ok(Some(key))
        } else {
            warn!(key = %key, hash = %hash, "record references a missing blob; storing a fresh copy");
            Ok(None)
        }
    }
}
