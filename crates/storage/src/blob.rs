//! Per-account blob layout on top of an [`ObjectStore`].
//!
//! Blobs live at `users/user_<account>/<uuid>[.<ext>]`. The generated name is
//! independent of the file's virtual path, so renames never touch storage.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ByteStream, ObjectStore};
use burrow_core::AccountId;
use bytes::Bytes;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Top-level prefix holding every account's blobs.
pub const USERS_PREFIX: &str = "users";

/// Longest extension carried into a blob key.
const MAX_EXTENSION_LEN: usize = 16;

/// Blob store that owns physical placement of file content.
#[derive(Clone)]
pub struct BlobStore {
    store: Arc<dyn ObjectStore>,
}

impl BlobStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Underlying object store.
    pub fn object_store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Prefix holding all blobs of `account_id`.
    pub fn account_prefix(account_id: AccountId) -> String {
        format!("{USERS_PREFIX}/user_{account_id}")
    }

    /// Generate a fresh key for a blob named `file_name` owned by `account_id`.
    ///
    /// The extension is kept when it is short and alphanumeric.
    pub fn new_key(account_id: AccountId, file_name: &str) -> String {
        let id = Uuid::new_v4();
        match burrow_core::path::extension(file_name)
            .filter(|ext| ext.len() <= MAX_EXTENSION_LEN)
            .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        {
            Some(ext) => format!(
                "{}/{id}.{}",
                Self::account_prefix(account_id),
                ext.to_ascii_lowercase()
            ),
            None => format!("{}/{id}", Self::account_prefix(account_id)),
        }
    }

    /// Write `data` as a new blob and return its key.
    ///
    /// The write is atomic; on failure nothing is left at the returned key.
    pub async fn write(
        &self,
        account_id: AccountId,
        file_name: &str,
        data: Bytes,
    ) -> StorageResult<String> {
        let key = Self::new_key(account_id, file_name);
        self.store.put(&key, data).await?;
        debug!(key = %key, "blob written");
        Ok(key)
    }

    /// Move an already-complete staged object into the account's blob space.
    pub async fn publish(
        &self,
        staged_key: &str,
        account_id: AccountId,
        file_name: &str,
    ) -> StorageResult<String> {
        let key = Self::new_key(account_id, file_name);
        self.store.rename(staged_key, &key).await?;
        debug!(from = %staged_key, key = %key, "staged blob published");
        Ok(key)
    }

    /// Stream a blob's content.
    pub async fn read(&self, key: &str) -> StorageResult<ByteStream> {
        self.store.get_stream(key).await
    }

    /// Size of a stored blob.
    pub async fn size(&self, key: &str) -> StorageResult<u64> {
        Ok(self.store.head(key).await?.size)
    }

    pub async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.store.exists(key).await
    }

    /// Delete a blob. Returns whether it existed.
    pub async fn delete(&self, key: &str) -> StorageResult<bool> {
        if !key.starts_with(USERS_PREFIX) {
            return Err(StorageError::InvalidKey(format!(
                "not a blob key: {key}"
            )));
        }
        let removed = self.store.delete(key).await?;
        debug!(key = %key, removed, "blob deleted");
        Ok(removed)
    }
}
