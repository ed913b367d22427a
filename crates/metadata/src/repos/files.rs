//! File and folder record repository.

use crate::error::MetadataResult;
use crate::models::FileRow;
use async_trait::async_trait;
use uuid::Uuid;

/// Repository for file and folder records.
///
/// Paths are full virtual paths (`/docs/a.txt`). Descendant queries match on
/// the `<folder>/` prefix, never on substrings.
#[async_trait]
pub trait FileRepo: Send + Sync {
    /// Insert a new record.
    async fn save_file(&self, row: &FileRow) -> MetadataResult<()>;

    /// Get a record by ID.
    async fn get_file(&self, file_id: Uuid) -> MetadataResult<Option<FileRow>>;

    /// Persist status and timestamp changes of an existing record.
    async fn update_file_status(&self, row: &FileRow) -> MetadataResult<()>;

    /// Rename a record to `row.name`/`row.path`.
    ///
    /// For folders the descendants under `previous_path` are moved along in
    /// the same transaction. Returns the number of descendants rewritten.
    async fn rename_file(&self, row: &FileRow, previous_path: &str) -> MetadataResult<u64>;

    /// Most recently created file (not folder) with this content hash, any
    /// account and any status.
    async fn find_file_by_hash(&self, content_hash: &str) -> MetadataResult<Option<FileRow>>;

    /// Active file of `account_id` with this content hash.
    async fn find_active_by_hash_for_account(
        &self,
        account_id: i64,
        content_hash: &str,
    ) -> MetadataResult<Option<FileRow>>;

    /// Active record of `account_id` at exactly `path`.
    async fn find_active_by_path(
        &self,
        account_id: i64,
        path: &str,
    ) -> MetadataResult<Option<FileRow>>;

    /// All records of an account with the given status.
    ///
    /// Deleted records come back most recently deleted first, active ones by
    /// path.
    async fn find_files_by_account_and_status(
        &self,
        account_id: i64,
        status: &str,
    ) -> MetadataResult<Vec<FileRow>>;

    /// Delete a record. Fails with `NotFound` if it does not exist.
    async fn delete_file_record(&self, file_id: Uuid) -> MetadataResult<()>;

    /// Whether any record of another account carries this content hash.
    async fn exists_hash_outside_account(
        &self,
        content_hash: &str,
        account_id: i64,
    ) -> MetadataResult<bool>;

    /// Number of records, other than `excluding`, pointing at `blob_key`.
    async fn count_blob_references(&self, blob_key: &str, excluding: Uuid) -> MetadataResult<u64>;

    /// Number of records of any status below the folder at `folder_path`.
    async fn count_descendants(&self, account_id: i64, folder_path: &str) -> MetadataResult<u64>;

    /// Number of records of any status owned by an account.
    async fn count_files_for_account(&self, account_id: i64) -> MetadataResult<u64>;
}

