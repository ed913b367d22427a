//! File lifecycle: upload, download, listing, folders, rename, trash and
//! permanent deletion.
//!
//! Every mutation holds the account lock for its whole duration. Steps that
//! share or free a blob also hold the lock for the content hash.

use crate::error::{VaultError, VaultResult};
use crate::vault::{resolve_mime, FileVault};
use burrow_core::{
    path, AccountId, ContentHash, FileId, FileKind, FileRecord, FileStatus, SortSpec,
};
use burrow_metadata::{FileRepo, FileRow};
use burrow_storage::{AssembledBlob, ByteStream, StorageError};
use bytes::Bytes;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};

/// A whole-file upload.
#[derive(Clone, Debug)]
pub struct UploadRequest {
    pub file_name: String,
    /// Target directory; empty means the root.
    pub directory: String,
    /// Declared MIME type. Guessed from the extension when absent.
    pub mime_type: Option<String>,
    pub data: Bytes,
}

/// Result of storing content.
#[derive(Clone, Debug, Serialize)]
pub struct UploadOutcome {
    pub file: FileRecord,
    /// True if the account already held identical content and nothing new
    /// was stored or charged.
    pub duplicate: bool,
}

/// Content ready to be committed.
pub(crate) enum Payload {
    Inline(Bytes),
    Staged(AssembledBlob),
}

impl Payload {
    fn size(&self) -> u64 {
        match self {
            Self::Inline(data) => data.len() as u64,
            Self::Staged(blob) => blob.size,
        }
    }
}

/// A file about to become a record.
pub(crate) struct NewFile {
    pub(crate) account_id: AccountId,
    pub(crate) name: String,
    pub(crate) directory: String,
    pub(crate) mime_type: String,
    pub(crate) hash: ContentHash,
    pub(crate) payload: Payload,
}

/// Side effects of a commit that must be undone if a later step fails.
#[derive(Default)]
struct CommitArtifacts {
    written_blob: Option<String>,
    saved_record: Option<FileId>,
}

impl CommitArtifacts {
    /// Best-effort removal of everything created so far.
    async fn rollback(self, vault: &FileVault) {
        if let Some(file_id) = self.saved_record {
            if let Err(e) = vault.metadata.delete_file_record(*file_id.as_uuid()).await {
                warn!(file_id = %file_id, error = %e, "failed to remove record during rollback");
            }
        }
        if let Some(key) = self.written_blob {
            if let Err(e) = vault.blobs.delete(&key).await {
                warn!(key = %key, error = %e, "failed to remove blob during rollback");
            }
        }
    }
}

impl FileVault {
    /// Store a whole file in `request.directory`.
    ///
    /// Re-uploading content the account already holds returns the existing
    /// record flagged as a duplicate.
    #[instrument(
        skip(self, request),
        fields(file_name = %request.file_name, size = request.data.len())
    )]
    pub async fn upload(
        &self,
        account_id: AccountId,
        request: UploadRequest,
    ) -> VaultResult<UploadOutcome> {
        let name = path::sanitize_name(&request.file_name)?;
        let directory = path::normalize_dir(&request.directory)?;
        self.check_file_size(request.data.len() as u64)?;

        let hash = ContentHash::hash_reader(request.data.as_ref())
            .await
            .map_err(StorageError::Io)?;
        let mime_type = resolve_mime(&name, request.mime_type);

        let _guard = self.locks.lock_account(account_id).await;
        self.commit_file(NewFile {
            account_id,
            name,
            directory,
            mime_type,
            hash,
            payload: Payload::Inline(request.data),
        })
        .await
    }

    /// Upload several files in order, stopping at the first failure.
    ///
    /// Files stored before the failure stay stored.
    pub async fn upload_many(
        &self,
        account_id: AccountId,
        requests: Vec<UploadRequest>,
    ) -> VaultResult<Vec<UploadOutcome>> {
        let mut outcomes = Vec::with_capacity(requests.len());
        for request in requests {
            outcomes.push(self.upload(account_id, request).await?);
        }
        Ok(outcomes)
    }

    /// Turn verified content into a record, charging quota for it.
    ///
    /// The caller must hold the account lock.
    pub(crate) async fn commit_file(&self, file: NewFile) -> VaultResult<UploadOutcome> {
        let account_id = file.account_id;
        let size = file.payload.size();
        let path = path::join(&file.directory, &file.name);

        self.ledger.usage(account_id).await?;
        self.require_directory(account_id, &file.directory).await?;

        if let Some(existing) = self.dedup.find_active(account_id, &file.hash).await? {
            info!(file_id = %existing.id, path = %existing.path, "duplicate upload");
            return Ok(UploadOutcome {
                file: existing,
                duplicate: true,
            });
        }

        self.ensure_path_free(account_id, &path, FileKind::File, None)
            .await?;
        self.ledger.ensure_headroom(account_id, size).await?;

        let _hash_guard = self.locks.lock_hash(file.hash).await;
        let mut artifacts = CommitArtifacts::default();
        let blob_key = match self.dedup.find_reusable_blob(&file.hash).await? {
            Some(key) => {
                debug!(key = %key, "reusing stored blob");
                key
            }
            None => {
                let key = match file.payload {
                    Payload::Inline(data) => self.blobs.write(account_id, &file.name, data).await?,
                    Payload::Staged(blob) => {
                        self.blobs
                            .publish(&blob.key, account_id, &file.name)
                            .await?
                    }
                };
                artifacts.written_blob = Some(key.clone());
                key
            }
        };

        let now = OffsetDateTime::now_utc();
        let record = FileRecord {
            id: FileId::new(),
            owner_account_id: account_id,
            name: file.name,
            path,
            kind: FileKind::File,
            blob_key: Some(blob_key),
            content_hash: file.hash,
            size_bytes: size,
            mime_type: Some(file.mime_type),
            status: FileStatus::Active,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        if let Err(e) = self.save_record(&record).await {
            artifacts.rollback(self).await;
            return Err(e);
        }
        artifacts.saved_record = Some(record.id);

        if let Err(e) = self.ledger.reserve(account_id, size).await {
            artifacts.rollback(self).await;
            return Err(e);
        }

        info!(file_id = %record.id, path = %record.path, size, "file stored");
        Ok(UploadOutcome {
            file: record,
            duplicate: false,
        })
    }

    /// Stream the content of an active file.
    pub async fn download(
        &self,
        account_id: AccountId,
        file_id: FileId,
    ) -> VaultResult<(FileRecord, ByteStream)> {
        let record = self.load_owned(account_id, file_id).await?;
        if !record.is_active() {
            return Err(VaultError::NotFound(format!("file {file_id} is in the trash")));
        }
        let key = record
            .blob_key
            .as_deref()
            .ok_or_else(|| VaultError::InvalidArgument(format!("{} is a folder", record.path)))?;
        let stream = self.blobs.read(key).await?;
        Ok((record, stream))
    }

    /// A record owned by `account_id`, in any status.
    pub async fn get_file(&self, account_id: AccountId, file_id: FileId) -> VaultResult<FileRecord> {
        self.load_owned(account_id, file_id).await
    }

    /// Active entries directly inside `directory`, ordered by `sort`.
    ///
    /// `sort` is `"<name|created_at|size>-<asc|desc>"`.
    pub async fn list_files(
        &self,
        account_id: AccountId,
        directory: &str,
        sort: &str,
    ) -> VaultResult<Vec<FileRecord>> {
        let sort: SortSpec = sort.parse()?;
        let directory = path::normalize_dir(directory)?;
        self.ledger.usage(account_id).await?;
        self.require_directory(account_id, &directory).await?;

        let mut records = self
            .records_with_status(account_id, FileStatus::Active)
            .await?
            .into_iter()
            .filter(|r| r.directory() == directory)
            .collect::<Vec<_>>();
        sort.sort(&mut records);
        Ok(records)
    }

    /// Trashed entries of an account, most recently deleted first.
    pub async fn list_trash(&self, account_id: AccountId) -> VaultResult<Vec<FileRecord>> {
        self.ledger.usage(account_id).await?;
        self.records_with_status(account_id, FileStatus::Deleted)
            .await
    }

    /// Create an empty folder `name` inside `parent`.
    #[instrument(skip(self))]
    pub async fn create_folder(
        &self,
        account_id: AccountId,
        parent: &str,
        name: &str,
    ) -> VaultResult<FileRecord> {
        let name = path::sanitize_name(name)?;
        let parent = path::normalize_dir(parent)?;

        let _guard = self.locks.lock_account(account_id).await;
        self.ledger.usage(account_id).await?;
        self.require_directory(account_id, &parent).await?;

        let path = path::join(&parent, &name);
        self.ensure_path_free(account_id, &path, FileKind::Folder, None)
            .await?;

        let now = OffsetDateTime::now_utc();
        let record = FileRecord {
            id: FileId::new(),
            owner_account_id: account_id,
            content_hash: ContentHash::for_folder(&path),
            name,
            path,
            kind: FileKind::Folder,
            blob_key: None,
            size_bytes: 0,
            mime_type: None,
            status: FileStatus::Active,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.save_record(&record).await?;
        info!(file_id = %record.id, path = %record.path, "folder created");
        Ok(record)
    }

    /// Give an active entry a new name in the same directory.
    ///
    /// Renaming a folder moves everything beneath it.
    #[instrument(skip(self))]
    pub async fn rename(
        &self,
        account_id: AccountId,
        file_id: FileId,
        new_name: &str,
    ) -> VaultResult<FileRecord> {
        let new_name = path::sanitize_name(new_name)?;

        let _guard = self.locks.lock_account(account_id).await;
        let mut record = self.load_owned(account_id, file_id).await?;
        if !record.is_active() {
            return Err(VaultError::InvalidArgument(format!(
                "{} is in the trash",
                record.path
            )));
        }

        let new_path = path::with_file_name(&record.path, &new_name);
        if new_path == record.path {
            return Ok(record);
        }
        self.ensure_path_free(account_id, &new_path, record.kind, Some(record.id))
            .await?;

        let old_path = std::mem::replace(&mut record.path, new_path);
        record.name = new_name;
        record.updated_at = OffsetDateTime::now_utc();
        let moved = self
            .metadata
            .rename_file(&FileRow::try_from(&record)?, &old_path)
            .await?;

        info!(from = %old_path, to = %record.path, moved, "renamed");
        Ok(record)
    }

    /// Move an active entry to the trash. Its size stays charged.
    #[instrument(skip(self))]
    pub async fn soft_delete(
        &self,
        account_id: AccountId,
        file_id: FileId,
    ) -> VaultResult<FileRecord> {
        let _guard = self.locks.lock_account(account_id).await;
        let mut record = self.load_owned(account_id, file_id).await?;
        if !record.is_active() {
            return Err(VaultError::InvalidArgument(format!(
                "{} is already in the trash",
                record.path
            )));
        }

        record.status = FileStatus::Deleted;
        record.deleted_at = Some(OffsetDateTime::now_utc());
        self.metadata
            .update_file_status(&FileRow::try_from(&record)?)
            .await?;
        info!(path = %record.path, "moved to trash");
        Ok(record)
    }

    /// Bring a trashed entry back to its original path.
    ///
    /// Fails with `NotFound` if its directory no longer exists and with
    /// `PathExists` if the path is now taken.
    #[instrument(skip(self))]
    pub async fn restore(&self, account_id: AccountId, file_id: FileId) -> VaultResult<FileRecord> {
        let _guard = self.locks.lock_account(account_id).await;
        let mut record = self.load_owned(account_id, file_id).await?;
        if record.is_active() {
            return Err(VaultError::InvalidArgument(format!(
                "{} is not in the trash",
                record.path
            )));
        }
        self.require_directory(account_id, record.directory())
            .await?;
        self.ensure_path_free(account_id, &record.path, record.kind, None)
            .await?;

        record.status = FileStatus::Active;
        record.deleted_at = None;
        self.metadata
            .update_file_status(&FileRow::try_from(&record)?)
            .await?;
        info!(path = %record.path, "restored from trash");
        Ok(record)
    }

    /// Remove a record for good, returning its quota.
    ///
    /// The blob is deleted only once no other record references it. A folder
    /// must have no entries beneath it, in any status.
    #[instrument(skip(self))]
    pub async fn purge(&self, account_id: AccountId, file_id: FileId) -> VaultResult<FileRecord> {
        let _guard = self.locks.lock_account(account_id).await;
        let record = self.load_owned(account_id, file_id).await?;
        if record.is_folder() {
            let children = self
                .metadata
                .count_descendants(account_id, &record.path)
                .await?;
            if children > 0 {
                return Err(VaultError::FolderNotEmpty(record.path));
            }
        }

        let _hash_guard = self.locks.lock_hash(record.content_hash).await;
        // Counted before anything changes; the hash lock keeps it stable.
        let shared_blob = match record.blob_key.as_deref() {
            Some(key) => {
                let references = self
                    .metadata
                    .count_blob_references(key, *record.id.as_uuid())
                    .await?;
                Some((key, references))
            }
            None => None,
        };

        self.metadata
            .delete_file_record(*record.id.as_uuid())
            .await?;

        if record.size_bytes > 0 {
            if let Err(e) = self.ledger.release(account_id, record.size_bytes).await {
                if let Err(restore) = self.save_record(&record).await {
                    warn!(file_id = %record.id, error = %restore, "failed to restore record after quota release failure");
                }
                return Err(e);
            }
        }

        match shared_blob {
            Some((key, 0)) => {
                // The record is already gone; a leftover blob is only a leak.
                if let Err(e) = self.blobs.delete(key).await {
                    warn!(key = %key, error = %e, "failed to delete unreferenced blob");
                }
            }
            Some((key, references)) => debug!(key = %key, references, "blob still referenced"),
            None => {}
        }

        info!(path = %record.path, size = record.size_bytes, "purged");
        Ok(record)
    }

    async fn save_record(&self, record: &FileRecord) -> VaultResult<()> {
        self.metadata.save_file(&FileRow::try_from(record)?).await?;
        Ok(())
    }

    async fn records_with_status(
        &self,
        account_id: AccountId,
        status: FileStatus,
    ) -> VaultResult<Vec<FileRecord>> {
        self.metadata
            .find_files_by_account_and_status(account_id, status.as_str())
            .await?
            .into_iter()
            .map(|row| FileRecord::try_from(row).map_err(VaultError::from))
            .collect()
    }
}
