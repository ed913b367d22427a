//! The file vault: shared state and account management.
//!
//! File lifecycle operations live in [`crate::lifecycle`] and chunked uploads
//! in [`crate::chunked`]; both are `impl FileVault` blocks over the state
//! defined here.

use crate::dedup::DedupIndex;
use crate::error::{VaultError, VaultResult};
use crate::ledger::QuotaLedger;
use crate::locks::MutationLocks;
use crate::reaper::{SessionReaper, SweepStats};
use crate::sessions::{MemorySessionStore, SessionStore};
use burrow_core::config::{AppConfig, UploadConfig};
use burrow_core::{path, AccountId, FileId, FileKind, FileRecord, QuotaUsage};
use burrow_metadata::{AccountQuotaRow, AccountRepo, FileRepo, MetadataError, MetadataStore};
use burrow_storage::{BlobStore, ObjectStore, StagingArea};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Quota state of an account as reported to callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct AccountQuota {
    pub account_id: AccountId,
    pub used_bytes: u64,
    pub total_bytes: u64,
    pub available_bytes: u64,
}

impl AccountQuota {
    fn new(account_id: AccountId, usage: QuotaUsage) -> Self {
        Self {
            account_id,
            used_bytes: usage.used,
            total_bytes: usage.total,
            available_bytes: usage.available(),
        }
    }
}

/// Per-account virtual file storage.
///
/// Cheap to clone; clones share every store, lock table and session.
#[derive(Clone)]
pub struct FileVault {
    pub(crate) metadata: Arc<dyn MetadataStore>,
    pub(crate) blobs: BlobStore,
    pub(crate) staging: StagingArea,
    pub(crate) ledger: QuotaLedger,
    pub(crate) dedup: DedupIndex,
    pub(crate) locks: Arc<MutationLocks>,
    pub(crate) sessions: Arc<dyn SessionStore>,
    pub(crate) reaper: Arc<SessionReaper>,
    pub(crate) uploads: UploadConfig,
    pub(crate) max_file_size: u64,
    default_quota: u64,
}

impl FileVault {
    /// Assemble a vault over already-built stores.
    pub fn new(
        config: &AppConfig,
        storage: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        let blobs = BlobStore::new(storage.clone());
        let staging = StagingArea::new(storage);
        Self {
            ledger: QuotaLedger::new(metadata.clone()),
            dedup: DedupIndex::new(metadata.clone(), blobs.clone()),
            locks: Arc::new(MutationLocks::new(config.locking.scope)),
            reaper: Arc::new(SessionReaper::new(sessions.clone(), staging.clone())),
            metadata,
            blobs,
            staging,
            sessions,
            uploads: config.uploads.clone(),
            max_file_size: config.storage.max_file_size(),
            default_quota: config.quota.default_total.as_u64(),
        }
    }

    /// Validate `config` and open the stores it names.
    ///
    /// Upload sessions are held in memory.
    pub async fn open(config: &AppConfig) -> VaultResult<Self> {
        config.validate().map_err(VaultError::InvalidArgument)?;
        let storage = burrow_storage::from_config(&config.storage).await?;
        let metadata = burrow_metadata::from_config(&config.metadata).await?;
        info!(
            lock_scope = ?config.locking.scope,
            max_file_size = config.storage.max_file_size(),
            "file vault opened"
        );
        Ok(Self::new(
            config,
            storage,
            metadata,
            Arc::new(MemorySessionStore::new()),
        ))
    }

    /// Start the background upload reaper, if enabled in configuration.
    pub fn spawn_reaper(&self) -> Option<tokio::task::JoinHandle<()>> {
        if !self.uploads.reaper_enabled {
            return None;
        }
        let interval = self.uploads.reaper_interval();
        info!(interval_secs = interval.as_secs(), "starting upload reaper");
        Some(self.reaper.clone().spawn(interval))
    }

    /// Run one reaper sweep now.
    pub async fn sweep_uploads(&self) -> VaultResult<SweepStats> {
        self.reaper.sweep().await
    }

    /// Create quota for a new account. `total` defaults to the configured
    /// per-account capacity.
    #[instrument(skip(self))]
    pub async fn create_account(
        &self,
        account_id: AccountId,
        total: Option<u64>,
    ) -> VaultResult<AccountQuota> {
        let _guard = self.locks.lock_account(account_id).await;
        let total = total.unwrap_or(self.default_quota);
        let row = AccountQuotaRow::new(account_id, total)?;
        match self.metadata.create_account_quota(&row).await {
            Ok(()) => {}
            Err(MetadataError::AlreadyExists(_)) => {
                return Err(VaultError::AccountExists(account_id));
            }
            Err(e) => return Err(e.into()),
        }
        info!(account_id, total, "account created");
        Ok(AccountQuota::new(account_id, row.usage()?))
    }

    /// Current quota of an account.
    pub async fn quota(&self, account_id: AccountId) -> VaultResult<AccountQuota> {
        let usage = self.ledger.usage(account_id).await?;
        Ok(AccountQuota::new(account_id, usage))
    }

    /// Remove an account that holds no records. Its pending uploads are
    /// discarded.
    #[instrument(skip(self))]
    pub async fn close_account(&self, account_id: AccountId) -> VaultResult<()> {
        let _guard = self.locks.lock_account(account_id).await;
        self.ledger.usage(account_id).await?;

        let remaining = self.metadata.count_files_for_account(account_id).await?;
        if remaining > 0 {
            return Err(VaultError::InvalidArgument(format!(
                "account {account_id} still holds {remaining} records"
            )));
        }

        for id in self.sessions.live_ids().await? {
            let owned = self
                .sessions
                .get(&id)
                .await?
                .is_some_and(|s| s.account_id == account_id);
            if owned && self.sessions.remove(&id).await?.is_some() {
                if let Err(e) = self.staging.purge(&id).await {
                    warn!(upload_id = %id, error = %e, "failed to purge staging of closed account");
                }
            }
        }

        self.metadata.delete_account_quota(account_id).await?;
        info!(account_id, "account closed");
        Ok(())
    }

    /// Load a record and check that `account_id` owns it.
    pub(crate) async fn load_owned(
        &self,
        account_id: AccountId,
        file_id: FileId,
    ) -> VaultResult<FileRecord> {
        let row = self
            .metadata
            .get_file(*file_id.as_uuid())
            .await?
            .ok_or_else(|| VaultError::NotFound(format!("file {file_id}")))?;
        let record = FileRecord::try_from(row)?;
        if record.owner_account_id != account_id {
            return Err(VaultError::Forbidden(format!(
                "file {file_id} belongs to another account"
            )));
        }
        Ok(record)
    }

    /// Fail with `NotFound` unless `directory` is the root or an active
    /// folder of the account.
    pub(crate) async fn require_directory(
        &self,
        account_id: AccountId,
        directory: &str,
    ) -> VaultResult<()> {
        if directory == path::ROOT {
            return Ok(());
        }
        match self.metadata.find_active_by_path(account_id, directory).await? {
            Some(row) if row.kind == FileKind::Folder.as_str() => Ok(()),
            _ => Err(VaultError::NotFound(format!("directory {directory}"))),
        }
    }

    /// Fail with `PathExists` if an active record at `path` clashes with a
    /// new entry of `kind`.
    ///
    /// Files may share a path with other files; a folder may share its path
    /// with nothing.
    pub(crate) async fn ensure_path_free(
        &self,
        account_id: AccountId,
        path: &str,
        kind: FileKind,
        ignore: Option<FileId>,
    ) -> VaultResult<()> {
        let Some(existing) = self.metadata.find_active_by_path(account_id, path).await? else {
            return Ok(());
        };
        if ignore.is_some_and(|id| *id.as_uuid() == existing.file_id) {
            return Ok(());
        }
        if kind == FileKind::Folder || existing.kind == FileKind::Folder.as_str() {
            return Err(VaultError::PathExists(path.to_string()));
        }
        Ok(())
    }

    pub(crate) fn check_file_size(&self, size: u64) -> VaultResult<()> {
        if size == 0 {
            return Err(VaultError::FileEmpty);
        }
        if size > self.max_file_size {
            return Err(VaultError::FileTooLarge {
                size,
                max: self.max_file_size,
            });
        }
        Ok(())
    }
}

/// MIME type for a stored file: the declared type if given, else a guess
/// from the name's extension.
pub(crate) fn resolve_mime(file_name: &str, declared: Option<String>) -> String {
    declared
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| {
            mime_guess::from_path(file_name)
                .first_or_octet_stream()
                .to_string()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_mime() {
        assert_eq!(resolve_mime("a.png", None), "image/png");
        assert_eq!(resolve_mime("a.unknownext", None), "application/octet-stream");
        assert_eq!(resolve_mime("noext", Some("  ".into())), "application/octet-stream");
        assert_eq!(
            resolve_mime("a.png", Some("application/x-custom".into())),
            "application/x-custom"
        );
    }
}
