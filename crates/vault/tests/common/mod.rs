pub mod fixtures;

use burrow_core::config::{AppConfig, LockScope};
use burrow_core::{AccountId, FileId, FileRecord};
use burrow_vault::{FileVault, UploadOutcome, UploadRequest};
use bytes::Bytes;
use futures::TryStreamExt;
use tempfile::TempDir;

pub const MB: u64 = 1024 * 1024;

/// A vault rooted in a temporary directory, built from the test config.
#[allow(dead_code)]
pub struct TestVault {
    pub dir: TempDir,
    pub config: AppConfig,
    pub vault: FileVault,
}

#[allow(dead_code)]
impl TestVault {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_scope(scope: LockScope) -> Self {
        Self::with_config(|c| c.locking.scope = scope).await
    }

    /// Build from the test config after `tweak` adjusts it.
    pub async fn with_config(tweak: impl FnOnce(&mut AppConfig)) -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let mut config = AppConfig::for_testing(dir.path());
        tweak(&mut config);
        let vault = FileVault::open(&config)
            .await
            .expect("failed to open vault");
        Self { dir, config, vault }
    }

    /// Create `account_id` with `total` bytes of quota.
    pub async fn account(&self, account_id: AccountId, total: u64) {
        self.vault
            .create_account(account_id, Some(total))
            .await
            .expect("failed to create account");
    }

    pub async fn put(
        &self,
        account_id: AccountId,
        directory: &str,
        name: &str,
        data: Bytes,
    ) -> UploadOutcome {
        self.vault
            .upload(account_id, request(directory, name, data))
            .await
            .expect("upload failed")
    }

    pub async fn read(&self, account_id: AccountId, file_id: FileId) -> Vec<u8> {
        let (_, stream) = self
            .vault
            .download(account_id, file_id)
            .await
            .expect("download failed");
        let parts: Vec<Bytes> = stream.try_collect().await.expect("read failed");
        parts.concat()
    }

    pub async fn used(&self, account_id: AccountId) -> u64 {
        self.vault
            .quota(account_id)
            .await
            .expect("quota lookup failed")
            .used_bytes
    }

    /// Regular files (not temp files) stored under the blob root.
    pub fn blob_files(&self) -> Vec<std::path::PathBuf> {
        self.files_under("storage/users")
    }

    pub fn staged_files(&self) -> Vec<std::path::PathBuf> {
        self.files_under("storage/staging")
    }

    fn files_under(&self, relative: &str) -> Vec<std::path::PathBuf> {
        let mut found = Vec::new();
        let mut stack = vec![self.dir.path().join(relative)];
        while let Some(dir) = stack.pop() {
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries {
                let entry = entry.expect("dir entry");
                if entry.file_type().expect("file type").is_dir() {
                    stack.push(entry.path());
                } else {
                    found.push(entry.path());
                }
            }
        }
        found.sort();
        found
    }

    /// Names of the active entries directly in `directory`, by name.
    pub async fn names(&self, account_id: AccountId, directory: &str) -> Vec<String> {
        self.vault
            .list_files(account_id, directory, "name-asc")
            .await
            .expect("listing failed")
            .into_iter()
            .map(|r: FileRecord| r.name)
            .collect()
    }
}

#[allow(dead_code)]
pub fn request(directory: &str, name: &str, data: Bytes) -> UploadRequest {
    UploadRequest {
        file_name: name.to_string(),
        directory: directory.to_string(),
        mime_type: None,
        data,
    }
}
