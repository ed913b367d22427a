use burrow_core::{ContentHash, FileId, FileKind, FileRecord, FileStatus};
use burrow_metadata::{AccountQuotaRow, AccountRepo, FileRow, SqliteStore};
use tempfile::TempDir;
use time::OffsetDateTime;

/// SQLite store in a temporary directory.
#[allow(dead_code)]
pub struct TestMetadata {
    pub dir: TempDir,
    pub store: SqliteStore,
}

#[allow(dead_code)]
impl TestMetadata {
    pub async fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let store = SqliteStore::new(dir.path().join("metadata.db"), 5)
            .await
            .expect("failed to open sqlite store");
        Self { dir, store }
    }

    /// Create an account with `total` bytes of quota.
    pub async fn with_account(self, account_id: i64, total: u64) -> Self {
        let row = AccountQuotaRow::new(account_id, total).expect("quota row");
        self.store
            .create_account_quota(&row)
            .await
            .expect("failed to create account");
        self
    }
}

/// Active file row at `path` holding `content`.
#[allow(dead_code)]
pub fn file_row(account_id: i64, path: &str, content: &[u8]) -> FileRow {
    let now = OffsetDateTime::now_utc();
    let name = burrow_core::path::file_name(path).to_string();
    let record = FileRecord {
        id: FileId::new(),
        owner_account_id: account_id,
        name,
        path: path.to_string(),
        kind: FileKind::File,
        blob_key: Some(format!("users/user_{account_id}/{}", FileId::new())),
        content_hash: ContentHash::compute(content),
        size_bytes: content.len() as u64,
        mime_type: None,
        status: FileStatus::Active,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };
    FileRow::try_from(&record).expect("file row")
}

/// Active folder row at `path`.
#[allow(dead_code)]
pub fn folder_row(account_id: i64, path: &str) -> FileRow {
    let mut row = file_row(account_id, path, b"");
    row.kind = FileKind::Folder.as_str().to_string();
    row.blob_key = None;
    row.content_hash = ContentHash::for_folder(path).to_hex();
    row
}
