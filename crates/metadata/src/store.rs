//! Metadata store trait and implementations.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{AccountRepo, FileRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Path value selecting a throwaway in-memory database.
pub const IN_MEMORY: &str = ":memory:";

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: AccountRepo + FileRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and migrate it.
    pub async fn new(path: impl AsRef<Path>, busy_timeout_secs: u64) -> MetadataResult<Self> {
        let path = path.as_ref();
        let in_memory = path.as_os_str() == IN_MEMORY;

        let opts = if in_memory {
            SqliteConnectOptions::from_str("sqlite::memory:")?
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
                .create_if_missing(true)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        };
        let opts = opts
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(busy_timeout_secs));

        let mut pool_opts = SqlitePoolOptions::new()
            // One writer at a time; more connections only trade for "database is locked".
            .max_connections(1);
        if in_memory {
            // Each connection to :memory: is a separate database.
            pool_opts = pool_opts.idle_timeout(None).max_lifetime(None);
        }
        let pool = pool_opts.connect_with(opts).await?;

        let store = Self { pool };
        store.migrate().await?;
        tracing::debug!(path = %path.display(), "sqlite metadata store ready");
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;

        let columns: Vec<(i32, String, String, i32, Option<String>, i32)> =
            sqlx::query_as("PRAGMA table_info(account_quotas)")
                .fetch_all(&self.pool)
                .await?;
        if !columns.iter().any(|(_, name, _, _, _, _)| name == "version") {
            return Err(MetadataError::Internal(
                "Incompatible database schema detected: account_quotas has no version column. \
                 Delete the database file to create a fresh schema."
                    .to_string(),
            ));
        }

        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// `<path>/` and its length in characters, as SQLite's `substr` counts them.
fn descendant_prefix(path: &str) -> (String, i64) {
    let prefix = format!("{}/", path.trim_end_matches('/'));
    let len = prefix.chars().count() as i64;
    (prefix, len)
}

mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use time::OffsetDateTime;
    use uuid::Uuid;

    #[async_trait]
    impl AccountRepo for SqliteStore {
        async fn create_account_quota(&self, row: &AccountQuotaRow) -> MetadataResult<()> {
            let result = sqlx::query(
                "INSERT INTO account_quotas (account_id, used_bytes, total_bytes, version, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(row.account_id)
            .bind(row.used_bytes)
            .bind(row.total_bytes)
            .bind(row.version)
            .bind(row.created_at)
            .bind(row.updated_at)
            .execute(&self.pool)
            .await;

            match result {
                Ok(_) => Ok(()),
                Err(e) if is_unique_violation(&e) => Err(MetadataError::AlreadyExists(format!(
                    "account {} already has a quota",
                    row.account_id
                ))),
                Err(e) => Err(e.into()),
            }
        }

        async fn get_account_quota(
            &self,
            account_id: i64,
        ) -> MetadataResult<Option<AccountQuotaRow>> {
            let row = sqlx::query_as::<_, AccountQuotaRow>(
                "SELECT * FROM account_quotas WHERE account_id = ?",
            )
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn update_account_quota(
            &self,
            account_id: i64,
            used_bytes: i64,
            expected_version: i64,
            updated_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            let result = sqlx::query(
                "UPDATE account_quotas SET used_bytes = ?, version = version + 1, updated_at = ? \
                 WHERE account_id = ? AND version = ?",
            )
            .bind(used_bytes)
            .bind(updated_at)
            .bind(account_id)
            .bind(expected_version)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                return match self.get_account_quota(account_id).await? {
                    Some(current) => Err(MetadataError::Conflict(format!(
                        "account {account_id} quota changed (expected version {expected_version}, found {})",
                        current.version
                    ))),
                    None => Err(MetadataError::NotFound(format!(
                        "account {account_id} has no quota"
                    ))),
                };
            }
            Ok(())
        }

        async fn delete_account_quota(&self, account_id: i64) -> MetadataResult<()> {
            let result = sqlx::query("DELETE FROM account_quotas WHERE account_id = ?")
                .bind(account_id)
                .execute(&self.pool)
                .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!(
                    "account {account_id} has no quota"
                )));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl FileRepo for SqliteStore {
        async fn save_file(&self, row: &FileRow) -> MetadataResult<()> {
            let result = sqlx::query(
                "INSERT INTO files (file_id, owner_account_id, name, path, kind, blob_key, content_hash, \
                 size_bytes, mime_type, status, created_at, updated_at, deleted_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(row.file_id)
            .bind(row.owner_account_id)
            .bind(&row.name)
            .bind(&row.path)
            .bind(&row.kind)
            .bind(&row.blob_key)
            .bind(&row.content_hash)
            .bind(row.size_bytes)
            .bind(&row.mime_type)
            .bind(&row.status)
            .bind(row.created_at)
            .bind(row.updated_at)
            .bind(row.deleted_at)
            .execute(&self.pool)
            .await;

            match result {
                Ok(_) => Ok(()),
                Err(e) if is_unique_violation(&e) => Err(MetadataError::AlreadyExists(format!(
                    "file {} already exists",
                    row.file_id
                ))),
                Err(e) => Err(e.into()),
            }
        }

        async fn get_file(&self, file_id: Uuid) -> MetadataResult<Option<FileRow>> {
            let row = sqlx::query_as::<_, FileRow>("SELECT * FROM files WHERE file_id = ?")
                .bind(file_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn update_file_status(&self, row: &FileRow) -> MetadataResult<()> {
            let result = sqlx::query(
                "UPDATE files SET status = ?, updated_at = ?, deleted_at = ? WHERE file_id = ?",
            )
            .bind(&row.status)
            .bind(row.updated_at)
            .bind(row.deleted_at)
            .bind(row.file_id)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!(
                    "file {} not found",
                    row.file_id
                )));
            }
            Ok(())
        }

        async fn rename_file(&self, row: &FileRow, previous_path: &str) -> MetadataResult<u64> {
            let mut tx = self.pool.begin().await?;

            let result = sqlx::query(
                "UPDATE files SET name = ?, path = ?, updated_at = ? WHERE file_id = ?",
            )
            .bind(&row.name)
            .bind(&row.path)
            .bind(row.updated_at)
            .bind(row.file_id)
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!(
                    "file {} not found",
                    row.file_id
                )));
            }

            let mut moved = 0;
            if row.kind == "folder" {
                let (old_prefix, old_len) = descendant_prefix(previous_path);
                let (new_prefix, _) = descendant_prefix(&row.path);
                moved = sqlx::query(
                    "UPDATE files SET path = ? || substr(path, ?), updated_at = ? \
                     WHERE owner_account_id = ? AND substr(path, 1, ?) = ?",
                )
                .bind(&new_prefix)
                .bind(old_len + 1)
                .bind(row.updated_at)
                .bind(row.owner_account_id)
                .bind(old_len)
                .bind(&old_prefix)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            }

            tx.commit().await?;
            Ok(moved)
        }

        async fn find_file_by_hash(&self, content_hash: &str) -> MetadataResult<Option<FileRow>> {
            let row = sqlx::query_as::<_, FileRow>(
                "SELECT * FROM files WHERE content_hash = ? AND kind = 'file' AND blob_key IS NOT NULL \
                 ORDER BY created_at DESC, rowid DESC LIMIT 1",
            )
            .bind(content_hash)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn find_active_by_hash_for_account(
            &self,
            account_id: i64,
            content_hash: &str,
        ) -> MetadataResult<Option<FileRow>> {
            let row = sqlx::query_as::<_, FileRow>(
                "SELECT * FROM files WHERE owner_account_id = ? AND content_hash = ? \
                 AND kind = 'file' AND status = 'active' \
                 ORDER BY created_at ASC, rowid ASC LIMIT 1",
            )
            .bind(account_id)
            .bind(content_hash)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn find_active_by_path(
            &self,
            account_id: i64,
            path: &str,
        ) -> MetadataResult<Option<FileRow>> {
            let row = sqlx::query_as::<_, FileRow>(
                "SELECT * FROM files WHERE owner_account_id = ? AND path = ? AND status = 'active' \
                 ORDER BY kind DESC, created_at ASC LIMIT 1",
            )
            .bind(account_id)
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn find_files_by_account_and_status(
            &self,
            account_id: i64,
            status: &str,
        ) -> MetadataResult<Vec<FileRow>> {
            let rows = sqlx::query_as::<_, FileRow>(
                "SELECT * FROM files WHERE owner_account_id = ? AND status = ? \
                 ORDER BY deleted_at DESC, path ASC",
            )
            .bind(account_id)
            .bind(status)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn delete_file_record(&self, file_id: Uuid) -> MetadataResult<()> {
            let result = sqlx::query("DELETE FROM files WHERE file_id = ?")
                .bind(file_id)
                .execute(&self.pool)
                .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("file {file_id} not found")));
            }
            Ok(())
        }

        async fn exists_hash_outside_account(
            &self,
            content_hash: &str,
            account_id: i64,
        ) -> MetadataResult<bool> {
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM files WHERE content_hash = ? AND owner_account_id != ?)",
            )
            .bind(content_hash)
            .bind(account_id)
            .fetch_one(&self.pool)
            .await?;
            Ok(exists)
        }

        async fn count_blob_references(
            &self,
            blob_key: &str,
            excluding: Uuid,
        ) -> MetadataResult<u64> {
            let count: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM files WHERE blob_key = ? AND file_id != ?",
            )
            .bind(blob_key)
            .bind(excluding)
            .fetch_one(&self.pool)
            .await?;
            from_db_size(count)
        }

        async fn count_descendants(
            &self,
            account_id: i64,
            folder_path: &str,
        ) -> MetadataResult<u64> {
            let (prefix, len) = descendant_prefix(folder_path);
            let count: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM files WHERE owner_account_id = ? AND substr(path, 1, ?) = ?",
            )
            .bind(account_id)
            .bind(len)
            .bind(&prefix)
            .fetch_one(&self.pool)
            .await?;
            from_db_size(count)
        }

        async fn count_files_for_account(&self, account_id: i64) -> MetadataResult<u64> {
            let count: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM files WHERE owner_account_id = ?")
                    .bind(account_id)
                    .fetch_one(&self.pool)
                    .await?;
            from_db_size(count)
        }
    }
}

const SCHEMA_SQL: &str = r#"
-- Quota ledger, one row per account
CREATE TABLE IF NOT EXISTS account_quotas (
    account_id INTEGER PRIMARY KEY,
    used_bytes INTEGER NOT NULL DEFAULT 0 CHECK (used_bytes >= 0),
    total_bytes INTEGER NOT NULL CHECK (total_bytes >= 0),
    version INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    CHECK (used_bytes <= total_bytes)
);

-- Files and folders; paths are virtual, blob_key is the physical location
CREATE TABLE IF NOT EXISTS files (
    file_id BLOB PRIMARY KEY,
    owner_account_id INTEGER NOT NULL REFERENCES account_quotas(account_id),
    name TEXT NOT NULL,
    path TEXT NOT NULL,
    kind TEXT NOT NULL CHECK (kind IN ('file', 'folder')),
    blob_key TEXT,
    content_hash TEXT NOT NULL,
    size_bytes INTEGER NOT NULL CHECK (size_bytes >= 0),
    mime_type TEXT,
    status TEXT NOT NULL CHECK (status IN ('active', 'deleted')),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_files_owner_status ON files(owner_account_id, status);
CREATE INDEX IF NOT EXISTS idx_files_owner_path ON files(owner_account_id, path);
CREATE INDEX IF NOT EXISTS idx_files_hash ON files(content_hash);
CREATE INDEX IF NOT EXISTS idx_files_blob_key ON files(blob_key);
"#;
