//! Database models mapping to the metadata schema.

use crate::error::{MetadataError, MetadataResult};
use burrow_core::{
    AccountId, ContentHash, FileId, FileKind, FileRecord, FileStatus, QuotaUsage,
};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Account quotas
// =============================================================================

/// Quota ledger row for one account.
///
/// `version` increases by one on every committed update and guards
/// optimistic read-modify-write cycles.
#[derive(Debug, Clone, FromRow)]
pub struct AccountQuotaRow {
    pub account_id: i64,
    pub used_bytes: i64,
    pub total_bytes: i64,
    pub version: i64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl AccountQuotaRow {
    /// Fresh row with nothing used.
    pub fn new(account_id: AccountId, total_bytes: u64) -> MetadataResult<Self> {
        let now = OffsetDateTime::now_utc();
        Ok(Self {
            account_id,
            used_bytes: 0,
            total_bytes: to_db_size(total_bytes)?,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Usage as a domain value.
    pub fn usage(&self) -> MetadataResult<QuotaUsage> {
        let used = from_db_size(self.used_bytes)?;
        let total = from_db_size(self.total_bytes)?;
        QuotaUsage::new(used, total).map_err(|e| {
            MetadataError::Internal(format!("account {} quota row: {e}", self.account_id))
        })
    }
}

// =============================================================================
// Files and folders
// =============================================================================

/// File or folder record.
#[derive(Debug, Clone, FromRow)]
pub struct FileRow {
    pub file_id: Uuid,
    pub owner_account_id: i64,
    pub name: String,
    pub path: String,
    pub kind: String,
    pub blob_key: Option<String>,
    pub content_hash: String,
    pub size_bytes: i64,
    pub mime_type: Option<String>,
    pub status: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub deleted_at: Option<OffsetDateTime>,
}

impl TryFrom<&FileRecord> for FileRow {
    type Error = MetadataError;

    fn try_from(record: &FileRecord) -> MetadataResult<Self> {
        Ok(Self {
            file_id: *record.id.as_uuid(),
            owner_account_id: record.owner_account_id,
            name: record.name.clone(),
            path: record.path.clone(),
            kind: record.kind.as_str().to_string(),
            blob_key: record.blob_key.clone(),
            content_hash: record.content_hash.to_hex(),
            size_bytes: to_db_size(record.size_bytes)?,
            mime_type: record.mime_type.clone(),
            status: record.status.as_str().to_string(),
            created_at: record.created_at,
            updated_at: record.updated_at,
            deleted_at: record.deleted_at,
        })
    }
}

impl TryFrom<FileRow> for FileRecord {
    type Error = MetadataError;

    fn try_from(row: FileRow) -> MetadataResult<Self> {
        let file_id = row.file_id;
        let corrupt =
            |e: burrow_core::Error| MetadataError::Internal(format!("file {file_id} row: {e}"));
        Ok(Self {
            id: FileId::from_uuid(file_id),
            owner_account_id: row.owner_account_id,
            kind: FileKind::parse(&row.kind).map_err(corrupt)?,
            content_hash: ContentHash::from_hex(&row.content_hash).map_err(corrupt)?,
            size_bytes: from_db_size(row.size_bytes)?,
            status: FileStatus::parse(&row.status).map_err(corrupt)?,
            name: row.name,
            path: row.path,
            blob_key: row.blob_key,
            mime_type: row.mime_type,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

/// Convert a byte count to SQLite's signed integer.
pub fn to_db_size(bytes: u64) -> MetadataResult<i64> {
    i64::try_from(bytes)
        .map_err(|_| MetadataError::Internal(format!("size {bytes} exceeds storable range")))
}

/// Convert a stored byte count back to unsigned.
pub fn from_db_size(bytes: i64) -> MetadataResult<u64> {
    u64::try_from(bytes)
        .map_err(|_| MetadataError::Internal(format!("negative stored size {bytes}")))
}
