//! Account quota repository.

use crate::error::MetadataResult;
use crate::models::AccountQuotaRow;
use async_trait::async_trait;
use time::OffsetDateTime;

/// Repository for per-account quota rows.
#[async_trait]
pub trait AccountRepo: Send + Sync {
    /// Create the quota row for a new account.
    ///
    /// Fails with `AlreadyExists` if the account already has one.
    async fn create_account_quota(&self, row: &AccountQuotaRow) -> MetadataResult<()>;

    /// Get the quota row for an account.
    async fn get_account_quota(&self, account_id: i64) -> MetadataResult<Option<AccountQuotaRow>>;

    /// Set `used_bytes` if the stored version still equals `expected_version`.
    ///
    /// On success the version is incremented. Fails with `Conflict` when the
    /// version moved since it was read, `NotFound` when the row is gone.
    /// Never retries.
    async fn update_account_quota(
        &self,
        account_id: i64,
        used_bytes: i64,
        expected_version: i64,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Delete the quota row of an account.
    async fn delete_account_quota(&self, account_id: i64) -> MetadataResult<()>;
}
