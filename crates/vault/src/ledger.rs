//! Quota ledger.
//!
//! Each reserve or release is one read-modify-write of the account's quota
//! row, committed only if the row's version is unchanged since the read. A
//! lost race surfaces as `Conflict` and is never retried here, so a caller
//! can never be charged twice.

use crate::error::{VaultError, VaultResult};
use burrow_core::{AccountId, QuotaUsage};
use burrow_metadata::{AccountQuotaRow, AccountRepo, MetadataStore};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::debug;

/// Per-account used/total capacity tracker.
#[derive(Clone)]
pub struct QuotaLedger {
    metadata: Arc<dyn MetadataStore>,
}

impl QuotaLedger {
    pub fn new(metadata: Arc<dyn MetadataStore>) -> Self {
        Self { metadata }
    }

    async fn snapshot(&self, account_id: AccountId) -> VaultResult<AccountQuotaRow> {
        self.metadata
            .get_account_quota(account_id)
            .await?
            .ok_or(VaultError::AccountNotFound(account_id))
    }

    /// Current usage of an account.
    pub async fn usage(&self, account_id: AccountId) -> VaultResult<QuotaUsage> {
        Ok(self.snapshot(account_id).await?.usage()?)
    }

    /// Fail with `QuotaExceeded` unless `delta` more bytes would fit now.
    ///
    /// Reserves nothing.
    pub async fn ensure_headroom(
        &self,
        account_id: AccountId,
        delta: u64,
    ) -> VaultResult<QuotaUsage> {
        let usage = self.usage(account_id).await?;
        if !usage.has_room_for(delta) {
            return Err(VaultError::QuotaExceeded {
                requested: delta,
                available: usage.available(),
            });
        }
        Ok(usage)
    }

    /// Charge `delta` bytes to an account.
    pub async fn reserve(&self, account_id: AccountId, delta: u64) -> VaultResult<QuotaUsage> {
        let snapshot = self.snapshot(account_id).await?;
        let next = snapshot.usage()?.reserve(delta).map_err(|e| match e {
            burrow_core::Error::QuotaExhausted {
                requested,
                available,
            } => VaultError::QuotaExceeded {
                requested,
                available,
            },
            other => other.into(),
        })?;
        self.commit(&snapshot, next).await?;
        debug!(account_id, delta, used = next.used, "quota reserved");
        Ok(next)
    }

    /// Return `delta` bytes to an account.
    pub async fn release(&self, account_id: AccountId, delta: u64) -> VaultResult<QuotaUsage> {
        let snapshot = self.snapshot(account_id).await?;
        let next = snapshot.usage()?.release(delta)?;
        self.commit(&snapshot, next).await?;
        debug!(account_id, delta, used = next.used, "quota released");
        Ok(next)
    }

    async fn commit(&self, snapshot: &AccountQuotaRow, next: QuotaUsage) -> VaultResult<()> {
        let used = burrow_metadata::models::to_db_size(next.used)?;
        self.metadata
            .update_account_quota(
                snapshot.account_id,
                used,
                snapshot.version,
                OffsetDateTime::now_utc(),
            )
            .await?;
        Ok(())
    }
}
