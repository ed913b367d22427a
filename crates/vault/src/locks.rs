//! Mutation locks.
//!
//! Every mutating lifecycle operation holds the lock for its account for its
//! whole duration. Operations that may share or free a blob additionally hold
//! the lock for its content hash. Account locks are always taken before hash
//! locks, never the other way round.

use burrow_core::config::LockScope;
use burrow_core::{AccountId, ContentHash};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Lock table for account and content-hash scoped mutations.
pub struct MutationLocks {
    scope: LockScope,
    global: Arc<Mutex<()>>,
    accounts: DashMap<AccountId, Arc<Mutex<()>>>,
    hashes: DashMap<ContentHash, Arc<Mutex<()>>>,
}

impl MutationLocks {
    pub fn new(scope: LockScope) -> Self {
        Self {
            scope,
            global: Arc::new(Mutex::new(())),
            accounts: DashMap::new(),
            hashes: DashMap::new(),
        }
    }

    /// Serialize mutations of `account_id`.
    ///
    /// With [`LockScope::Global`] every account shares one lock.
    pub async fn lock_account(&self, account_id: AccountId) -> AccountGuard<'_> {
        match self.scope {
            LockScope::Global => AccountGuard {
                locks: self,
                account_id: None,
                guard: Some(self.global.clone().lock_owned().await),
            },
            LockScope::PerAccount => {
                // Clone out of the map so no shard lock is held across the await.
                let mutex = self
                    .accounts
                    .entry(account_id)
                    .or_insert_with(|| Arc::new(Mutex::new(())))
                    .clone();
                AccountGuard {
                    locks: self,
                    account_id: Some(account_id),
                    guard: Some(mutex.lock_owned().await),
                }
            }
        }
    }

    /// Serialize blob sharing and blob deletion for one content hash.
    pub async fn lock_hash(&self, hash: ContentHash) -> HashGuard<'_> {
        let mutex = self
            .hashes
            .entry(hash)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;
        HashGuard {
            locks: self,
            hash,
            guard: Some(guard),
        }
    }

    /// Number of per-account locks currently allocated.
    pub fn account_lock_count(&self) -> usize {
        self.accounts.len()
    }

    /// Number of hash locks currently allocated.
    pub fn hash_lock_count(&self) -> usize {
        self.hashes.len()
    }
}

/// Held account lock. Unused per-account entries are dropped on release.
pub struct AccountGuard<'a> {
    locks: &'a MutationLocks,
    account_id: Option<AccountId>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for AccountGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        if let Some(account_id) = self.account_id {
            self.locks
                .accounts
                .remove_if(&account_id, |_, mutex| Arc::strong_count(mutex) == 1);
        }
    }
}

/// Held hash lock. Unused entries are dropped from the table on release.
pub struct HashGuard<'a> {
    locks: &'a MutationLocks,
    hash: ContentHash,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for HashGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the table's own reference left means nobody holds or awaits it.
        self.locks
            .hashes
            .remove_if(&self.hash, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
