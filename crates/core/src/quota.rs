//! Quota arithmetic.
//!
//! `QuotaUsage` is a value type: reserving or releasing produces a new usage
//! or an error, never a partially applied change. Persistence and concurrency
//! control live in the metadata store and the vault's ledger.

use serde::{Deserialize, Serialize};

/// Used and total capacity of one account, in bytes.
///
/// Invariant: `used <= total`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaUsage {
    pub used: u64,
    pub total: u64,
}

impl QuotaUsage {
    /// Create a usage value, rejecting `used > total`.
    pub fn new(used: u64, total: u64) -> crate::Result<Self> {
        if used > total {
            return Err(crate::Error::QuotaExhausted {
                requested: used,
                available: total,
            });
        }
        Ok(Self { used, total })
    }

    /// Fresh account with nothing stored.
    pub fn empty(total: u64) -> Self {
        Self { used: 0, total }
    }

    /// Bytes still available.
    pub fn available(&self) -> u64 {
        self.total - self.used
    }

    /// Whether `delta` more bytes would fit.
    pub fn has_room_for(&self, delta: u64) -> bool {
        delta <= self.available()
    }

    /// Usage after charging `delta` bytes.
    pub fn reserve(&self, delta: u64) -> crate::Result<Self> {
        if !self.has_room_for(delta) {
            return Err(crate::Error::QuotaExhausted {
                requested: delta,
                available: self.available(),
            });
        }
        Ok(Self {
            used: self.used + delta,
            total: self.total,
        })
    }

    /// Usage after returning `delta` bytes.
    pub fn release(&self, delta: u64) -> crate::Result<Self> {
        let used = self
            .used
            .checked_sub(delta)
            .ok_or(crate::Error::InvalidRelease {
                released: delta,
                used: self.used,
            })?;
        Ok(Self {
            used,
            total: self.total,
        })
    }
}
