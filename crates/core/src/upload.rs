//! Chunked upload session types and lifecycle.

use crate::file::AccountId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Unique identifier for an upload session.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UploadId(Uuid);

impl UploadId {
    /// Generate a new random upload ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from a string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| crate::Error::UploadSession(format!("invalid upload ID: {e}")))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UploadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UploadId({})", self.0)
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Upload session state.
///
/// `Initialized -> Receiving -> Completing`. Completion, failure, abort and
/// expiry all end the session by removing it from its store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadState {
    /// Created, no chunk received yet.
    Initialized,
    /// At least one chunk received.
    Receiving,
    /// Assembly in progress; no more chunks accepted.
    Completing,
}

impl UploadState {
    /// Check if the session can still receive chunks.
    pub fn accepts_chunks(&self) -> bool {
        matches!(self, Self::Initialized | Self::Receiving)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::Receiving => "receiving",
            Self::Completing => "completing",
        }
    }
}

/// An in-flight chunked upload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadSession {
    /// Unique session identifier.
    pub id: UploadId,
    /// Account that created the session and will own the file.
    pub account_id: AccountId,
    /// Sanitized file name.
    pub file_name: String,
    /// Normalized virtual directory the file lands in.
    pub directory: String,
    /// Declared size of the whole file.
    pub total_size: u64,
    /// Size of every chunk except possibly the last.
    pub chunk_size: u64,
    /// Number of chunks (`ceil(total_size / chunk_size)`).
    pub total_chunks: u32,
    /// Indices accepted so far. Always a subset of `0..total_chunks`.
    pub received: BTreeSet<u32>,
    /// Current session state.
    pub state: UploadState,
    /// MIME type declared at init, if any.
    pub mime_type: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl UploadSession {
    /// Create a new upload session.
    pub fn new(
        account_id: AccountId,
        file_name: String,
        directory: String,
        total_size: u64,
        chunk_size: u64,
        expires_in: time::Duration,
    ) -> crate::Result<Self> {
        if total_size == 0 {
            return Err(crate::Error::UploadSession(
                "total size must be greater than zero".to_string(),
            ));
        }
        if chunk_size == 0 {
            return Err(crate::Error::InvalidChunkSize {
                size: 0,
                min: 1,
                max: u64::MAX,
            });
        }
        let total_chunks = u32::try_from(total_size.div_ceil(chunk_size)).map_err(|_| {
            crate::Error::UploadSession(format!(
                "{total_size} bytes in chunks of {chunk_size} exceeds the chunk index range"
            ))
        })?;

        let now = OffsetDateTime::now_utc();
        let expires_at = now.checked_add(expires_in).ok_or_else(|| {
            crate::Error::UploadSession(format!("session lifetime {expires_in} is out of range"))
        })?;
        Ok(Self {
            id: UploadId::new(),
            account_id,
            file_name,
            directory,
            total_size,
            chunk_size,
            total_chunks,
            received: BTreeSet::new(),
            state: UploadState::Initialized,
            mime_type: None,
            created_at: now,
            updated_at: now,
            expires_at,
        })
    }

    /// Check if the session has expired.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(OffsetDateTime::now_utc())
    }

    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now > self.expires_at
    }

    /// Exact byte length expected for chunk `index`, or `None` if out of range.
    pub fn expected_chunk_len(&self, index: u32) -> Option<u64> {
        if index >= self.total_chunks {
            return None;
        }
        if index + 1 == self.total_chunks {
            Some(self.total_size - self.chunk_size * u64::from(self.total_chunks - 1))
        } else {
            Some(self.chunk_size)
        }
    }

    /// Mark chunk `index` as received.
    ///
    /// Returns `Ok(false)` if it was already received.
    pub fn record_chunk(&mut self, index: u32) -> crate::Result<bool> {
        if !self.state.accepts_chunks() {
            return Err(crate::Error::UploadSession(format!(
                "session is {}, not accepting chunks",
                self.state.as_str()
            )));
        }
        if index >= self.total_chunks {
            return Err(crate::Error::UploadSession(format!(
                "chunk index {index} out of range 0..{}",
                self.total_chunks
            )));
        }
        let inserted = self.received.insert(index);
        if inserted {
            self.state = UploadState::Receiving;
            self.updated_at = OffsetDateTime::now_utc();
        }
        Ok(inserted)
    }

    /// Whether every chunk index has been received.
    pub fn is_complete(&self) -> bool {
        self.received.len() == self.total_chunks as usize
    }

    /// Indices not yet received, ascending.
    pub fn missing(&self) -> Vec<u32> {
        (0..self.total_chunks)
            .filter(|i| !self.received.contains(i))
            .collect()
    }

    /// Snapshot of progress for callers.
    pub fn progress(&self) -> ChunkProgress {
        ChunkProgress {
            upload_id: self.id,
            received_chunks: self.received.len() as u32,
            total_chunks: self.total_chunks,
            complete: self.is_complete(),
        }
    }
}

/// Progress of a chunked upload after a chunk is accepted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkProgress {
    pub upload_id: UploadId,
    pub received_chunks: u32,
    pub total_chunks: u32,
    pub complete: bool,
}
