//! Upload session storage.
//!
//! Sessions are process-local by default. The trait keeps the state machine
//! rules in one place so another backing store can enforce the same
//! guarantees: ids are unique and every received index lies inside
//! `0..total_chunks`.

use crate::error::{VaultError, VaultResult};
use async_trait::async_trait;
use burrow_core::{ChunkProgress, UploadId, UploadSession, UploadState};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use time::OffsetDateTime;

/// Result of recording a chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkRecorded {
    /// False if the index had already been received.
    pub newly_received: bool,
    pub progress: ChunkProgress,
}

/// Storage for in-flight chunked upload sessions.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Add a new session. Fails with `Conflict` if the id is taken.
    async fn insert(&self, session: UploadSession) -> VaultResult<()>;

    /// Snapshot of a session.
    async fn get(&self, id: &UploadId) -> VaultResult<Option<UploadSession>>;

    /// Mark chunk `index` received.
    ///
    /// Fails with `UploadNotFound` if the session is gone,
    /// `InvalidChunkIndex` if out of range and `Conflict` once completion
    /// has started.
    async fn record_chunk(&self, id: &UploadId, index: u32) -> VaultResult<ChunkRecorded>;

    /// Move a fully received session to `Completing` and return it.
    ///
    /// Fails with `IncompleteUpload` (leaving the session untouched) if any
    /// chunk is missing, and with `Conflict` if completion already started.
    async fn begin_completion(&self, id: &UploadId) -> VaultResult<UploadSession>;

    /// Remove a session, returning it if it existed.
    async fn remove(&self, id: &UploadId) -> VaultResult<Option<UploadSession>>;

    /// Sessions past their expiry that are not being completed.
    async fn expired(&self, now: OffsetDateTime) -> VaultResult<Vec<UploadSession>>;

    /// Ids of every session currently held.
    async fn live_ids(&self) -> VaultResult<Vec<UploadId>>;
}

/// In-process session store.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: DashMap<UploadId, UploadSession>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, session: UploadSession) -> VaultResult<()> {
        match self.sessions.entry(session.id) {
            Entry::Occupied(_) => Err(VaultError::Conflict(format!(
                "upload session {} already exists",
                session.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(session);
                Ok(())
            }
        }
    }

    async fn get(&self, id: &UploadId) -> VaultResult<Option<UploadSession>> {
        Ok(self.sessions.get(id).map(|s| s.clone()))
    }

    async fn record_chunk(&self, id: &UploadId, index: u32) -> VaultResult<ChunkRecorded> {
        let mut session = self
            .sessions
            .get_mut(id)
            .ok_or(VaultError::UploadNotFound(*id))?;
        if index >= session.total_chunks {
            return Err(VaultError::InvalidChunkIndex {
                index,
                total: session.total_chunks,
            });
        }
        if !session.state.accepts_chunks() {
            return Err(VaultError::Conflict(format!(
                "upload session {id} is {}",
                session.state.as_str()
            )));
        }
        let newly_received = session.record_chunk(index)?;
        Ok(ChunkRecorded {
            newly_received,
            progress: session.progress(),
        })
    }

    async fn begin_completion(&self, id: &UploadId) -> VaultResult<UploadSession> {
        let mut session = self
            .sessions
            .get_mut(id)
            .ok_or(VaultError::UploadNotFound(*id))?;
        if !session.state.accepts_chunks() {
            return Err(VaultError::Conflict(format!(
                "upload session {id} is {}",
                session.state.as_str()
            )));
        }
        if !session.is_complete() {
            return Err(VaultError::IncompleteUpload {
                missing: session.missing(),
                total: session.total_chunks,
            });
        }
        session.state = UploadState::Completing;
        session.updated_at = OffsetDateTime::now_utc();
        Ok(session.clone())
    }

    async fn remove(&self, id: &UploadId) -> VaultResult<Option<UploadSession>> {
        Ok(self.sessions.remove(id).map(|(_, session)| session))
    }

    async fn expired(&self, now: OffsetDateTime) -> VaultResult<Vec<UploadSession>> {
        Ok(self
            .sessions
            .iter()
            .filter(|s| s.state != UploadState::Completing && s.is_expired_at(now))
            .map(|s| s.clone())
            .collect())
    }

    async fn live_ids(&self) -> VaultResult<Vec<UploadId>> {
        Ok(self.sessions.iter().map(|s| *s.key()).collect())
    }
}
