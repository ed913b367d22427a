//! Chunked uploads.
//!
//! A session is opened with the file's total size and chunk size, chunks
//! arrive in any order and are staged individually, and completion assembles
//! them into one blob that goes through the same commit path as a whole-file
//! upload. Completion is terminal: the session and its staging data are
//! removed whether the commit succeeds or fails.

use crate::error::{VaultError, VaultResult};
use crate::lifecycle::{NewFile, Payload, UploadOutcome};
use crate::vault::{resolve_mime, FileVault};
use burrow_core::{path, AccountId, ChunkProgress, UploadId, UploadSession, UploadState};
use bytes::Bytes;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};

/// Parameters for opening a chunked upload.
#[derive(Clone, Debug)]
pub struct InitUpload {
    pub file_name: String,
    pub directory: String,
    pub total_size: u64,
    pub chunk_size: u64,
    pub mime_type: Option<String>,
}

/// Snapshot of a session for status queries.
#[derive(Clone, Debug, Serialize)]
pub struct UploadStatus {
    pub upload_id: UploadId,
    pub file_name: String,
    pub directory: String,
    pub state: UploadState,
    pub total_size: u64,
    pub chunk_size: u64,
    pub total_chunks: u32,
    pub received_chunks: u32,
    pub missing: Vec<u32>,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl From<&UploadSession> for UploadStatus {
    fn from(session: &UploadSession) -> Self {
        Self {
            upload_id: session.id,
            file_name: session.file_name.clone(),
            directory: session.directory.clone(),
            state: session.state,
            total_size: session.total_size,
            chunk_size: session.chunk_size,
            total_chunks: session.total_chunks,
            received_chunks: session.received.len() as u32,
            missing: session.missing(),
            expires_at: session.expires_at,
        }
    }
}

impl FileVault {
    /// Open a chunked upload session.
    ///
    /// Quota headroom is checked here and again at completion; nothing is
    /// reserved in between.
    #[instrument(skip(self, request), fields(file_name = %request.file_name, total_size = request.total_size))]
    pub async fn init_upload(
        &self,
        account_id: AccountId,
        request: InitUpload,
    ) -> VaultResult<UploadSession> {
        let name = path::sanitize_name(&request.file_name)?;
        let directory = path::normalize_dir(&request.directory)?;
        self.check_file_size(request.total_size)?;

        let (min, max) = (
            self.uploads.min_chunk_size.as_u64(),
            self.uploads.max_chunk_size.as_u64(),
        );
        if request.chunk_size < min || request.chunk_size > max {
            return Err(burrow_core::Error::InvalidChunkSize {
                size: request.chunk_size,
                min,
                max,
            }
            .into());
        }

        self.ledger
            .ensure_headroom(account_id, request.total_size)
            .await?;
        self.require_directory(account_id, &directory).await?;

        let mut session = UploadSession::new(
            account_id,
            name,
            directory,
            request.total_size,
            request.chunk_size,
            self.uploads.session_ttl(),
        )?;
        if session.total_chunks > self.uploads.max_chunks {
            return Err(VaultError::InvalidArgument(format!(
                "{} chunks exceeds the limit of {}",
                session.total_chunks, self.uploads.max_chunks
            )));
        }
        session.mime_type = Some(resolve_mime(&session.file_name, request.mime_type));

        self.sessions.insert(session.clone()).await?;
        info!(
            upload_id = %session.id,
            total_chunks = session.total_chunks,
            "upload session opened"
        );
        Ok(session)
    }

    /// Stage chunk `index` of an upload.
    ///
    /// `data` must be exactly the chunk's expected length. Sending an index
    /// that was already received is accepted without rewriting it.
    #[instrument(skip(self, data), fields(upload_id = %upload_id, size = data.len()))]
    pub async fn accept_chunk(
        &self,
        account_id: AccountId,
        upload_id: UploadId,
        index: u32,
        data: Bytes,
    ) -> VaultResult<ChunkProgress> {
        let session = self.live_session(account_id, &upload_id).await?;
        if !session.state.accepts_chunks() {
            return Err(VaultError::Conflict(format!(
                "upload session {upload_id} is {}",
                session.state.as_str()
            )));
        }
        let expected = session
            .expected_chunk_len(index)
            .ok_or(VaultError::InvalidChunkIndex {
                index,
                total: session.total_chunks,
            })?;
        if data.len() as u64 != expected {
            return Err(VaultError::InvalidArgument(format!(
                "chunk {index} is {} bytes, expected {expected}",
                data.len()
            )));
        }
        if session.received.contains(&index) {
            debug!(index, "chunk already received");
            return Ok(session.progress());
        }

        self.staging.write_chunk(&upload_id, index, data).await?;
        match self.sessions.record_chunk(&upload_id, index).await {
            Ok(recorded) => {
                debug!(
                    index,
                    received = recorded.progress.received_chunks,
                    total = recorded.progress.total_chunks,
                    "chunk staged"
                );
                Ok(recorded.progress)
            }
            Err(VaultError::UploadNotFound(id)) => {
                // Aborted or reaped while the chunk was being written.
                if let Err(e) = self.staging.purge(&id).await {
                    warn!(error = %e, "failed to purge staging of vanished upload");
                }
                Err(VaultError::UploadNotFound(id))
            }
            Err(e) => Err(e),
        }
    }

    /// Progress of an upload.
    pub async fn upload_status(
        &self,
        account_id: AccountId,
        upload_id: UploadId,
    ) -> VaultResult<UploadStatus> {
        let session = self.live_session(account_id, &upload_id).await?;
        Ok(UploadStatus::from(&session))
    }

    /// Drop an upload and everything staged for it.
    #[instrument(skip(self), fields(upload_id = %upload_id))]
    pub async fn abort_upload(&self, account_id: AccountId, upload_id: UploadId) -> VaultResult<()> {
        let session = self.owned_session(account_id, &upload_id).await?;
        if session.state == UploadState::Completing {
            return Err(VaultError::Conflict(format!(
                "upload session {upload_id} is completing"
            )));
        }
        self.sessions.remove(&upload_id).await?;
        self.staging.purge(&upload_id).await?;
        info!("upload aborted");
        Ok(())
    }

    /// Assemble a fully received upload and store it as a file.
    ///
    /// With chunks missing this fails with `IncompleteUpload` and changes
    /// nothing. Otherwise the session ends here, successful or not.
    #[instrument(skip(self), fields(upload_id = %upload_id))]
    pub async fn complete_upload(
        &self,
        account_id: AccountId,
        upload_id: UploadId,
    ) -> VaultResult<UploadOutcome> {
        self.live_session(account_id, &upload_id).await?;

        let _guard = self.locks.lock_account(account_id).await;
        let session = self.sessions.begin_completion(&upload_id).await?;

        let result = self.commit_session(&session).await;

        if let Err(e) = self.staging.purge(&upload_id).await {
            warn!(error = %e, "failed to purge upload staging");
        }
        if let Err(e) = self.sessions.remove(&upload_id).await {
            warn!(error = %e, "failed to remove upload session");
        }

        match &result {
            Ok(outcome) => info!(
                file_id = %outcome.file.id,
                duplicate = outcome.duplicate,
                "chunked upload completed"
            ),
            Err(e) => warn!(error = %e, "chunked upload failed"),
        }
        result
    }

    async fn commit_session(&self, session: &UploadSession) -> VaultResult<UploadOutcome> {
        let assembled = self
            .staging
            .assemble(&session.id, session.total_chunks)
            .await?;
        if assembled.size != session.total_size {
            return Err(VaultError::InvalidArgument(format!(
                "assembled {} bytes, declared {}",
                assembled.size, session.total_size
            )));
        }

        let mime_type = session
            .mime_type
            .clone()
            .unwrap_or_else(|| resolve_mime(&session.file_name, None));
        self.commit_file(NewFile {
            account_id: session.account_id,
            name: session.file_name.clone(),
            directory: session.directory.clone(),
            mime_type,
            hash: assembled.hash,
            payload: Payload::Staged(assembled),
        })
        .await
    }

    /// Session owned by `account_id`, in any state.
    async fn owned_session(
        &self,
        account_id: AccountId,
        upload_id: &UploadId,
    ) -> VaultResult<UploadSession> {
        let session = self
            .sessions
            .get(upload_id)
            .await?
            .ok_or(VaultError::UploadNotFound(*upload_id))?;
        if session.account_id != account_id {
            return Err(VaultError::Forbidden(format!(
                "upload session {upload_id} belongs to another account"
            )));
        }
        Ok(session)
    }

    /// Owned session that has not expired. Expired sessions are treated as
    /// gone even before the reaper removes them.
    async fn live_session(
        &self,
        account_id: AccountId,
        upload_id: &UploadId,
    ) -> VaultResult<UploadSession> {
        let session = self.owned_session(account_id, upload_id).await?;
        if session.is_expired() && session.state != UploadState::Completing {
            return Err(VaultError::UploadNotFound(*upload_id));
        }
        Ok(session)
    }
}
