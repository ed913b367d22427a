//! Background cleanup of abandoned uploads.

use crate::error::VaultResult;
use crate::sessions::SessionStore;
use burrow_storage::StagingArea;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

/// Outcome of one sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Expired sessions removed.
    pub expired_sessions: usize,
    /// Staging areas purged that belonged to no live session.
    pub orphaned_staging: usize,
}

/// Expires idle upload sessions and purges staging data nobody owns.
pub struct SessionReaper {
    sessions: Arc<dyn SessionStore>,
    staging: StagingArea,
}

impl SessionReaper {
    pub fn new(sessions: Arc<dyn SessionStore>, staging: StagingArea) -> Self {
        Self { sessions, staging }
    }

    /// Run one sweep.
    ///
    /// Staging is listed before live sessions are read, so an upload created
    /// during the sweep can never be mistaken for an orphan.
    pub async fn sweep(&self) -> VaultResult<SweepStats> {
        let staged = self.staging.staged_upload_ids().await?;
        let mut stats = SweepStats::default();

        for session in self.sessions.expired(OffsetDateTime::now_utc()).await? {
            if self.sessions.remove(&session.id).await?.is_none() {
                continue;
            }
            if let Err(e) = self.staging.purge(&session.id).await {
                warn!(upload_id = %session.id, error = %e, "failed to purge expired upload staging");
            }
            info!(
                upload_id = %session.id,
                account_id = session.account_id,
                received = session.received.len(),
                total = session.total_chunks,
                "expired upload session removed"
            );
            stats.expired_sessions += 1;
        }

        let live: HashSet<_> = self.sessions.live_ids().await?.into_iter().collect();
        for id in staged.into_iter().filter(|id| !live.contains(id)) {
            match self.staging.purge(&id).await {
                Ok(true) => {
                    debug!(upload_id = %id, "orphaned staging purged");
                    stats.orphaned_staging += 1;
                }
                Ok(false) => {}
                Err(e) => warn!(upload_id = %id, error = %e, "failed to purge orphaned staging"),
            }
        }

        Ok(stats)
    }

    /// Spawn a task that sweeps every `interval` until aborted.
    pub fn spawn(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                match self.sweep().await {
                    Ok(stats) if stats != SweepStats::default() => {
                        info!(
                            expired_sessions = stats.expired_sessions,
                            orphaned_staging = stats.orphaned_staging,
                            "upload reaper sweep finished"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "upload reaper sweep failed"),
                }
            }
        })
    }
}
