//! Expiration reaper.
//!
//! Upload session expirations are advisory inside the state machines. The
//! reaper is what acts on them: each sweep cancels `pending`/`error`
//! sessions whose expiration passed, cancels their expired unfinished files,
//! and optionally evicts expired terminal sessions from the store.

use crate::error::StoreResult;
use crate::store::SessionStore;
use forklift_core::config::ReaperConfig;
use forklift_core::{UploadContext, UploadSession};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::task::JoinHandle;

/// Statistics for one sweep.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReaperStats {
    /// Expired sessions examined.
    pub items_processed: u64,
    /// Upload sessions canceled.
    pub canceled: u64,
    /// File upload sessions canceled.
    pub files_canceled: u64,
    /// Terminal sessions removed from the store.
    pub evicted: u64,
    /// Sessions that could not be canceled.
    pub errors: u64,
}

impl ReaperStats {
    /// Whether the sweep changed anything.
    pub fn is_empty(&self) -> bool {
        self.canceled == 0 && self.files_canceled == 0 && self.evicted == 0 && self.errors == 0
    }
}

/// Periodic sweeper over a [`SessionStore`].
pub struct Reaper {
    store: Arc<dyn SessionStore>,
    context: Arc<UploadContext>,
    config: ReaperConfig,
}

impl Reaper {
    pub fn new(
        store: Arc<dyn SessionStore>,
        context: Arc<UploadContext>,
        config: ReaperConfig,
    ) -> Self {
        Self {
            store,
            context,
            config,
        }
    }

    /// Run one sweep against the current time.
    pub async fn sweep(&self) -> StoreResult<ReaperStats> {
        self.sweep_at(OffsetDateTime::now_utc()).await
    }

    /// Run one sweep treating `now` as the current time.
    pub async fn sweep_at(&self, now: OffsetDateTime) -> StoreResult<ReaperStats> {
        let mut stats = ReaperStats::default();

        let expired = self.store.expired(now, self.config.batch_size).await?;
        for shared in expired {
            stats.items_processed += 1;
            let mut session = shared.lock().await;
            let upload_id = session.id;

            // Re-check under the lock: the session may have been published
            // or extended since it was listed.
            if session.state().is_terminal() || !session.is_expired_at(now) {
                continue;
            }

            match cancel_expired(&mut session, &self.context, now) {
                Ok(files) => {
                    stats.canceled += 1;
                    stats.files_canceled += files;
                    tracing::info!(
                        upload_id = %upload_id,
                        project = %session.project(),
                        version = %session.version(),
                        files_canceled = files,
                        "Expired upload session canceled"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        upload_id = %upload_id,
                        error = %e,
                        "Failed to cancel expired upload session"
                    );
                    stats.errors += 1;
                }
            }
        }

        if self.config.evict_terminal {
            stats.evicted = self
                .store
                .evict_terminal(now, self.config.batch_size)
                .await?;
        }

        Ok(stats)
    }

    /// Run sweeps every `sweep_interval_secs` until the task is aborted.
    pub fn spawn(self) -> JoinHandle<()> {
        let interval = self.config.sweep_interval();
        tracing::info!(
            interval_secs = interval.as_secs(),
            batch_size = self.config.batch_size,
            evict_terminal = self.config.evict_terminal,
            "Upload session reaper spawned"
        );

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                match self.sweep().await {
                    Ok(stats) if stats.is_empty() => {
                        tracing::debug!("Reaper sweep found nothing to do");
                    }
                    Ok(stats) => {
                        tracing::info!(
                            items_processed = stats.items_processed,
                            canceled = stats.canceled,
                            files_canceled = stats.files_canceled,
                            evicted = stats.evicted,
                            errors = stats.errors,
                            "Reaper sweep finished"
                        );
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Reaper sweep failed");
                    }
                }
            }
        })
    }
}

/// Cancel a session's expired unfinished files, then the session itself.
/// Returns the number of files canceled.
fn cancel_expired(
    session: &mut UploadSession,
    context: &UploadContext,
    now: OffsetDateTime,
) -> forklift_core::Result<u64> {
    let file_ids: Vec<_> = session
        .file_upload_sessions()
        .iter()
        .filter(|file| file.is_expired_at(now) && !file.state().is_terminal())
        .map(|file| file.id)
        .collect();

    let mut controller = context.controller(session);
    let mut canceled = 0u64;
    for file_id in file_ids {
        if let Some(mut file) = controller.file(file_id) {
            file.action_cancel()?;
            canceled += 1;
        }
    }
    controller.action_cancel()?;
    Ok(canceled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_is_empty() {
        assert!(ReaperStats::default().is_empty());
        assert!(
            !ReaperStats {
                evicted: 1,
                ..ReaperStats::default()
            }
            .is_empty()
        );
        // Examining a session without acting on it is not a change.
        assert!(
            ReaperStats {
                items_processed: 3,
                ..ReaperStats::default()
            }
            .is_empty()
        );
    }
}
