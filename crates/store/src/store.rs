//! Session store trait and in-memory implementation.

use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use dashmap::DashMap;
use forklift_core::{SessionToken, UploadSession, UploadSessionId};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::Mutex;

/// A stored session. Every transition on a session runs under its lock, so
/// `action_publish` reads its files' states as one snapshot.
pub type SharedSession = Arc<Mutex<UploadSession>>;

/// Registry of live upload sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Register a new session. Fails if its ID or session token is taken.
    async fn insert(&self, session: UploadSession) -> StoreResult<SharedSession>;

    /// Get a session by ID.
    async fn get(&self, upload_id: UploadSessionId) -> StoreResult<Option<SharedSession>>;

    /// Remove a session by ID.
    async fn remove(&self, upload_id: UploadSessionId) -> StoreResult<()>;

    /// Get a session by its session token.
    async fn find_by_token(&self, token: &SessionToken) -> StoreResult<Option<SharedSession>>;

    /// Up to `limit` sessions past their expiration at `now` that are still
    /// `pending` or `error`.
    async fn expired(&self, now: OffsetDateTime, limit: u32) -> StoreResult<Vec<SharedSession>>;

    /// Remove up to `limit` `published` or `canceled` sessions past their
    /// expiration at `now`. Returns the number removed.
    async fn evict_terminal(&self, now: OffsetDateTime, limit: u32) -> StoreResult<u64>;

    /// Number of sessions still `pending` or `error`.
    async fn count_active(&self) -> StoreResult<u64>;
}

/// [`SessionStore`] backed by concurrent hash maps.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: DashMap<UploadSessionId, SharedSession>,
    tokens: DashMap<SessionToken, UploadSessionId>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone out every stored handle so no map guard is held across an await.
    fn snapshot(&self) -> Vec<(UploadSessionId, SharedSession)> {
        self.sessions
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, session: UploadSession) -> StoreResult<SharedSession> {
        let upload_id = session.id;
        let token = session.session_token();

        match self.tokens.entry(token) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(StoreError::AlreadyExists(format!(
                    "upload session for {}=={}",
                    session.project(),
                    session.version()
                )));
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                if self.sessions.contains_key(&upload_id) {
                    return Err(StoreError::AlreadyExists(format!(
                        "upload session {upload_id}"
                    )));
                }
                slot.insert(upload_id);
            }
        }

        let shared = Arc::new(Mutex::new(session));
        self.sessions.insert(upload_id, Arc::clone(&shared));
        tracing::debug!(upload_id = %upload_id, "Upload session stored");
        Ok(shared)
    }

    async fn get(&self, upload_id: UploadSessionId) -> StoreResult<Option<SharedSession>> {
        Ok(self
            .sessions
            .get(&upload_id)
            .map(|entry| Arc::clone(entry.value())))
    }

    async fn remove(&self, upload_id: UploadSessionId) -> StoreResult<()> {
        let Some((_, shared)) = self.sessions.remove(&upload_id) else {
            return Err(StoreError::NotFound(format!("upload session {upload_id}")));
        };
        let token = shared.lock().await.session_token();
        self.tokens.remove_if(&token, |_, id| *id == upload_id);
        tracing::debug!(upload_id = %upload_id, "Upload session removed");
        Ok(())
    }

    async fn find_by_token(&self, token: &SessionToken) -> StoreResult<Option<SharedSession>> {
        let Some(upload_id) = self.tokens.get(token).map(|entry| *entry.value()) else {
            return Ok(None);
        };
        self.get(upload_id).await
    }

    async fn expired(&self, now: OffsetDateTime, limit: u32) -> StoreResult<Vec<SharedSession>> {
        let mut expired = Vec::new();
        for (_, shared) in self.snapshot() {
            if expired.len() >= limit as usize {
                break;
            }
            let is_candidate = {
                let session = shared.lock().await;
                session.is_expired_at(now) && !session.state().is_terminal()
            };
            if is_candidate {
                expired.push(shared);
            }
        }
        Ok(expired)
    }

    async fn evict_terminal(&self, now: OffsetDateTime, limit: u32) -> StoreResult<u64> {
        let mut evicted = 0u64;
        for (upload_id, shared) in self.snapshot() {
            if evicted >= u64::from(limit) {
                break;
            }
            let token = {
                let session = shared.lock().await;
                if !(session.is_expired_at(now) && session.state().is_terminal()) {
                    continue;
                }
                session.session_token()
            };
            if self.sessions.remove(&upload_id).is_some() {
                self.tokens.remove_if(&token, |_, id| *id == upload_id);
                evicted += 1;
            }
        }
        Ok(evicted)
    }

    async fn count_active(&self) -> StoreResult<u64> {
        let mut active = 0u64;
        for (_, shared) in self.snapshot() {
            if !shared.lock().await.state().is_terminal() {
                active += 1;
            }
        }
        Ok(active)
    }
}
