//! Upload session records.
//!
//! These are the state-carrying halves of the two upload state machines.
//! Transition logic lives in [`crate::fsm`]; the `state` fields here are only
//! written by the controllers.

use crate::fsm::file::FileUploadState;
use crate::fsm::session::UploadSessionState;
use crate::hash::SessionToken;
use crate::mechanism::{MechanismDetails, UploadMechanism};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// Unique identifier for an upload session.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UploadSessionId(Uuid);

impl UploadSessionId {
    /// Generate a new random upload session ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from a string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| crate::Error::InvalidSessionId(format!("invalid upload session ID: {e}")))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UploadSessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for UploadSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UploadSessionId({})", self.0)
    }
}

impl fmt::Display for UploadSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a file upload session.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileUploadSessionId(Uuid);

impl FileUploadSessionId {
    /// Generate a new random file upload session ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from a string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s).map(Self).map_err(|e| {
            crate::Error::InvalidSessionId(format!("invalid file upload session ID: {e}"))
        })
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for FileUploadSessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FileUploadSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileUploadSessionId({})", self.0)
    }
}

impl fmt::Display for FileUploadSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Seconds left until `expiration`, clamped at zero.
fn seconds_until(expiration: OffsetDateTime, now: OffsetDateTime) -> i64 {
    (expiration - now).whole_seconds().max(0)
}

/// Declared file metadata supplied when a file upload session is created.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDeclaration {
    /// Artifact filename.
    pub filename: String,
    /// Size in bytes.
    pub size: u64,
    /// Algorithm name → hex digest. Not verified here.
    #[serde(default)]
    pub hashes: BTreeMap<String, String>,
    /// Opaque metadata blob (e.g. serialized core metadata).
    #[serde(default)]
    pub metadata: String,
}

impl FileDeclaration {
    pub fn new(filename: impl Into<String>, size: u64) -> Self {
        Self {
            filename: filename.into(),
            size,
            hashes: BTreeMap::new(),
            metadata: String::new(),
        }
    }

    /// Add a declared digest.
    pub fn with_hash(mut self, algorithm: impl Into<String>, digest: impl Into<String>) -> Self {
        self.hashes.insert(algorithm.into(), digest.into());
        self
    }

    /// Attach the metadata blob.
    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = metadata.into();
        self
    }
}

/// One artifact's upload within an [`UploadSession`].
#[derive(Debug)]
pub struct FileUploadSession {
    /// Unique file upload session identifier.
    pub id: FileUploadSessionId,
    /// Artifact filename.
    pub filename: String,
    /// Declared size in bytes.
    pub size: u64,
    /// Declared digests (algorithm → hex digest).
    pub hashes: BTreeMap<String, String>,
    /// Opaque metadata blob.
    pub metadata: String,
    /// Mechanism the client transfers bytes with. Shared, never mutated.
    pub mechanism: Arc<dyn UploadMechanism>,
    /// When the session was created.
    pub created_at: OffsetDateTime,
    /// When the session expires. Advisory; only `extend` reads it.
    pub expiration: OffsetDateTime,
    mechanism_details: Option<MechanismDetails>,
    notices: Vec<String>,
    pub(crate) state: FileUploadState,
}

impl FileUploadSession {
    /// Create a new pending file upload session.
    pub fn new(
        declaration: FileDeclaration,
        mechanism: Arc<dyn UploadMechanism>,
        expires_in: Duration,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: FileUploadSessionId::new(),
            filename: declaration.filename,
            size: declaration.size,
            hashes: declaration.hashes,
            metadata: declaration.metadata,
            mechanism,
            created_at: now,
            expiration: now.saturating_add(expires_in),
            mechanism_details: None,
            notices: Vec::new(),
            state: FileUploadState::Pending,
        }
    }

    /// Populate `mechanism_details` from the mechanism. Idempotent: once
    /// populated, later calls leave the details untouched.
    pub fn prepare(&mut self) {
        if self.mechanism_details.is_none() {
            self.mechanism_details = Some(self.mechanism.prepare(self.id));
        }
    }

    /// Mechanism instructions, if prepared.
    pub fn mechanism_details(&self) -> Option<&MechanismDetails> {
        self.mechanism_details.as_ref()
    }

    /// Diagnostics accumulated on error transitions, oldest first.
    pub fn notices(&self) -> &[String] {
        &self.notices
    }

    pub(crate) fn push_notice(&mut self, notice: impl Into<String>) {
        self.notices.push(notice.into());
    }

    /// Current state-machine state.
    pub fn state(&self) -> FileUploadState {
        self.state
    }

    /// Seconds left before expiration, clamped at zero.
    pub fn valid_for(&self) -> i64 {
        self.valid_for_at(OffsetDateTime::now_utc())
    }

    /// Seconds left before expiration at `now`, clamped at zero.
    pub fn valid_for_at(&self, now: OffsetDateTime) -> i64 {
        seconds_until(self.expiration, now)
    }

    /// Check if the session has expired.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(OffsetDateTime::now_utc())
    }

    /// Check if the session has expired at `now`.
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expiration < now
    }
}

/// One release's publish attempt.
#[derive(Debug)]
pub struct UploadSession {
    /// Unique session identifier.
    pub id: UploadSessionId,
    /// Nonce mixed into the session token. Changing it after the token was
    /// first read has no effect on the token.
    pub nonce: String,
    /// When the session was created.
    pub created_at: OffsetDateTime,
    /// When the session expires. Advisory; only `extend` and the reaper read it.
    pub expiration: OffsetDateTime,
    project: String,
    version: String,
    session_token: OnceLock<SessionToken>,
    pub(crate) file_upload_sessions: Vec<FileUploadSession>,
    pub(crate) notices: Vec<String>,
    pub(crate) state: UploadSessionState,
}

impl UploadSession {
    /// Create a new pending upload session.
    pub fn new(
        project: impl Into<String>,
        version: impl Into<String>,
        nonce: impl Into<String>,
        expires_in: Duration,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: UploadSessionId::new(),
            nonce: nonce.into(),
            created_at: now,
            expiration: now.saturating_add(expires_in),
            project: project.into(),
            version: version.into(),
            session_token: OnceLock::new(),
            file_upload_sessions: Vec::new(),
            notices: Vec::new(),
            state: UploadSessionState::Pending,
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// The session token, computed on first access and frozen afterwards.
    pub fn session_token(&self) -> SessionToken {
        *self
            .session_token
            .get_or_init(|| SessionToken::derive(&self.project, &self.version, &self.nonce))
    }

    /// File upload sessions in creation order.
    pub fn file_upload_sessions(&self) -> &[FileUploadSession] {
        &self.file_upload_sessions
    }

    /// Look up a file upload session by ID.
    pub fn file_upload_session(&self, id: FileUploadSessionId) -> Option<&FileUploadSession> {
        self.file_upload_sessions.iter().find(|f| f.id == id)
    }

    /// Mutable lookup by ID. State changes still go through
    /// [`FileUploadSessionController`](crate::FileUploadSessionController).
    pub fn file_upload_session_mut(
        &mut self,
        id: FileUploadSessionId,
    ) -> Option<&mut FileUploadSession> {
        self.file_upload_sessions.iter_mut().find(|f| f.id == id)
    }

    /// Diagnostics accumulated on error transitions, oldest first.
    pub fn notices(&self) -> &[String] {
        &self.notices
    }

    pub(crate) fn push_notice(&mut self, notice: impl Into<String>) {
        self.notices.push(notice.into());
    }

    /// Operator reset of accumulated notices. A session in `error` returns to
    /// `pending` on the next `revalidate`.
    pub fn clear_notices(&mut self) {
        self.notices.clear();
    }

    /// Whether any notices have been recorded.
    pub fn has_errors(&self) -> bool {
        !self.notices.is_empty()
    }

    /// Whether no file upload session is `pending` or `error`.
    ///
    /// A `processing` file does not block publishing. Callers hold the
    /// session exclusively while this runs, so the children's states form a
    /// single consistent snapshot.
    pub fn can_publish(&self) -> bool {
        self.file_upload_sessions.iter().all(|file| {
            !matches!(
                file.state(),
                FileUploadState::Pending | FileUploadState::Error
            )
        })
    }

    /// Current state-machine state.
    pub fn state(&self) -> UploadSessionState {
        self.state
    }

    /// Seconds left before expiration, clamped at zero.
    pub fn valid_for(&self) -> i64 {
        self.valid_for_at(OffsetDateTime::now_utc())
    }

    /// Seconds left before expiration at `now`, clamped at zero.
    pub fn valid_for_at(&self, now: OffsetDateTime) -> i64 {
        seconds_until(self.expiration, now)
    }

    /// Check if the session has expired.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(OffsetDateTime::now_utc())
    }

    /// Check if the session has expired at `now`.
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expiration < now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mechanism::HttpPostApplicationOctetStream;

    fn sample_file(expires_in: Duration) -> FileUploadSession {
        FileUploadSession::new(
            FileDeclaration::new("demo-1.0.0.tar.gz", 1000).with_hash("sha256", "ab"),
            Arc::new(HttpPostApplicationOctetStream::default()),
            expires_in,
        )
    }

    #[test]
    fn test_session_id_roundtrip() {
        let id = UploadSessionId::new();
        let parsed = UploadSessionId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
        assert!(UploadSessionId::parse("not-a-uuid").is_err());

        let id = FileUploadSessionId::new();
        let parsed = FileUploadSessionId::parse(&id.to_string()).unwrap();
        assert_eq!(id.as_uuid(), parsed.as_uuid());
        assert!(FileUploadSessionId::parse("").is_err());
    }

    #[test]
    fn test_file_prepare_is_idempotent() {
        let mut file = sample_file(Duration::hours(1));
        assert!(file.mechanism_details().is_none());
        file.prepare();
        let first = file.mechanism_details().cloned();
        assert!(first.is_some());
        file.prepare();
        assert_eq!(file.mechanism_details().cloned(), first);
    }

    #[test]
    fn test_valid_for_clamps_at_zero() {
        let file = sample_file(Duration::seconds(-30));
        assert_eq!(file.valid_for(), 0);
        assert!(file.is_expired());

        let file = sample_file(Duration::hours(1));
        let at = file.created_at + Duration::minutes(10);
        assert_eq!(file.valid_for_at(at), 3000);
        assert!(!file.is_expired_at(at));
    }

    #[test]
    fn test_oversized_lifetime_saturates() {
        let lifetime = Duration::seconds(1_000_000_000_000);
        let session = UploadSession::new("demo", "1.0.0", "", lifetime);
        assert!(session.expiration > session.created_at);
        assert!(session.valid_for() > 0);

        let file = sample_file(Duration::MAX);
        assert!(file.expiration > file.created_at);
    }

    #[test]
    fn test_session_defaults() {
        let session = UploadSession::new("demo", "1.0.0", "", Duration::days(1));
        assert_eq!(session.state(), UploadSessionState::Pending);
        assert!(!session.has_errors());
        assert!(session.file_upload_sessions().is_empty());
        assert!(session.can_publish());
        assert!(session.valid_for() > 86000);
    }

    #[test]
    fn test_session_token_is_memoized() {
        let mut session = UploadSession::new("demo", "1.0.0", "", Duration::days(1));
        let token = session.session_token();
        assert_eq!(token, SessionToken::derive("demo", "1.0.0", ""));

        session.nonce = "changed".to_string();
        assert_eq!(session.session_token(), token);
    }

    #[test]
    fn test_notices_drive_has_errors() {
        let mut session = UploadSession::new("demo", "1.0.0", "", Duration::days(1));
        session.push_notice("boom");
        assert!(session.has_errors());
        session.clear_notices();
        assert!(!session.has_errors());
    }
}
