//! Upload session state machine.
//!
//! ```text
//! pending ──publish (all files settled)──▶ published
//!    │ ▲
//!    │ └──revalidate (no notices)──┐
//!    ├──fail / publish blocked──▶ error
//!    └──cancel──▶ canceled ◀──cancel── error
//! ```
//!
//! `create_file_upload_session` is a self-loop in both `pending` and `error`.

use crate::context::UploadContext;
use crate::fsm::file::{FileUploadSessionController, serialize_file};
use crate::status::UploadSessionStatus;
use crate::upload::{FileDeclaration, FileUploadSession, FileUploadSessionId, UploadSession};
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

/// Notice recorded when publishing is attempted with unsettled files.
pub const PUBLISH_BLOCKED_NOTICE: &str = "Upload Session could not be published";

/// Notice recorded when an expired upload session is asked to extend.
pub const EXPIRED_EXTEND_NOTICE: &str = "Expired Upload Sessions cannot be extended";

const MACHINE: &str = "upload session";

/// Upload session state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadSessionState {
    /// Accepting files.
    Pending,
    /// The release was published.
    Published,
    /// A notice was recorded; files may still be added.
    Error,
    /// Canceled.
    Canceled,
}

impl UploadSessionState {
    /// Wire name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Published => "published",
            Self::Error => "error",
            Self::Canceled => "canceled",
        }
    }

    /// Check if the session reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Published | Self::Canceled)
    }
}

impl fmt::Display for UploadSessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Events accepted by the upload session machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UploadSessionEvent {
    /// Add a file upload session.
    CreateFileUploadSession,
    /// Request publication. Dispatches to `MarkPublished` or `Fail`.
    Publish,
    /// Commit the publication.
    MarkPublished,
    /// Cancel the session.
    Cancel,
    /// Return from `error` to `pending`.
    ClearErrors,
    /// Re-check whether an `error` session still has notices.
    Revalidate,
    /// Record a failure.
    Fail,
    /// Push the expiration out.
    Extend,
}

impl UploadSessionEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateFileUploadSession => "create_file_upload_session",
            Self::Publish => "publish",
            Self::MarkPublished => "mark_published",
            Self::Cancel => "cancel",
            Self::ClearErrors => "clear_errors",
            Self::Revalidate => "revalidate",
            Self::Fail => "fail",
            Self::Extend => "extend",
        }
    }
}

impl fmt::Display for UploadSessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The upload session transition table.
///
/// `Fail` also loops on `error` so every failed operation in `error` (such as
/// an unknown mechanism) still records exactly one notice.
pub fn transition(
    state: UploadSessionState,
    event: UploadSessionEvent,
) -> crate::Result<UploadSessionState> {
    use UploadSessionEvent as E;
    use UploadSessionState as S;

    let next = match (state, event) {
        (S::Pending, E::CreateFileUploadSession | E::Publish | E::Extend) => S::Pending,
        (S::Error, E::CreateFileUploadSession | E::Revalidate) => S::Error,
        (S::Pending, E::MarkPublished) => S::Published,
        (S::Pending | S::Error, E::Fail) => S::Error,
        (S::Pending | S::Error, E::Cancel) => S::Canceled,
        (S::Error, E::ClearErrors) => S::Pending,
        _ => {
            return Err(crate::Error::InvalidTransition {
                machine: MACHINE,
                state: state.as_str(),
                operation: event.as_str(),
            });
        }
    };
    Ok(next)
}

/// Transition logic over a borrowed [`UploadSession`].
#[derive(Debug)]
pub struct UploadSessionController<'a> {
    session: &'a mut UploadSession,
    context: &'a UploadContext,
}

impl<'a> UploadSessionController<'a> {
    pub fn new(session: &'a mut UploadSession, context: &'a UploadContext) -> Self {
        Self { session, context }
    }

    /// The underlying record.
    pub fn session(&self) -> &UploadSession {
        self.session
    }

    /// Current state.
    pub fn state(&self) -> UploadSessionState {
        self.session.state
    }

    fn fire(&mut self, event: UploadSessionEvent) -> crate::Result<UploadSessionState> {
        let from = self.session.state;
        let to = transition(from, event)?;
        self.session.state = to;
        tracing::debug!(
            upload_id = %self.session.id,
            operation = %event,
            from = %from,
            to = %to,
            "Upload session transition"
        );
        Ok(to)
    }

    /// Record a failure and move to `error`.
    pub fn fail(&mut self, notice: impl Into<String>) -> crate::Result<UploadSessionState> {
        let notice = notice.into();
        let state = self.fire(UploadSessionEvent::Fail)?;
        tracing::warn!(
            upload_id = %self.session.id,
            project = %self.session.project(),
            version = %self.session.version(),
            notice = %notice,
            "Upload session error"
        );
        self.session.push_notice(notice);
        Ok(state)
    }

    /// Declare a new file and prepare its upload.
    ///
    /// Returns the prepared child's controller, or `None` when `mechanism` is
    /// not registered; in that case the session moves to `error` with a
    /// notice naming the mechanism and no child is added.
    pub fn create_file_upload_session(
        &mut self,
        declaration: FileDeclaration,
        mechanism: &str,
    ) -> crate::Result<Option<FileUploadSessionController<'_>>> {
        self.fire(UploadSessionEvent::CreateFileUploadSession)?;

        let context = self.context;
        let Some(found) = context.mechanisms().get(mechanism) else {
            self.fail(format!("Unknown upload mechanism: {mechanism}"))?;
            return Ok(None);
        };

        let mut file = FileUploadSession::new(
            declaration,
            found,
            context.config().file_session_lifetime(),
        );
        FileUploadSessionController::new(&mut file, context.config()).prepare()?;

        tracing::info!(
            upload_id = %self.session.id,
            file_upload_id = %file.id,
            filename = %file.filename,
            mechanism = %mechanism,
            "File upload session created"
        );

        self.session.file_upload_sessions.push(file);
        Ok(self
            .session
            .file_upload_sessions
            .last_mut()
            .map(|file| FileUploadSessionController::new(file, context.config())))
    }

    /// Controller for an existing file upload session.
    pub fn file(&mut self, id: FileUploadSessionId) -> Option<FileUploadSessionController<'_>> {
        let context = self.context;
        let config = context.config();
        self.session
            .file_upload_session_mut(id)
            .map(|file| FileUploadSessionController::new(file, config))
    }

    /// Publish the release if no file is `pending` or `error`; otherwise
    /// move to `error` with [`PUBLISH_BLOCKED_NOTICE`].
    pub fn action_publish(&mut self) -> crate::Result<UploadSessionState> {
        self.fire(UploadSessionEvent::Publish)?;
        if !self.session.can_publish() {
            return self.fail(PUBLISH_BLOCKED_NOTICE);
        }
        let state = self.fire(UploadSessionEvent::MarkPublished)?;
        tracing::info!(
            upload_id = %self.session.id,
            project = %self.session.project(),
            version = %self.session.version(),
            files = self.session.file_upload_sessions.len(),
            "Upload session published"
        );
        Ok(state)
    }

    /// Cancel the session. File upload sessions keep their own states.
    pub fn action_cancel(&mut self) -> crate::Result<UploadSessionState> {
        let state = self.fire(UploadSessionEvent::Cancel)?;
        tracing::info!(upload_id = %self.session.id, "Upload session canceled");
        Ok(state)
    }

    /// In `error`, return to `pending` once the session has no notices.
    ///
    /// Notices only disappear through [`UploadSession::clear_notices`].
    pub fn revalidate(&mut self) -> crate::Result<UploadSessionState> {
        let state = self.fire(UploadSessionEvent::Revalidate)?;
        if self.session.has_errors() {
            return Ok(state);
        }
        self.fire(UploadSessionEvent::ClearErrors)
    }

    /// Push the expiration out by `seconds` (clamped to `max_extend_secs`).
    ///
    /// A session whose expiration has already passed cannot be extended: it
    /// moves to `error` with [`EXPIRED_EXTEND_NOTICE`] instead.
    pub fn action_extend(&mut self, seconds: u64) -> crate::Result<UploadSessionState> {
        self.extend_at(seconds, OffsetDateTime::now_utc())
    }

    pub(crate) fn extend_at(
        &mut self,
        seconds: u64,
        now: OffsetDateTime,
    ) -> crate::Result<UploadSessionState> {
        self.fire(UploadSessionEvent::Extend)?;
        if self.session.is_expired_at(now) {
            return self.fail(EXPIRED_EXTEND_NOTICE);
        }
        self.session.expiration = self
            .session
            .expiration
            .saturating_add(self.context.config().clamp_extend(seconds));
        tracing::debug!(
            upload_id = %self.session.id,
            expiration = %self.session.expiration,
            "Upload session extended"
        );
        Ok(self.session.state)
    }

    /// Status snapshot of the session and every file. Valid in every state;
    /// never changes the session.
    pub fn serialize(&self) -> UploadSessionStatus {
        self.serialize_at(OffsetDateTime::now_utc())
    }

    pub(crate) fn serialize_at(&self, now: OffsetDateTime) -> UploadSessionStatus {
        serialize_session(self.session, self.context, now)
    }
}

/// Build the status snapshot without borrowing the session mutably.
pub fn serialize_session(
    session: &UploadSession,
    context: &UploadContext,
    now: OffsetDateTime,
) -> UploadSessionStatus {
    UploadSessionStatus {
        mechanisms: context.mechanisms().names(),
        session_token: session.session_token().to_hex(),
        valid_for: session.valid_for_at(now),
        files: session
            .file_upload_sessions
            .iter()
            .map(|file| serialize_file(file, now))
            .collect(),
        notices: session.notices.clone(),
        status: session.state,
    }
}
