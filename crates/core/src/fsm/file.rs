//! File upload session state machine.
//!
//! ```text
//! pending ──ready──▶ processing ──complete──▶ complete
//!    │  └──ready (no processing)──────────────▶ complete
//!    ├──fail──▶ error ◀──fail── processing
//!    └──cancel──▶ canceled ◀──cancel── processing | complete | error
//! ```

use crate::config::UploadConfig;
use crate::status::FileUploadStatus;
use crate::upload::FileUploadSession;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use time::OffsetDateTime;

/// Notice recorded when an expired file upload session is asked to extend.
pub const EXPIRED_EXTEND_NOTICE: &str = "Expired File Upload Sessions cannot be extended";

const MACHINE: &str = "file upload session";

/// File upload session state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileUploadState {
    /// Waiting for the client to transfer bytes.
    Pending,
    /// Bytes received; post-processing in progress.
    Processing,
    /// Accepted and usable for publication.
    Complete,
    /// Failed; only cancellation remains.
    Error,
    /// Canceled.
    Canceled,
}

impl FileUploadState {
    /// Wire name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Complete => "complete",
            Self::Error => "error",
            Self::Canceled => "canceled",
        }
    }

    /// Check if no content-mutating transition remains.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Canceled)
    }
}

impl fmt::Display for FileUploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Events accepted by the file upload session machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileUploadEvent {
    /// Populate mechanism details.
    Prepare,
    /// Client finished transferring bytes. Dispatches to `Process` or `Complete`.
    Ready,
    /// Enter post-processing.
    Process,
    /// Mark the file accepted.
    Complete,
    /// Cancel the upload.
    Cancel,
    /// Record a failure.
    Fail,
    /// Push the expiration out.
    Extend,
}

impl FileUploadEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prepare => "prepare",
            Self::Ready => "ready",
            Self::Process => "process",
            Self::Complete => "complete",
            Self::Cancel => "cancel",
            Self::Fail => "fail",
            Self::Extend => "extend",
        }
    }
}

impl fmt::Display for FileUploadEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The file upload session transition table.
pub fn transition(
    state: FileUploadState,
    event: FileUploadEvent,
) -> crate::Result<FileUploadState> {
    use FileUploadEvent as E;
    use FileUploadState as S;

    let next = match (state, event) {
        (S::Pending, E::Prepare | E::Ready | E::Extend) => S::Pending,
        (S::Pending, E::Process) => S::Processing,
        (S::Pending | S::Processing, E::Complete) => S::Complete,
        (S::Pending | S::Processing, E::Fail) => S::Error,
        (S::Pending | S::Processing | S::Complete | S::Error, E::Cancel) => S::Canceled,
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

/// Transition logic over a borrowed [`FileUploadSession`].
#[derive(Debug)]
pub struct FileUploadSessionController<'a> {
    session: &'a mut FileUploadSession,
    config: &'a UploadConfig,
}

impl<'a> FileUploadSessionController<'a> {
    pub fn new(session: &'a mut FileUploadSession, config: &'a UploadConfig) -> Self {
        Self { session, config }
    }

    /// The underlying record.
    pub fn session(&self) -> &FileUploadSession {
        self.session
    }

    /// Current state.
    pub fn state(&self) -> FileUploadState {
        self.session.state
    }

    fn fire(&mut self, event: FileUploadEvent) -> crate::Result<FileUploadState> {
        let from = self.session.state;
        let to = transition(from, event)?;
        self.session.state = to;
        tracing::debug!(
            file_upload_id = %self.session.id,
            filename = %self.session.filename,
            operation = %event,
            from = %from,
            to = %to,
            "File upload session transition"
        );
        Ok(to)
    }

    /// Ask the mechanism for client instructions. Idempotent.
    pub fn prepare(&mut self) -> crate::Result<()> {
        self.fire(FileUploadEvent::Prepare)?;
        self.session.prepare();
        Ok(())
    }

    /// The client finished uploading bytes.
    ///
    /// Moves to `processing` when the mechanism requires post-processing and
    /// straight to `complete` otherwise.
    pub fn action_ready(&mut self) -> crate::Result<FileUploadState> {
        self.fire(FileUploadEvent::Ready)?;
        if self.session.mechanism.requires_processing() {
            self.process()
        } else {
            self.complete()
        }
    }

    /// Enter post-processing. Normally reached through [`Self::action_ready`].
    pub fn process(&mut self) -> crate::Result<FileUploadState> {
        self.fire(FileUploadEvent::Process)
    }

    /// Mark the file accepted. Post-processing pipelines call this once they
    /// finish with a `processing` file.
    pub fn complete(&mut self) -> crate::Result<FileUploadState> {
        self.fire(FileUploadEvent::Complete)
    }

    /// Record a failure and move to `error`.
    pub fn fail(&mut self, notice: impl Into<String>) -> crate::Result<FileUploadState> {
        let notice = notice.into();
        let state = self.fire(FileUploadEvent::Fail)?;
        tracing::warn!(
            file_upload_id = %self.session.id,
            filename = %self.session.filename,
            notice = %notice,
            "File upload session failed"
        );
        self.session.push_notice(notice);
        Ok(state)
    }

    /// Cancel the upload. Not defined once already canceled.
    pub fn action_cancel(&mut self) -> crate::Result<FileUploadState> {
        let state = self.fire(FileUploadEvent::Cancel)?;
        tracing::info!(
            file_upload_id = %self.session.id,
            filename = %self.session.filename,
            "File upload session canceled"
        );
        Ok(state)
    }

    /// Push the expiration out by `seconds` (clamped to `max_extend_secs`).
    ///
    /// A session whose expiration has already passed cannot be extended: it
    /// moves to `error` with [`EXPIRED_EXTEND_NOTICE`] instead.
    pub fn action_extend(&mut self, seconds: u64) -> crate::Result<FileUploadState> {
        self.extend_at(seconds, OffsetDateTime::now_utc())
    }

    pub(crate) fn extend_at(
        &mut self,
        seconds: u64,
        now: OffsetDateTime,
    ) -> crate::Result<FileUploadState> {
        self.fire(FileUploadEvent::Extend)?;
        if self.session.is_expired_at(now) {
            return self.fail(EXPIRED_EXTEND_NOTICE);
        }
        self.session.expiration = self
            .session
            .expiration
            .saturating_add(self.config.clamp_extend(seconds));
        tracing::debug!(
            file_upload_id = %self.session.id,
            expiration = %self.session.expiration,
            "File upload session extended"
        );
        Ok(self.session.state)
    }

    /// Status snapshot keyed by filename. Valid in every state; never
    /// changes the session.
    pub fn serialize(&self) -> (String, FileUploadStatus) {
        self.serialize_at(OffsetDateTime::now_utc())
    }

    pub(crate) fn serialize_at(&self, now: OffsetDateTime) -> (String, FileUploadStatus) {
        serialize_file(self.session, now)
    }
}

pub(crate) fn serialize_file(
    session: &FileUploadSession,
    now: OffsetDateTime,
) -> (String, FileUploadStatus) {
    let mut mechanism = BTreeMap::new();
    mechanism.insert(
        session.mechanism.name().to_string(),
        session.mechanism_details().cloned().unwrap_or_default(),
    );
    let status = FileUploadStatus {
        valid_for: session.valid_for_at(now),
        mechanism,
        status: session.state,
    };
    (session.filename.clone(), status)
}
