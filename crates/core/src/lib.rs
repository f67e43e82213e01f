//! Upload session state machines for a package index.
//!
//! This crate models the release publish flow of an upload API:
//! - Upload mechanisms and the mechanism registry
//! - File upload sessions (one per artifact) and their state machine
//! - Upload sessions (one per release) that gate publication on their files
//! - Session tokens and serialized status snapshots
//!
//! Nothing here performs I/O. Storage, HTTP routing, authentication and
//! persistence belong to the embedding service.

pub mod config;
pub mod context;
pub mod error;
pub mod fsm;
pub mod hash;
pub mod mechanism;
pub mod status;
pub mod upload;

pub use context::UploadContext;
pub use error::{Error, Result};
pub use fsm::{
    FileUploadSessionController, FileUploadState, UploadSessionController, UploadSessionState,
};
pub use hash::SessionToken;
pub use mechanism::{
    HTTP_POST_APPLICATION_OCTET_STREAM, HttpPostApplicationOctetStream, MechanismDetails,
    MechanismRegistry, UploadMechanism,
};
pub use status::{FileUploadStatus, UploadSessionStatus};
pub use upload::{
    FileDeclaration, FileUploadSession, FileUploadSessionId, UploadSession, UploadSessionId,
};
