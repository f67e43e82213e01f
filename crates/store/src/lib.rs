//! Session registry and expiration reaper for forklift upload sessions.
//!
//! This crate holds live [`UploadSession`](forklift_core::UploadSession)
//! records between requests:
//! - A [`SessionStore`] trait and its in-memory implementation
//! - A [`Reaper`] that cancels and evicts expired sessions

pub mod error;
pub mod reaper;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use reaper::{Reaper, ReaperStats};
pub use store::{MemorySessionStore, SessionStore, SharedSession};
