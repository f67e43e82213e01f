//! Upload state machines.
//!
//! Each machine is a closed state enum, an event enum, and a `transition`
//! table mapping `(state, event)` to the next state or an invalid-transition
//! error. Controllers borrow a session record, fire events through the table,
//! and apply the side effects that go with them.

pub mod file;
pub mod session;

pub use file::{FileUploadEvent, FileUploadSessionController, FileUploadState};
pub use session::{UploadSessionController, UploadSessionEvent, UploadSessionState};
