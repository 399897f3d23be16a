//! Session lifecycle: `idle → connecting → open → closed`, with `error`
//! terminal from `connecting` and `open`.
//!
//! [`SessionController`] owns the state machine; the live resources of an
//! open session sit in a private handle that is torn down exactly once.

pub mod config;
pub mod controller;
mod handle;
pub mod state;
pub mod summary;

pub use config::SessionConfig;
pub use controller::{SessionClient, SessionController, SessionEvent, SessionEvents, StartOptions};
pub use state::{FailureCause, SessionState};
pub use summary::SessionSummary;
