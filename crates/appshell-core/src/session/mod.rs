//! Authentication session for the running process.
//!
//! One [`SessionManager`] per process owns the [`Session`]; the UI reads
//! snapshots from it and reacts to [`SessionEvent`]s.

mod manager;
mod state;

pub use manager::{ReconcilePolicy, SessionManager};
pub use state::{Session, SessionEvent, SignOutReason};
