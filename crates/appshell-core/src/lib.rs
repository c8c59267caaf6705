//! # appshell-core
//!
//! Session lifecycle core for the app shell.
//!
//! This crate is framework-agnostic and can be used by:
//! - the UI render layer (via [`ShellContext`])
//! - the `appshell` daemon CLI
//!
//! ## Key Concepts
//!
//! - **Session**: the process's authentication status, `(user, loading)`
//! - **Identity service**: the remote authority on whether a session is valid
//! - **Reconciliation**: syncing the local `user` with the identity service
//! - **SessionEvent**: broadcast on every observable session change

pub mod config;
pub mod context;
pub mod event_bus;
pub mod identity;
pub mod logging;
pub mod navigation;
pub mod paths;
pub mod session;

// Re-export commonly used types
pub use config::ShellConfig;
pub use context::ShellContext;
pub use identity::{Identity, IdentityError, IdentityService};
pub use navigation::RootStack;
pub use session::{ReconcilePolicy, Session, SessionEvent, SessionManager};
