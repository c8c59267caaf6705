//! The identity service collaborator.
//!
//! The session manager never talks to the backend directly. It goes through
//! [`IdentityService`], which has exactly the two calls the session
//! lifecycle needs:
//!
//! - [`IdentityService::get_current_user`] - who does the backend think is signed in?
//! - [`IdentityService::logout`] - invalidate the current session remotely.
//!
//! # Implementations
//!
//! - [`http::HttpIdentityService`] - REST client for the account API
//! - [`scripted::ScriptedIdentityService`] - replays queued replies (tests, offline mode)
//!
//! Failures come back as a typed [`IdentityError`]. The session manager only
//! needs [`IdentityError::kind`] to pick between clearing the session and
//! reporting the failure.

pub mod credentials;
pub mod error;
pub mod http;
pub mod scripted;
pub mod types;

use async_trait::async_trait;

pub use credentials::{CredentialError, CredentialStore};
pub use error::{ErrorKind, IdentityError};
pub use http::HttpIdentityService;
pub use scripted::ScriptedIdentityService;
pub use types::{CurrentUserResponse, Identity};

/// Remote authority on session validity.
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Look up the account bound to the current session.
    async fn get_current_user(&self) -> Result<CurrentUserResponse, IdentityError>;

    /// Invalidate the current session on the remote side.
    async fn logout(&self) -> Result<(), IdentityError>;
}
