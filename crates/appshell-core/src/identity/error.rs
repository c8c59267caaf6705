//! Error taxonomy for identity service calls.

use thiserror::Error;

/// Substrings the backend uses when a session token is no longer usable.
const MISSING_SCOPE_MARKER: &str = "missing scope";
const INVALID_SESSION_MARKER: &str = "Invalid session";

enum MarkerKind {
    MissingScope,
    InvalidSession,
}

fn marker_kind(message: &str) -> Option<MarkerKind> {
    if message.contains(MISSING_SCOPE_MARKER) {
        Some(MarkerKind::MissingScope)
    } else if message.contains(INVALID_SESSION_MARKER) {
        Some(MarkerKind::InvalidSession)
    } else {
        None
    }
}

/// How the session manager should react to a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The session is gone on the remote side. Clear it locally.
    InvalidSession,
    /// Anything else. Report it and leave local state alone.
    Transient,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Invalid session: {0}")]
    InvalidSession(String),

    #[error("Session is missing scope: {0}")]
    MissingScope(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unexpected response: {0}")]
    Protocol(String),

    #[error("{0}")]
    Other(String),
}

impl IdentityError {
    /// Classify an untyped error message.
    ///
    /// Collaborators that only surface free text still get a typed error;
    /// text carrying neither marker becomes `Other`.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        match marker_kind(&message) {
            Some(MarkerKind::MissingScope) => IdentityError::MissingScope(message),
            Some(MarkerKind::InvalidSession) => IdentityError::InvalidSession(message),
            None => IdentityError::Other(message),
        }
    }

    /// `Other` is untyped text, so it is classified by its markers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            IdentityError::InvalidSession(_) | IdentityError::MissingScope(_) => {
                ErrorKind::InvalidSession
            }
            IdentityError::Other(message) if marker_kind(message).is_some() => {
                ErrorKind::InvalidSession
            }
            IdentityError::Transport(_) | IdentityError::Protocol(_) | IdentityError::Other(_) => {
                ErrorKind::Transient
            }
        }
    }

    pub fn is_invalid_session(&self) -> bool {
        self.kind() == ErrorKind::InvalidSession
    }
}
