//! Session state and the events describing its changes.

use serde::{Deserialize, Serialize};

use crate::identity::Identity;

/// Authentication status of the running process.
///
/// Starts as `{ user: None, loading: true }`. `loading` flips to false once,
/// after the first reconciliation, and never comes back. While `loading` is
/// true, `user` is not final and must not drive UI decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user: Option<Identity>,
    pub loading: bool,
}

impl Session {
    pub fn new() -> Self {
        Self {
            user: None,
            loading: true,
        }
    }

    /// True once loading is over and a user is present.
    pub fn is_authenticated(&self) -> bool {
        !self.loading && self.user.is_some()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|user| user.id.as_str())
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Why a user was removed from the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SignOutReason {
    /// The identity service no longer accepts the session.
    Invalidated,
    /// Explicit logout.
    Logout,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SessionEvent {
    /// The initial reconciliation finished.
    Loaded { authenticated: bool },
    SignedIn { user_id: String },
    SignedOut { reason: SignOutReason },
    /// A reconciliation failed without invalidating the session.
    ReconcileFailed { message: String },
    Disposed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    mod session {
        use super::*;

        #[test]
        fn new_is_loading_without_user() {
            let session = Session::new();
            assert!(session.loading);
            assert!(session.user.is_none());
            assert_eq!(session, Session::default());
        }

        #[test]
        fn loading_session_is_never_authenticated() {
            let session = Session {
                user: Some(Identity::new("u1")),
                loading: true,
            };
            assert!(!session.is_authenticated());
        }

        #[test]
        fn loaded_session_with_user_is_authenticated() {
            let session = Session {
                user: Some(Identity::new("u1")),
                loading: false,
            };
            assert!(session.is_authenticated());
            assert_eq!(session.user_id(), Some("u1"));
        }

        #[test]
        fn serializes_user_and_loading() {
            let session = Session {
                user: None,
                loading: false,
            };
            assert_eq!(
                serde_json::to_value(&session).unwrap(),
                json!({"user": null, "loading": false})
            );
        }
    }

    mod session_event {
        use super::*;

        #[test]
        fn tagged_by_kind() {
            let value = serde_json::to_value(SessionEvent::Loaded {
                authenticated: true,
            })
            .unwrap();
            assert_eq!(value, json!({"kind": "loaded", "authenticated": true}));
        }

        #[test]
        fn field_names_are_camel_case() {
            let value = serde_json::to_value(SessionEvent::ReconcileFailed {
                message: "down".into(),
            })
            .unwrap();
            assert_eq!(value, json!({"kind": "reconcileFailed", "message": "down"}));
        }

        #[test]
        fn unit_variant_has_only_kind() {
            let value = serde_json::to_value(SessionEvent::Disposed).unwrap();
            assert_eq!(value, json!({"kind": "disposed"}));
        }
    }
}
