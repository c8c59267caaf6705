//! Records exchanged with the identity service.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The signed-in account as reported by the identity service.
///
/// Only `id` is interpreted locally. Everything else the backend returns is
/// kept in `attributes` so consumers can read it without this crate knowing
/// the account schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(rename = "$id", alias = "id")]
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            email: None,
            attributes: Map::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Reply to a current-user lookup.
///
/// `success == false` means the service was reachable but does not consider
/// the session valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentUserResponse {
    pub success: bool,
    #[serde(default)]
    pub data: Option<Identity>,
}

impl CurrentUserResponse {
    pub fn authenticated(identity: Identity) -> Self {
        Self {
            success: true,
            data: Some(identity),
        }
    }

    pub fn rejected() -> Self {
        Self {
            success: false,
            data: None,
        }
    }

    /// The identity, if this reply actually establishes one.
    ///
    /// A `success` reply without data does not.
    pub fn into_identity(self) -> Option<Identity> {
        if self.success {
            self.data
        } else {
            None
        }
    }
}
