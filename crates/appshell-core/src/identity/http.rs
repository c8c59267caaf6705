//! REST client for the backend account API.
//!
//! # Endpoints
//!
//! - `GET {endpoint}/account` - current account for the session
//! - `DELETE {endpoint}/account/sessions/current` - invalidate the session
//!
//! Every request carries `X-Appwrite-Project` and, when a session secret is
//! known, `X-Appwrite-Session`.
//!
//! # Status Mapping
//!
//! | status | result |
//! |--------|--------|
//! | 2xx | `CurrentUserResponse { success: true, data }` |
//! | 401 / 403 | typed error from the body's `type`, else classified by `message` |
//! | 404 | `CurrentUserResponse { success: false }` |
//! | other | `IdentityError::Protocol` |
//! | no response | `IdentityError::Transport` |
//!
//! ureq is blocking, so each call runs on tokio's blocking pool.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::credentials::CredentialStore;
use super::error::IdentityError;
use super::types::{CurrentUserResponse, Identity};
use super::IdentityService;
use crate::config::IdentityConfig;

const PROJECT_HEADER: &str = "X-Appwrite-Project";
const SESSION_HEADER: &str = "X-Appwrite-Session";

/// Error body returned by the account API.
#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default, rename = "type")]
    error_type: String,
}

pub struct HttpIdentityService {
    agent: ureq::Agent,
    endpoint: String,
    project_id: String,
    session_secret: Arc<Mutex<Option<String>>>,
    credentials: Option<CredentialStore>,
}

impl HttpIdentityService {
    pub fn new(config: &IdentityConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build();

        Self {
            agent,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            project_id: config.project_id.clone(),
            session_secret: Arc::new(Mutex::new(None)),
            credentials: None,
        }
    }

    /// Back the session secret with a credential file.
    ///
    /// An unreadable file is logged and treated as empty.
    pub fn with_credentials(mut self, store: CredentialStore) -> Self {
        match store.load() {
            Ok(secret) => *self.lock_secret() = secret,
            Err(e) => log::warn!(
                "Ignoring unreadable credential file {}: {}",
                store.path().display(),
                e
            ),
        }
        self.credentials = Some(store);
        self
    }

    /// Install the secret of a freshly created session.
    pub fn set_session_secret(&self, secret: impl Into<String>) {
        let secret = secret.into();
        if let Some(store) = &self.credentials {
            if let Err(e) = store.save(&secret) {
                log::warn!("Failed to persist session secret: {}", e);
            }
        }
        *self.lock_secret() = Some(secret);
    }

    pub fn has_session_secret(&self) -> bool {
        self.lock_secret().is_some()
    }

    fn lock_secret(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.session_secret
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn clear_session_secret(&self) {
        *self.lock_secret() = None;
        if let Some(store) = &self.credentials {
            if let Err(e) = store.clear() {
                log::warn!("Failed to remove credential file: {}", e);
            }
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    fn request(&self, method: &str, path: &str, secret: &str) -> ureq::Request {
        self.agent
            .request(method, &self.url(path))
            .set(PROJECT_HEADER, &self.project_id)
            .set(SESSION_HEADER, secret)
    }
}

/// Turn an error status and its body into the reply or typed error it means.
fn classify_status(status: u16, body: &str) -> Result<CurrentUserResponse, IdentityError> {
    let parsed: ApiErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = if parsed.message.is_empty() {
        format!("status {status}")
    } else {
        parsed.message
    };

    match status {
        401 | 403 => Err(match parsed.error_type.as_str() {
            "general_unauthorized_scope" => IdentityError::MissingScope(message),
            "user_unauthorized" | "user_session_not_found" | "user_jwt_invalid"
            | "user_invalid_token" => IdentityError::InvalidSession(message),
            _ => IdentityError::from_message(message),
        }),
        404 => Ok(CurrentUserResponse::rejected()),
        _ => Err(IdentityError::Protocol(message)),
    }
}

fn transport_error(err: ureq::Transport) -> IdentityError {
    IdentityError::Transport(err.to_string())
}

async fn run_blocking<T, F>(f: F) -> Result<T, IdentityError>
where
    F: FnOnce() -> Result<T, IdentityError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| IdentityError::Other(format!("Identity request task failed: {e}")))?
}

#[async_trait]
impl IdentityService for HttpIdentityService {
    async fn get_current_user(&self) -> Result<CurrentUserResponse, IdentityError> {
        let Some(secret) = self.lock_secret().clone() else {
            log::debug!("No session secret, skipping account lookup");
            return Ok(CurrentUserResponse::rejected());
        };

        let request = self.request("GET", "/account", &secret);
        run_blocking(move || match request.call() {
            Ok(response) => {
                let identity: Identity = response
                    .into_json()
                    .map_err(|e| IdentityError::Protocol(format!("Invalid account body: {e}")))?;
                Ok(CurrentUserResponse::authenticated(identity))
            }
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_string().unwrap_or_default();
                classify_status(status, &body)
            }
            Err(ureq::Error::Transport(t)) => Err(transport_error(t)),
        })
        .await
    }

    async fn logout(&self) -> Result<(), IdentityError> {
        let Some(secret) = self.lock_secret().clone() else {
            return Ok(());
        };

        let request = self.request("DELETE", "/account/sessions/current", &secret);
        let result = run_blocking(move || match request.call() {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_string().unwrap_or_default();
                classify_status(status, &body).map(|_| ())
            }
            Err(ureq::Error::Transport(t)) => Err(transport_error(t)),
        })
        .await;

        // The secret is useless once logout was attempted, whatever the outcome.
        self.clear_session_secret();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_config() -> IdentityConfig {
        IdentityConfig {
            endpoint: "http://127.0.0.1:9/v1/".to_string(),
            project_id: "proj".to_string(),
            timeout_secs: 1,
        }
    }

    mod classify_status {
        use super::*;

        #[test]
        fn scope_error_type_is_missing_scope() {
            let body = r#"{"message":"User (role: guests) missing scope (account)","code":401,"type":"general_unauthorized_scope"}"#;
            let err = classify_status(401, body).unwrap_err();
            assert!(matches!(err, IdentityError::MissingScope(_)));
        }

        #[test]
        fn session_not_found_is_invalid_session() {
            let body = r#"{"message":"Session not found","type":"user_session_not_found"}"#;
            let err = classify_status(401, body).unwrap_err();
            assert_eq!(err, IdentityError::InvalidSession("Session not found".into()));
        }

        #[test]
        fn unknown_type_falls_back_to_message_markers() {
            let body = r#"{"message":"Invalid session for this project","type":"something_new"}"#;
            let err = classify_status(403, body).unwrap_err();
            assert!(err.is_invalid_session());
        }

        #[test]
        fn unauthorized_without_markers_is_transient() {
            let body = r#"{"message":"Rate limit exceeded","type":"general_rate_limit_exceeded"}"#;
            let err = classify_status(401, body).unwrap_err();
            assert!(!err.is_invalid_session());
        }

        #[test]
        fn not_found_is_rejected_reply() {
            let reply = classify_status(404, "").unwrap();
            assert!(!reply.success);
        }

        #[test]
        fn server_error_is_protocol() {
            let err = classify_status(503, "upstream unavailable").unwrap_err();
            assert_eq!(err, IdentityError::Protocol("status 503".into()));
        }
    }

    mod service {
        use super::*;

        #[test]
        fn new_trims_trailing_slash() {
            let service = HttpIdentityService::new(&test_config());
            assert_eq!(service.url("/account"), "http://127.0.0.1:9/v1/account");
        }

        #[test]
        fn with_credentials_loads_secret() {
            let dir = tempdir().unwrap();
            let store = CredentialStore::new(dir.path().join("session.json"));
            store.save("secret").unwrap();

            let service = HttpIdentityService::new(&test_config()).with_credentials(store);
            assert!(service.has_session_secret());
        }

        #[test]
        fn set_session_secret_persists() {
            let dir = tempdir().unwrap();
            let store = CredentialStore::new(dir.path().join("session.json"));
            let service = HttpIdentityService::new(&test_config()).with_credentials(store.clone());

            service.set_session_secret("fresh");
            assert_eq!(store.load().unwrap(), Some("fresh".to_string()));
        }

        #[tokio::test]
        async fn get_current_user_without_secret_is_rejected() {
            let service = HttpIdentityService::new(&test_config());
            let reply = service.get_current_user().await.unwrap();
            assert!(!reply.success);
        }

        #[tokio::test]
        async fn logout_without_secret_is_noop() {
            let service = HttpIdentityService::new(&test_config());
            assert!(service.logout().await.is_ok());
        }

        #[tokio::test]
        async fn unreachable_backend_is_transport_error() {
            let service = HttpIdentityService::new(&test_config());
            service.set_session_secret("secret");

            let err = service.get_current_user().await.unwrap_err();
            assert!(matches!(err, IdentityError::Transport(_)));
        }

        #[tokio::test]
        async fn failed_logout_still_clears_secret() {
            let dir = tempdir().unwrap();
            let store = CredentialStore::new(dir.path().join("session.json"));
            let service = HttpIdentityService::new(&test_config()).with_credentials(store.clone());
            service.set_session_secret("secret");

            assert!(service.logout().await.is_err());
            assert!(!service.has_session_secret());
            assert_eq!(store.load().unwrap(), None);
        }
    }
}
