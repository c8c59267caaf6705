//! Shell configuration.
//!
//! # File Format
//!
//! Stored as `config.json` in the config directory. Every field is optional:
//!
//! ```json
//! {
//!   "identity": {
//!     "endpoint": "https://cloud.appwrite.io/v1",
//!     "projectId": "my-project",
//!     "timeoutSecs": 10
//!   },
//!   "reconcilePolicy": "singleFlight",
//!   "credentialsPath": "/home/me/.config/appshell/session.json",
//!   "logDir": "/home/me/.config/appshell/logs"
//! }
//! ```
//!
//! # Environment Overrides
//!
//! Applied after the file is read:
//!
//! - `APPSHELL_ENDPOINT` - identity endpoint
//! - `APPSHELL_PROJECT` - project id
//! - `APPSHELL_CREDENTIALS` - credential file path
//! - `APPSHELL_LOG_DIR` - error report directory

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::paths::default_config_dir;
use crate::session::ReconcilePolicy;

const CONFIG_FILE_NAME: &str = "config.json";
const CREDENTIALS_FILE_NAME: &str = "session.json";
const DEFAULT_ENDPOINT: &str = "https://cloud.appwrite.io/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Where and how to reach the identity service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IdentityConfig {
    pub endpoint: String,
    pub project_id: String,
    pub timeout_secs: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            project_id: String::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShellConfig {
    pub identity: IdentityConfig,
    pub reconcile_policy: ReconcilePolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

impl ShellConfig {
    /// Read a config file. The file must exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read `config.json` from `dir`, or fall back to defaults if absent.
    pub fn load_from_dir(dir: &Path) -> Result<Self, ConfigError> {
        let path = dir.join(CONFIG_FILE_NAME);
        if path.exists() {
            Self::load(&path)
        } else {
            log::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Apply `APPSHELL_*` variables from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.is_empty());

        if let Some(endpoint) = get("APPSHELL_ENDPOINT") {
            self.identity.endpoint = endpoint;
        }
        if let Some(project) = get("APPSHELL_PROJECT") {
            self.identity.project_id = project;
        }
        if let Some(path) = get("APPSHELL_CREDENTIALS") {
            self.credentials_path = Some(PathBuf::from(path));
        }
        if let Some(dir) = get("APPSHELL_LOG_DIR") {
            self.log_dir = Some(PathBuf::from(dir));
        }
    }

    /// Credential file to use: explicit setting, else `session.json` in the
    /// default config dir.
    pub fn resolved_credentials_path(&self) -> Option<PathBuf> {
        self.credentials_path
            .clone()
            .or_else(|| default_config_dir().map(|dir| dir.join(CREDENTIALS_FILE_NAME)))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let endpoint = &self.identity.endpoint;
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "identity endpoint must be an http(s) URL: {endpoint}"
            )));
        }
        if self.identity.project_id.is_empty() {
            return Err(ConfigError::Invalid("identity project id is empty".into()));
        }
        if self.identity.timeout_secs == 0 {
            return Err(ConfigError::Invalid("identity timeout must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn valid_config() -> ShellConfig {
        let mut config = ShellConfig::default();
        config.identity.project_id = "proj".into();
        config
    }

    mod loading {
        use super::*;

        #[test]
        fn defaults_when_dir_has_no_config() {
            let dir = tempdir().unwrap();
            let config = ShellConfig::load_from_dir(dir.path()).unwrap();
            assert_eq!(config, ShellConfig::default());
            assert_eq!(config.identity.endpoint, DEFAULT_ENDPOINT);
            assert_eq!(config.reconcile_policy, ReconcilePolicy::LastWriterWins);
        }

        #[test]
        fn partial_file_keeps_other_defaults() {
            let dir = tempdir().unwrap();
            fs::write(
                dir.path().join(CONFIG_FILE_NAME),
                r#"{"identity": {"projectId": "p1"}, "reconcilePolicy": "singleFlight"}"#,
            )
            .unwrap();

            let config = ShellConfig::load_from_dir(dir.path()).unwrap();
            assert_eq!(config.identity.project_id, "p1");
            assert_eq!(config.identity.timeout_secs, DEFAULT_TIMEOUT_SECS);
            assert_eq!(config.reconcile_policy, ReconcilePolicy::SingleFlight);
        }

        #[test]
        fn load_missing_file_is_read_error() {
            let dir = tempdir().unwrap();
            let err = ShellConfig::load(&dir.path().join("nope.json")).unwrap_err();
            assert!(matches!(err, ConfigError::Read { .. }));
        }

        #[test]
        fn load_malformed_file_is_parse_error() {
            let dir = tempdir().unwrap();
            let path = dir.path().join(CONFIG_FILE_NAME);
            fs::write(&path, "{ not json").unwrap();

            let err = ShellConfig::load(&path).unwrap_err();
            assert!(matches!(err, ConfigError::Parse { .. }));
            assert!(err.to_string().contains("config.json"));
        }
    }

    mod overrides {
        use super::*;

        #[test]
        fn lookup_values_replace_file_values() {
            let vars: HashMap<&str, &str> = [
                ("APPSHELL_ENDPOINT", "http://localhost/v1"),
                ("APPSHELL_PROJECT", "env-project"),
                ("APPSHELL_CREDENTIALS", "/tmp/creds.json"),
                ("APPSHELL_LOG_DIR", "/tmp/logs"),
            ]
            .into_iter()
            .collect();

            let mut config = ShellConfig::default();
            config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

            assert_eq!(config.identity.endpoint, "http://localhost/v1");
            assert_eq!(config.identity.project_id, "env-project");
            assert_eq!(config.credentials_path, Some(PathBuf::from("/tmp/creds.json")));
            assert_eq!(config.log_dir, Some(PathBuf::from("/tmp/logs")));
        }

        #[test]
        fn empty_values_are_ignored() {
            let mut config = valid_config();
            config.apply_overrides(|_| Some(String::new()));
            assert_eq!(config, valid_config());
        }

        #[test]
        fn explicit_credentials_path_wins() {
            let mut config = valid_config();
            config.credentials_path = Some(PathBuf::from("/x/session.json"));
            assert_eq!(
                config.resolved_credentials_path(),
                Some(PathBuf::from("/x/session.json"))
            );
        }
    }

    mod validation {
        use super::*;

        #[test]
        fn accepts_valid_config() {
            assert!(valid_config().validate().is_ok());
        }

        #[test]
        fn rejects_non_http_endpoint() {
            let mut config = valid_config();
            config.identity.endpoint = "ftp://example.com".into();
            assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        }

        #[test]
        fn rejects_empty_project() {
            let config = ShellConfig::default();
            assert!(config.validate().is_err());
        }

        #[test]
        fn rejects_zero_timeout() {
            let mut config = valid_config();
            config.identity.timeout_secs = 0;
            assert!(config.validate().is_err());
        }
    }
}
