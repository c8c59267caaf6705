//! Session secret persistence.
//!
//! # File Format
//!
//! ```json
//! {
//!   "sessionSecret": "a1b2c3...",
//!   "savedAt": "2026-02-04T10:15:30.123Z"
//! }
//! ```
//!
//! A missing file means "no credential" and is not an error.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Failed to access credential file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse credential file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredCredential {
    session_secret: String,
    saved_at: DateTime<Utc>,
}

/// File-backed store for the backend session secret.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored secret, `None` if nothing has been saved.
    pub fn load(&self) -> Result<Option<String>, CredentialError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&self.path)?;
        let stored: StoredCredential = serde_json::from_str(&contents)?;
        Ok(Some(stored.session_secret))
    }

    /// Save the secret using write-then-rename.
    pub fn save(&self, session_secret: &str) -> Result<(), CredentialError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let stored = StoredCredential {
            session_secret: session_secret.to_string(),
            saved_at: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&stored)?;

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, json)?;
        fs::rename(&temp_path, &self.path)?;

        Ok(())
    }

    /// Remove the stored secret. Clearing an empty store is a no-op.
    pub fn clear(&self) -> Result<(), CredentialError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
