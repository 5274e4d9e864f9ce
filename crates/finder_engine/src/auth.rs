//! Credential loading through an injected store, plus saving to a JSON file.
//!
//! The pipeline never reads credentials from a fixed location on its own; the
//! caller hands it a [`CredentialStore`] and the store decides where secrets
//! live.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{AtomicFileWriter, ConfigError, PersistError};

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client_id.trim().is_empty() {
            return Err(ConfigError::MalformedCredentials {
                reason: "client_id is empty".into(),
            });
        }
        if self.client_secret.trim().is_empty() {
            return Err(ConfigError::MalformedCredentials {
                reason: "client_secret is empty".into(),
            });
        }
        Ok(())
    }

    /// Secret with everything but the last four characters replaced.
    pub fn masked_secret(&self) -> String {
        let chars: Vec<char> = self.client_secret.chars().collect();
        // Short secrets are hidden entirely.
        let hidden = if chars.len() > 8 {
            chars.len() - 4
        } else {
            chars.len()
        };
        let shown: String = chars[hidden..].iter().collect();
        format!("{}{}", "*".repeat(hidden.max(4)), shown)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.masked_secret())
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<Credentials, ConfigError>;
}

/// Reads `{client_id, client_secret, redirect_uri?}` from a JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileCredentialStore {
    path: PathBuf,
}

impl JsonFileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Validates `credentials` and replaces the file atomically, creating its
    /// directory when missing. Returns the written path.
    pub fn save(&self, credentials: &Credentials) -> Result<PathBuf, ConfigError> {
        credentials.validate()?;
        let save_error = |source| ConfigError::SaveCredentials {
            path: self.path.clone(),
            source,
        };
        let filename = self
            .path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                save_error(PersistError::OutputDir {
                    dir: self.path.clone(),
                    reason: "path does not name a file".to_string(),
                })
            })?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut content = serde_json::to_string_pretty(credentials).map_err(|err| {
            ConfigError::MalformedCredentials {
                reason: err.to_string(),
            }
        })?;
        content.push('\n');
        AtomicFileWriter::new(dir)
            .write(filename, &content)
            .map_err(save_error)
    }
}

impl CredentialStore for JsonFileCredentialStore {
    fn load(&self) -> Result<Credentials, ConfigError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::MissingCredentials {
                    path: self.path.clone(),
                });
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        let credentials: Credentials =
            serde_json::from_str(&content).map_err(|err| ConfigError::MalformedCredentials {
                reason: err.to_string(),
            })?;
        credentials.validate()?;
        Ok(credentials)
    }
}

/// Holds credentials in memory, e.g. when they come from a keychain prompt.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialStore {
    credentials: Option<Credentials>,
}

impl StaticCredentialStore {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials: Some(credentials),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

impl CredentialStore for StaticCredentialStore {
    fn load(&self) -> Result<Credentials, ConfigError> {
        let credentials = self.credentials.clone().ok_or(ConfigError::NoCredentials)?;
        credentials.validate()?;
        Ok(credentials)
    }
}
