use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Problems detected before a run is created; no network call has happened yet.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("credentials file not found at {path:?}")]
    MissingCredentials { path: PathBuf },
    #[error("no credentials configured")]
    NoCredentials,
    #[error("malformed credentials: {reason}")]
    MalformedCredentials { reason: String },
    #[error("query has no genres")]
    EmptyQuery,
    #[error("genre #{index} is blank")]
    BlankGenre { index: usize },
    #[error("page size {0} outside 1..={max}", max = crate::MAX_PAGE_SIZE)]
    InvalidPageSize(u32),
    #[error("io error reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },    #[error("could not save credentials to {path:?}")]
    SaveCredentials {
        path: PathBuf,
        #[source]
        source: crate::PersistError,
    },
}

#[derive(Debug, Error)]
pub enum StartError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error("a run is already active on this pipeline")]
    AlreadyRunning,
    #[error("could not spawn the run thread")]
    Spawn(#[source] std::io::Error),
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog rejected credentials (status {status}): {message}")]
    Auth { status: u16, message: String },

    #[error("transient catalog failure: {message}")]
    Transient {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("not found: {resource}")]
    NotFound { resource: String },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("could not decode {context}: {source}")]
    Decode {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid catalog url: {0}")]
    InvalidUrl(String),
}

impl CatalogError {
    pub(crate) fn transient(message: impl Into<String>) -> Self {
        CatalogError::Transient {
            message: message.into(),
            retry_after: None,
        }
    }

    /// Only transient failures are worth another attempt.
    pub fn is_retriable(&self) -> bool {
        matches!(self, CatalogError::Transient { .. })
    }
}

impl From<reqwest::Error> for CatalogError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
                return CatalogError::Auth {
                    status: status.as_u16(),
                    message: err.to_string(),
                };
            }
        }
        CatalogError::transient(err.to_string())
    }
}
