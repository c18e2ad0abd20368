use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GateError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Lock poisoned: {0}")]
    LockPoisoned(&'static str),
    #[error("Logging error: {0}")]
    Logging(String),
    #[error("Redirect flow stopped in state {0}")]
    UnexpectedState(&'static str),
}

pub type Result<T> = std::result::Result<T, GateError>;

/// Raised when a click cannot be turned into a pending download.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("app has no name")]
    MissingName,
    #[error("app has no download link")]
    MissingUrl,
    #[error("download link is not a valid URL: {0}")]
    InvalidUrl(String),
    #[error("could not store pending download: {0}")]
    Store(#[from] GateError),
}

/// Raised when the redirect view finds no usable pending download.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("no pending download request")]
    Missing,
    #[error("pending download has no app name")]
    MissingName,
    #[error("pending download has no URL")]
    MissingUrl,
    #[error("pending download URL is invalid: {0}")]
    InvalidUrl(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdFetchError {
    #[error("advertisement request failed: {0}")]
    Network(String),
    #[error("advertisement service error: {0}")]
    Backend(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("verification request failed: {0}")]
    Network(String),
    #[error("advertisement view rejected: {0}")]
    Rejected(String),
    #[error("unreadable verification response: {0}")]
    MalformedResponse(String),
}

impl AdFetchError {
    pub fn from_transport(err: GateError) -> Self {
        match err {
            GateError::Network(inner) if inner.is_timeout() => {
                Self::Network("request timed out".to_string())
            }
            GateError::Network(inner) => Self::Network(inner.to_string()),
            other => Self::Network(other.to_string()),
        }
    }
}

impl VerificationError {
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Network("request timed out".to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("download was already dispatched")]
    AlreadyDispatched,
    #[error("unlock grant is not usable: {0}")]
    InvalidGrant(String),
}
