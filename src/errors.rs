use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LauncherError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("Timed out: {0}")]
    Timeout(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Archive error: {0}")]
    Archive(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Invalid ownership record: {0}")]
    InvalidRecord(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Cancelled: {0}")]
    Cancelled(String),
}

/// Coarse failure classes surfaced to the UI alongside a failed install.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Filesystem,
    Persistence,
    Cancelled,
    Other,
}

impl LauncherError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LauncherError::Network(_) | LauncherError::Http(_) | LauncherError::Timeout(_) => {
                ErrorKind::Network
            }
            LauncherError::Io(_) | LauncherError::Archive(_) => ErrorKind::Filesystem,
            LauncherError::Serde(_)
            | LauncherError::Persistence(_)
            | LauncherError::InvalidRecord(_) => ErrorKind::Persistence,
            LauncherError::Cancelled(_) => ErrorKind::Cancelled,
            LauncherError::NotFound(_) | LauncherError::Config(_) => ErrorKind::Other,
        }
    }
}

impl From<zip::result::ZipError> for LauncherError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(io_err) => LauncherError::Io(io_err),
            other => LauncherError::Archive(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, LauncherError>;
