use serde::Serialize;
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TavlaError>;

#[derive(Debug, Error)]
pub enum TavlaError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: RecordKind, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("User {user} may not respond to invitation {invitation}")]
    Unauthorized { user: String, invitation: String },

    #[error("Invalid invitation transition from {from} to {to}")]
    InvalidState { from: String, to: String },

    #[error("Invalid permutation: {0}")]
    InvalidPermutation(String),

    #[error("Invalid identifier: {0}")]
    InvalidId(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl TavlaError {
    pub(crate) fn not_found(kind: RecordKind, id: impl fmt::Display) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Stable tag for callers that map errors onto their own responses
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::InvalidPermutation(_) => ErrorKind::InvalidPermutation,
            Self::InvalidId(_) | Self::ConfigError(_) => ErrorKind::Invalid,
            Self::StorageError(_) | Self::IoError(_) | Self::SerializationError(_) => {
                ErrorKind::Storage
            }
        }
    }
}

/// The kind of record an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Board,
    Lane,
    Entry,
    Invitation,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Board => write!(f, "Board"),
            Self::Lane => write!(f, "Lane"),
            Self::Entry => write!(f, "Entry"),
            Self::Invitation => write!(f, "Invitation"),
        }
    }
}

/// Coarse error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Unauthorized,
    InvalidState,
    InvalidPermutation,
    Invalid,
    Storage,
}
