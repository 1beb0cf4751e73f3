use std::fmt;

use thiserror::Error;

/// Broad category of a store failure, reported by the store itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreErrorKind {
    /// Backend unreachable or refusing connections
    Unavailable,
    /// Operation exceeded its time budget
    Timeout,
    /// Credentials rejected or access not permitted
    Unauthorized,
    /// Change was committed locally but could not be synchronized upstream
    PushFailed,
    /// Stored data could not be encoded or decoded
    Serialization,
    /// Local filesystem or database failure
    Io,
    /// The store does not offer the requested capability
    Unsupported,
    /// Anything the store could not categorize
    Other,
}

impl StoreErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreErrorKind::Unavailable => "unavailable",
            StoreErrorKind::Timeout => "timeout",
            StoreErrorKind::Unauthorized => "unauthorized",
            StoreErrorKind::PushFailed => "push_failed",
            StoreErrorKind::Serialization => "serialization",
            StoreErrorKind::Io => "io",
            StoreErrorKind::Unsupported => "unsupported",
            StoreErrorKind::Other => "other",
        }
    }
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error: {message}")]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub message: String,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Unavailable, message)
    }

    pub fn push_failed(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::PushFailed, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Unsupported, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Other, message)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        let kind = match &e {
            rusqlite::Error::SqliteFailure(err, _) => match err.code {
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
                    StoreErrorKind::Unavailable
                }
                rusqlite::ErrorCode::PermissionDenied | rusqlite::ErrorCode::ReadOnly => {
                    StoreErrorKind::Unauthorized
                }
                rusqlite::ErrorCode::CannotOpen => StoreErrorKind::Unavailable,
                _ => StoreErrorKind::Io,
            },
            rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::InvalidColumnType(..) => StoreErrorKind::Serialization,
            _ => StoreErrorKind::Io,
        };
        Self::new(kind, e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::new(StoreErrorKind::Serialization, e.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        let kind = match e.kind() {
            std::io::ErrorKind::PermissionDenied => StoreErrorKind::Unauthorized,
            std::io::ErrorKind::TimedOut => StoreErrorKind::Timeout,
            std::io::ErrorKind::NotFound
            | std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionReset => StoreErrorKind::Unavailable,
            _ => StoreErrorKind::Io,
        };
        Self::new(kind, e.to_string())
    }
}
