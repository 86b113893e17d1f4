//! Error types for the storage port.

use std::fmt;

use thiserror::Error;

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// The kind of storage resource an operation addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Blob,
    Table,
    Queue,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Blob => "blob",
            Self::Table => "table",
            Self::Queue => "queue",
        })
    }
}

/// Errors that can occur while reading task hub storage.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The addressed resource (or its parent container) does not exist.
    #[error("{kind} not found: {name}")]
    NotFound { kind: ResourceKind, name: String },

    /// The service answered with a non-success status other than 404.
    #[error("storage request failed with status {status}{}: {message}", code_suffix(.code))]
    Status {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("storage transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed storage response: {0}")]
    Malformed(String),
}

impl StorageError {
    pub fn not_found(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Whether this error means the resource is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// HTTP status carried by the error, if the service produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::NotFound { .. } => Some(404),
            Self::Status { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            Self::Malformed(_) => None,
        }
    }
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_deref().map(|c| format!(" ({c})")).unwrap_or_default()
}

/// Errors produced while parsing a storage connection string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConnectionStringError {
    #[error("connection string is empty")]
    Empty,

    #[error("malformed connection string segment: {0:?}")]
    MalformedSegment(String),

    #[error("connection string has no {service} endpoint and no AccountName to derive one")]
    MissingEndpoint { service: &'static str },

    #[error("invalid {service} endpoint {endpoint:?}")]
    InvalidEndpoint {
        service: &'static str,
        endpoint: String,
    },

    #[error("unsupported credential: {0}")]
    UnsupportedCredential(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_display_includes_code() {
        let err = StorageError::Status {
            status: 403,
            code: Some("AuthenticationFailed".to_string()),
            message: "signature mismatch".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "storage request failed with status 403 (AuthenticationFailed): signature mismatch"
        );
        assert_eq!(err.status(), Some(403));
        assert!(!err.is_not_found());
    }

    #[test]
    fn not_found_is_classified() {
        let err = StorageError::not_found(ResourceKind::Queue, "hub-control-00");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "queue not found: hub-control-00");
    }
}
