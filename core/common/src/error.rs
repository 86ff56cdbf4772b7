//! Common error types for multifs.

use thiserror::Error;

/// Top-level error type for multifs operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage backend operation failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation not permitted.
    #[error("Not permitted: {0}")]
    NotPermitted(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Logical path names no registered drive and no default backend exists.
    #[error("Couldn't resolve path [{0}]")]
    Unresolved(String),

    /// Rename or move spanning two different backends.
    #[error("Can't move files between backends ({old} -> {new})")]
    CrossBackend { old: String, new: String },

    /// A backend connection could not be established.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Internal consistency check failed. Indicates a code defect.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

impl Error {
    /// HTTP-equivalent status class for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::NotFound(_) | Error::Unresolved(_) => 404,
            Error::InvalidInput(_) | Error::CrossBackend { .. } => 400,
            Error::NotPermitted(_) => 403,
            Error::AlreadyExists(_) => 409,
            Error::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => 404,
                std::io::ErrorKind::PermissionDenied => 403,
                std::io::ErrorKind::AlreadyExists => 409,
                _ => 500,
            },
            Error::Storage(_)
            | Error::Serialization(_)
            | Error::Connection(_)
            | Error::InvariantViolation(_) => 500,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
