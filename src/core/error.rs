use std::fmt;
use std::io;
use thiserror::Error;

pub type MemoryResult<T> = Result<T, MemoryError>;

#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("Connection error: {0}")]
    ConnectionError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Query error: {0}")]
    QueryError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
}

/// Coarse failure class, so callers can branch on "your input was wrong"
/// versus "the system failed" without matching on messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connection,
    Validation,
    Storage,
    Query,
    Config,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Connection => "connection",
            ErrorKind::Validation => "validation",
            ErrorKind::Storage => "storage",
            ErrorKind::Query => "query",
            ErrorKind::Config => "config",
            ErrorKind::Io => "io",
        };
        f.write_str(s)
    }
}

impl MemoryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MemoryError::ConnectionError(_) => ErrorKind::Connection,
            MemoryError::ValidationError(_) => ErrorKind::Validation,
            MemoryError::StorageError(_) => ErrorKind::Storage,
            MemoryError::QueryError(_) => ErrorKind::Query,
            MemoryError::ConfigError(_) => ErrorKind::Config,
            MemoryError::IoError(_) => ErrorKind::Io,
        }
    }

    /// Validation failures describe bad input and are never worth retrying.
    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    pub(crate) fn storage(op: &str, err: rusqlite::Error) -> Self {
        MemoryError::StorageError(format!("{op}: {err}"))
    }

    pub(crate) fn query(op: &str, err: rusqlite::Error) -> Self {
        MemoryError::QueryError(format!("{op}: {err}"))
    }

    pub(crate) fn connection(path: &str, err: rusqlite::Error) -> Self {
        MemoryError::ConnectionError(format!("{path}: {err}"))
    }
}

impl From<serde_json::Error> for MemoryError {
    fn from(e: serde_json::Error) -> Self {
        MemoryError::StorageError(format!("serialization failed: {e}"))
    }
}
