//! Error taxonomy for the mapping engine.

use thiserror::Error;

use crate::intercept::OperationKind;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The caller used the API in a way the schema does not allow.
    #[error("usage error: {0}")]
    Usage(String),

    /// Schema shape the engine does not support (composite-key references).
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// Host type without a storage mapping. Indicates a schema defect.
    #[error("no storage mapping for host type `{0}`")]
    NoMapping(String),

    /// A stored value could not be coerced to the declared host type.
    #[error("cannot convert column `{column}`: {message}")]
    Conversion { column: String, message: String },

    /// A cursor column (or a requested record field) has no matching column.
    #[error("unknown column `{0}`")]
    UnknownColumn(String),

    /// An interceptor cancelled the operation before any SQL was sent.
    #[error("{kind} on `{table}` aborted by interceptor")]
    Aborted { kind: OperationKind, table: String },

    /// Invalid configuration document.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Errors reported by SQLite, passed through unchanged.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

impl Error {
    pub(crate) fn usage(message: impl Into<String>) -> Self {
        Error::Usage(message.into())
    }

    pub(crate) fn conversion(column: &str, message: impl Into<String>) -> Self {
        Error::Conversion {
            column: column.to_string(),
            message: message.into(),
        }
    }

    /// True when the operation was cancelled by an interceptor.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Error::Aborted { .. })
    }

    /// SQLite error code for storage-engine failures.
    pub fn sqlite_code(&self) -> Option<rusqlite::ErrorCode> {
        match self {
            Error::Sqlite(e) => e.sqlite_error_code(),
            _ => None,
        }
    }
}
