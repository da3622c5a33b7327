//! Storage and query error types

use thiserror::Error;

/// Errors from the storage engine.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem failure while opening the database.
    #[error("storage path '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Engine-level failure.
    #[error(transparent)]
    Engine(#[from] turso::Error),

    /// Schema reconciliation failure.
    #[error("migrate table '{table}': {message}")]
    Migrate { table: String, message: String },

    /// Query or cleanup against a table that does not exist.
    #[error("table '{0}' not found")]
    MissingTable(String),
}

impl StorageError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn migrate(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Migrate {
            table: table.into(),
            message: message.into(),
        }
    }
}

/// Errors from building a query out of client input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("unknown filter operator '{0}'")]
    UnknownOp(String),

    #[error("filter '{field}': invalid integer value '{value}'")]
    InvalidInt { field: String, value: String },

    #[error("filter '{field}': invalid time value '{value}'")]
    InvalidTime { field: String, value: String },
}
