use std::path::PathBuf;
use thiserror::Error;

/// Unified error type for store operations that application code can handle
#[derive(Error, Debug)]
pub enum DbError {
    /// Record not found by the given key
    #[error("Record not found")]
    NotFound,

    /// Unique constraint violation on the primary key or the `name` index
    #[error("Unique constraint violation: {message}")]
    UniqueViolation {
        constraint: Option<String>,
        table: Option<String>,
        message: String,
    },

    /// The backing store could not be opened (missing engine, version conflict, I/O failure)
    #[error("Store at {} is unavailable: {reason}", path.display())]
    StorageUnavailable { path: PathBuf, reason: String },

    /// Catch-all for non-recoverable errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DbError {
    pub(crate) fn unavailable(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        DbError::StorageUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error came from a uniqueness constraint in the engine
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, DbError::UniqueViolation { .. })
    }
}

/// Whether the engine refused a lock (`SQLITE_BUSY` or one of its extended codes).
///
/// The busy timeout already waits on most locks; this catches the ones it cannot, such as the
/// exclusive lock a journal-mode switch needs.
pub(crate) fn is_busy(err: &sqlx::Error) -> bool {
    const SQLITE_BUSY: i32 = 5;

    match err {
        sqlx::Error::Database(db_err) => db_err
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .is_some_and(|code| code & 0xff == SQLITE_BUSY),
        _ => false,
    }
}

/// Convert from sqlx::Error using sqlx's own error categorization
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => DbError::NotFound,
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => DbError::UniqueViolation {
                constraint: db_err.constraint().map(|s| s.to_string()),
                table: db_err.table().map(|s| s.to_string()),
                message: db_err.message().to_string(),
            },
            // All other sqlx errors are non-recoverable - convert to anyhow
            _ => DbError::Other(anyhow::Error::from(err)),
        }
    }
}

/// Type alias for store operation results
pub type Result<T> = std::result::Result<T, DbError>;
