//! Error types for the scribe-store crate.
//!
//! All storage operations return [`StoreError`] via [`StoreResult`].  At the
//! [`KeyValueStore`](scribe_core::KeyValueStore) boundary they are folded
//! into [`ScribeError::Storage`].

use scribe_core::ScribeError;
use thiserror::Error;

/// Alias for `Result<T, StoreError>`.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the storage engine.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite operation failed.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A schema migration failed.
    #[error("migration v{version} failed: {message}")]
    Migration { version: u32, message: String },

    /// The connection mutex was poisoned by a panicking writer.
    #[error("connection lock poisoned: {0}")]
    Poisoned(String),

    /// A blocking task was cancelled or panicked.
    #[error("background task failed: {0}")]
    TaskJoin(String),
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskJoin(err.to_string())
    }
}

impl From<StoreError> for ScribeError {
    fn from(err: StoreError) -> Self {
        ScribeError::Storage {
            reason: err.to_string(),
        }
    }
}
