//! Storage Layer
//!
//! SQLite persistence for alert history. The unique key constraint makes
//! `record` a conditional put, so several processes can share one database
//! without breaking daily dedup.

mod sqlite;

pub use sqlite::SqliteAlertHistory;

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Invalid database URL: {0}")]
    InvalidUrl(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::DatabaseError(err.to_string())
    }
}
