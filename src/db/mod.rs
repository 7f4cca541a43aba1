pub mod sqlite;
pub mod repository;

pub use sqlite::*;
pub use repository::*;

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },

    #[error("Invalid SQL identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Statement exceeded the {0:?} timeout")]
    Timeout(Duration),

    #[error("Statement interrupted by cancellation")]
    Interrupted,
}
