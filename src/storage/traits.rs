//! Sink trait and storage error types

use crate::model::Record;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("A sqlite sink is declared but the model has no database-path")]
    MissingDatabasePath,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage backend a finished record is written to
///
/// One sink instance is bound per distinct backend kind declared across
/// all templates; collections partition records within a backend.
/// Implementations must be safe to share across the fetch/parse tasks.
pub trait Sink: Send + Sync {
    /// Stores a record under `(collection, record.url)`, replacing any
    /// prior version.
    fn store(&self, collection: &str, record: &Record) -> StorageResult<()>;

    /// Reads the record stored for a URL, if any.
    fn read(&self, collection: &str, url: &str) -> StorageResult<Option<Record>>;

    /// Lists every URL stored in a collection (phase synchronization).
    fn stored_urls(&self, collection: &str) -> StorageResult<Vec<String>>;

    /// Reads every record in a collection (`from_db` phase seeding).
    fn records(&self, collection: &str) -> StorageResult<Vec<Record>>;
}
