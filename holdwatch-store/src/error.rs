use holdwatch_core::SnapshotKey;
use thiserror::Error;

/// Result alias for snapshot store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Error type surfaced by snapshot storage and artifact files.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("invalid snapshot: {0}")]
    InvalidState(String),
    #[error("snapshot {key} already stored and the append policy rejects duplicates")]
    Conflict { key: SnapshotKey },
    #[error("snapshot {0} not found")]
    NotFound(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Storage(value.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Storage(value.to_string())
    }
}

impl From<csv::Error> for StoreError {
    fn from(value: csv::Error) -> Self {
        Self::Serialization(value.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value.to_string())
    }
}
