//! Error types for the storage layer

use thiserror::Error;

/// Failure reading or writing the key-value store
#[derive(Debug, Error)]
pub enum StoreError {
    /// The `SQLite` backend failed
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A value couldn't be serialized before writing
    #[error("failed to serialize value: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Any other backend failure
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Failure loading a persisted seen-set
#[derive(Debug, Error)]
pub enum SeenLoadError {
    /// The payload under `key` exists but can't be parsed
    #[error("seen-set payload under `{key}` is corrupt: {source}")]
    Corrupt {
        /// Storage key of the payload
        key: String,
        /// Parse error
        #[source]
        source: serde_json::Error,
    },

    /// The store itself failed
    #[error(transparent)]
    Store(#[from] StoreError),
}
