//! Error types for the SlotGrid persistence adapter.

use slotgrid_pool::PoolError;
use thiserror::Error;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while reading or writing pool variables.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open store: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("failed to read {key}: {message}")]
    Read { key: String, message: String },

    #[error("failed to write {key}: {message}")]
    Write { key: String, message: String },

    #[error("variable already exists: {0}")]
    AlreadyExists(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("pool name {0:?} has no alphanumeric characters")]
    InvalidPoolName(String),

    #[error("failed to save {key} after {attempts} attempts: {source}")]
    RetriesExhausted {
        key: String,
        attempts: u32,
        #[source]
        source: Box<StoreError>,
    },

    #[error(transparent)]
    Pool(#[from] PoolError),
}
