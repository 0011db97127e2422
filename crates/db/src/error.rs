use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by a [`Store`](crate::Store).
#[derive(Debug, Error)]
pub enum StoreError {
    /// A guard saw a different revision than the caller read. Retryable.
    #[error("stale {entity} {id}: expected revision {expected}, found {found:?}")]
    Stale {
        entity: &'static str,
        id: String,
        expected: u64,
        found: Option<u64>,
    },

    #[error("unique constraint violated on {field}: {value}")]
    Unique { field: &'static str, value: String },

    #[error("snapshot I/O failed for {path}: {source}")]
    Snapshot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    /// A snapshot parsed but its copy counts disagree with its loans.
    #[error("snapshot is inconsistent for book {id}: {reason}")]
    Inconsistent { id: String, reason: String },
}

impl StoreError {
    /// Returns `true` if re-reading and retrying the batch might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Stale { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
