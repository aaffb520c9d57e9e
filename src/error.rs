//! Error taxonomy for staging, codecs and host calls.

use thiserror::Error;

use crate::engine::OperationState;

/// Failure reported by the live bookmark tree provider.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("bookmark tree unavailable: {0}")]
    Unavailable(String),

    #[error("parent container not found: {0}")]
    ParentNotFound(String),

    #[error("host rejected creation: {0}")]
    Rejected(String),

    #[error("host I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("host data is corrupt: {0}")]
    Corrupt(String),
}

/// Failure reported by the persistent key-value store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored value for `{key}` is unreadable: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("value for `{key}` could not be encoded: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum StageError {
    /// Payload is not a recognizable sequence or document.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// Every candidate record was rejected.
    #[error("no valid bookmarks found ({skipped} skipped)")]
    NoValidRecords { skipped: usize },

    #[error("bookmark host failure: {0}")]
    Host(#[from] HostError),

    #[error("staging store failure: {0}")]
    Store(#[from] StoreError),

    #[error("another operation is in progress ({state})")]
    Busy { state: OperationState },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StageError {
    /// Host reads may be retried; re-running recomputes the plan from live state.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StageError::Host(_) | StageError::Busy { .. })
    }
}

pub type Result<T> = std::result::Result<T, StageError>;
