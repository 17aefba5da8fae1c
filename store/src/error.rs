//! Storage error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("schema version {found} is newer than supported version {supported}")]
    VersionTooNew { found: u64, supported: u64 },

    #[error("backend error: {0}")]
    Backend(String),
}
