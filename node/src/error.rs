//! Node-level errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("configuration: {0}")]
    Config(String),

    #[error("storage: {0}")]
    Store(#[from] keva_store::StoreError),

    #[error("network: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}
