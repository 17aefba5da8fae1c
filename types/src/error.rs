//! Top-level error type shared across crates.

use thiserror::Error;

/// Common error type for the keva protocol.
#[derive(Debug, Error)]
pub enum KevaError {
    #[error("invalid account string: {0}")]
    InvalidAccount(String),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid proof of work")]
    InvalidWork,

    #[error("invalid block: {reason}")]
    InvalidBlock { reason: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}
