//! LMDB error wrapping.

use keva_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LmdbError {
    #[error("lmdb: {0}")]
    Heed(#[from] heed::Error),

    #[error("serialization: {0}")]
    Bincode(#[from] bincode::Error),
}

impl From<LmdbError> for StoreError {
    fn from(err: LmdbError) -> Self {
        StoreError::Backend(err.to_string())
    }
}
