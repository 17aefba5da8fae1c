//! Frontier records: head block hash → owning account.

use keva_types::{Account, BlockHash};

use crate::StoreError;

/// Read-side frontier queries.
pub trait FrontierStore {
    fn frontier_get(&self, hash: &BlockHash) -> Result<Option<Account>, StoreError>;
    fn frontier_count(&self) -> Result<u64, StoreError>;
}
