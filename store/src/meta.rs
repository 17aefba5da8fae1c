//! Schema metadata records.

use crate::StoreError;

/// The meta table key holding the schema version: all zeros except a final 1.
pub const VERSION_KEY: [u8; 32] = {
    let mut key = [0u8; 32];
    key[31] = 1;
    key
};

/// Read-side meta queries.
pub trait MetaStore {
    fn version_get(&self) -> Result<u64, StoreError>;
    fn meta_get(&self, key: &[u8; 32]) -> Result<Option<Vec<u8>>, StoreError>;
}
