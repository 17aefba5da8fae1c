//! Read-side frontier queries.

use keva_store::{FrontierStore, StoreError};
use keva_types::{Account, BlockHash};

use crate::environment::LmdbEnvironment;
use crate::LmdbError;

impl FrontierStore for LmdbEnvironment {
    fn frontier_get(&self, hash: &BlockHash) -> Result<Option<Account>, StoreError> {
        let rtxn = self.read_txn()?;
        let found = self
            .frontiers_db
            .get(&rtxn, hash.as_bytes())
            .map_err(LmdbError::from)?;
        Ok(found.and_then(|bytes| {
            let arr: [u8; 32] = bytes.try_into().ok()?;
            Some(Account::from_bytes(arr))
        }))
    }

    fn frontier_count(&self) -> Result<u64, StoreError> {
        let rtxn = self.read_txn()?;
        Ok(self.frontiers_db.len(&rtxn).map_err(LmdbError::from)?)
    }
}
