//! Read-side unchecked queries.

use keva_store::{StoreError, UncheckedInfo, UncheckedStore};
use keva_types::BlockHash;

use crate::environment::LmdbEnvironment;
use crate::LmdbError;

impl UncheckedStore for LmdbEnvironment {
    fn unchecked_get(&self, dependency: &BlockHash) -> Result<Vec<UncheckedInfo>, StoreError> {
        let rtxn = self.read_txn()?;
        let mut out = Vec::new();
        let iter = self
            .unchecked_db
            .prefix_iter(&rtxn, dependency.as_bytes())
            .map_err(LmdbError::from)?;
        for entry in iter {
            let (_, value) = entry.map_err(LmdbError::from)?;
            out.push(UncheckedInfo::from_bytes(value)?);
        }
        Ok(out)
    }

    fn unchecked_count(&self) -> Result<u64, StoreError> {
        let rtxn = self.read_txn()?;
        Ok(self.unchecked_db.len(&rtxn).map_err(LmdbError::from)?)
    }
}
