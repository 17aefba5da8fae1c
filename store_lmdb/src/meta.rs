//! Read-side meta queries.

use keva_store::meta::VERSION_KEY;
use keva_store::{MetaStore, StoreError};

use crate::environment::LmdbEnvironment;
use crate::LmdbError;

impl MetaStore for LmdbEnvironment {
    fn version_get(&self) -> Result<u64, StoreError> {
        Ok(match self.meta_get(&VERSION_KEY)? {
            Some(bytes) if bytes.len() == 32 => {
                let tail: [u8; 8] = bytes[24..]
                    .try_into()
                    .map_err(|_| StoreError::Corrupt("version record".into()))?;
                u64::from_be_bytes(tail)
            }
            Some(_) => return Err(StoreError::Corrupt("version record size".into())),
            // A store created before the version key existed is schema v1.
            None => 1,
        })
    }

    fn meta_get(&self, key: &[u8; 32]) -> Result<Option<Vec<u8>>, StoreError> {
        let rtxn = self.read_txn()?;
        let found = self.meta_db.get(&rtxn, key).map_err(LmdbError::from)?;
        Ok(found.map(|bytes| bytes.to_vec()))
    }
}
