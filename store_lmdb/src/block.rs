//! Read-side block queries.

use rand::Rng;

use keva_store::{BlockStore, StoreError, StoredBlock};
use keva_types::{Account, Amount, BlockHash};

use crate::environment::LmdbEnvironment;
use crate::LmdbError;

impl BlockStore for LmdbEnvironment {
    fn block_get(&self, hash: &BlockHash) -> Result<Option<StoredBlock>, StoreError> {
        let rtxn = self.read_txn()?;
        for db in self.block_tables() {
            if let Some(bytes) = db.get(&rtxn, hash.as_bytes()).map_err(LmdbError::from)? {
                return StoredBlock::from_bytes(bytes).map(Some);
            }
        }
        Ok(None)
    }

    fn block_exists(&self, hash: &BlockHash) -> Result<bool, StoreError> {
        let rtxn = self.read_txn()?;
        for db in self.block_tables() {
            if db.get(&rtxn, hash.as_bytes()).map_err(LmdbError::from)?.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn block_count(&self) -> Result<u64, StoreError> {
        let rtxn = self.read_txn()?;
        let mut total = 0;
        for db in self.block_tables() {
            total += db.len(&rtxn).map_err(LmdbError::from)?;
        }
        Ok(total)
    }

    fn block_random(&self) -> Result<Option<StoredBlock>, StoreError> {
        let total = self.block_count()?;
        if total == 0 {
            return Ok(None);
        }
        let mut target = rand::thread_rng().gen_range(0..total);
        let rtxn = self.read_txn()?;
        for db in self.block_tables() {
            let len = db.len(&rtxn).map_err(LmdbError::from)?;
            if target < len {
                let entry = db
                    .iter(&rtxn)
                    .map_err(LmdbError::from)?
                    .nth(target as usize);
                if let Some(entry) = entry {
                    let (_, bytes) = entry.map_err(LmdbError::from)?;
                    return StoredBlock::from_bytes(bytes).map(Some);
                }
                return Ok(None);
            }
            target -= len;
        }
        Ok(None)
    }

    fn block_account(&self, hash: &BlockHash) -> Result<Option<Account>, StoreError> {
        Ok(self.block_get(hash)?.map(|stored| stored.sideband.account))
    }

    fn block_balance(&self, hash: &BlockHash) -> Result<Option<Amount>, StoreError> {
        Ok(self.block_get(hash)?.map(|stored| stored.sideband.balance))
    }

    fn block_successor(&self, hash: &BlockHash) -> Result<Option<BlockHash>, StoreError> {
        Ok(self.block_get(hash)?.map(|stored| stored.sideband.successor))
    }
}
