//! Read-side pending queries over the merged epoch partitions.

use keva_store::{PendingInfo, PendingKey, PendingStore, StoreError};
use keva_types::Account;

use crate::environment::LmdbEnvironment;
use crate::LmdbError;

impl PendingStore for LmdbEnvironment {
    fn pending_get(&self, key: &PendingKey) -> Result<Option<PendingInfo>, StoreError> {
        let rtxn = self.read_txn()?;
        for db in [self.pending_v1_db, self.pending_v0_db] {
            if let Some(bytes) = db.get(&rtxn, &key.to_bytes()).map_err(LmdbError::from)? {
                return PendingInfo::from_bytes(bytes).map(Some);
            }
        }
        Ok(None)
    }

    fn pending_exists(&self, key: &PendingKey) -> Result<bool, StoreError> {
        Ok(self.pending_get(key)?.is_some())
    }

    fn pending_for_account(
        &self,
        account: &Account,
    ) -> Result<Vec<(PendingKey, PendingInfo)>, StoreError> {
        let rtxn = self.read_txn()?;
        let mut out = Vec::new();
        for db in [self.pending_v0_db, self.pending_v1_db] {
            let iter = db
                .prefix_iter(&rtxn, account.as_bytes())
                .map_err(LmdbError::from)?;
            for entry in iter {
                let (key_bytes, value) = entry.map_err(LmdbError::from)?;
                let key = PendingKey::from_bytes(key_bytes)
                    .ok_or_else(|| StoreError::Corrupt("pending key size".into()))?;
                out.push((key, PendingInfo::from_bytes(value)?));
            }
        }
        out.sort_by_key(|(key, _)| key.hash);
        Ok(out)
    }

    fn pending_count(&self) -> Result<u64, StoreError> {
        let rtxn = self.read_txn()?;
        let v0 = self.pending_v0_db.len(&rtxn).map_err(LmdbError::from)?;
        let v1 = self.pending_v1_db.len(&rtxn).map_err(LmdbError::from)?;
        Ok(v0 + v1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keva_store::Epoch;
    use keva_types::{Amount, BlockHash};

    #[test]
    fn per_account_listing_spans_partitions() {
        let dir = tempfile::tempdir().unwrap();
        let env = LmdbEnvironment::open(dir.path(), 32 * 1024 * 1024).unwrap();
        let dest = Account::from_bytes([1; 32]);

        let mut batch = env.write_batch().unwrap();
        batch
            .pending_put(
                &PendingKey::new(dest, BlockHash::new([1; 32])),
                &PendingInfo {
                    source: Account::from_bytes([2; 32]),
                    amount: Amount::new(10),
                    epoch: Epoch::Epoch0,
                },
            )
            .unwrap();
        batch
            .pending_put(
                &PendingKey::new(dest, BlockHash::new([2; 32])),
                &PendingInfo {
                    source: Account::from_bytes([3; 32]),
                    amount: Amount::new(20),
                    epoch: Epoch::Epoch1,
                },
            )
            .unwrap();
        // A different destination must not appear.
        batch
            .pending_put(
                &PendingKey::new(Account::from_bytes([9; 32]), BlockHash::new([3; 32])),
                &PendingInfo {
                    source: Account::from_bytes([3; 32]),
                    amount: Amount::new(30),
                    epoch: Epoch::Epoch0,
                },
            )
            .unwrap();
        batch.commit().unwrap();

        let entries = env.pending_for_account(&dest).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].1.amount, Amount::new(10));
        assert_eq!(entries[1].1.amount, Amount::new(20));
        assert_eq!(env.pending_count().unwrap(), 3);
    }
}
