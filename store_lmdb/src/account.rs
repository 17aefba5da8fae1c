//! Read-side account queries over the merged epoch partitions.

use keva_store::{AccountInfo, AccountStore, StoreError};
use keva_types::Account;

use crate::environment::LmdbEnvironment;
use crate::LmdbError;

impl AccountStore for LmdbEnvironment {
    fn account_get(&self, account: &Account) -> Result<Option<AccountInfo>, StoreError> {
        let rtxn = self.read_txn()?;
        for db in [self.accounts_v1_db, self.accounts_v0_db] {
            if let Some(bytes) = db.get(&rtxn, account.as_bytes()).map_err(LmdbError::from)? {
                return AccountInfo::from_bytes(bytes).map(Some);
            }
        }
        Ok(None)
    }

    fn account_exists(&self, account: &Account) -> Result<bool, StoreError> {
        Ok(self.account_get(account)?.is_some())
    }

    fn account_count(&self) -> Result<u64, StoreError> {
        let rtxn = self.read_txn()?;
        let v0 = self.accounts_v0_db.len(&rtxn).map_err(LmdbError::from)?;
        let v1 = self.accounts_v1_db.len(&rtxn).map_err(LmdbError::from)?;
        Ok(v0 + v1)
    }

    fn accounts_iter(&self) -> Result<Vec<(Account, AccountInfo)>, StoreError> {
        let rtxn = self.read_txn()?;
        let mut out = Vec::new();
        for db in [self.accounts_v0_db, self.accounts_v1_db] {
            for entry in db.iter(&rtxn).map_err(LmdbError::from)? {
                let (key, value) = entry.map_err(LmdbError::from)?;
                let bytes: [u8; 32] = key
                    .try_into()
                    .map_err(|_| StoreError::Corrupt("account key size".into()))?;
                out.push((Account::from_bytes(bytes), AccountInfo::from_bytes(value)?));
            }
        }
        out.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
        Ok(out)
    }
}
