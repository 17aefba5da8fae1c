//! Read-side representation queries.

use keva_store::{RepWeightStore, StoreError};
use keva_types::{Account, Amount};

use crate::environment::LmdbEnvironment;
use crate::LmdbError;

impl RepWeightStore for LmdbEnvironment {
    fn representation_get(&self, account: &Account) -> Result<Amount, StoreError> {
        let rtxn = self.read_txn()?;
        let found = self
            .representation_db
            .get(&rtxn, account.as_bytes())
            .map_err(LmdbError::from)?;
        Ok(match found {
            Some(bytes) => {
                let arr: [u8; 16] = bytes
                    .try_into()
                    .map_err(|_| StoreError::Corrupt("weight record size".into()))?;
                Amount::from_be_bytes(arr)
            }
            None => Amount::ZERO,
        })
    }

    fn representation_iter(&self) -> Result<Vec<(Account, Amount)>, StoreError> {
        let rtxn = self.read_txn()?;
        let mut out = Vec::new();
        for entry in self.representation_db.iter(&rtxn).map_err(LmdbError::from)? {
            let (key, value) = entry.map_err(LmdbError::from)?;
            let account: [u8; 32] = key
                .try_into()
                .map_err(|_| StoreError::Corrupt("weight key size".into()))?;
            let amount: [u8; 16] = value
                .try_into()
                .map_err(|_| StoreError::Corrupt("weight record size".into()))?;
            out.push((
                Account::from_bytes(account),
                Amount::from_be_bytes(amount),
            ));
        }
        Ok(out)
    }
}
