//! Read-side online-weight sample queries.

use keva_store::{OnlineWeightStore, StoreError};
use keva_types::Amount;

use crate::environment::LmdbEnvironment;
use crate::LmdbError;

impl OnlineWeightStore for LmdbEnvironment {
    fn online_weight_iter(&self) -> Result<Vec<(u64, Amount)>, StoreError> {
        let rtxn = self.read_txn()?;
        let mut out = Vec::new();
        for entry in self.online_weight_db.iter(&rtxn).map_err(LmdbError::from)? {
            let (key, value) = entry.map_err(LmdbError::from)?;
            let ts: [u8; 8] = key
                .try_into()
                .map_err(|_| StoreError::Corrupt("weight sample key size".into()))?;
            let amount: [u8; 16] = value
                .try_into()
                .map_err(|_| StoreError::Corrupt("weight sample size".into()))?;
            out.push((u64::from_be_bytes(ts), Amount::from_be_bytes(amount)));
        }
        Ok(out)
    }

    fn online_weight_count(&self) -> Result<u64, StoreError> {
        let rtxn = self.read_txn()?;
        Ok(self.online_weight_db.len(&rtxn).map_err(LmdbError::from)?)
    }
}
