//! Online weight samples, keyed by unix seconds.

use keva_types::Amount;

use crate::StoreError;

/// Read-side online-weight sample queries, ascending by timestamp.
pub trait OnlineWeightStore {
    fn online_weight_iter(&self) -> Result<Vec<(u64, Amount)>, StoreError>;
    fn online_weight_count(&self) -> Result<u64, StoreError>;
}
