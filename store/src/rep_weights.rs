//! Representative voting weight records.

use keva_types::{Account, Amount};

use crate::StoreError;

/// Read-side representation queries. Weights are updated additively by the
/// ledger under the same write batch as the block that moved them.
pub trait RepWeightStore {
    fn representation_get(&self, account: &Account) -> Result<Amount, StoreError>;
    /// Every representative with nonzero weight.
    fn representation_iter(&self) -> Result<Vec<(Account, Amount)>, StoreError>;
}
