//! Account records.

use serde::{Deserialize, Serialize};

use keva_types::{Account, Amount, BlockHash};

use crate::StoreError;

/// Protocol epoch an account chain has reached. Epoch upgrades are one-way
/// and partition the account and pending tables.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Epoch {
    #[default]
    Epoch0,
    Epoch1,
}

/// Per-account chain summary, kept current by the ledger so balance and
/// head queries never traverse the chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    /// Hash of the newest block in the chain.
    pub head: BlockHash,
    /// Hash of the block that most recently named the representative.
    pub rep_block: BlockHash,
    /// Hash of the first block in the chain.
    pub open_block: BlockHash,
    /// Balance at `head`.
    pub balance: Amount,
    /// Unix seconds of the last modification.
    pub modified: u64,
    /// Chain length.
    pub block_count: u64,
    /// Which table partition the account lives in.
    pub epoch: Epoch,
}

impl AccountInfo {
    pub fn to_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).expect("account info serialization is infallible")
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        bincode::deserialize(bytes).map_err(|e| StoreError::Corrupt(e.to_string()))
    }
}

/// Read-side account queries. The epoch partitions are merged: a lookup
/// consults v1 before v0.
pub trait AccountStore {
    fn account_get(&self, account: &Account) -> Result<Option<AccountInfo>, StoreError>;
    fn account_exists(&self, account: &Account) -> Result<bool, StoreError>;
    fn account_count(&self) -> Result<u64, StoreError>;
    /// Every account in both partitions, ascending by account bytes.
    fn accounts_iter(&self) -> Result<Vec<(Account, AccountInfo)>, StoreError>;
}
