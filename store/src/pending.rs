//! Pending (unclaimed send) records.

use serde::{Deserialize, Serialize};

use keva_types::{Account, Amount, BlockHash};

use crate::{account::Epoch, StoreError};

/// Key of a pending entry: the destination account and the hash of the
/// originating send. The binary form is the LMDB key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PendingKey {
    pub account: Account,
    pub hash: BlockHash,
}

impl PendingKey {
    pub const SIZE: usize = 64;

    pub fn new(account: Account, hash: BlockHash) -> Self {
        Self { account, hash }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[..32].copy_from_slice(self.account.as_bytes());
        out[32..].copy_from_slice(self.hash.as_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::SIZE {
            return None;
        }
        Some(Self {
            account: Account::from_bytes(bytes[..32].try_into().ok()?),
            hash: BlockHash::new(bytes[32..].try_into().ok()?),
        })
    }
}

/// What an unclaimed send is worth and where it came from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingInfo {
    pub source: Account,
    pub amount: Amount,
    pub epoch: Epoch,
}

impl PendingInfo {
    pub fn to_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).expect("pending info serialization is infallible")
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        bincode::deserialize(bytes).map_err(|e| StoreError::Corrupt(e.to_string()))
    }
}

/// Read-side pending queries over the merged v0/v1 partitions.
pub trait PendingStore {
    fn pending_get(&self, key: &PendingKey) -> Result<Option<PendingInfo>, StoreError>;
    fn pending_exists(&self, key: &PendingKey) -> Result<bool, StoreError>;
    /// All pending entries for one destination account.
    fn pending_for_account(&self, account: &Account)
        -> Result<Vec<(PendingKey, PendingInfo)>, StoreError>;
    fn pending_count(&self) -> Result<u64, StoreError>;
}
