//! Last-observed vote per representative, for sequence replay protection.

use serde::{Deserialize, Serialize};

use keva_types::{Account, BlockHash};

use crate::StoreError;

/// The replay-protection record: the highest sequence seen from a
/// representative and the digest of that vote.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredVote {
    pub sequence: u64,
    pub vote_hash: BlockHash,
}

impl StoredVote {
    pub fn to_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).expect("stored vote serialization is infallible")
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        bincode::deserialize(bytes).map_err(|e| StoreError::Corrupt(e.to_string()))
    }
}

/// Read-side vote replay queries.
pub trait VoteStore {
    fn vote_get(&self, account: &Account) -> Result<Option<StoredVote>, StoreError>;
    /// The max of the stored sequence and `sequence`, what a generated vote
    /// must exceed.
    fn vote_max(&self, account: &Account, sequence: u64) -> Result<u64, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let v = StoredVote {
            sequence: 41,
            vote_hash: BlockHash::new([7; 32]),
        };
        assert_eq!(StoredVote::from_bytes(&v.to_bytes()).unwrap(), v);
    }
}
