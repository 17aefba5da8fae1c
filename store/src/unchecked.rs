//! Unchecked blocks: received but waiting for a missing dependency.

use serde::{Deserialize, Serialize};

use keva_blocks::Block;
use keva_types::{Account, BlockHash};

use crate::StoreError;

/// Outcome of signature checking recorded with an unchecked block, so work
/// already done before the gap was discovered is not repeated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureVerification {
    Unknown,
    Invalid,
    Valid,
    /// Valid and signed by the epoch signer.
    ValidEpoch,
}

/// A block parked until its dependency arrives.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncheckedInfo {
    /// Type-prefixed serialized block.
    pub block_bytes: Vec<u8>,
    /// Chain owner when known, zero otherwise.
    pub account: Account,
    /// Unix seconds of arrival.
    pub modified: u64,
    pub verified: SignatureVerification,
}

impl UncheckedInfo {
    pub fn new(block: &Block, account: Account, now: u64, verified: SignatureVerification) -> Self {
        let mut block_bytes = Vec::new();
        block.serialize_with_type(&mut block_bytes);
        Self {
            block_bytes,
            account,
            modified: now,
            verified,
        }
    }

    pub fn block(&self) -> Result<Block, StoreError> {
        Block::deserialize_with_type(&self.block_bytes)
            .map(|(block, _)| block)
            .ok_or_else(|| StoreError::Corrupt("unreadable unchecked block".into()))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).expect("unchecked info serialization is infallible")
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        bincode::deserialize(bytes).map_err(|e| StoreError::Corrupt(e.to_string()))
    }
}

/// Read-side unchecked queries. The table is keyed by (dependency, hash) so
/// multiple blocks can wait on one dependency.
pub trait UncheckedStore {
    fn unchecked_get(&self, dependency: &BlockHash) -> Result<Vec<UncheckedInfo>, StoreError>;
    fn unchecked_count(&self) -> Result<u64, StoreError>;
}
