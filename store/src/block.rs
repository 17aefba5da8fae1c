//! Committed block records: block body plus sideband.

use keva_blocks::Block;
use keva_types::{Account, Amount, BlockHash};

use crate::StoreError;

/// Metadata stored alongside each block, excluded from its hash. Lets the
/// ledger answer successor/balance/height queries in one lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockSideband {
    /// Hash of the next block in the chain, zero at the head.
    pub successor: BlockHash,
    /// Owner of the chain this block belongs to.
    pub account: Account,
    /// Balance after this block was applied.
    pub balance: Amount,
    /// 1-based position in the chain.
    pub height: u64,
    /// Unix seconds when this node committed the block.
    pub timestamp: u64,
}

impl BlockSideband {
    pub const SIZE: usize = 32 + 32 + 16 + 8 + 8;

    pub fn serialize(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.successor.as_bytes());
        out.extend_from_slice(self.account.as_bytes());
        out.extend_from_slice(&self.balance.to_be_bytes());
        out.extend_from_slice(&self.height.to_be_bytes());
        out.extend_from_slice(&self.timestamp.to_be_bytes());
    }

    pub fn deserialize(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::SIZE {
            return None;
        }
        Some(Self {
            successor: BlockHash::new(bytes[0..32].try_into().ok()?),
            account: Account::from_bytes(bytes[32..64].try_into().ok()?),
            balance: Amount::from_be_bytes(bytes[64..80].try_into().ok()?),
            height: u64::from_be_bytes(bytes[80..88].try_into().ok()?),
            timestamp: u64::from_be_bytes(bytes[88..96].try_into().ok()?),
        })
    }
}

/// A block together with its sideband, the unit the block tables store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredBlock {
    pub block: Block,
    pub sideband: BlockSideband,
}

impl StoredBlock {
    /// Type-prefixed block body followed by the fixed-size sideband.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.block.serialize_with_type(&mut out);
        self.sideband.serialize(&mut out);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        let (block, consumed) = Block::deserialize_with_type(bytes)
            .ok_or_else(|| StoreError::Corrupt("unreadable block body".into()))?;
        let sideband = BlockSideband::deserialize(&bytes[consumed..])
            .ok_or_else(|| StoreError::Corrupt("unreadable sideband".into()))?;
        Ok(Self { block, sideband })
    }
}

/// Read-side block queries across all block tables.
pub trait BlockStore {
    fn block_get(&self, hash: &BlockHash) -> Result<Option<StoredBlock>, StoreError>;
    fn block_exists(&self, hash: &BlockHash) -> Result<bool, StoreError>;
    fn block_count(&self) -> Result<u64, StoreError>;
    /// A uniformly random committed block, `None` on an empty store.
    fn block_random(&self) -> Result<Option<StoredBlock>, StoreError>;
    /// Owner account of a block, from its sideband.
    fn block_account(&self, hash: &BlockHash) -> Result<Option<Account>, StoreError>;
    /// Balance after a block, from its sideband.
    fn block_balance(&self, hash: &BlockHash) -> Result<Option<Amount>, StoreError>;
    fn block_successor(&self, hash: &BlockHash) -> Result<Option<BlockHash>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use keva_blocks::{SendBlock, StateBlock};
    use keva_types::{Link, Signature};

    fn sample() -> StoredBlock {
        StoredBlock {
            block: Block::State(StateBlock {
                account: Account::from_bytes([1; 32]),
                previous: BlockHash::new([2; 32]),
                representative: Account::from_bytes([3; 32]),
                balance: Amount::new(50),
                link: Link::ZERO,
                signature: Signature([4; 64]),
                work: 5,
            }),
            sideband: BlockSideband {
                successor: BlockHash::ZERO,
                account: Account::from_bytes([1; 32]),
                balance: Amount::new(50),
                height: 3,
                timestamp: 1_650_000_000,
            },
        }
    }

    #[test]
    fn stored_block_roundtrip() {
        let stored = sample();
        assert_eq!(StoredBlock::from_bytes(&stored.to_bytes()).unwrap(), stored);
    }

    #[test]
    fn legacy_stored_block_roundtrip() {
        let stored = StoredBlock {
            block: Block::Send(SendBlock {
                previous: BlockHash::new([9; 32]),
                destination: Account::from_bytes([8; 32]),
                balance: Amount::new(7),
                signature: Signature([6; 64]),
                work: 5,
            }),
            sideband: sample().sideband,
        };
        assert_eq!(StoredBlock::from_bytes(&stored.to_bytes()).unwrap(), stored);
    }

    #[test]
    fn truncated_record_rejected() {
        let bytes = sample().to_bytes();
        assert!(StoredBlock::from_bytes(&bytes[..bytes.len() - 1]).is_err());
        assert!(StoredBlock::from_bytes(&[]).is_err());
    }

    #[test]
    fn sideband_size() {
        assert_eq!(BlockSideband::SIZE, 96);
    }
}
