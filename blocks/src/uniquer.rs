//! Block deduplication cache.
//!
//! The network floods duplicates of popular blocks; the uniquer collapses
//! structurally equal copies onto one shared allocation. Entries are weak so
//! the cache never extends a block's lifetime, and every call sweeps a small
//! random sample to evict dead handles, bounding memory without a dedicated
//! maintenance thread.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use rand::seq::IteratorRandom;

use keva_types::BlockHash;

use crate::block::Block;

/// Dead-handle sweep sample size per `unique` call.
const CLEANUP_SAMPLE: usize = 2;

/// Maps full-hash → weak handle of the canonical instance.
#[derive(Default)]
pub struct BlockUniquer {
    blocks: Mutex<HashMap<BlockHash, Weak<Block>>>,
}

impl BlockUniquer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the canonical shared instance for `block`, installing it if no
    /// live equal instance exists.
    pub fn unique(&self, block: Arc<Block>) -> Arc<Block> {
        let key = block.full_hash();
        let mut blocks = self.blocks.lock().unwrap();

        let result = match blocks.get(&key).and_then(Weak::upgrade) {
            Some(existing) => existing,
            None => {
                blocks.insert(key, Arc::downgrade(&block));
                block
            }
        };

        // Random sweep: evict expired weak handles from a small sample.
        let mut rng = rand::thread_rng();
        let dead: Vec<BlockHash> = blocks
            .iter()
            .filter(|(_, weak)| weak.strong_count() == 0)
            .map(|(hash, _)| *hash)
            .choose_multiple(&mut rng, CLEANUP_SAMPLE);
        for hash in dead {
            blocks.remove(&hash);
        }

        result
    }

    pub fn size(&self) -> usize {
        self.blocks.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{SendBlock, StateBlock};
    use keva_types::{Account, Amount, Link, Signature};

    fn sample_block(byte: u8) -> Arc<Block> {
        Arc::new(Block::State(StateBlock {
            account: Account::from_bytes([byte; 32]),
            previous: BlockHash::new([1; 32]),
            representative: Account::from_bytes([2; 32]),
            balance: Amount::new(10),
            link: Link::ZERO,
            signature: Signature([3; 64]),
            work: 0,
        }))
    }

    #[test]
    fn equal_blocks_collapse_to_one_instance() {
        let uniquer = BlockUniquer::new();
        let a = uniquer.unique(sample_block(1));
        let b = uniquer.unique(sample_block(1));
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn distinct_blocks_stay_distinct() {
        let uniquer = BlockUniquer::new();
        let a = uniquer.unique(sample_block(1));
        let b = uniquer.unique(sample_block(2));
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(uniquer.size(), 2);
    }

    #[test]
    fn different_work_is_a_different_entry() {
        let uniquer = BlockUniquer::new();
        let a = sample_block(1);
        let mut inner = (*a).clone();
        inner.set_work(99);
        let b = Arc::new(inner);
        let ua = uniquer.unique(a);
        let ub = uniquer.unique(b);
        assert!(!Arc::ptr_eq(&ua, &ub));
    }

    #[test]
    fn dead_entries_eventually_swept() {
        let uniquer = BlockUniquer::new();
        for i in 0..8u8 {
            let block = uniquer.unique(sample_block(i));
            drop(block);
        }
        // All handles are dead; repeated calls shrink the map via sampling.
        let keeper = uniquer.unique(Arc::new(Block::Send(SendBlock {
            previous: BlockHash::new([9; 32]),
            destination: Account::from_bytes([9; 32]),
            balance: Amount::ZERO,
            signature: Signature([0; 64]),
            work: 0,
        })));
        for _ in 0..200 {
            let again = uniquer.unique(keeper.clone());
            assert!(Arc::ptr_eq(&again, &keeper));
        }
        assert!(uniquer.size() <= 2);
    }
}
