//! Recent block arrival tracking.
//!
//! Distinguishes blocks that just arrived off the wire (which should seed
//! elections) from historical blocks streamed in by bootstrap (which should
//! not). A time-ordered queue plus a hash set gives O(1) membership with
//! cheap pruning from the front.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use keva_types::BlockHash;

/// A block is "recent" for this long after arrival.
const ARRIVAL_WINDOW: Duration = Duration::from_secs(300);
/// Hard bound on tracked arrivals.
const MAX_ARRIVALS: usize = 256 * 1024;

#[derive(Default)]
struct Inner {
    order: VecDeque<(Instant, BlockHash)>,
    set: HashSet<BlockHash>,
}

#[derive(Default)]
pub struct BlockArrival {
    inner: Mutex<Inner>,
}

impl BlockArrival {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an arrival off the wire. Returns false if already tracked.
    pub fn add(&self, hash: BlockHash) -> bool {
        let mut inner = self.inner.lock().unwrap();
        Self::prune(&mut inner);
        if !inner.set.insert(hash) {
            return false;
        }
        inner.order.push_back((Instant::now(), hash));
        true
    }

    /// Whether `hash` arrived off the wire within the window.
    pub fn recent(&self, hash: &BlockHash) -> bool {
        let mut inner = self.inner.lock().unwrap();
        Self::prune(&mut inner);
        inner.set.contains(hash)
    }

    fn prune(inner: &mut Inner) {
        let cutoff = Instant::now() - ARRIVAL_WINDOW;
        while let Some((arrived, hash)) = inner.order.front().copied() {
            if arrived >= cutoff && inner.order.len() <= MAX_ARRIVALS {
                break;
            }
            inner.order.pop_front();
            inner.set.remove(&hash);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn added_blocks_are_recent() {
        let arrival = BlockArrival::new();
        let hash = BlockHash::new([1; 32]);
        assert!(arrival.add(hash));
        assert!(arrival.recent(&hash));
        assert!(!arrival.recent(&BlockHash::new([2; 32])));
    }

    #[test]
    fn duplicate_add_reports_false() {
        let arrival = BlockArrival::new();
        let hash = BlockHash::new([1; 32]);
        assert!(arrival.add(hash));
        assert!(!arrival.add(hash));
        assert_eq!(arrival.len(), 1);
    }
}
