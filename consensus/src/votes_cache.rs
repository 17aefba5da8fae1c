//! Cache of our own recent votes, keyed by block hash.
//!
//! When a peer confirm_reqs a block we have already voted on, the cached
//! vote is replayed instead of re-signing with a fresh sequence number.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use keva_blocks::Vote;
use keva_types::BlockHash;

struct Inner {
    cache: HashMap<BlockHash, Vec<Arc<Vote>>>,
    order: VecDeque<BlockHash>,
}

pub struct VotesCache {
    inner: Mutex<Inner>,
    max_size: usize,
}

impl VotesCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                cache: HashMap::new(),
                order: VecDeque::new(),
            }),
            max_size,
        }
    }

    pub fn add(&self, vote: Arc<Vote>) {
        let mut inner = self.inner.lock().unwrap();
        for hash in vote.hashes() {
            if !inner.cache.contains_key(&hash) {
                if inner.order.len() >= self.max_size {
                    if let Some(evicted) = inner.order.pop_front() {
                        inner.cache.remove(&evicted);
                    }
                }
                inner.order.push_back(hash);
            }
            let votes = inner.cache.entry(hash).or_default();
            if !votes.iter().any(|v| v.full_hash() == vote.full_hash()) {
                votes.push(vote.clone());
            }
        }
    }

    pub fn find(&self, hash: &BlockHash) -> Vec<Arc<Vote>> {
        self.inner
            .lock()
            .unwrap()
            .cache
            .get(hash)
            .cloned()
            .unwrap_or_default()
    }

    pub fn remove(&self, hash: &BlockHash) {
        let mut inner = self.inner.lock().unwrap();
        inner.cache.remove(hash);
        inner.order.retain(|h| h != hash);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
