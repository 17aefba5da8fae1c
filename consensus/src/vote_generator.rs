//! Vote generation for this node's representative key.
//!
//! Hashes accepted as `progress` accumulate here; a flush every
//! `VOTE_GENERATOR_DELAY` (or as soon as a full vote's worth is queued)
//! signs one sequence-stamped vote and sends it to every representative
//! peer. The persisted sequence makes restarts replay-safe.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use keva_blocks::{Vote, MAX_HASHES_PER_VOTE};
use keva_ledger::Ledger;
use keva_messages::{ConfirmAck, Message};
use keva_network::PeerTable;
use keva_store::{StoredVote, VoteStore};
use keva_types::{Amount, BlockHash, KeyPair};

use crate::votes_cache::VotesCache;
use crate::OutboundSink;

/// Accumulation window before a flush.
pub const VOTE_GENERATOR_DELAY: Duration = Duration::from_millis(100);

pub struct VoteGenerator {
    ledger: Arc<Ledger>,
    /// The representative key this node votes with, if configured.
    keys: Option<KeyPair>,
    peers: Arc<Mutex<PeerTable>>,
    votes_cache: Arc<VotesCache>,
    outbound: OutboundSink,
    queue: Mutex<Vec<BlockHash>>,
}

impl VoteGenerator {
    pub fn new(
        ledger: Arc<Ledger>,
        keys: Option<KeyPair>,
        peers: Arc<Mutex<PeerTable>>,
        votes_cache: Arc<VotesCache>,
        outbound: OutboundSink,
    ) -> Self {
        Self {
            ledger,
            keys,
            peers,
            votes_cache,
            outbound,
            queue: Mutex::new(Vec::new()),
        }
    }

    pub fn is_representative(&self) -> bool {
        self.keys.is_some()
    }

    /// Queue a hash for the next vote. Returns true when the queue reached
    /// a full vote and the caller should flush immediately.
    pub fn add(&self, hash: BlockHash) -> bool {
        if self.keys.is_none() {
            return false;
        }
        let mut queue = self.queue.lock().unwrap();
        queue.push(hash);
        queue.len() >= MAX_HASHES_PER_VOTE
    }

    pub fn queued(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    /// Sign and broadcast one vote covering up to twelve queued hashes.
    /// Returns the vote for observability; `None` when idle or keyless.
    pub async fn flush(&self) -> Option<Arc<Vote>> {
        let keys = self.keys.as_ref()?;
        let hashes: Vec<BlockHash> = {
            let mut queue = self.queue.lock().unwrap();
            if queue.is_empty() {
                return None;
            }
            let take = queue.len().min(MAX_HASHES_PER_VOTE);
            queue.drain(..take).collect()
        };

        let sequence = match self.next_sequence(keys) {
            Ok(sequence) => sequence,
            Err(err) => {
                tracing::error!(%err, "vote sequence persistence failed");
                return None;
            }
        };
        let vote = Arc::new(Vote::new_signed(keys, sequence, hashes));
        self.votes_cache.add(vote.clone());

        let reps: Vec<_> = {
            let peers = self.peers.lock().unwrap();
            let mut targets: Vec<_> = peers
                .representatives(Amount::ZERO)
                .into_iter()
                .map(|(endpoint, _)| endpoint)
                .collect();
            if targets.is_empty() {
                targets = peers.list_fanout();
            }
            targets
        };
        if !reps.is_empty() {
            let message = Message::ConfirmAck(ConfirmAck { vote: vote.clone() });
            let _ = self.outbound.send((message, reps)).await;
        }
        Some(vote)
    }

    /// Monotonic sequence, persisted so a restart cannot reuse one.
    fn next_sequence(&self, keys: &KeyPair) -> Result<u64, keva_store::StoreError> {
        let account = keys.account();
        let current = self
            .ledger
            .store()
            .vote_get(&account)?
            .map(|stored| stored.sequence)
            .unwrap_or(0);
        let sequence = current + 1;
        let mut batch = self.ledger.store().write_batch()?;
        batch.vote_put(
            &account,
            &StoredVote {
                sequence,
                vote_hash: BlockHash::ZERO,
            },
        )?;
        batch.commit()?;
        Ok(sequence)
    }
}
