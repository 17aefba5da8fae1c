//! Per-root election state.
//!
//! An election exists for one root (one slot in one account chain) and
//! tracks every candidate block seen for that slot plus the latest vote
//! from each representative. Tallying reduces `last_votes` through the
//! ledger's representation weights; the election confirms when the leading
//! candidate's weight reaches the quorum delta.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use keva_blocks::{Block, Vote};
use keva_types::{Account, Amount, BlockHash, Root};

/// The latest accepted vote from one representative.
#[derive(Clone, Debug)]
pub struct VoteRecord {
    pub time: Instant,
    pub sequence: u64,
    pub hash: BlockHash,
    /// Full hash of the carrying vote, the tiebreak at equal sequence.
    pub vote_full_hash: BlockHash,
}

/// Snapshot of a finished (or running) election.
#[derive(Clone, Debug)]
pub struct ElectionStatus {
    pub winner: BlockHash,
    pub tally: Amount,
    pub started: Instant,
    pub confirmed_at: Option<Instant>,
    pub announcements: u32,
}

pub struct Election {
    pub root: Root,
    /// Every candidate for this slot, by hash.
    pub blocks: HashMap<BlockHash, Arc<Block>>,
    /// account → latest vote accepted from that representative.
    pub last_votes: HashMap<Account, VoteRecord>,
    /// The current leader (initially the block that started the election).
    pub winner: BlockHash,
    pub started: Instant,
    pub announcements: u32,
}

impl Election {
    pub fn new(block: Arc<Block>) -> Self {
        let hash = block.hash();
        let mut blocks = HashMap::new();
        blocks.insert(hash, block);
        Self {
            root: blocks[&hash].root(),
            blocks,
            last_votes: HashMap::new(),
            winner: hash,
            started: Instant::now(),
            announcements: 0,
        }
    }

    /// Add a fork candidate. Returns false if it was already present.
    pub fn insert_candidate(&mut self, block: Arc<Block>) -> bool {
        debug_assert_eq!(block.root(), self.root);
        self.blocks.insert(block.hash(), block).is_none()
    }

    /// Apply one representative's vote for `hash`.
    ///
    /// Acceptance rule: a vote replaces the existing record iff its
    /// sequence is higher, or equal with a greater vote full-hash (a total
    /// order that makes equivocation at one sequence deterministic).
    /// Returns `(replay, processed)`: replay is true when the vote did not
    /// advance the record.
    pub fn vote(&mut self, vote: &Vote, hash: BlockHash) -> (bool, bool) {
        let full_hash = vote.full_hash();
        match self.last_votes.get(&vote.account) {
            Some(existing)
                if vote.sequence < existing.sequence
                    || (vote.sequence == existing.sequence
                        && full_hash <= existing.vote_full_hash) =>
            {
                (true, false)
            }
            _ => {
                self.last_votes.insert(
                    vote.account,
                    VoteRecord {
                        time: Instant::now(),
                        sequence: vote.sequence,
                        hash,
                        vote_full_hash: full_hash,
                    },
                );
                (false, true)
            }
        }
    }

    /// Reduce `last_votes` through `weight_of`, descending by weight.
    pub fn tally(&self, weight_of: &dyn Fn(&Account) -> Amount) -> Vec<(Amount, BlockHash)> {
        let mut per_block: HashMap<BlockHash, Amount> = HashMap::new();
        for (account, record) in &self.last_votes {
            let weight = weight_of(account);
            let entry = per_block.entry(record.hash).or_insert(Amount::ZERO);
            *entry = entry
                .checked_add(weight)
                .unwrap_or(Amount::MAX);
        }
        let mut sorted: Vec<(Amount, BlockHash)> =
            per_block.into_iter().map(|(hash, w)| (w, hash)).collect();
        sorted.sort_by(|a, b| b.0.cmp(&a.0));
        sorted
    }

    /// Update the leader from a tally; returns the leader and its weight.
    pub fn leader(
        &mut self,
        weight_of: &dyn Fn(&Account) -> Amount,
    ) -> Option<(Amount, BlockHash)> {
        let tally = self.tally(weight_of);
        if let Some((weight, hash)) = tally.first() {
            // Only adopt candidates we actually hold a block for.
            if self.blocks.contains_key(hash) {
                self.winner = *hash;
            }
            return Some((*weight, *hash));
        }
        None
    }

    pub fn status(&self) -> ElectionStatus {
        ElectionStatus {
            winner: self.winner,
            tally: Amount::ZERO,
            started: self.started,
            confirmed_at: None,
            announcements: self.announcements,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keva_blocks::StateBlock;
    use keva_crypto::keypair_from_seed;
    use keva_types::{KeyPair, Link, Signature};

    fn candidate(balance: u128) -> Arc<Block> {
        Arc::new(Block::State(StateBlock {
            account: Account::from_bytes([1; 32]),
            previous: BlockHash::new([2; 32]),
            representative: Account::from_bytes([3; 32]),
            balance: Amount::new(balance),
            link: Link::ZERO,
            signature: Signature([4; 64]),
            work: 0,
        }))
    }

    fn rep(seed: u8) -> KeyPair {
        keypair_from_seed(&[seed; 32])
    }

    #[test]
    fn new_election_has_one_candidate() {
        let block = candidate(10);
        let election = Election::new(block.clone());
        assert_eq!(election.winner, block.hash());
        assert_eq!(election.blocks.len(), 1);
        assert_eq!(election.root, block.root());
    }

    #[test]
    fn candidates_share_root() {
        let a = candidate(10);
        let b = candidate(20);
        let mut election = Election::new(a);
        assert!(election.insert_candidate(b.clone()));
        assert!(!election.insert_candidate(b));
        assert_eq!(election.blocks.len(), 2);
    }

    #[test]
    fn first_vote_processed() {
        let block = candidate(10);
        let mut election = Election::new(block.clone());
        let keys = rep(1);
        let vote = Vote::new_signed(&keys, 1, vec![block.hash()]);
        assert_eq!(election.vote(&vote, block.hash()), (false, true));
    }

    #[test]
    fn lower_sequence_is_replay() {
        let block = candidate(10);
        let mut election = Election::new(block.clone());
        let keys = rep(1);
        let v2 = Vote::new_signed(&keys, 2, vec![block.hash()]);
        let v1 = Vote::new_signed(&keys, 1, vec![block.hash()]);
        election.vote(&v2, block.hash());
        assert_eq!(election.vote(&v1, block.hash()), (true, false));
    }

    #[test]
    fn higher_sequence_replaces() {
        let a = candidate(10);
        let b = candidate(20);
        let mut election = Election::new(a.clone());
        election.insert_candidate(b.clone());
        let keys = rep(1);
        election.vote(&Vote::new_signed(&keys, 1, vec![a.hash()]), a.hash());
        let (replay, processed) =
            election.vote(&Vote::new_signed(&keys, 2, vec![b.hash()]), b.hash());
        assert!(!replay && processed);
        assert_eq!(election.last_votes[&keys.account()].hash, b.hash());
    }

    #[test]
    fn equal_sequence_tiebreaks_on_full_hash() {
        let a = candidate(10);
        let b = candidate(20);
        let mut election = Election::new(a.clone());
        election.insert_candidate(b.clone());
        let keys = rep(1);
        let va = Vote::new_signed(&keys, 1, vec![a.hash()]);
        let vb = Vote::new_signed(&keys, 1, vec![b.hash()]);
        let (first, second, first_hash, second_hash) = if va.full_hash() < vb.full_hash() {
            (va, vb, a.hash(), b.hash())
        } else {
            (vb, va, b.hash(), a.hash())
        };
        election.vote(&first, first_hash);
        let (replay, processed) = election.vote(&second, second_hash);
        assert!(processed, "greater full-hash replaces at equal sequence");
        assert!(!replay);
        // And the reverse direction is a replay.
        let (replay, processed) = election.vote(&first, first_hash);
        assert!(replay && !processed);
    }

    #[test]
    fn tally_sums_weights_per_candidate() {
        let a = candidate(10);
        let b = candidate(20);
        let mut election = Election::new(a.clone());
        election.insert_candidate(b.clone());

        let r1 = rep(1);
        let r2 = rep(2);
        let r3 = rep(3);
        election.vote(&Vote::new_signed(&r1, 1, vec![a.hash()]), a.hash());
        election.vote(&Vote::new_signed(&r2, 1, vec![b.hash()]), b.hash());
        election.vote(&Vote::new_signed(&r3, 1, vec![b.hash()]), b.hash());

        let weights: HashMap<Account, Amount> = [
            (r1.account(), Amount::new(100)),
            (r2.account(), Amount::new(60)),
            (r3.account(), Amount::new(70)),
        ]
        .into_iter()
        .collect();
        let weight_of =
            move |account: &Account| weights.get(account).copied().unwrap_or(Amount::ZERO);

        let tally = election.tally(&weight_of);
        assert_eq!(tally[0], (Amount::new(130), b.hash()));
        assert_eq!(tally[1], (Amount::new(100), a.hash()));

        let (weight, leader) = election.leader(&weight_of).unwrap();
        assert_eq!(leader, b.hash());
        assert_eq!(weight, Amount::new(130));
        assert_eq!(election.winner, b.hash());
    }
}
