//! The active election machine.
//!
//! One election per conflicting root. Votes arrive from the network and
//! update per-election records; the announcement loop periodically tallies,
//! confirms elections whose leader clears the quorum delta, and rebroadcasts
//! confirm_req for the rest. Confirmation against a committed competitor
//! rolls the loser back and applies the winner under one write batch.
//!
//! Lock discipline: the roots mutex is never held across store writes or
//! channel sends — the loop snapshots under the lock, works outside it, and
//! reacquires to apply removals.

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::SocketAddrV6;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use keva_blocks::{Block, Vote};
use keva_ledger::Ledger;
use keva_messages::{ConfirmReq, ConfirmReqPayload, Message, MAX_CONFIRM_REQ_ROOTS};
use keva_network::PeerTable;
use keva_types::{Amount, BlockHash, Root};

use crate::election::Election;
use crate::online_weight::OnlineWeight;
use crate::OutboundSink;

/// Elections announced per round, lowest roots first.
const ANNOUNCEMENTS_PER_INTERVAL: usize = 32;
/// Announcement count that marks an election as long-running.
const ANNOUNCEMENT_LONG: u32 = 20;
/// Unconfirmed elections are abandoned after this long.
const ELECTION_MAX_AGE: Duration = Duration::from_secs(300);
/// Bounded history of confirmed (root, winner) pairs.
const CONFIRMED_HISTORY: usize = 2048;
/// Winner blocks are refloods every this many announcement rounds.
const REBROADCAST_INTERVAL: u32 = 4;

/// What happened to an inbound vote.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VoteOutcome {
    /// At least one hash was already recorded at an equal-or-newer sequence.
    pub replay: bool,
    /// At least one election advanced.
    pub processed: bool,
    /// Hashes with no active election (candidates for gap/vote caches).
    pub unknown: Vec<BlockHash>,
}

struct Inner {
    roots: HashMap<Root, Election>,
    blocks_index: HashMap<BlockHash, Root>,
    confirmed: VecDeque<(Root, BlockHash)>,
    confirmed_roots: HashSet<Root>,
    confirmed_hashes: HashSet<BlockHash>,
}

pub struct ActiveElections {
    ledger: Arc<Ledger>,
    online: Arc<OnlineWeight>,
    peers: Arc<Mutex<PeerTable>>,
    outbound: OutboundSink,
    confirmed_tx: mpsc::UnboundedSender<Arc<Block>>,
    inner: Mutex<Inner>,
}

impl ActiveElections {
    pub fn new(
        ledger: Arc<Ledger>,
        online: Arc<OnlineWeight>,
        peers: Arc<Mutex<PeerTable>>,
        outbound: OutboundSink,
        confirmed_tx: mpsc::UnboundedSender<Arc<Block>>,
    ) -> Self {
        Self {
            ledger,
            online,
            peers,
            outbound,
            confirmed_tx,
            inner: Mutex::new(Inner {
                roots: HashMap::new(),
                blocks_index: HashMap::new(),
                confirmed: VecDeque::new(),
                confirmed_roots: HashSet::new(),
                confirmed_hashes: HashSet::new(),
            }),
        }
    }

    /// Begin (or extend) an election for `block`'s root. Returns true when
    /// a new election was created.
    pub fn start(&self, block: Arc<Block>) -> bool {
        let root = block.root();
        let hash = block.hash();
        let mut inner = self.inner.lock().unwrap();
        if inner.confirmed_roots.contains(&root) || inner.confirmed_hashes.contains(&hash) {
            return false;
        }
        if let Some(election) = inner.roots.get_mut(&root) {
            if election.insert_candidate(block) {
                inner.blocks_index.insert(hash, root);
            }
            return false;
        }
        inner.roots.insert(root, Election::new(block));
        inner.blocks_index.insert(hash, root);
        tracing::debug!(%hash, "election started");
        true
    }

    /// Route a validated vote into the elections covering its hashes.
    pub fn vote(&self, vote: &Vote) -> VoteOutcome {
        self.online.observe(vote.account);
        let mut outcome = VoteOutcome::default();
        let mut inner = self.inner.lock().unwrap();
        for hash in vote.hashes() {
            if inner.confirmed_hashes.contains(&hash) {
                outcome.replay = true;
                continue;
            }
            match inner.blocks_index.get(&hash).copied() {
                Some(root) => {
                    if let Some(election) = inner.roots.get_mut(&root) {
                        let (replay, processed) = election.vote(vote, hash);
                        outcome.replay |= replay;
                        outcome.processed |= processed;
                    }
                }
                None => outcome.unknown.push(hash),
            }
        }
        outcome
    }

    pub fn active_count(&self) -> usize {
        self.inner.lock().unwrap().roots.len()
    }

    pub fn election_exists(&self, root: &Root) -> bool {
        self.inner.lock().unwrap().roots.contains_key(root)
    }

    pub fn recently_confirmed(&self, hash: &BlockHash) -> bool {
        self.inner.lock().unwrap().confirmed_hashes.contains(hash)
    }

    /// One announcement round: confirm what has quorum, drop what has
    /// expired, and solicit votes for the rest.
    pub async fn announce_round(&self) {
        let delta = self.online.delta();
        let ledger = self.ledger.clone();
        let weight_of = move |account: &keva_types::Account| ledger.weight(account);

        // Phase 1: snapshot decisions under the lock.
        let mut to_confirm: Vec<(Root, Arc<Block>, Amount)> = Vec::new();
        let mut to_drop: Vec<Root> = Vec::new();
        let mut announce: Vec<(BlockHash, Root)> = Vec::new();
        let mut rebroadcast: Vec<Arc<Block>> = Vec::new();
        {
            let mut inner = self.inner.lock().unwrap();
            let mut roots_sorted: Vec<Root> = inner.roots.keys().copied().collect();
            roots_sorted.sort();

            for root in &roots_sorted {
                let Some(election) = inner.roots.get_mut(root) else {
                    continue;
                };
                if let Some((weight, winner_hash)) = election.leader(&weight_of) {
                    if weight >= delta && !delta.is_zero() {
                        if let Some(winner) = election.blocks.get(&winner_hash) {
                            to_confirm.push((*root, winner.clone(), weight));
                            continue;
                        }
                    }
                }
                if election.started.elapsed() > ELECTION_MAX_AGE {
                    to_drop.push(*root);
                }
            }

            for root in roots_sorted
                .iter()
                .filter(|r| !to_confirm.iter().any(|(c, _, _)| c == *r))
                .filter(|r| !to_drop.contains(r))
                .take(ANNOUNCEMENTS_PER_INTERVAL)
            {
                let Some(election) = inner.roots.get_mut(root) else {
                    continue;
                };
                election.announcements += 1;
                if election.announcements == ANNOUNCEMENT_LONG {
                    tracing::info!(root = %root, "election running long");
                }
                announce.push((election.winner, *root));
                if election.announcements % REBROADCAST_INTERVAL == 0 {
                    if let Some(winner) = election.blocks.get(&election.winner) {
                        rebroadcast.push(winner.clone());
                    }
                }
            }
        }

        // Phase 2: store writes, outside the elections lock.
        let mut confirmed: Vec<(Root, Arc<Block>)> = Vec::new();
        for (root, winner, tally) in to_confirm {
            match self.commit_winner(&winner) {
                Ok(()) => {
                    tracing::info!(winner = %winner.hash(), %tally, "election confirmed");
                    confirmed.push((root, winner));
                }
                Err(err) => {
                    tracing::error!(winner = %winner.hash(), %err, "confirmation commit failed");
                }
            }
        }

        // Phase 3: apply removals and history.
        {
            let mut inner = self.inner.lock().unwrap();
            for (root, winner) in &confirmed {
                if let Some(election) = inner.roots.remove(root) {
                    for hash in election.blocks.keys() {
                        inner.blocks_index.remove(hash);
                    }
                }
                inner.confirmed.push_back((*root, winner.hash()));
                inner.confirmed_roots.insert(*root);
                inner.confirmed_hashes.insert(winner.hash());
                while inner.confirmed.len() > CONFIRMED_HISTORY {
                    if let Some((old_root, old_hash)) = inner.confirmed.pop_front() {
                        inner.confirmed_roots.remove(&old_root);
                        inner.confirmed_hashes.remove(&old_hash);
                    }
                }
            }
            for root in &to_drop {
                if let Some(election) = inner.roots.remove(root) {
                    tracing::debug!(%root, announcements = election.announcements, "election expired");
                    for hash in election.blocks.keys() {
                        inner.blocks_index.remove(hash);
                    }
                }
            }
        }

        for (_, winner) in &confirmed {
            let _ = self.confirmed_tx.send(winner.clone());
        }

        // Phase 4: network traffic.
        let fanout: Vec<SocketAddrV6> = self.peers.lock().unwrap().list_fanout();
        if fanout.is_empty() {
            return;
        }
        for chunk in announce.chunks(MAX_CONFIRM_REQ_ROOTS) {
            let message = Message::ConfirmReq(ConfirmReq {
                payload: ConfirmReqPayload::Roots(chunk.to_vec()),
            });
            let _ = self.outbound.send((message, fanout.clone())).await;
        }
        for block in rebroadcast {
            let _ = self
                .outbound
                .send((Message::Publish(block), fanout.clone()))
                .await;
        }
    }

    /// Make the store agree with the election winner.
    fn commit_winner(&self, winner: &Arc<Block>) -> Result<(), keva_store::StoreError> {
        if self.ledger.block_exists(&winner.hash())? {
            return Ok(());
        }
        let mut batch = self.ledger.store().write_batch()?;
        let result = self.ledger.winner_supersedes(&mut batch, winner)?;
        batch.commit()?;
        tracing::debug!(winner = %winner.hash(), %result, "winner applied");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keva_crypto::{keypair_from_seed, sign_message};
    use keva_ledger::genesis::TEST_GENESIS_SEED;
    use keva_store_lmdb::LmdbStore;
    use keva_types::{KeyPair, Link, Network, NetworkParams, Signature};
    use keva_work::WorkPool;

    struct Fixture {
        _dir: tempfile::TempDir,
        ledger: Arc<Ledger>,
        active: ActiveElections,
        confirmed_rx: mpsc::UnboundedReceiver<Arc<Block>>,
        _outbound_rx: mpsc::Receiver<(Message, Vec<SocketAddrV6>)>,
        genesis_keys: KeyPair,
        online: Arc<OnlineWeight>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LmdbStore::open(dir.path(), 64 * 1024 * 1024).unwrap());
        let ledger = Arc::new(Ledger::new(store, Network::Test));
        ledger.initialize().unwrap();
        let online = Arc::new(OnlineWeight::new(
            ledger.clone(),
            NetworkParams::new(Network::Test),
        ));
        let peers = Arc::new(Mutex::new(PeerTable::new(true)));
        let (outbound_tx, outbound_rx) = mpsc::channel(64);
        let (confirmed_tx, confirmed_rx) = mpsc::unbounded_channel();
        let active = ActiveElections::new(
            ledger.clone(),
            online.clone(),
            peers,
            outbound_tx,
            confirmed_tx,
        );
        Fixture {
            _dir: dir,
            ledger,
            active,
            confirmed_rx,
            _outbound_rx: outbound_rx,
            genesis_keys: keypair_from_seed(&TEST_GENESIS_SEED),
            online,
        }
    }

    impl Fixture {
        fn signed_state(
            &self,
            keys: &KeyPair,
            previous: BlockHash,
            balance: u128,
            link: Link,
        ) -> Arc<Block> {
            let mut block = keva_blocks::StateBlock {
                account: keys.account(),
                previous,
                representative: keys.account(),
                balance: Amount::new(balance),
                link,
                signature: Signature::ZERO,
                work: 0,
            };
            block.signature = sign_message(&keys.private, &keys.public, &block.hash());
            let root = if previous.is_zero() {
                Root::from(keys.account())
            } else {
                Root::from(previous)
            };
            let pool = WorkPool::new(Network::Test.publish_threshold());
            block.work = pool.generate(&root, 1).unwrap();
            Arc::new(Block::State(block))
        }
    }

    #[test]
    fn start_dedups_by_root() {
        let fx = fixture();
        let head = fx
            .ledger
            .latest(&fx.ledger.genesis_account())
            .unwrap()
            .unwrap();
        let a = fx.signed_state(&fx.genesis_keys, head, u128::MAX - 1, Link::ZERO);
        let b = fx.signed_state(&fx.genesis_keys, head, u128::MAX - 2, Link::ZERO);
        assert!(fx.active.start(a));
        assert!(!fx.active.start(b));
        assert_eq!(fx.active.active_count(), 1);
    }

    #[test]
    fn votes_for_unknown_hashes_reported() {
        let fx = fixture();
        let vote = Vote::new_signed(&fx.genesis_keys, 1, vec![BlockHash::new([9; 32])]);
        let outcome = fx.active.vote(&vote);
        assert!(!outcome.processed);
        assert_eq!(outcome.unknown, vec![BlockHash::new([9; 32])]);
    }

    #[tokio::test]
    async fn fork_resolved_by_quorum_vote() {
        let mut fx = fixture();
        let genesis_account = fx.ledger.genesis_account();
        let head = fx.ledger.latest(&genesis_account).unwrap().unwrap();
        let dest_a = keypair_from_seed(&[4u8; 32]);
        let dest_b = keypair_from_seed(&[5u8; 32]);

        let committed = fx.signed_state(
            &fx.genesis_keys,
            head,
            u128::MAX - 10,
            Link::from(dest_a.account()),
        );
        let winner = fx.signed_state(
            &fx.genesis_keys,
            head,
            u128::MAX - 20,
            Link::from(dest_b.account()),
        );

        // Commit the first block, then discover the fork.
        let mut batch = fx.ledger.store().write_batch().unwrap();
        fx.ledger.process(&mut batch, &committed).unwrap();
        batch.commit().unwrap();

        fx.active.start(committed.clone());
        fx.active.start(winner.clone());

        // Give quorum a denominator: genesis has voted recently.
        fx.online.observe(genesis_account);
        fx.online.sample();

        // The genesis rep (all the weight) votes for the second block.
        let vote = Vote::new_signed(&fx.genesis_keys, 1, vec![winner.hash()]);
        let outcome = fx.active.vote(&vote);
        assert!(outcome.processed);

        fx.active.announce_round().await;

        assert!(fx.ledger.block_exists(&winner.hash()).unwrap());
        assert!(!fx.ledger.block_exists(&committed.hash()).unwrap());
        assert!(fx.active.recently_confirmed(&winner.hash()));
        assert_eq!(fx.active.active_count(), 0);
        let confirmed = fx.confirmed_rx.try_recv().unwrap();
        assert_eq!(confirmed.hash(), winner.hash());
    }

    #[tokio::test]
    async fn no_confirmation_below_quorum() {
        let fx = fixture();
        let head = fx
            .ledger
            .latest(&fx.ledger.genesis_account())
            .unwrap()
            .unwrap();
        let block = fx.signed_state(&fx.genesis_keys, head, u128::MAX - 1, Link::ZERO);
        fx.active.start(block.clone());

        // Establish online weight so delta is nonzero, then vote with a
        // weightless key.
        fx.online.observe(fx.ledger.genesis_account());
        fx.online.sample();
        let nobody = keypair_from_seed(&[42u8; 32]);
        let vote = Vote::new_signed(&nobody, 1, vec![block.hash()]);
        fx.active.vote(&vote);

        fx.active.announce_round().await;
        assert_eq!(fx.active.active_count(), 1);
        assert!(!fx.ledger.block_exists(&block.hash()).unwrap());
    }
}
