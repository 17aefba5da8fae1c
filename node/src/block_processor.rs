//! The block processing pipeline.
//!
//! Blocks queue in three lanes: state blocks (eligible for batched
//! signature verification), other blocks, and a forced lane whose entries
//! may roll back a committed competitor. A dedicated thread drains the
//! lanes: it verifies a batch of state-block signatures in parallel, then
//! applies blocks one at a time inside a single write batch whose wall time
//! is bounded so readers are never starved. Results are published as events
//! for the async side of the node to act on.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use tokio::sync::mpsc;

use keva_blocks::{Block, BlockType};
use keva_crypto::validate_message;
use keva_ledger::{Ledger, ProcessResult, EPOCH_LINK};
use keva_store::{SignatureVerification, UncheckedInfo};
use keva_types::{unix_seconds, BlockHash, PublicKey};

/// State blocks signature-checked per parallel batch.
const SIGNATURE_BATCH: usize = 256;
/// Bound on remembered rollback victims (thrash guard).
const ROLLED_BACK_MAX: usize = 1024;
/// Queue bound per lane.
const QUEUE_MAX: usize = 64 * 1024;

/// One processed block and its outcome, published to the node.
#[derive(Clone, Debug)]
pub struct ProcessedEvent {
    pub block: Arc<Block>,
    pub result: ProcessResult,
}

#[derive(Default)]
struct Queues {
    state_blocks: VecDeque<Arc<Block>>,
    blocks: VecDeque<Arc<Block>>,
    forced: VecDeque<Arc<Block>>,
}

impl Queues {
    fn is_empty(&self) -> bool {
        self.state_blocks.is_empty() && self.blocks.is_empty() && self.forced.is_empty()
    }

    fn len(&self) -> usize {
        self.state_blocks.len() + self.blocks.len() + self.forced.len()
    }
}

/// Bounded memory of recently rolled-back hashes, indexed by insertion
/// order and by hash, so a fork loop cannot thrash rollbacks.
#[derive(Default)]
struct RolledBack {
    order: VecDeque<BlockHash>,
    set: HashSet<BlockHash>,
}

impl RolledBack {
    fn insert(&mut self, hash: BlockHash) {
        if !self.set.insert(hash) {
            return;
        }
        self.order.push_back(hash);
        while self.order.len() > ROLLED_BACK_MAX {
            if let Some(old) = self.order.pop_front() {
                self.set.remove(&old);
            }
        }
    }

    fn contains(&self, hash: &BlockHash) -> bool {
        self.set.contains(hash)
    }
}

pub struct BlockProcessor {
    ledger: Arc<Ledger>,
    queues: Mutex<Queues>,
    condition: Condvar,
    stopped: AtomicBool,
    batch_max_time: Duration,
    events: mpsc::UnboundedSender<ProcessedEvent>,
    rolled_back: Mutex<RolledBack>,
}

impl BlockProcessor {
    pub fn new(
        ledger: Arc<Ledger>,
        batch_max_time: Duration,
        events: mpsc::UnboundedSender<ProcessedEvent>,
    ) -> Self {
        Self {
            ledger,
            queues: Mutex::new(Queues::default()),
            condition: Condvar::new(),
            stopped: AtomicBool::new(false),
            batch_max_time,
            events,
            rolled_back: Mutex::new(RolledBack::default()),
        }
    }

    /// Enqueue a block from the network or bootstrap.
    pub fn add(&self, block: Arc<Block>) {
        let mut queues = self.queues.lock().unwrap();
        if queues.len() >= QUEUE_MAX {
            tracing::warn!("block processor queue full, dropping");
            return;
        }
        match block.block_type() {
            BlockType::State => queues.state_blocks.push_back(block),
            _ => queues.blocks.push_back(block),
        }
        drop(queues);
        self.condition.notify_one();
    }

    /// Enqueue a block that must take its slot even over a committed
    /// competitor (election winners).
    pub fn force(&self, block: Arc<Block>) {
        self.queues.lock().unwrap().forced.push_back(block);
        self.condition.notify_one();
    }

    pub fn queue_len(&self) -> usize {
        self.queues.lock().unwrap().len()
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.condition.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// The processing loop; run on a dedicated thread.
    pub fn run(&self) {
        while !self.is_stopped() {
            let mut queues = self.queues.lock().unwrap();
            while queues.is_empty() && !self.is_stopped() {
                queues = self.condition.wait(queues).unwrap();
            }
            if self.is_stopped() {
                return;
            }
            drop(queues);
            self.process_batch();
        }
    }

    /// Drain what fits in one bounded write batch.
    fn process_batch(&self) {
        // Pre-verify a slice of state-block signatures in parallel; invalid
        // ones are rejected here without touching the store.
        let verified = self.verify_state_batch();

        let mut batch = match self.ledger.store().write_batch() {
            Ok(batch) => batch,
            Err(err) => {
                tracing::error!(%err, "write batch open failed");
                self.stop();
                return;
            }
        };

        let deadline = Instant::now() + self.batch_max_time;
        let mut requeue: Vec<Arc<Block>> = Vec::new();
        let mut events: Vec<ProcessedEvent> = Vec::new();

        loop {
            if Instant::now() >= deadline {
                break;
            }
            let (block, forced) = {
                let mut queues = self.queues.lock().unwrap();
                if let Some(block) = queues.forced.pop_front() {
                    (block, true)
                } else if let Some(block) = queues.blocks.pop_front() {
                    (block, false)
                } else {
                    break;
                }
            };
            match self.process_one(&mut batch, &block, forced, &mut requeue) {
                Ok(result) => events.push(ProcessedEvent { block, result }),
                Err(err) => {
                    tracing::error!(%err, "store failure during block processing");
                    self.stop();
                    return;
                }
            }
        }

        // Verified state blocks flow through the same transaction.
        for block in verified {
            if Instant::now() >= deadline {
                // Out of budget: return them to the front of the lane.
                let mut queues = self.queues.lock().unwrap();
                queues.state_blocks.push_front(block);
                continue;
            }
            match self.process_one(&mut batch, &block, false, &mut requeue) {
                Ok(result) => events.push(ProcessedEvent { block, result }),
                Err(err) => {
                    tracing::error!(%err, "store failure during block processing");
                    self.stop();
                    return;
                }
            }
        }

        if let Err(err) = batch.commit() {
            tracing::error!(%err, "block batch commit failed");
            self.stop();
            return;
        }

        // Publish results and requeue gap-released dependents only after
        // the batch is durable.
        for block in requeue {
            self.add(block);
        }
        for event in events {
            let _ = self.events.send(event);
        }
    }

    /// Take up to one signature batch of state blocks and verify in
    /// parallel. Invalid blocks are reported and dropped.
    fn verify_state_batch(&self) -> Vec<Arc<Block>> {
        let candidates: Vec<Arc<Block>> = {
            let mut queues = self.queues.lock().unwrap();
            let take = queues.state_blocks.len().min(SIGNATURE_BATCH);
            queues.state_blocks.drain(..take).collect()
        };
        if candidates.is_empty() {
            return candidates;
        }
        let epoch_signer = self.ledger.genesis().epoch_signer;
        let checked: Vec<(Arc<Block>, bool)> = candidates
            .into_par_iter()
            .map(|block| {
                let signer = if block.link() == EPOCH_LINK {
                    epoch_signer
                } else {
                    block.account()
                };
                let valid =
                    validate_message(&PublicKey::from(signer), &block.hash(), &block.signature());
                (block, valid)
            })
            .collect();

        let mut valid = Vec::with_capacity(checked.len());
        for (block, ok) in checked {
            if ok {
                valid.push(block);
            } else {
                let _ = self.events.send(ProcessedEvent {
                    block,
                    result: ProcessResult::BadSignature,
                });
            }
        }
        valid
    }

    /// Apply one block; on gaps, park it in the unchecked table; on
    /// progress, release its dependents back into the queues.
    fn process_one(
        &self,
        batch: &mut keva_store_lmdb::WriteBatch<'_>,
        block: &Arc<Block>,
        forced: bool,
        requeue: &mut Vec<Arc<Block>>,
    ) -> Result<ProcessResult, keva_store::StoreError> {
        let hash = block.hash();
        let mut result = self.ledger.process(batch, block)?;

        if result == ProcessResult::Fork && forced {
            // A forced block takes the slot unless it was itself the victim
            // of a recent rollback (a fork ping-pong).
            if self.rolled_back.lock().unwrap().contains(&hash) {
                tracing::debug!(%hash, "forced block recently rolled back, ignoring");
            } else {
                result = self.ledger.winner_supersedes(batch, block)?;
                if result == ProcessResult::Progress {
                    let mut rolled_back = self.rolled_back.lock().unwrap();
                    rolled_back.insert(hash);
                }
            }
        }

        match result {
            ProcessResult::Progress => {
                for info in batch.unchecked_drain(&hash)? {
                    match info.block() {
                        Ok(dependent) => requeue.push(Arc::new(dependent)),
                        Err(err) => tracing::warn!(%err, "undecodable unchecked entry dropped"),
                    }
                }
            }
            ProcessResult::GapPrevious => {
                let info =
                    UncheckedInfo::new(block, block.account(), unix_seconds(), SignatureVerification::Unknown);
                batch.unchecked_put(&block.previous(), &hash, &info)?;
            }
            ProcessResult::GapSource => {
                let dependency = if block.source().is_zero() {
                    block.link().as_block_hash()
                } else {
                    block.source()
                };
                let info =
                    UncheckedInfo::new(block, block.account(), unix_seconds(), SignatureVerification::Unknown);
                batch.unchecked_put(&dependency, &hash, &info)?;
            }
            _ => {}
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keva_crypto::{keypair_from_seed, sign_message};
    use keva_ledger::genesis::TEST_GENESIS_SEED;
    use keva_store_lmdb::LmdbStore;
    use keva_store::UncheckedStore;
    use keva_types::{Account, Amount, KeyPair, Link, Network, Root, Signature};
    use keva_work::WorkPool;

    struct Fixture {
        _dir: tempfile::TempDir,
        ledger: Arc<Ledger>,
        processor: Arc<BlockProcessor>,
        events: mpsc::UnboundedReceiver<ProcessedEvent>,
        genesis_keys: KeyPair,
        pool: WorkPool,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LmdbStore::open(dir.path(), 64 * 1024 * 1024).unwrap());
        let ledger = Arc::new(Ledger::new(store, Network::Test));
        ledger.initialize().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        let processor = Arc::new(BlockProcessor::new(
            ledger.clone(),
            Duration::from_millis(250),
            tx,
        ));
        Fixture {
            _dir: dir,
            ledger,
            processor,
            events: rx,
            genesis_keys: keypair_from_seed(&TEST_GENESIS_SEED),
            pool: WorkPool::new(Network::Test.publish_threshold()),
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
            block.work = self.pool.generate(&root, 1).unwrap();
            Arc::new(Block::State(block))
        }

        /// Drive the pipeline synchronously until the queues drain.
        fn drain(&self) {
            while self.processor.queue_len() > 0 {
                self.processor.process_batch();
            }
        }
    }

    #[test]
    fn publish_then_commit() {
        let mut fx = fixture();
        let genesis_account = fx.ledger.genesis_account();
        let head = fx.ledger.latest(&genesis_account).unwrap().unwrap();
        let send = fx.signed_state(&fx.genesis_keys, head, u128::MAX - 1, Link::ZERO);

        fx.processor.add(send.clone());
        fx.drain();

        assert!(fx.ledger.block_exists(&send.hash()).unwrap());
        let event = fx.events.try_recv().unwrap();
        assert_eq!(event.result, ProcessResult::Progress);
        assert_eq!(event.block.hash(), send.hash());
    }

    #[test]
    fn invalid_signature_rejected_in_prepass() {
        let mut fx = fixture();
        let genesis_account = fx.ledger.genesis_account();
        let head = fx.ledger.latest(&genesis_account).unwrap().unwrap();
        let mut send = (*fx.signed_state(&fx.genesis_keys, head, u128::MAX - 1, Link::ZERO)).clone();
        send.set_signature(Signature([9; 64]));
        let send = Arc::new(send);

        fx.processor.add(send.clone());
        fx.drain();

        assert!(!fx.ledger.block_exists(&send.hash()).unwrap());
        let event = fx.events.try_recv().unwrap();
        assert_eq!(event.result, ProcessResult::BadSignature);
    }

    #[test]
    fn gap_previous_parks_in_unchecked_and_releases() {
        let mut fx = fixture();
        let genesis_account = fx.ledger.genesis_account();
        let head = fx.ledger.latest(&genesis_account).unwrap().unwrap();
        let first = fx.signed_state(&fx.genesis_keys, head, u128::MAX - 1, Link::ZERO);
        let second = fx.signed_state(&fx.genesis_keys, first.hash(), u128::MAX - 2, Link::ZERO);

        // Child first: parks under its missing previous.
        fx.processor.add(second.clone());
        fx.drain();
        assert_eq!(
            fx.events.try_recv().unwrap().result,
            ProcessResult::GapPrevious
        );
        assert_eq!(fx.ledger.store().unchecked_count().unwrap(), 1);
        assert!(!fx.ledger.block_exists(&second.hash()).unwrap());

        // Parent arrives: both land.
        fx.processor.add(first.clone());
        fx.drain();
        assert!(fx.ledger.block_exists(&first.hash()).unwrap());
        assert!(fx.ledger.block_exists(&second.hash()).unwrap());
        assert_eq!(fx.ledger.store().unchecked_count().unwrap(), 0);
    }

    #[test]
    fn gap_source_parks_under_link() {
        let mut fx = fixture();
        let receiver = keypair_from_seed(&[2u8; 32]);
        let missing_send = BlockHash::new([0xAB; 32]);
        let open = fx.signed_state(&receiver, BlockHash::ZERO, 100, Link::from(missing_send));

        fx.processor.add(open);
        fx.drain();

        assert_eq!(
            fx.events.try_recv().unwrap().result,
            ProcessResult::GapSource
        );
        assert_eq!(
            fx.ledger.store().unchecked_get(&missing_send).unwrap().len(),
            1
        );
    }

    #[test]
    fn fork_reported_not_committed() {
        let mut fx = fixture();
        let genesis_account = fx.ledger.genesis_account();
        let head = fx.ledger.latest(&genesis_account).unwrap().unwrap();
        let a = fx.signed_state(&fx.genesis_keys, head, u128::MAX - 1, Link::ZERO);
        let b = fx.signed_state(&fx.genesis_keys, head, u128::MAX - 2, Link::ZERO);

        fx.processor.add(a.clone());
        fx.drain();
        fx.events.try_recv().unwrap();

        fx.processor.add(b.clone());
        fx.drain();
        let event = fx.events.try_recv().unwrap();
        assert_eq!(event.result, ProcessResult::Fork);
        assert!(fx.ledger.block_exists(&a.hash()).unwrap());
        assert!(!fx.ledger.block_exists(&b.hash()).unwrap());
    }

    #[test]
    fn forced_fork_supersedes_committed() {
        let mut fx = fixture();
        let genesis_account = fx.ledger.genesis_account();
        let head = fx.ledger.latest(&genesis_account).unwrap().unwrap();
        let a = fx.signed_state(&fx.genesis_keys, head, u128::MAX - 1, Link::ZERO);
        let b = fx.signed_state(&fx.genesis_keys, head, u128::MAX - 2, Link::ZERO);

        fx.processor.add(a.clone());
        fx.drain();
        fx.events.try_recv().unwrap();

        fx.processor.force(b.clone());
        fx.drain();
        let event = fx.events.try_recv().unwrap();
        assert_eq!(event.result, ProcessResult::Progress);
        assert!(fx.ledger.block_exists(&b.hash()).unwrap());
        assert!(!fx.ledger.block_exists(&a.hash()).unwrap());
    }

    #[test]
    fn duplicate_reports_old() {
        let mut fx = fixture();
        let genesis_account = fx.ledger.genesis_account();
        let head = fx.ledger.latest(&genesis_account).unwrap().unwrap();
        let send = fx.signed_state(&fx.genesis_keys, head, u128::MAX - 1, Link::ZERO);

        fx.processor.add(send.clone());
        fx.drain();
        fx.events.try_recv().unwrap();

        fx.processor.add(send);
        fx.drain();
        assert_eq!(fx.events.try_recv().unwrap().result, ProcessResult::Old);
    }

    #[test]
    fn stop_wakes_the_loop() {
        let fx = fixture();
        let processor = fx.processor.clone();
        let handle = std::thread::spawn(move || processor.run());
        std::thread::sleep(Duration::from_millis(50));
        fx.processor.stop();
        handle.join().unwrap();
    }
}
