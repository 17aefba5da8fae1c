//! Bootstrap client.
//!
//! Three synchronization modes over TCP:
//!
//! - **legacy**: walk a peer's frontiers, pull every chain whose remote
//!   head differs from ours, and push back chains the peer is missing.
//! - **lazy**: seed with one hash (usually from the gap cache) and walk its
//!   dependency closure, pulling unknown previous/link references until the
//!   frontier of the unknown region is exhausted.
//! - **wallet**: discover receivable entries for a set of accounts and
//!   lazily pull the send blocks behind them.
//!
//! Failed pulls requeue with an attempt counter; connection counts scale
//! with the square root of the outstanding pull count.

use std::collections::{HashSet, VecDeque};
use std::net::SocketAddrV6;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use keva_blocks::{Block, BlockType};
use keva_ledger::Ledger;
use keva_messages::{
    BulkPull, BulkPullAccount, FrontierReq, Message, PendingAddressFlag,
};
use keva_network::PeerTable;
use keva_types::{Account, Amount, BlockHash, Root};

use crate::block_processor::BlockProcessor;

/// Give up on a pull after this many attempts.
const PULL_RETRY_LIMIT: u32 = 16;
/// Cap on blocks accepted per lazy pull.
const LAZY_MAX_PULL_BLOCKS: u32 = 512;
/// A lazy attempt halts after this many empty/failed pull rounds.
const LAZY_MAX_STOPPED: usize = 256;
/// TCP connect/read inactivity budget.
const IO_TIMEOUT: Duration = Duration::from_secs(5);

/// One outstanding chain pull.
#[derive(Clone, Debug)]
struct PullInfo {
    /// Account or head hash to pull from.
    start: Root,
    /// Pull stops when this hash is reached (our head, or zero).
    end: BlockHash,
    attempts: u32,
}

pub struct BootstrapInitiator {
    ledger: Arc<Ledger>,
    processor: Arc<BlockProcessor>,
    peers: Arc<Mutex<PeerTable>>,
    stopped: Arc<AtomicBool>,
    connections_min: usize,
    connections_max: usize,
    /// Completed pulls, for observability.
    pulls_done: AtomicU64,
    /// Serializes attempts: only one runs at a time.
    running: tokio::sync::Mutex<()>,
}

impl BootstrapInitiator {
    pub fn new(
        ledger: Arc<Ledger>,
        processor: Arc<BlockProcessor>,
        peers: Arc<Mutex<PeerTable>>,
        stopped: Arc<AtomicBool>,
        connections_min: usize,
        connections_max: usize,
    ) -> Self {
        Self {
            ledger,
            processor,
            peers,
            stopped,
            connections_min: connections_min.max(1),
            connections_max: connections_max.max(1),
            pulls_done: AtomicU64::new(0),
            running: tokio::sync::Mutex::new(()),
        }
    }

    pub fn pulls_done(&self) -> u64 {
        self.pulls_done.load(Ordering::Relaxed)
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// How many connections an attempt should hold open for `pulls`
    /// outstanding pulls.
    fn target_connections(&self, pulls: usize) -> usize {
        let sqrt = (pulls as f64).sqrt().ceil() as usize;
        sqrt.clamp(self.connections_min, self.connections_max)
    }

    async fn connect(&self, endpoint: SocketAddrV6) -> std::io::Result<TcpStream> {
        tokio::time::timeout(IO_TIMEOUT, TcpStream::connect(endpoint))
            .await
            .map_err(|_| std::io::Error::from(std::io::ErrorKind::TimedOut))?
    }

    fn pick_peer(&self) -> Option<SocketAddrV6> {
        self.peers.lock().unwrap().bootstrap_peer()
    }

    /// Legacy bootstrap against one peer: frontier scan, then pulls (and
    /// pushes for chains the peer lacks).
    pub async fn bootstrap_legacy(&self) {
        let _guard = self.running.lock().await;
        let peer = match self.pick_peer() {
            Some(peer) => peer,
            None => return,
        };
        let (pulls, pushes) = match self.request_frontiers(peer).await {
            Ok(result) => result,
            Err(err) => {
                tracing::debug!(%peer, %err, "frontier request failed");
                return;
            }
        };
        tracing::info!(%peer, pulls = pulls.len(), pushes = pushes.len(), "legacy bootstrap");
        self.run_pulls(peer, pulls).await;
        for (head, stop) in pushes {
            if let Err(err) = self.push_chain(peer, head, stop).await {
                tracing::debug!(%peer, %err, "bulk push failed");
                break;
            }
        }
    }

    /// Lazy bootstrap: walk the dependency closure of `seed`.
    pub async fn bootstrap_lazy(&self, seed: BlockHash) {
        let _guard = self.running.lock().await;
        let peer = match self.pick_peer() {
            Some(peer) => peer,
            None => return,
        };
        tracing::info!(%peer, %seed, "lazy bootstrap");
        self.run_lazy(peer, VecDeque::from([seed])).await;
    }

    /// Wallet bootstrap: find receivable sends for `accounts` and pull the
    /// chains behind them.
    pub async fn bootstrap_wallet(&self, accounts: Vec<Account>) {
        let _guard = self.running.lock().await;
        let peer = match self.pick_peer() {
            Some(peer) => peer,
            None => return,
        };
        let mut seeds = VecDeque::new();
        for account in accounts {
            if self.is_stopped() {
                return;
            }
            match self.request_pending(peer, account).await {
                Ok(hashes) => seeds.extend(hashes),
                Err(err) => {
                    tracing::debug!(%peer, %account, %err, "bulk_pull_account failed");
                }
            }
        }
        tracing::info!(%peer, seeds = seeds.len(), "wallet bootstrap");
        self.run_lazy(peer, seeds).await;
    }

    // ── Legacy internals ────────────────────────────────────────────────

    /// Stream the peer's frontiers; classify differences into pulls (they
    /// are ahead or unknown) and pushes (we are ahead).
    async fn request_frontiers(
        &self,
        peer: SocketAddrV6,
    ) -> std::io::Result<(Vec<PullInfo>, Vec<(BlockHash, BlockHash)>)> {
        let mut stream = self.connect(peer).await?;
        let request = Message::FrontierReq(FrontierReq {
            start: Account::ZERO,
            age: u32::MAX,
            count: u32::MAX,
        });
        stream
            .write_all(&request.serialize(self.ledger.network()))
            .await?;
        stream.flush().await?;

        let mut pulls = Vec::new();
        let mut pushes = Vec::new();
        loop {
            let mut pair = [0u8; 64];
            tokio::time::timeout(IO_TIMEOUT, stream.read_exact(&mut pair))
                .await
                .map_err(|_| std::io::Error::from(std::io::ErrorKind::TimedOut))??;
            let account = Account::from_bytes(pair[..32].try_into().expect("split at 32"));
            if account.is_zero() {
                break;
            }
            let remote_head = BlockHash::new(pair[32..].try_into().expect("split at 32"));
            let our_head = self
                .ledger
                .latest(&account)
                .ok()
                .flatten()
                .unwrap_or(BlockHash::ZERO);
            if our_head == remote_head {
                continue;
            }
            if self
                .ledger
                .block_exists(&remote_head)
                .unwrap_or(false)
            {
                // Their head is inside our chain: they are behind.
                pushes.push((our_head, remote_head));
            } else {
                pulls.push(PullInfo {
                    start: Root::from(account),
                    end: our_head,
                    attempts: 0,
                });
            }
        }
        Ok((pulls, pushes))
    }

    /// Work a pull queue with a sqrt-scaled set of connections.
    async fn run_pulls(&self, peer: SocketAddrV6, pulls: Vec<PullInfo>) {
        if pulls.is_empty() {
            return;
        }
        let connections = self.target_connections(pulls.len());
        let queue = Arc::new(Mutex::new(VecDeque::from(pulls)));
        let mut workers = Vec::new();
        for _ in 0..connections {
            let queue = queue.clone();
            workers.push(async move {
                loop {
                    if self.is_stopped() {
                        return;
                    }
                    let Some(pull) = queue.lock().unwrap().pop_front() else {
                        return;
                    };
                    match self.pull_chain(peer, &pull).await {
                        Ok(count) => {
                            self.pulls_done.fetch_add(1, Ordering::Relaxed);
                            tracing::debug!(blocks = count, "pull complete");
                        }
                        Err(err) => {
                            let mut retry = pull.clone();
                            retry.attempts += 1;
                            if retry.attempts < PULL_RETRY_LIMIT {
                                queue.lock().unwrap().push_back(retry);
                            } else {
                                tracing::warn!(%err, "pull abandoned after retries");
                            }
                        }
                    }
                }
            });
        }
        futures_util::future::join_all(workers).await;
    }

    /// One bulk_pull conversation: request and feed every block into the
    /// processor.
    async fn pull_chain(&self, peer: SocketAddrV6, pull: &PullInfo) -> std::io::Result<u64> {
        let mut stream = self.connect(peer).await?;
        let request = Message::BulkPull(BulkPull {
            start: pull.start,
            end: pull.end,
            count: None,
        });
        stream
            .write_all(&request.serialize(self.ledger.network()))
            .await?;
        stream.flush().await?;

        let mut count = 0u64;
        while let Some(block) = read_block(&mut stream).await? {
            self.processor.add(Arc::new(block));
            count += 1;
        }
        Ok(count)
    }

    /// Send our chain slice from `head` down to `stop` via bulk_push.
    async fn push_chain(
        &self,
        peer: SocketAddrV6,
        head: BlockHash,
        stop: BlockHash,
    ) -> std::io::Result<()> {
        let mut stream = self.connect(peer).await?;
        stream
            .write_all(&Message::BulkPush.serialize(self.ledger.network()))
            .await?;
        let mut current = head;
        while !current.is_zero() && current != stop {
            let stored = match self.ledger.block_get(&current) {
                Ok(Some(stored)) => stored,
                _ => break,
            };
            let mut frame = Vec::new();
            stored.block.serialize_with_type(&mut frame);
            stream.write_all(&frame).await?;
            current = stored.block.previous();
        }
        stream.write_all(&[BlockType::NotABlock as u8]).await?;
        stream.flush().await
    }

    // ── Lazy internals ──────────────────────────────────────────────────

    /// Dependency walk: pull each unknown hash, inspect arriving blocks for
    /// further unknown references, stop when the frontier set drains or too
    /// many rounds come back empty.
    async fn run_lazy(&self, peer: SocketAddrV6, mut pulls: VecDeque<BlockHash>) {
        let mut seen: HashSet<BlockHash> = pulls.iter().copied().collect();
        let mut stopped_rounds = 0usize;

        while let Some(hash) = pulls.pop_front() {
            if self.is_stopped() || stopped_rounds >= LAZY_MAX_STOPPED {
                break;
            }
            if self.ledger.block_exists(&hash).unwrap_or(false) {
                continue;
            }
            match self.pull_lazy(peer, hash).await {
                Ok(blocks) if blocks.is_empty() => {
                    stopped_rounds += 1;
                }
                Ok(blocks) => {
                    self.pulls_done.fetch_add(1, Ordering::Relaxed);
                    for block in blocks {
                        for dependency in lazy_dependencies(&block) {
                            if seen.insert(dependency)
                                && !self.ledger.block_exists(&dependency).unwrap_or(true)
                            {
                                pulls.push_back(dependency);
                            }
                        }
                        self.processor.add(Arc::new(block));
                    }
                }
                Err(err) => {
                    tracing::debug!(%hash, %err, "lazy pull failed");
                    stopped_rounds += 1;
                }
            }
        }
    }

    /// Pull a bounded slice starting at one hash.
    async fn pull_lazy(
        &self,
        peer: SocketAddrV6,
        hash: BlockHash,
    ) -> std::io::Result<Vec<Block>> {
        let mut stream = self.connect(peer).await?;
        let request = Message::BulkPull(BulkPull {
            start: Root::from(hash),
            end: BlockHash::ZERO,
            count: Some(LAZY_MAX_PULL_BLOCKS),
        });
        stream
            .write_all(&request.serialize(self.ledger.network()))
            .await?;
        stream.flush().await?;

        let mut blocks = Vec::new();
        while let Some(block) = read_block(&mut stream).await? {
            blocks.push(block);
            if blocks.len() as u32 >= LAZY_MAX_PULL_BLOCKS {
                break;
            }
        }
        Ok(blocks)
    }

    /// Fetch receivable send hashes for one account.
    async fn request_pending(
        &self,
        peer: SocketAddrV6,
        account: Account,
    ) -> std::io::Result<Vec<BlockHash>> {
        let mut stream = self.connect(peer).await?;
        let request = Message::BulkPullAccount(BulkPullAccount {
            account,
            minimum_amount: Amount::ZERO,
            flags: PendingAddressFlag::PendingHashAndAmount,
        });
        stream
            .write_all(&request.serialize(self.ledger.network()))
            .await?;
        stream.flush().await?;

        // Frontier pair first.
        let mut frontier = [0u8; 48];
        tokio::time::timeout(IO_TIMEOUT, stream.read_exact(&mut frontier))
            .await
            .map_err(|_| std::io::Error::from(std::io::ErrorKind::TimedOut))??;

        let mut hashes = Vec::new();
        loop {
            let mut entry = [0u8; 48];
            tokio::time::timeout(IO_TIMEOUT, stream.read_exact(&mut entry))
                .await
                .map_err(|_| std::io::Error::from(std::io::ErrorKind::TimedOut))??;
            let hash = BlockHash::new(entry[..32].try_into().expect("split at 32"));
            if hash.is_zero() {
                break;
            }
            hashes.push(hash);
        }
        Ok(hashes)
    }
}

/// The hashes a block depends on for lazy walking: its previous and, for
/// receive-shaped blocks, the linked source.
fn lazy_dependencies(block: &Block) -> Vec<BlockHash> {
    let mut deps = Vec::with_capacity(2);
    let previous = block.previous();
    if !previous.is_zero() {
        deps.push(previous);
    }
    let source = block.source();
    if !source.is_zero() {
        deps.push(source);
    }
    // A state block's link may be a source send, a destination account, or
    // an epoch marker; without the previous balance the kind is unknown, so
    // the link is walked optimistically and non-blocks simply pull empty.
    let link = block.link();
    if !link.is_zero() && block.block_type() == BlockType::State {
        deps.push(link.as_block_hash());
    }
    deps
}

/// Read one type-prefixed block frame; `None` at the not_a_block
/// terminator.
async fn read_block(stream: &mut TcpStream) -> std::io::Result<Option<Block>> {
    let mut type_byte = [0u8; 1];
    tokio::time::timeout(IO_TIMEOUT, stream.read_exact(&mut type_byte))
        .await
        .map_err(|_| std::io::Error::from(std::io::ErrorKind::TimedOut))??;
    let block_type = BlockType::from_u8(type_byte[0])
        .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::InvalidData))?;
    if block_type == BlockType::NotABlock {
        return Ok(None);
    }
    let size = block_type
        .body_size()
        .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::InvalidData))?;
    let mut body = vec![0u8; size];
    tokio::time::timeout(IO_TIMEOUT, stream.read_exact(&mut body))
        .await
        .map_err(|_| std::io::Error::from(std::io::ErrorKind::TimedOut))??;
    Block::deserialize(block_type, &body)
        .map(Some)
        .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::InvalidData))
}
