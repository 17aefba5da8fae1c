//! Node wiring.
//!
//! Builds every subsystem over one store, then runs the loops: UDP receive
//! and packet workers, outbound sender, the block-processor thread, the
//! processed/confirmed event pumps, the election announcement loop, vote
//! generation, online-weight sampling, keepalive, rep crawling, and the
//! bootstrap TCP server. Everything stops when the `stopped` flag is set.

use std::net::SocketAddrV6;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use keva_blocks::{Block, BlockUniquer, Vote, VoteUniquer};
use keva_consensus::{
    ActiveElections, BlockArrival, GapCache, OnlineWeight, RepCrawler, VoteGenerator, VotesCache,
};
use keva_crypto::{generate_keypair, keypair_from_seed, sign_message};
use keva_ledger::{Ledger, ProcessResult};
use keva_messages::{
    ConfirmAck, ConfirmReq, ConfirmReqPayload, Keepalive, Message, MessageParser, NodeIdHandshake,
    KEEPALIVE_PEERS,
};
use keva_network::{PeerTable, SynCookies, UdpChannels};
use keva_store_lmdb::{LmdbStore, Migrator};
use keva_types::{Account, BlockHash, KeyPair, Network, NetworkParams};

use crate::block_processor::{BlockProcessor, ProcessedEvent};
use crate::bootstrap::BootstrapInitiator;
use crate::bootstrap_server::BootstrapServer;
use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::metrics::NodeMetrics;

/// Outbound message channel capacity.
const OUTBOUND_CAPACITY: usize = 4096;
/// Peer table persistence interval.
const PEER_PERSIST_INTERVAL: Duration = Duration::from_secs(300);

pub struct Node {
    pub config: NodeConfig,
    pub network: Network,
    pub stopped: Arc<AtomicBool>,
    pub store: Arc<LmdbStore>,
    pub ledger: Arc<Ledger>,
    pub peers: Arc<Mutex<PeerTable>>,
    pub syn_cookies: Arc<Mutex<SynCookies>>,
    pub online: Arc<OnlineWeight>,
    pub active: Arc<ActiveElections>,
    pub votes_cache: Arc<VotesCache>,
    pub vote_generator: Arc<VoteGenerator>,
    pub gap_cache: Arc<GapCache>,
    pub block_arrival: Arc<BlockArrival>,
    pub rep_crawler: Arc<RepCrawler>,
    pub processor: Arc<BlockProcessor>,
    pub bootstrap: Arc<BootstrapInitiator>,
    pub block_uniquer: Arc<BlockUniquer>,
    pub vote_uniquer: Arc<VoteUniquer>,
    pub metrics: Arc<NodeMetrics>,
    channels: Arc<UdpChannels>,
    parser: MessageParser,
    node_keys: KeyPair,

    outbound_rx: Mutex<Option<mpsc::Receiver<(Message, Vec<SocketAddrV6>)>>>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<ProcessedEvent>>>,
    confirmed_rx: Mutex<Option<mpsc::UnboundedReceiver<Arc<Block>>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Node {
    /// Open the store, migrate, write genesis, and build every subsystem.
    pub async fn new(config: NodeConfig, network: Network) -> Result<Arc<Self>, NodeError> {
        let store = Arc::new(LmdbStore::open(&config.data_dir, config.lmdb_map_size)?);
        let migration = Migrator::run(&store)?;
        if migration.background_upgrade {
            let upgrade_store = store.clone();
            std::thread::spawn(move || loop {
                match Migrator::sideband_rebuild_step(&upgrade_store) {
                    Ok(true) => break,
                    Ok(false) => continue,
                    Err(err) => {
                        tracing::error!(%err, "background schema upgrade failed");
                        break;
                    }
                }
            });
        }

        let ledger = Arc::new(Ledger::new(store.clone(), network));
        ledger.initialize()?;

        let params = NetworkParams::new(network);
        let stopped = Arc::new(AtomicBool::new(false));
        let peers = Arc::new(Mutex::new(PeerTable::new(config.allow_local_peers)));
        let online = Arc::new(OnlineWeight::new(ledger.clone(), params));
        let votes_cache = Arc::new(VotesCache::new(network.votes_cache_size()));

        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (confirmed_tx, confirmed_rx) = mpsc::unbounded_channel();

        let active = Arc::new(ActiveElections::new(
            ledger.clone(),
            online.clone(),
            peers.clone(),
            outbound_tx.clone(),
            confirmed_tx,
        ));

        let vote_keys = parse_vote_seed(&config.vote_seed)?;
        let vote_generator = Arc::new(VoteGenerator::new(
            ledger.clone(),
            vote_keys,
            peers.clone(),
            votes_cache.clone(),
            outbound_tx.clone(),
        ));

        let processor = Arc::new(BlockProcessor::new(
            ledger.clone(),
            Duration::from_millis(config.block_processor_batch_max_time_ms),
            events_tx,
        ));

        let bootstrap = Arc::new(BootstrapInitiator::new(
            ledger.clone(),
            processor.clone(),
            peers.clone(),
            stopped.clone(),
            config.bootstrap_connections,
            config.bootstrap_connections_max,
        ));

        let gap_cache = Arc::new(GapCache::new(ledger.clone(), online.clone()));
        let rep_crawler = Arc::new(RepCrawler::new(
            ledger.clone(),
            peers.clone(),
            outbound_tx.clone(),
        ));

        let channels = Arc::new(UdpChannels::bind(config.port).await?);

        // Seed the peer table from the store and configuration.
        {
            use keva_store::PeerStore;
            let mut table = peers.lock().unwrap();
            for endpoint in store.peers_iter().unwrap_or_default() {
                table.contacted(endpoint, keva_types::PROTOCOL_VERSION);
            }
            for text in &config.preconfigured_peers {
                match text.parse::<SocketAddrV6>() {
                    Ok(endpoint) => {
                        table.contacted(endpoint, keva_types::PROTOCOL_VERSION);
                    }
                    Err(err) => {
                        tracing::warn!(peer = %text, %err, "unparseable preconfigured peer");
                    }
                }
            }
        }

        Ok(Arc::new(Self {
            config,
            network,
            stopped,
            store,
            ledger,
            peers,
            syn_cookies: Arc::new(Mutex::new(SynCookies::new())),
            online,
            active,
            votes_cache,
            vote_generator,
            gap_cache,
            block_arrival: Arc::new(BlockArrival::new()),
            rep_crawler,
            processor,
            bootstrap,
            block_uniquer: Arc::new(BlockUniquer::new()),
            vote_uniquer: Arc::new(VoteUniquer::new()),
            metrics: Arc::new(NodeMetrics::new()),
            channels,
            parser: MessageParser::new(network),
            node_keys: generate_keypair(),
            outbound_rx: Mutex::new(Some(outbound_rx)),
            events_rx: Mutex::new(Some(events_rx)),
            confirmed_rx: Mutex::new(Some(confirmed_rx)),
            handles: Mutex::new(Vec::new()),
        }))
    }

    pub fn node_id(&self) -> Account {
        self.node_keys.account()
    }

    pub fn udp_port(&self) -> u16 {
        self.channels.local_port()
    }

    /// Spawn every background loop.
    pub async fn start(self: &Arc<Self>) -> Result<(), NodeError> {
        let mut handles = Vec::new();

        // UDP receive into the ring buffer.
        {
            let node = self.clone();
            handles.push(tokio::spawn(async move {
                node.channels.run_receiver(node.stopped.clone()).await;
            }));
        }

        // Packet worker pool.
        for _ in 0..self.config.packet_threads.max(1) {
            let node = self.clone();
            handles.push(tokio::spawn(async move {
                while let Some(datagram) = node.channels.queue.pop(&node.stopped).await {
                    node.receive(datagram.from, &datagram.bytes).await;
                }
            }));
        }

        // Outbound sender.
        {
            let node = self.clone();
            let mut rx = self
                .outbound_rx
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| NodeError::Other("node already started".into()))?;
            handles.push(tokio::spawn(async move {
                while let Some((message, targets)) = rx.recv().await {
                    if node.stopped.load(Ordering::Acquire) {
                        break;
                    }
                    let bytes = message.serialize(node.network);
                    for target in targets {
                        node.channels.send(&bytes, target).await;
                    }
                }
            }));
        }

        // Block processor thread.
        {
            let processor = self.processor.clone();
            let stopped = self.stopped.clone();
            let _ = std::thread::Builder::new()
                .name("block processor".into())
                .spawn(move || {
                    processor.run();
                    stopped.store(true, Ordering::Release);
                })
                .map_err(NodeError::Io)?;
        }

        // Processed-block events.
        {
            let node = self.clone();
            let mut rx = self
                .events_rx
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| NodeError::Other("node already started".into()))?;
            handles.push(tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    node.on_processed(event).await;
                }
            }));
        }

        // Confirmed-block events (from elections).
        {
            let node = self.clone();
            let mut rx = self
                .confirmed_rx
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| NodeError::Other("node already started".into()))?;
            handles.push(tokio::spawn(async move {
                while let Some(block) = rx.recv().await {
                    node.metrics.elections_confirmed.inc();
                    // Anything parked on the winner can proceed.
                    node.processor.add(block);
                }
            }));
        }

        // Election announcements.
        {
            let node = self.clone();
            handles.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_millis(
                    node.network.request_interval_ms(),
                ));
                while !node.stopped.load(Ordering::Acquire) {
                    interval.tick().await;
                    node.active.announce_round().await;
                }
            }));
        }

        // Vote generation.
        {
            let node = self.clone();
            handles.push(tokio::spawn(async move {
                let mut interval =
                    tokio::time::interval(keva_consensus::vote_generator::VOTE_GENERATOR_DELAY);
                while !node.stopped.load(Ordering::Acquire) {
                    interval.tick().await;
                    if node.vote_generator.flush().await.is_some() {
                        node.metrics.votes_generated.inc();
                    }
                }
            }));
        }

        // Online-weight sampling.
        {
            let node = self.clone();
            handles.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(
                    node.network.weight_period_secs(),
                ));
                while !node.stopped.load(Ordering::Acquire) {
                    interval.tick().await;
                    node.online.sample();
                }
            }));
        }

        // Keepalive, purge, and peer persistence.
        {
            let node = self.clone();
            handles.push(tokio::spawn(async move {
                let mut tick = tokio::time::interval(Duration::from_secs(
                    keva_network::KEEPALIVE_PERIOD_SECS,
                ));
                let mut last_persist = std::time::Instant::now();
                while !node.stopped.load(Ordering::Acquire) {
                    tick.tick().await;
                    node.keepalive_round().await;
                    if last_persist.elapsed() >= PEER_PERSIST_INTERVAL {
                        node.persist_peers();
                        last_persist = std::time::Instant::now();
                    }
                }
            }));
        }

        // Representative crawling.
        {
            let node = self.clone();
            handles.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(60));
                while !node.stopped.load(Ordering::Acquire) {
                    interval.tick().await;
                    node.rep_crawler.round().await;
                }
            }));
        }

        // Bootstrap TCP server on the same port.
        {
            let listener =
                tokio::net::TcpListener::bind((std::net::Ipv6Addr::UNSPECIFIED, self.udp_port()))
                    .await?;
            let server = Arc::new(BootstrapServer::new(
                self.ledger.clone(),
                self.processor.clone(),
                self.stopped.clone(),
            ));
            handles.push(tokio::spawn(server.run(listener)));
        }

        // Introduce ourselves to seeded peers without waiting a period.
        {
            let node = self.clone();
            handles.push(tokio::spawn(async move {
                let endpoints = node.peers.lock().unwrap().endpoints();
                for endpoint in endpoints {
                    node.send_keepalive(endpoint).await;
                }
            }));
        }

        self.handles.lock().unwrap().extend(handles);
        tracing::info!(
            port = self.udp_port(),
            network = self.network.as_str(),
            node_id = %self.node_id(),
            "node started"
        );
        Ok(())
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.processor.stop();
        self.channels.queue.notify_all();
        for handle in self.handles.lock().unwrap().drain(..) {
            handle.abort();
        }
        self.persist_peers();
        tracing::info!("node stopped");
    }

    // ── Inbound dispatch ────────────────────────────────────────────────

    /// Parse and dispatch one datagram.
    pub async fn receive(&self, from: SocketAddrV6, bytes: &[u8]) {
        let message = match self.parser.parse(bytes) {
            Ok(message) => message,
            Err(status) => {
                self.metrics
                    .parse_failures
                    .with_label_values(&[&status.to_string()])
                    .inc();
                tracing::debug!(%from, %status, "datagram rejected");
                return;
            }
        };
        self.peers
            .lock()
            .unwrap()
            .contacted(from, keva_types::PROTOCOL_VERSION);

        match message {
            Message::Keepalive(keepalive) => self.on_keepalive(from, keepalive).await,
            Message::Publish(block) => self.on_publish(block).await,
            Message::ConfirmReq(request) => self.on_confirm_req(from, request).await,
            Message::ConfirmAck(ack) => self.on_confirm_ack(from, ack).await,
            Message::NodeIdHandshake(handshake) => self.on_handshake(from, handshake).await,
            // TCP-only kinds cannot reach here; the parser rejects them.
            _ => {}
        }
    }

    async fn on_keepalive(&self, from: SocketAddrV6, keepalive: Keepalive) {
        let mut fresh = Vec::new();
        {
            let mut peers = self.peers.lock().unwrap();
            for endpoint in keepalive.peers.iter() {
                if endpoint.ip().is_unspecified() || peers.contains(endpoint) {
                    continue;
                }
                fresh.push(*endpoint);
            }
        }
        // Introduce ourselves to gossiped endpoints.
        for endpoint in fresh {
            self.send_keepalive(endpoint).await;
        }
        // Handshake unidentified peers.
        let needs_handshake = self
            .peers
            .lock()
            .unwrap()
            .get(&from)
            .map(|info| info.node_id.is_none())
            .unwrap_or(false);
        if needs_handshake {
            self.send_handshake_query(from).await;
        }
    }

    async fn on_publish(&self, block: Arc<Block>) {
        let block = self.block_uniquer.unique(block);
        self.block_arrival.add(block.hash());
        self.processor.add(block);
    }

    async fn on_confirm_req(&self, from: SocketAddrV6, request: ConfirmReq) {
        let mut reply_hashes = Vec::new();
        match &request.payload {
            ConfirmReqPayload::Block(block) => {
                let block = self.block_uniquer.unique(block.clone());
                let hash = block.hash();
                let cached = self.votes_cache.find(&hash);
                if cached.is_empty() {
                    if self.ledger.block_exists(&hash).unwrap_or(false) {
                        reply_hashes.push(hash);
                    } else {
                        self.block_arrival.add(hash);
                        self.processor.add(block);
                    }
                } else {
                    for vote in cached {
                        self.send_ack(from, vote).await;
                    }
                }
            }
            ConfirmReqPayload::Roots(pairs) => {
                for (hash, _root) in pairs {
                    let cached = self.votes_cache.find(hash);
                    if !cached.is_empty() {
                        for vote in cached {
                            self.send_ack(from, vote).await;
                        }
                    } else if self.ledger.block_exists(hash).unwrap_or(false) {
                        reply_hashes.push(*hash);
                    }
                }
            }
        }
        // Queue fresh votes for everything we can attest to.
        let mut flush_now = false;
        for hash in reply_hashes {
            flush_now |= self.vote_generator.add(hash);
        }
        if flush_now {
            let _ = self.vote_generator.flush().await;
        }
    }

    async fn on_confirm_ack(&self, from: SocketAddrV6, ack: ConfirmAck) {
        let vote = self.vote_uniquer.unique(ack.vote.clone());
        if !vote.validate() {
            tracing::debug!(%from, "invalid vote signature");
            return;
        }
        // Any valid ack doubles as proof of representative control.
        self.rep_crawler.response(&from, vote.account);

        let outcome = self.active.vote(&vote);
        for hash in outcome.unknown {
            if self.ledger.block_exists(&hash).unwrap_or(false) {
                continue;
            }
            if self.gap_cache.vote(hash, vote.account) {
                let bootstrap = self.bootstrap.clone();
                tokio::spawn(async move { bootstrap.bootstrap_lazy(hash).await });
            }
        }
        // A vote carrying a full block also delivers the block.
        if let keva_blocks::VotePayload::Block(block) = &vote.payload {
            self.on_publish(block.clone()).await;
        }
    }

    async fn on_handshake(&self, from: SocketAddrV6, handshake: NodeIdHandshake) {
        let mut response = None;
        if let Some(cookie) = handshake.query {
            let signature = sign_message(
                &self.node_keys.private,
                &self.node_keys.public,
                &BlockHash::new(cookie),
            );
            response = Some((self.node_id(), signature));
        }
        if let Some((account, signature)) = handshake.response {
            let valid = self
                .syn_cookies
                .lock()
                .unwrap()
                .validate(&from, &account, &signature);
            if valid {
                self.peers.lock().unwrap().set_node_id(&from, account);
            } else {
                tracing::debug!(%from, "handshake response rejected");
            }
        }
        if let Some(response) = response {
            let message = Message::NodeIdHandshake(NodeIdHandshake {
                query: None,
                response: Some(response),
            });
            let _ = self
                .channels
                .send(&message.serialize(self.network), from)
                .await;
        }
    }

    // ── Outbound helpers ────────────────────────────────────────────────

    async fn send_keepalive(&self, to: SocketAddrV6) {
        let mut keepalive = Keepalive::default();
        let sample = self.peers.lock().unwrap().random_sample(KEEPALIVE_PEERS);
        for (slot, endpoint) in keepalive.peers.iter_mut().zip(sample) {
            *slot = endpoint;
        }
        self.channels
            .send(&Message::Keepalive(keepalive).serialize(self.network), to)
            .await;
    }

    async fn send_handshake_query(&self, to: SocketAddrV6) {
        let cookie = self.syn_cookies.lock().unwrap().assign(&to);
        if let Some(cookie) = cookie {
            let message = Message::NodeIdHandshake(NodeIdHandshake {
                query: Some(cookie),
                response: None,
            });
            self.channels.send(&message.serialize(self.network), to).await;
        }
    }

    async fn send_ack(&self, to: SocketAddrV6, vote: Arc<Vote>) {
        let message = Message::ConfirmAck(ConfirmAck { vote });
        self.channels.send(&message.serialize(self.network), to).await;
    }

    async fn keepalive_round(&self) {
        let (targets, dead) = {
            let mut peers = self.peers.lock().unwrap();
            let dead = peers.purge();
            (peers.keepalive_targets(), dead)
        };
        if !dead.is_empty() {
            if let Ok(mut batch) = self.store.write_batch() {
                for endpoint in &dead {
                    let _ = batch.peer_del(endpoint);
                }
                let _ = batch.commit();
            }
        }
        for target in targets {
            self.send_keepalive(target).await;
        }
    }

    fn persist_peers(&self) {
        let endpoints = self.peers.lock().unwrap().endpoints();
        let result = (|| {
            let mut batch = self.store.write_batch()?;
            for endpoint in &endpoints {
                batch.peer_put(endpoint)?;
            }
            batch.commit()
        })();
        if let Err(err) = result {
            tracing::warn!(%err, "peer persistence failed");
        }
    }

    /// React to one block-processor outcome.
    async fn on_processed(&self, event: ProcessedEvent) {
        let block = event.block;
        match event.result {
            ProcessResult::Progress => {
                self.metrics.blocks_processed.inc();
                // Recent arrivals contend for confirmation; bootstrap
                // backfill does not.
                if self.block_arrival.recent(&block.hash()) {
                    self.active.start(block.clone());
                    let flush = self.vote_generator.add(block.hash());
                    if flush {
                        let _ = self.vote_generator.flush().await;
                    }
                    let fanout = self.peers.lock().unwrap().list_fanout();
                    if !fanout.is_empty() {
                        let message = Message::Publish(block.clone());
                        let bytes = message.serialize(self.network);
                        for target in fanout {
                            self.channels.send(&bytes, target).await;
                        }
                    }
                }
            }
            ProcessResult::Fork => {
                self.metrics.blocks_forked.inc();
                self.active.start(block.clone());
                // Publish the committed occupant so the network can weigh
                // both candidates.
                let root_hash = BlockHash::new(*block.root().as_bytes());
                let occupant = self
                    .ledger
                    .block_get(&root_hash)
                    .ok()
                    .flatten()
                    .map(|stored| stored.sideband.successor)
                    .filter(|successor| !successor.is_zero())
                    .and_then(|successor| self.ledger.block_get(&successor).ok().flatten());
                if let Some(stored) = occupant {
                    let ours = Arc::new(stored.block);
                    self.active.start(ours.clone());
                    let fanout = self.peers.lock().unwrap().list_fanout();
                    let bytes = Message::Publish(ours).serialize(self.network);
                    for target in fanout {
                        self.channels.send(&bytes, target).await;
                    }
                }
            }
            ProcessResult::GapPrevious => {
                self.gap_cache.add(block.previous());
            }
            ProcessResult::GapSource => {
                let dependency = if block.source().is_zero() {
                    block.link().as_block_hash()
                } else {
                    block.source()
                };
                self.gap_cache.add(dependency);
            }
            other => {
                tracing::debug!(hash = %block.hash(), result = %other, "block not accepted");
            }
        }
    }
}

/// Parse the configured voting seed; empty string disables voting.
fn parse_vote_seed(seed_hex: &str) -> Result<Option<KeyPair>, NodeError> {
    if seed_hex.is_empty() {
        return Ok(None);
    }
    if seed_hex.len() != 64 {
        return Err(NodeError::Config("vote_seed must be 64 hex digits".into()));
    }
    let mut seed = [0u8; 32];
    hex::decode_to_slice(seed_hex, &mut seed)
        .map_err(|_| NodeError::Config("vote_seed is not valid hex".into()))?;
    let keys = keypair_from_seed(&seed);
    tracing::info!(representative = %keys.account(), "voting enabled");
    Ok(Some(keys))
}
