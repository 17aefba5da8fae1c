//! End-to-end node scenarios on the test network.

use std::net::{Ipv6Addr, SocketAddrV6};
use std::sync::Arc;
use std::time::Duration;

use keva_blocks::{Block, StateBlock, Vote};
use keva_crypto::{keypair_from_seed, sign_message};
use keva_ledger::genesis::TEST_GENESIS_SEED;
use keva_messages::{ConfirmAck, Keepalive, Message};
use keva_node::{Node, NodeConfig};
use keva_store::{AccountStore, PendingKey, PendingStore, UncheckedStore};
use keva_types::{Amount, BlockHash, KeyPair, Link, Network, Root, Signature};
use keva_work::WorkPool;

fn test_keys() -> KeyPair {
    keypair_from_seed(&TEST_GENESIS_SEED)
}

fn signed_state(keys: &KeyPair, previous: BlockHash, balance: u128, link: Link) -> Arc<Block> {
    let mut block = StateBlock {
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
    block.work = pool.generate(&root, 1).expect("test work");
    Arc::new(Block::State(block))
}

async fn start_node() -> (tempfile::TempDir, Arc<Node>) {
    let dir = tempfile::tempdir().unwrap();
    let config = NodeConfig::test_default(dir.path().to_path_buf());
    let node = Node::new(config, Network::Test).await.unwrap();
    node.start().await.unwrap();
    (dir, node)
}

async fn wait_for<F: Fn() -> bool>(what: &str, predicate: F) {
    for _ in 0..500 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

fn local_endpoint(port: u16) -> SocketAddrV6 {
    SocketAddrV6::new(Ipv6Addr::LOCALHOST, port, 0, 0)
}

fn sender_endpoint() -> SocketAddrV6 {
    local_endpoint(40000)
}

#[tokio::test(flavor = "multi_thread")]
async fn genesis_only() {
    let (_dir, node) = start_node().await;
    let genesis = node.ledger.genesis_account();
    assert_eq!(node.store.account_count().unwrap(), 1);
    assert_eq!(node.ledger.balance(&genesis), Amount::MAX);
    assert_eq!(node.ledger.weight(&genesis), Amount::MAX);
    node.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn publish_send_and_receive() {
    let (_dir, node) = start_node().await;
    let genesis_keys = test_keys();
    let genesis = genesis_keys.account();
    let receiver = keypair_from_seed(&[2u8; 32]);
    let head = node.ledger.latest(&genesis).unwrap().unwrap();

    let send = signed_state(
        &genesis_keys,
        head,
        u128::MAX - 100,
        Link::from(receiver.account()),
    );
    let bytes = Message::Publish(send.clone()).serialize(Network::Test);
    node.receive(sender_endpoint(), &bytes).await;

    let ledger = node.ledger.clone();
    let send_hash = send.hash();
    wait_for("send to commit", || {
        ledger.block_exists(&send_hash).unwrap_or(false)
    })
    .await;
    assert!(node
        .store
        .pending_exists(&PendingKey::new(receiver.account(), send_hash))
        .unwrap());

    let open = signed_state(&receiver, BlockHash::ZERO, 100, Link::from(send_hash));
    let bytes = Message::Publish(open.clone()).serialize(Network::Test);
    node.receive(sender_endpoint(), &bytes).await;

    let open_hash = open.hash();
    let ledger = node.ledger.clone();
    wait_for("open to commit", || {
        ledger.block_exists(&open_hash).unwrap_or(false)
    })
    .await;

    assert_eq!(node.store.pending_count().unwrap(), 0);
    assert_eq!(node.ledger.balance(&genesis), Amount::new(u128::MAX - 100));
    assert_eq!(node.ledger.balance(&receiver.account()), Amount::new(100));
    assert_eq!(node.ledger.weight(&genesis), Amount::new(u128::MAX - 100));
    assert_eq!(node.ledger.weight(&receiver.account()), Amount::new(100));
    node.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn fork_resolved_by_representative_vote() {
    let (_dir, node) = start_node().await;
    let genesis_keys = test_keys();
    let genesis = genesis_keys.account();
    let head = node.ledger.latest(&genesis).unwrap().unwrap();
    let dest_a = keypair_from_seed(&[4u8; 32]);
    let dest_b = keypair_from_seed(&[5u8; 32]);

    let first = signed_state(
        &genesis_keys,
        head,
        u128::MAX - 10,
        Link::from(dest_a.account()),
    );
    let second = signed_state(
        &genesis_keys,
        head,
        u128::MAX - 20,
        Link::from(dest_b.account()),
    );

    // First block commits.
    node.receive(
        sender_endpoint(),
        &Message::Publish(first.clone()).serialize(Network::Test),
    )
    .await;
    let ledger = node.ledger.clone();
    let first_hash = first.hash();
    wait_for("first to commit", || {
        ledger.block_exists(&first_hash).unwrap_or(false)
    })
    .await;

    // Second is a fork; an election starts on its root.
    node.receive(
        sender_endpoint(),
        &Message::Publish(second.clone()).serialize(Network::Test),
    )
    .await;
    let active = node.active.clone();
    let root = second.root();
    wait_for("election to start", || active.election_exists(&root)).await;

    // Give quorum a denominator, then vote with all the weight.
    node.online.observe(genesis);
    node.online.sample();
    let vote = Vote::new_signed(&genesis_keys, 1, vec![second.hash()]);
    let ack = Message::ConfirmAck(ConfirmAck {
        vote: Arc::new(vote),
    })
    .serialize(Network::Test);
    node.receive(sender_endpoint(), &ack).await;

    // The announcement loop confirms and the ledger flips to the winner.
    let ledger = node.ledger.clone();
    let second_hash = second.hash();
    wait_for("fork to resolve", || {
        ledger.block_exists(&second_hash).unwrap_or(false)
    })
    .await;
    assert!(!node.ledger.block_exists(&first.hash()).unwrap());
    assert!(!node
        .store
        .pending_exists(&PendingKey::new(dest_a.account(), first.hash()))
        .unwrap());
    assert!(node
        .store
        .pending_exists(&PendingKey::new(dest_b.account(), second.hash()))
        .unwrap());
    node.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn gap_source_parks_and_gap_cache_triggers() {
    let (_dir, node) = start_node().await;
    let genesis_keys = test_keys();
    let receiver = keypair_from_seed(&[2u8; 32]);
    let missing = BlockHash::new([0xAB; 32]);

    let open = signed_state(&receiver, BlockHash::ZERO, 100, Link::from(missing));
    node.receive(
        sender_endpoint(),
        &Message::Publish(open).serialize(Network::Test),
    )
    .await;

    let store = node.store.clone();
    wait_for("block to park in unchecked", || {
        store
            .unchecked_get(&missing)
            .map(|entries| !entries.is_empty())
            .unwrap_or(false)
    })
    .await;

    // Enough vote weight on the missing hash triggers a lazy bootstrap.
    node.online.observe(genesis_keys.account());
    node.online.sample();
    assert!(node.gap_cache.vote(missing, genesis_keys.account()));
    node.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn parser_rejections_counted_and_ignored() {
    let (_dir, node) = start_node().await;

    // Declared state publish with a short body.
    let genesis_keys = test_keys();
    let head = node
        .ledger
        .latest(&genesis_keys.account())
        .unwrap()
        .unwrap();
    let block = signed_state(&genesis_keys, head, u128::MAX - 1, Link::ZERO);
    let mut bytes = Message::Publish(block).serialize(Network::Test);
    bytes.truncate(bytes.len() - 20);
    node.receive(sender_endpoint(), &bytes).await;
    assert_eq!(
        node.metrics
            .parse_failures
            .with_label_values(&["invalid_publish_message"])
            .get(),
        1
    );

    // Wrong magic letter.
    let mut bytes = Message::Keepalive(Keepalive::default()).serialize(Network::Test);
    bytes[1] = b'A';
    node.receive(sender_endpoint(), &bytes).await;
    assert_eq!(
        node.metrics
            .parse_failures
            .with_label_values(&["invalid_magic"])
            .get(),
        1
    );

    // Nothing reached the processor.
    assert_eq!(node.processor.queue_len(), 0);
    node.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn work_below_threshold_never_enqueued() {
    let (_dir, node) = start_node().await;
    let genesis_keys = test_keys();
    let head = node
        .ledger
        .latest(&genesis_keys.account())
        .unwrap()
        .unwrap();
    let mut block = (*signed_state(&genesis_keys, head, u128::MAX - 1, Link::ZERO)).clone();

    let threshold = Network::Test.publish_threshold();
    let bad_nonce = (0u64..)
        .find(|nonce| !keva_work::work_valid(&block.root(), *nonce, threshold))
        .unwrap();
    block.set_work(bad_nonce);

    let bytes = Message::Publish(Arc::new(block)).serialize(Network::Test);
    node.receive(sender_endpoint(), &bytes).await;

    assert_eq!(
        node.metrics
            .parse_failures
            .with_label_values(&["insufficient_work"])
            .get(),
        1
    );
    assert_eq!(node.processor.queue_len(), 0);
    node.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn legacy_bootstrap_between_two_nodes() {
    let (_dir_a, node_a) = start_node().await;
    let (_dir_b, node_b) = start_node().await;

    // Give node A a chain beyond genesis.
    let genesis_keys = test_keys();
    let genesis = genesis_keys.account();
    let head = node_a.ledger.latest(&genesis).unwrap().unwrap();
    let receiver = keypair_from_seed(&[2u8; 32]);
    let send = signed_state(
        &genesis_keys,
        head,
        u128::MAX - 7,
        Link::from(receiver.account()),
    );
    node_a.processor.add(send.clone());
    let ledger_a = node_a.ledger.clone();
    let send_hash = send.hash();
    wait_for("node A to commit the send", || {
        ledger_a.block_exists(&send_hash).unwrap_or(false)
    })
    .await;

    // Node B learns node A's address and pulls its frontiers.
    node_b
        .peers
        .lock()
        .unwrap()
        .contacted(local_endpoint(node_a.udp_port()), 16);
    node_b.bootstrap.bootstrap_legacy().await;

    let ledger_b = node_b.ledger.clone();
    wait_for("node B to sync the send", || {
        ledger_b.block_exists(&send_hash).unwrap_or(false)
    })
    .await;
    assert_eq!(node_b.ledger.balance(&genesis), Amount::new(u128::MAX - 7));

    node_a.stop();
    node_b.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn keepalive_over_real_sockets_registers_peer() {
    let (_dir_a, node_a) = start_node().await;

    // A keepalive sent to node A's socket flows through the ring buffer
    // and dispatch, registering the sender as a peer.
    let a_endpoint = local_endpoint(node_a.udp_port());
    let keepalive = Message::Keepalive(Keepalive::default()).serialize(Network::Test);
    let socket = tokio::net::UdpSocket::bind((Ipv6Addr::LOCALHOST, 0))
        .await
        .unwrap();
    socket.send_to(&keepalive, a_endpoint).await.unwrap();

    let peers = node_a.peers.clone();
    wait_for("peer to register", || peers.lock().unwrap().len() > 0).await;
    node_a.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn wallet_bootstrap_discovers_pending() {
    let (_dir_a, node_a) = start_node().await;
    let (_dir_b, node_b) = start_node().await;

    // A pending entry for the wallet account exists only on node A.
    let genesis_keys = test_keys();
    let wallet = keypair_from_seed(&[9u8; 32]);
    let head = node_a
        .ledger
        .latest(&genesis_keys.account())
        .unwrap()
        .unwrap();
    let send = signed_state(
        &genesis_keys,
        head,
        u128::MAX - 55,
        Link::from(wallet.account()),
    );
    node_a.processor.add(send.clone());
    let ledger_a = node_a.ledger.clone();
    let send_hash = send.hash();
    wait_for("node A to commit the send", || {
        ledger_a.block_exists(&send_hash).unwrap_or(false)
    })
    .await;

    node_b
        .peers
        .lock()
        .unwrap()
        .contacted(local_endpoint(node_a.udp_port()), 16);
    node_b.bootstrap.bootstrap_wallet(vec![wallet.account()]).await;

    let ledger_b = node_b.ledger.clone();
    wait_for("node B to pull the send chain", || {
        ledger_b.block_exists(&send_hash).unwrap_or(false)
    })
    .await;

    node_a.stop();
    node_b.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_publish_is_idempotent() {
    let (_dir, node) = start_node().await;
    let genesis_keys = test_keys();
    let head = node
        .ledger
        .latest(&genesis_keys.account())
        .unwrap()
        .unwrap();
    let send = signed_state(&genesis_keys, head, u128::MAX - 3, Link::ZERO);
    let bytes = Message::Publish(send.clone()).serialize(Network::Test);

    for _ in 0..5 {
        node.receive(sender_endpoint(), &bytes).await;
    }
    let ledger = node.ledger.clone();
    let hash = send.hash();
    wait_for("block to commit", || {
        ledger.block_exists(&hash).unwrap_or(false)
    })
    .await;
    // One block only, balance applied once.
    assert_eq!(
        node.ledger.balance(&genesis_keys.account()),
        Amount::new(u128::MAX - 3)
    );
    node.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn bootstrap_blocks_do_not_start_elections() {
    let (_dir, node) = start_node().await;
    let genesis_keys = test_keys();
    let head = node
        .ledger
        .latest(&genesis_keys.account())
        .unwrap()
        .unwrap();
    // Blocks fed straight to the processor (bootstrap path) bypass
    // block_arrival, so no election is started for them.
    let send = signed_state(&genesis_keys, head, u128::MAX - 2, Link::ZERO);
    node.processor.add(send.clone());
    let ledger = node.ledger.clone();
    let hash = send.hash();
    wait_for("block to commit", || {
        ledger.block_exists(&hash).unwrap_or(false)
    })
    .await;
    assert_eq!(node.active.active_count(), 0);
    node.stop();
}
