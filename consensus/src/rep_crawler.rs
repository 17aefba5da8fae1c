//! Representative crawling.
//!
//! Each round asks the eight highest-weight peers (that have not been asked
//! recently) to vote on a random committed block. Any confirm_ack that
//! comes back proves the sender controls its voting key; the peer table
//! records the representative and its ledger weight for vote routing and
//! fanout weighting.

use std::net::SocketAddrV6;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use keva_ledger::Ledger;
use keva_messages::{ConfirmReq, ConfirmReqPayload, Message};
use keva_network::PeerTable;
use keva_store::BlockStore;
use keva_types::{Account, Amount};

use crate::OutboundSink;

/// Do not re-ask a peer within this interval.
const REP_REQUEST_INTERVAL: Duration = Duration::from_secs(60);

pub struct RepCrawler {
    ledger: Arc<Ledger>,
    peers: Arc<Mutex<PeerTable>>,
    outbound: OutboundSink,
}

impl RepCrawler {
    pub fn new(ledger: Arc<Ledger>, peers: Arc<Mutex<PeerTable>>, outbound: OutboundSink) -> Self {
        Self {
            ledger,
            peers,
            outbound,
        }
    }

    /// One crawl round: confirm_req a random known block to the top peers.
    pub async fn round(&self) {
        let block = match self.ledger.store().block_random() {
            Ok(Some(stored)) => Arc::new(stored.block),
            Ok(None) => return,
            Err(err) => {
                tracing::error!(%err, "rep crawl block pick failed");
                return;
            }
        };
        let targets: Vec<SocketAddrV6> = self
            .peers
            .lock()
            .unwrap()
            .rep_crawl_targets(REP_REQUEST_INTERVAL);
        if targets.is_empty() {
            return;
        }
        let message = Message::ConfirmReq(ConfirmReq {
            payload: ConfirmReqPayload::Block(block),
        });
        let _ = self.outbound.send((message, targets)).await;
    }

    /// Record a proven representative reply from `endpoint`.
    pub fn response(&self, endpoint: &SocketAddrV6, rep: Account) {
        let weight: Amount = self.ledger.weight(&rep);
        self.peers.lock().unwrap().rep_response(endpoint, rep, weight);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keva_store_lmdb::LmdbStore;
    use keva_types::Network;
    use std::net::Ipv6Addr;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn round_sends_confirm_req_to_peers() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LmdbStore::open(dir.path(), 64 * 1024 * 1024).unwrap());
        let ledger = Arc::new(Ledger::new(store, Network::Test));
        ledger.initialize().unwrap();

        let peers = Arc::new(Mutex::new(PeerTable::new(true)));
        let endpoint = SocketAddrV6::new(Ipv6Addr::LOCALHOST, 54000, 0, 0);
        peers.lock().unwrap().contacted(endpoint, 16);

        let (tx, mut rx) = mpsc::channel(4);
        let crawler = RepCrawler::new(ledger.clone(), peers.clone(), tx);
        crawler.round().await;

        let (message, targets) = rx.try_recv().unwrap();
        assert_eq!(targets, vec![endpoint]);
        match message {
            Message::ConfirmReq(req) => match req.payload {
                ConfirmReqPayload::Block(block) => {
                    assert!(ledger.block_exists(&block.hash()).unwrap())
                }
                other => panic!("expected block payload, got {:?}", other),
            },
            other => panic!("expected ConfirmReq, got {:?}", other),
        }

        // The reply wires the rep weight into the peer table.
        crawler.response(&endpoint, ledger.genesis_account());
        assert_eq!(
            peers.lock().unwrap().get(&endpoint).unwrap().rep_weight,
            Amount::MAX
        );
    }

    #[tokio::test]
    async fn empty_peer_table_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LmdbStore::open(dir.path(), 64 * 1024 * 1024).unwrap());
        let ledger = Arc::new(Ledger::new(store, Network::Test));
        ledger.initialize().unwrap();
        let peers = Arc::new(Mutex::new(PeerTable::new(true)));
        let (tx, mut rx) = mpsc::channel(4);
        let crawler = RepCrawler::new(ledger, peers, tx);
        crawler.round().await;
        assert!(rx.try_recv().is_err());
    }
}
