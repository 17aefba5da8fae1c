//! The peer table.
//!
//! Peers are keyed by UDP endpoint. Beyond the primary map the table is
//! queried along several orderings — last contact, last attempt, last
//! bootstrap attempt, last rep request, descending rep weight — which are
//! computed on demand: the table is bounded to a few thousand entries, so a
//! scan-and-sort beats maintaining auxiliary structures in lockstep.

use std::collections::HashMap;
use std::net::{Ipv6Addr, SocketAddrV6};
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;

use keva_types::{Account, Amount};

/// Seconds between keepalives to a peer.
pub const KEEPALIVE_PERIOD_SECS: u64 = 60;
/// A peer silent for five keepalive periods is dropped.
pub const PEER_CUTOFF_SECS: u64 = 5 * KEEPALIVE_PERIOD_SECS;
/// At most this many peers per IP address.
const MAX_PEERS_PER_IP: usize = 10;
/// Representatives contacted per rep-crawl round.
pub const REP_CRAWL_PEERS: usize = 8;

/// Everything known about one peer.
#[derive(Clone, Debug)]
pub struct PeerInfo {
    pub last_contact: Instant,
    pub last_attempt: Instant,
    pub last_bootstrap_attempt: Option<Instant>,
    pub last_rep_request: Option<Instant>,
    /// Voting weight of the representative this peer has proven control of.
    pub rep_weight: Amount,
    pub rep_account: Account,
    pub network_version: u8,
    /// Node identity confirmed via syn-cookie handshake.
    pub node_id: Option<Account>,
}

impl PeerInfo {
    fn new(now: Instant, version: u8) -> Self {
        Self {
            last_contact: now,
            last_attempt: now,
            last_bootstrap_attempt: None,
            last_rep_request: None,
            rep_weight: Amount::ZERO,
            rep_account: Account::ZERO,
            network_version: version,
            node_id: None,
        }
    }
}

/// Reject endpoints a well-behaved node should never gossip or dial.
pub fn reserved_address(endpoint: &SocketAddrV6, allow_local: bool) -> bool {
    let ip = *endpoint.ip();
    if endpoint.port() == 0 || ip.is_unspecified() || ip.is_multicast() {
        return true;
    }
    let local = ip.is_loopback()
        || ip.is_unique_local()
        || ip.is_unicast_link_local()
        || matches!(ip.to_ipv4_mapped(), Some(v4) if v4.is_private() || v4.is_loopback());
    local && !allow_local
}

pub struct PeerTable {
    peers: HashMap<SocketAddrV6, PeerInfo>,
    allow_local: bool,
}

impl PeerTable {
    pub fn new(allow_local: bool) -> Self {
        Self {
            peers: HashMap::new(),
            allow_local,
        }
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn contains(&self, endpoint: &SocketAddrV6) -> bool {
        self.peers.contains_key(endpoint)
    }

    fn peers_on_ip(&self, ip: &Ipv6Addr) -> usize {
        self.peers.keys().filter(|ep| ep.ip() == ip).count()
    }

    /// Record traffic from a peer, inserting it if acceptable. Returns
    /// whether the peer is (now) in the table.
    pub fn contacted(&mut self, endpoint: SocketAddrV6, version: u8) -> bool {
        if reserved_address(&endpoint, self.allow_local) {
            return false;
        }
        let now = Instant::now();
        if let Some(info) = self.peers.get_mut(&endpoint) {
            info.last_contact = now;
            info.network_version = version;
            return true;
        }
        if self.peers_on_ip(endpoint.ip()) >= MAX_PEERS_PER_IP {
            tracing::debug!(%endpoint, "peer rejected: per-IP cap reached");
            return false;
        }
        self.peers.insert(endpoint, PeerInfo::new(now, version));
        true
    }

    /// Record a confirmed node identity for a peer.
    pub fn set_node_id(&mut self, endpoint: &SocketAddrV6, node_id: Account) {
        if let Some(info) = self.peers.get_mut(endpoint) {
            info.node_id = Some(node_id);
        }
    }

    /// Record that a confirm_ack proved `endpoint` controls a representative.
    pub fn rep_response(&mut self, endpoint: &SocketAddrV6, rep: Account, weight: Amount) {
        if let Some(info) = self.peers.get_mut(endpoint) {
            info.rep_account = rep;
            info.rep_weight = weight;
        }
    }

    /// Drop peers not heard from within the cutoff. Returns the removed
    /// endpoints so persistence can forget them too.
    pub fn purge(&mut self) -> Vec<SocketAddrV6> {
        let cutoff = Duration::from_secs(PEER_CUTOFF_SECS);
        let now = Instant::now();
        let dead: Vec<SocketAddrV6> = self
            .peers
            .iter()
            .filter(|(_, info)| now.duration_since(info.last_contact) > cutoff)
            .map(|(ep, _)| *ep)
            .collect();
        for ep in &dead {
            self.peers.remove(ep);
        }
        dead
    }

    /// Peers due a keepalive: no traffic in one period.
    pub fn keepalive_targets(&mut self) -> Vec<SocketAddrV6> {
        let period = Duration::from_secs(KEEPALIVE_PERIOD_SECS);
        let now = Instant::now();
        let mut due: Vec<SocketAddrV6> = self
            .peers
            .iter()
            .filter(|(_, info)| now.duration_since(info.last_attempt) >= period)
            .map(|(ep, _)| *ep)
            .collect();
        for ep in &due {
            if let Some(info) = self.peers.get_mut(ep) {
                info.last_attempt = now;
            }
        }
        due.sort();
        due
    }

    /// A random sample for gossiping in keepalive slots.
    pub fn random_sample(&self, count: usize) -> Vec<SocketAddrV6> {
        let mut all: Vec<SocketAddrV6> = self.peers.keys().copied().collect();
        all.shuffle(&mut rand::thread_rng());
        all.truncate(count);
        all
    }

    /// Flood fanout: the square root of the table, at least two.
    pub fn list_fanout(&self) -> Vec<SocketAddrV6> {
        let count = ((self.peers.len() as f64).sqrt() as usize).max(2);
        self.random_sample(count)
    }

    /// The highest-weight peers for a rep-crawl round, skipping peers asked
    /// within `min_interval`. Marks the returned peers as requested.
    pub fn rep_crawl_targets(&mut self, min_interval: Duration) -> Vec<SocketAddrV6> {
        let now = Instant::now();
        let mut candidates: Vec<(SocketAddrV6, Amount)> = self
            .peers
            .iter()
            .filter(|(_, info)| {
                info.last_rep_request
                    .map(|at| now.duration_since(at) >= min_interval)
                    .unwrap_or(true)
            })
            .map(|(ep, info)| (*ep, info.rep_weight))
            .collect();
        candidates.sort_by(|a, b| b.1.cmp(&a.1));
        candidates.truncate(REP_CRAWL_PEERS);
        let targets: Vec<SocketAddrV6> = candidates.into_iter().map(|(ep, _)| ep).collect();
        for ep in &targets {
            if let Some(info) = self.peers.get_mut(ep) {
                info.last_rep_request = Some(now);
            }
        }
        targets
    }

    /// Representative peers above a weight floor, for vote broadcast.
    pub fn representatives(&self, min_weight: Amount) -> Vec<(SocketAddrV6, Account)> {
        let mut reps: Vec<(SocketAddrV6, Account, Amount)> = self
            .peers
            .iter()
            .filter(|(_, info)| !info.rep_account.is_zero() && info.rep_weight >= min_weight)
            .map(|(ep, info)| (*ep, info.rep_account, info.rep_weight))
            .collect();
        reps.sort_by(|a, b| b.2.cmp(&a.2));
        reps.into_iter().map(|(ep, rep, _)| (ep, rep)).collect()
    }

    /// The peer least recently used for bootstrap, marking it attempted.
    pub fn bootstrap_peer(&mut self) -> Option<SocketAddrV6> {
        let target = self
            .peers
            .iter()
            .min_by_key(|(_, info)| info.last_bootstrap_attempt)
            .map(|(ep, _)| *ep)?;
        if let Some(info) = self.peers.get_mut(&target) {
            info.last_bootstrap_attempt = Some(Instant::now());
        }
        Some(target)
    }

    pub fn endpoints(&self) -> Vec<SocketAddrV6> {
        self.peers.keys().copied().collect()
    }

    pub fn get(&self, endpoint: &SocketAddrV6) -> Option<&PeerInfo> {
        self.peers.get(endpoint)
    }
}
