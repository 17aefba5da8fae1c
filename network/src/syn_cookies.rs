//! Syn-cookie handshake state.
//!
//! A fresh 256-bit nonce is remembered per endpoint on first contact; the
//! peer proves its claimed node identity by signing that nonce. Cookie
//! issuance is rate-limited per source IP and capped globally so a spray of
//! handshake requests cannot exhaust memory.

use std::collections::HashMap;
use std::net::{Ipv6Addr, SocketAddrV6};
use std::time::{Duration, Instant};

use keva_crypto::validate_message;
use keva_types::{Account, BlockHash, PublicKey, Signature};

/// Cookie validity window.
const COOKIE_TTL: Duration = Duration::from_secs(30);
/// Outstanding cookies per source IP within the TTL window.
const MAX_PER_IP: usize = 2;
/// Global cap on outstanding cookies.
const MAX_PENDING: usize = 10_000;

struct CookieEntry {
    cookie: [u8; 32],
    created_at: Instant,
}

#[derive(Default)]
pub struct SynCookies {
    pending: HashMap<SocketAddrV6, CookieEntry>,
}

impl SynCookies {
    pub fn new() -> Self {
        Self::default()
    }

    fn per_ip(&self, ip: &Ipv6Addr) -> usize {
        self.pending.keys().filter(|ep| ep.ip() == ip).count()
    }

    /// Issue (or re-issue) a cookie for an endpoint. `None` when the
    /// per-IP or global limit is hit.
    pub fn assign(&mut self, endpoint: &SocketAddrV6) -> Option<[u8; 32]> {
        self.purge();
        if let Some(entry) = self.pending.get(endpoint) {
            return Some(entry.cookie);
        }
        if self.pending.len() >= MAX_PENDING || self.per_ip(endpoint.ip()) >= MAX_PER_IP {
            return None;
        }
        let mut cookie = [0u8; 32];
        getrandom::getrandom(&mut cookie).ok()?;
        self.pending.insert(
            *endpoint,
            CookieEntry {
                cookie,
                created_at: Instant::now(),
            },
        );
        Some(cookie)
    }

    /// Validate a handshake response: the claimed node id must have signed
    /// our cookie for this endpoint. Consumes the cookie either way.
    pub fn validate(
        &mut self,
        endpoint: &SocketAddrV6,
        node_id: &Account,
        signature: &Signature,
    ) -> bool {
        let entry = match self.pending.remove(endpoint) {
            Some(entry) => entry,
            None => return false,
        };
        if entry.created_at.elapsed() > COOKIE_TTL {
            return false;
        }
        validate_message(
            &PublicKey::from(*node_id),
            &BlockHash::new(entry.cookie),
            signature,
        )
    }

    /// Drop expired cookies.
    pub fn purge(&mut self) {
        self.pending
            .retain(|_, entry| entry.created_at.elapsed() <= COOKIE_TTL);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
