//! Persisted peer endpoints.

use std::net::SocketAddrV6;

use crate::StoreError;

/// Serialize an endpoint as 16 address bytes + 2 port bytes (big-endian).
pub fn endpoint_key(endpoint: &SocketAddrV6) -> [u8; 18] {
    let mut key = [0u8; 18];
    key[..16].copy_from_slice(&endpoint.ip().octets());
    key[16..].copy_from_slice(&endpoint.port().to_be_bytes());
    key
}

pub fn endpoint_from_key(key: &[u8]) -> Option<SocketAddrV6> {
    if key.len() != 18 {
        return None;
    }
    let octets: [u8; 16] = key[..16].try_into().ok()?;
    let port = u16::from_be_bytes(key[16..].try_into().ok()?);
    Some(SocketAddrV6::new(octets.into(), port, 0, 0))
}

/// Read-side peer persistence queries.
pub trait PeerStore {
    fn peers_iter(&self) -> Result<Vec<SocketAddrV6>, StoreError>;
    fn peer_count(&self) -> Result<u64, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    #[test]
    fn endpoint_key_roundtrip() {
        let ep = SocketAddrV6::new(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1), 7032, 0, 0);
        assert_eq!(endpoint_from_key(&endpoint_key(&ep)), Some(ep));
    }

    #[test]
    fn short_key_rejected() {
        assert_eq!(endpoint_from_key(&[0u8; 17]), None);
    }
}
