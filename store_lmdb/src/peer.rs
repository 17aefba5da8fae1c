//! Read-side peer persistence queries.

use std::net::SocketAddrV6;

use keva_store::peer::endpoint_from_key;
use keva_store::{PeerStore, StoreError};

use crate::environment::LmdbEnvironment;
use crate::LmdbError;

impl PeerStore for LmdbEnvironment {
    fn peers_iter(&self) -> Result<Vec<SocketAddrV6>, StoreError> {
        let rtxn = self.read_txn()?;
        let mut out = Vec::new();
        for entry in self.peers_db.iter(&rtxn).map_err(LmdbError::from)? {
            let (key, _) = entry.map_err(LmdbError::from)?;
            if let Some(endpoint) = endpoint_from_key(key) {
                out.push(endpoint);
            }
        }
        Ok(out)
    }

    fn peer_count(&self) -> Result<u64, StoreError> {
        let rtxn = self.read_txn()?;
        Ok(self.peers_db.len(&rtxn).map_err(LmdbError::from)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    #[test]
    fn persisted_peers_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let env = LmdbEnvironment::open(dir.path(), 16 * 1024 * 1024).unwrap();
        let ep = SocketAddrV6::new(Ipv6Addr::LOCALHOST, 54000, 0, 0);

        let mut batch = env.write_batch().unwrap();
        batch.peer_put(&ep).unwrap();
        batch.commit().unwrap();

        assert_eq!(env.peers_iter().unwrap(), vec![ep]);
        assert_eq!(env.peer_count().unwrap(), 1);

        let mut batch = env.write_batch().unwrap();
        batch.peer_del(&ep).unwrap();
        batch.commit().unwrap();
        assert_eq!(env.peer_count().unwrap(), 0);
    }
}
