//! P2P networking: the UDP socket service with its datagram ring buffer,
//! the peer table, and syn-cookie handshake state.

pub mod peers;
pub mod syn_cookies;
pub mod udp;

pub use peers::{reserved_address, PeerInfo, PeerTable, KEEPALIVE_PERIOD_SECS, PEER_CUTOFF_SECS};
pub use syn_cookies::SynCookies;
pub use udp::{Datagram, DatagramQueue, UdpChannels, RECEIVE_BUFFER_SLOTS};
