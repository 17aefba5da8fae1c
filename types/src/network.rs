//! Network selection and per-network protocol constants.
//!
//! The active network is a compile-time choice (cargo features
//! `network-beta` / `network-test`; live by default), mirroring the way the
//! genesis block, magic number, and work thresholds must agree across every
//! node on a network. Runtime components nevertheless take an explicit
//! [`Network`] so tests can exercise the test parameters regardless of the
//! build configuration.

use serde::{Deserialize, Serialize};

/// Which keva network a node participates in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Network {
    /// The production network.
    Live,
    /// The public beta network.
    Beta,
    /// Low-work network with a published genesis key, for tests.
    Test,
}

#[cfg(feature = "network-test")]
pub const ACTIVE_NETWORK: Network = Network::Test;
#[cfg(all(feature = "network-beta", not(feature = "network-test")))]
pub const ACTIVE_NETWORK: Network = Network::Beta;
#[cfg(not(any(feature = "network-test", feature = "network-beta")))]
pub const ACTIVE_NETWORK: Network = Network::Live;

/// Wire protocol version carried in every message header.
pub const PROTOCOL_VERSION: u8 = 16;
/// Oldest protocol version this node will talk to.
pub const PROTOCOL_VERSION_MIN: u8 = 13;

impl Network {
    /// Second byte of the message magic ('X' is always first).
    pub fn magic_letter(&self) -> u8 {
        match self {
            Self::Live => b'Q',
            Self::Beta => b'C',
            Self::Test => b'T',
        }
    }

    /// Default UDP port for node-to-node traffic.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Live => 7032,
            Self::Beta | Self::Test => 54000,
        }
    }

    /// Proof-of-work publish threshold: BLAKE2b-64(work ‖ root) must exceed
    /// this value.
    pub fn publish_threshold(&self) -> u64 {
        match self {
            Self::Live | Self::Beta => 0xffff_ffc0_0000_0000,
            Self::Test => 0xff00_0000_0000_0000,
        }
    }

    /// Number of retained online-weight samples (≈ two weeks at the sample
    /// period on live).
    pub fn weight_samples(&self) -> usize {
        match self {
            Self::Live => 4032,
            Self::Beta | Self::Test => 864,
        }
    }

    /// Seconds between online-weight samples.
    pub fn weight_period_secs(&self) -> u64 {
        match self {
            Self::Live | Self::Beta => 300,
            Self::Test => 1,
        }
    }

    /// Milliseconds between election announcement rounds.
    pub fn request_interval_ms(&self) -> u64 {
        match self {
            Self::Live | Self::Beta => 16_000,
            Self::Test => 10,
        }
    }

    /// Bound on the votes cache.
    pub fn votes_cache_size(&self) -> usize {
        match self {
            Self::Live | Self::Beta => 1000,
            Self::Test => 2,
        }
    }

    /// Divisor applied to online weight when deciding whether accumulated
    /// vote weight on an unknown hash should trigger a lazy bootstrap.
    pub fn bootstrap_fraction(&self) -> u128 {
        match self {
            Self::Live | Self::Beta => 10,
            Self::Test => 4,
        }
    }

    /// Floor for the quorum denominator, in raw units.
    pub fn online_weight_minimum(&self) -> u128 {
        match self {
            Self::Live | Self::Beta => 60_000_000 * crate::amount::MKEVA,
            Self::Test => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Beta => "beta",
            Self::Test => "test",
        }
    }
}

/// Bundle of the tunables derived from a [`Network`], plus the quorum
/// percentage shared by all networks.
#[derive(Clone, Copy, Debug)]
pub struct NetworkParams {
    pub network: Network,
    pub quorum_percent: u8,
}

impl NetworkParams {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            quorum_percent: 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_letters() {
        assert_eq!(Network::Live.magic_letter(), b'Q');
        assert_eq!(Network::Beta.magic_letter(), b'C');
        assert_eq!(Network::Test.magic_letter(), b'T');
    }

    #[test]
    fn ports() {
        assert_eq!(Network::Live.default_port(), 7032);
        assert_eq!(Network::Beta.default_port(), 54000);
        assert_eq!(Network::Test.default_port(), 54000);
    }

    #[test]
    fn thresholds() {
        assert_eq!(Network::Live.publish_threshold(), 0xffff_ffc0_0000_0000);
        assert_eq!(Network::Test.publish_threshold(), 0xff00_0000_0000_0000);
        assert!(Network::Test.publish_threshold() < Network::Live.publish_threshold());
    }

    #[test]
    fn sample_counts() {
        assert_eq!(Network::Live.weight_samples(), 4032);
        assert_eq!(Network::Beta.weight_samples(), 864);
    }
}
