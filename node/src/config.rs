//! Node configuration with TOML file support.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::NodeError;

/// Configuration for a keva node.
///
/// Loaded from a TOML file via [`NodeConfig::from_toml_file`] or built
/// programmatically (tests use [`NodeConfig::test_default`]). The network
/// itself is a compile-time selection, not configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Ledger data directory.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// UDP/TCP port. Zero binds an ephemeral port (tests).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Accept loopback/private peers (development networks).
    #[serde(default)]
    pub allow_local_peers: bool,

    /// Endpoints contacted at startup, as `address:port` strings.
    #[serde(default)]
    pub preconfigured_peers: Vec<String>,

    /// Datagram worker tasks.
    #[serde(default = "default_packet_threads")]
    pub packet_threads: usize,

    /// Wall-clock budget of one block-processor write batch.
    #[serde(default = "default_batch_max_time_ms")]
    pub block_processor_batch_max_time_ms: u64,

    /// Base bootstrap connection count.
    #[serde(default = "default_bootstrap_connections")]
    pub bootstrap_connections: usize,

    /// Bootstrap connection ceiling.
    #[serde(default = "default_bootstrap_connections_max")]
    pub bootstrap_connections_max: usize,

    /// Hex seed of the representative voting key; empty disables voting.
    #[serde(default)]
    pub vote_seed: String,

    /// LMDB map size in bytes.
    #[serde(default = "default_map_size")]
    pub lmdb_map_size: usize,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./keva_data")
}

fn default_port() -> u16 {
    keva_types::ACTIVE_NETWORK.default_port()
}

fn default_packet_threads() -> usize {
    4
}

fn default_batch_max_time_ms() -> u64 {
    250
}

fn default_bootstrap_connections() -> usize {
    4
}

fn default_bootstrap_connections_max() -> usize {
    64
}

fn default_map_size() -> usize {
    128 * 1024 * 1024 * 1024
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for NodeConfig {
    fn default() -> Self {
        toml::from_str("").expect("empty config populates every default")
    }
}

impl NodeConfig {
    pub fn from_toml_file(path: &std::path::Path) -> Result<Self, NodeError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, NodeError> {
        toml::from_str(content).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// A small-footprint configuration for tests: local peers allowed, tiny
    /// map, ephemeral port.
    pub fn test_default(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            port: 0,
            allow_local_peers: true,
            lmdb_map_size: 256 * 1024 * 1024,
            packet_threads: 1,
            ..Self::default()
        }
    }
}
