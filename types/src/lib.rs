//! Fundamental types for the keva protocol.
//!
//! This crate defines the core scalars shared across every other crate in the
//! workspace: block hashes, accounts, amounts, keys, signatures, and the
//! compile-time network selection with its protocol constants.

pub mod account;
pub mod amount;
pub mod error;
pub mod hash;
pub mod keys;
pub mod network;
pub mod time;

pub use account::Account;
pub use amount::Amount;
pub use error::KevaError;
pub use hash::{BlockHash, Link, Root};
pub use keys::{KeyPair, PrivateKey, PublicKey, Signature};
pub use network::{Network, NetworkParams, ACTIVE_NETWORK, PROTOCOL_VERSION, PROTOCOL_VERSION_MIN};
pub use time::unix_seconds;

/// A 64-bit proof-of-work nonce.
///
/// Endianness on the wire depends on the block kind (big-endian for state
/// blocks, little-endian for the legacy kinds); the codecs own that detail.
pub type Work = u64;
