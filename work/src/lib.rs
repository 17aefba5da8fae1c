//! Proof-of-work for the keva protocol.
//!
//! Every block carries a 64-bit nonce. A nonce is valid for a root when
//! BLAKE2b-64(nonce-LE ‖ root), read as a little-endian integer, exceeds the
//! network's publish threshold. Work is tied to the block's root rather than
//! its hash so it can be precomputed before the block contents are final.

pub mod generator;
pub mod validator;

pub use generator::WorkPool;
pub use validator::{work_valid, work_value};
