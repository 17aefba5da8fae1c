//! Cryptographic primitives for the keva protocol.
//!
//! Everything is BLAKE2b: block and vote hashing (256-bit), the inner hash of
//! the Ed25519 signature scheme (512-bit), account checksums (40-bit, in
//! `keva-types`), and proof-of-work digests (64-bit, in `keva-work`).

pub mod hash;
pub mod keys;
pub mod sign;

pub use hash::{blake2b_256, blake2b_64, Blake2b256};
pub use keys::{generate_keypair, keypair_from_seed, public_from_private};
pub use sign::{sign_message, validate_message};
