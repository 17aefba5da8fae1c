//! Key pair construction.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use rand::RngCore;

use keva_types::{KeyPair, PrivateKey, PublicKey};

/// Generate a key pair from operating-system randomness.
pub fn generate_keypair() -> KeyPair {
    let mut secret = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut secret);
    let private = PrivateKey(secret);
    let public = crate::sign::derive_public(&private);
    KeyPair { public, private }
}

/// Deterministic key pair: secret = BLAKE2b-256(seed ‖ index-LE), the
/// wallet-style derivation. Index 0 is used for fixed test identities.
pub fn keypair_from_seed_index(seed: &[u8; 32], index: u32) -> KeyPair {
    let mut hasher = Blake2b::<U32>::new();
    hasher.update(seed);
    hasher.update(index.to_le_bytes());
    let mut secret = [0u8; 32];
    secret.copy_from_slice(&hasher.finalize());
    let private = PrivateKey(secret);
    let public = crate::sign::derive_public(&private);
    KeyPair { public, private }
}

/// Deterministic key pair at index 0.
pub fn keypair_from_seed(seed: &[u8; 32]) -> KeyPair {
    keypair_from_seed_index(seed, 0)
}

/// Recompute the public half of a secret key.
pub fn public_from_private(private: &PrivateKey) -> PublicKey {
    crate::sign::derive_public(private)
}
