//! Ed25519 signing with BLAKE2b-512 as the inner hash.
//!
//! The protocol predates the Ed25519 RFC's SHA-512 ubiquity and substitutes
//! BLAKE2b-512 everywhere the scheme hashes: secret key expansion, the
//! nonce derivation, and the challenge. `ed25519-dalek` exposes exactly this
//! seam through its `hazmat` module, which accepts any 64-byte-output digest
//! for the signing and verification transcripts; key expansion is done here
//! with BLAKE2b so the whole scheme is consistent.

use blake2::{Blake2b512, Digest};
use ed25519_dalek::hazmat::{raw_sign, raw_verify, ExpandedSecretKey};
use ed25519_dalek::VerifyingKey;

use keva_types::{BlockHash, PrivateKey, PublicKey, Signature};

/// Expand a 32-byte secret with BLAKE2b-512 into the scalar + prefix pair.
fn expand_secret(private: &PrivateKey) -> ExpandedSecretKey {
    let digest = Blake2b512::digest(private.as_bytes());
    let mut bytes = [0u8; 64];
    bytes.copy_from_slice(&digest);
    // `from_bytes` clamps the scalar half per the Ed25519 spec.
    ExpandedSecretKey::from_bytes(&bytes)
}

/// Derive the public key belonging to a BLAKE2b-expanded secret.
pub(crate) fn derive_public(private: &PrivateKey) -> PublicKey {
    let expanded = expand_secret(private);
    let verifying = VerifyingKey::from(&expanded);
    PublicKey(verifying.to_bytes())
}

/// Sign a block hash. `public` must be the key derived from `private`.
pub fn sign_message(private: &PrivateKey, public: &PublicKey, message: &BlockHash) -> Signature {
    let expanded = expand_secret(private);
    let verifying = VerifyingKey::from(&expanded);
    debug_assert_eq!(verifying.to_bytes(), *public.as_bytes());
    let sig = raw_sign::<Blake2b512>(&expanded, message.as_bytes(), &verifying);
    Signature(sig.to_bytes())
}

/// Verify a signature over a block hash. Returns `true` when valid.
pub fn validate_message(public: &PublicKey, message: &BlockHash, signature: &Signature) -> bool {
    let verifying = match VerifyingKey::from_bytes(public.as_bytes()) {
        Ok(v) => v,
        Err(_) => return false,
    };
    let sig = ed25519_dalek::Signature::from_bytes(signature.as_bytes());
    raw_verify::<Blake2b512>(&verifying, message.as_bytes(), &sig).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::keypair_from_seed;

    fn test_hash(byte: u8) -> BlockHash {
        BlockHash::new([byte; 32])
    }

    #[test]
    fn sign_and_verify() {
        let kp = keypair_from_seed(&[1u8; 32]);
        let hash = test_hash(0x42);
        let sig = sign_message(&kp.private, &kp.public, &hash);
        assert!(validate_message(&kp.public, &hash, &sig));
    }

    #[test]
    fn wrong_message_rejected() {
        let kp = keypair_from_seed(&[1u8; 32]);
        let sig = sign_message(&kp.private, &kp.public, &test_hash(0x42));
        assert!(!validate_message(&kp.public, &test_hash(0x43), &sig));
    }

    #[test]
    fn wrong_key_rejected() {
        let kp1 = keypair_from_seed(&[1u8; 32]);
        let kp2 = keypair_from_seed(&[2u8; 32]);
        let hash = test_hash(0x42);
        let sig = sign_message(&kp1.private, &kp1.public, &hash);
        assert!(!validate_message(&kp2.public, &hash, &sig));
    }

    #[test]
    fn corrupted_signature_rejected() {
        let kp = keypair_from_seed(&[1u8; 32]);
        let hash = test_hash(0x42);
        let mut sig = sign_message(&kp.private, &kp.public, &hash);
        sig.0[0] ^= 0x01;
        assert!(!validate_message(&kp.public, &hash, &sig));
    }

    #[test]
    fn signing_is_deterministic() {
        let kp = keypair_from_seed(&[9u8; 32]);
        let hash = test_hash(0x01);
        let s1 = sign_message(&kp.private, &kp.public, &hash);
        let s2 = sign_message(&kp.private, &kp.public, &hash);
        assert_eq!(s1, s2);
    }
}
