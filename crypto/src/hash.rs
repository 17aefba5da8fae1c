//! BLAKE2b digest helpers.

use blake2::digest::consts::{U32, U8};
use blake2::{Blake2b, Digest};

/// BLAKE2b with a 256-bit digest, the hash of blocks and votes.
pub type Blake2b256 = Blake2b<U32>;
/// BLAKE2b with a 64-bit digest, the proof-of-work hash.
pub type Blake2b64 = Blake2b<U8>;

/// One-shot BLAKE2b-256 over a byte slice.
pub fn blake2b_256(input: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Blake2b256::digest(input));
    out
}

/// One-shot BLAKE2b-64 over a byte slice, returned as the raw 8-byte digest.
pub fn blake2b_64(input: &[u8]) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(&Blake2b64::digest(input));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic() {
        assert_eq!(blake2b_256(b"keva"), blake2b_256(b"keva"));
        assert_ne!(blake2b_256(b"keva"), blake2b_256(b"kevb"));
    }

    #[test]
    fn short_digest_is_not_a_truncation() {
        // BLAKE2b parameterises the digest length, so the 8-byte digest is a
        // different function from the first 8 bytes of the 32-byte digest.
        let long = blake2b_256(b"keva");
        let short = blake2b_64(b"keva");
        assert_ne!(&long[..8], &short[..]);
    }

    #[test]
    fn empty_input_known_vector() {
        // RFC 7693 appendix: BLAKE2b-512("") begins 786a02f7; the 256-bit
        // variant of the empty string is the well-known 0e5751c0... digest.
        let digest = blake2b_256(b"");
        assert_eq!(
            hex::encode(digest),
            "0e5751c026e543b2e8ab2eb06099daa1d1e5df47778f7787faab45cdf12fe3a8"
        );
    }
}
