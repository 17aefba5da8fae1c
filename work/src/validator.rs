//! PoW validation.

use keva_crypto::blake2b_64;
use keva_types::{Root, Work};

/// Compute the difficulty value of a nonce for a root.
pub fn work_value(root: &Root, work: Work) -> u64 {
    let mut input = [0u8; 40];
    input[..8].copy_from_slice(&work.to_le_bytes());
    input[8..].copy_from_slice(root.as_bytes());
    u64::from_le_bytes(blake2b_64(&input))
}

/// A nonce is valid iff its difficulty value strictly exceeds the threshold.
pub fn work_valid(root: &Root, work: Work, threshold: u64) -> bool {
    work_value(root, work) > threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use keva_types::Network;

    #[test]
    fn value_is_deterministic() {
        let root = Root([0x11; 32]);
        assert_eq!(work_value(&root, 42), work_value(&root, 42));
        assert_ne!(work_value(&root, 42), work_value(&root, 43));
    }

    #[test]
    fn threshold_boundary() {
        let root = Root([0x22; 32]);
        let v = work_value(&root, 7);
        assert!(work_valid(&root, 7, v - 1));
        assert!(!work_valid(&root, 7, v));
    }

    #[test]
    fn maximum_threshold_rejects_everything() {
        let root = Root([0u8; 32]);
        assert!(!work_valid(&root, 0, u64::MAX));
        assert!(!work_valid(&root, u64::MAX, u64::MAX));
    }

    #[test]
    fn test_network_threshold_is_reachable() {
        // Exhaustively search a small nonce space; the test threshold admits
        // roughly 1 in 256 nonces so 4096 attempts virtually always succeed.
        let root = Root([0x42; 32]);
        let threshold = Network::Test.publish_threshold();
        let found = (0u64..4096).any(|nonce| work_valid(&root, nonce, threshold));
        assert!(found);
    }

    #[test]
    fn root_changes_value() {
        let a = Root([0x01; 32]);
        let b = Root([0x02; 32]);
        assert_ne!(work_value(&a, 5), work_value(&b, 5));
    }
}
