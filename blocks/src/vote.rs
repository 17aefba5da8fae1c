//! Representative votes.
//!
//! A vote is a representative's signed statement endorsing one or more
//! blocks, stamped with a monotonically increasing sequence number for
//! replay protection. The payload is either a full serialized block or a
//! list of up to twelve bare hashes (vote-by-hash, signalled on the wire by
//! a `not_a_block` block type in the enclosing header).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use blake2::Digest;
use rand::seq::IteratorRandom;

use keva_crypto::{sign_message, validate_message, Blake2b256};
use keva_types::{Account, BlockHash, KeyPair, PublicKey, Signature};

use crate::block::{Block, BlockType};

/// Maximum hashes carried by one vote-by-hash message.
pub const MAX_HASHES_PER_VOTE: usize = 12;

/// What a vote endorses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VotePayload {
    /// A full block, carried inline.
    Block(Arc<Block>),
    /// Bare hashes of blocks the recipient is expected to know.
    Hashes(Vec<BlockHash>),
}

/// A signed vote from a representative.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Vote {
    pub account: Account,
    pub signature: Signature,
    pub sequence: u64,
    pub payload: VotePayload,
}

impl Vote {
    /// Build and sign a vote-by-hash over `hashes`.
    pub fn new_signed(keys: &KeyPair, sequence: u64, hashes: Vec<BlockHash>) -> Self {
        debug_assert!(!hashes.is_empty() && hashes.len() <= MAX_HASHES_PER_VOTE);
        let mut vote = Self {
            account: keys.account(),
            signature: Signature::ZERO,
            sequence,
            payload: VotePayload::Hashes(hashes),
        };
        vote.signature = sign_message(&keys.private, &keys.public, &vote.hash());
        vote
    }

    /// Build and sign a vote carrying a full block.
    pub fn new_signed_block(keys: &KeyPair, sequence: u64, block: Arc<Block>) -> Self {
        let mut vote = Self {
            account: keys.account(),
            signature: Signature::ZERO,
            sequence,
            payload: VotePayload::Block(block),
        };
        vote.signature = sign_message(&keys.private, &keys.public, &vote.hash());
        vote
    }

    /// The hashes this vote endorses, regardless of payload form.
    pub fn hashes(&self) -> Vec<BlockHash> {
        match &self.payload {
            VotePayload::Block(block) => vec![block.hash()],
            VotePayload::Hashes(hashes) => hashes.clone(),
        }
    }

    /// The signed digest: every endorsed hash, then the sequence (LE).
    pub fn hash(&self) -> BlockHash {
        let mut h = Blake2b256::new();
        for hash in self.hashes() {
            h.update(hash.as_bytes());
        }
        h.update(self.sequence.to_le_bytes());
        let mut out = [0u8; 32];
        out.copy_from_slice(&h.finalize());
        BlockHash::new(out)
    }

    /// Deduplication key: mixes the voter and signature into the hash.
    pub fn full_hash(&self) -> BlockHash {
        let mut h = Blake2b256::new();
        h.update(self.hash().as_bytes());
        h.update(self.account.as_bytes());
        h.update(self.signature.as_bytes());
        let mut out = [0u8; 32];
        out.copy_from_slice(&h.finalize());
        BlockHash::new(out)
    }

    /// Verify the signature against the voting account.
    pub fn validate(&self) -> bool {
        validate_message(
            &PublicKey::from(self.account),
            &self.hash(),
            &self.signature,
        )
    }

    /// The block type the enclosing message header must carry.
    pub fn header_block_type(&self) -> BlockType {
        match &self.payload {
            VotePayload::Block(block) => block.block_type(),
            VotePayload::Hashes(_) => BlockType::NotABlock,
        }
    }

    /// Serialize: account ‖ signature ‖ sequence-LE ‖ payload.
    pub fn serialize(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.account.as_bytes());
        out.extend_from_slice(self.signature.as_bytes());
        out.extend_from_slice(&self.sequence.to_le_bytes());
        match &self.payload {
            VotePayload::Block(block) => block.serialize(out),
            VotePayload::Hashes(hashes) => {
                for hash in hashes {
                    out.extend_from_slice(hash.as_bytes());
                }
            }
        }
    }

    /// Deserialize a vote whose payload form is dictated by `block_type`.
    /// Requires the payload to fill `bytes` exactly.
    pub fn deserialize(block_type: BlockType, bytes: &[u8]) -> Option<Self> {
        const PREFIX: usize = 32 + 64 + 8;
        if bytes.len() < PREFIX {
            return None;
        }
        let account = Account::from_bytes(bytes[0..32].try_into().ok()?);
        let signature = Signature(bytes[32..96].try_into().ok()?);
        let sequence = u64::from_le_bytes(bytes[96..104].try_into().ok()?);
        let rest = &bytes[PREFIX..];

        let payload = match block_type {
            BlockType::NotABlock => {
                if rest.is_empty() || rest.len() % 32 != 0 || rest.len() / 32 > MAX_HASHES_PER_VOTE
                {
                    return None;
                }
                let hashes = rest
                    .chunks_exact(32)
                    .map(|chunk| BlockHash::new(chunk.try_into().expect("chunk is 32 bytes")))
                    .collect();
                VotePayload::Hashes(hashes)
            }
            _ => {
                let block = Block::deserialize(block_type, rest)?;
                VotePayload::Block(Arc::new(block))
            }
        };

        Some(Self {
            account,
            signature,
            sequence,
            payload,
        })
    }
}

/// Maps vote full-hash → weak handle, same sweep policy as the block uniquer.
#[derive(Default)]
pub struct VoteUniquer {
    votes: Mutex<HashMap<BlockHash, Weak<Vote>>>,
}

impl VoteUniquer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unique(&self, vote: Arc<Vote>) -> Arc<Vote> {
        let key = vote.full_hash();
        let mut votes = self.votes.lock().unwrap();

        let result = match votes.get(&key).and_then(Weak::upgrade) {
            Some(existing) => existing,
            None => {
                votes.insert(key, Arc::downgrade(&vote));
                vote
            }
        };

        let mut rng = rand::thread_rng();
        let dead: Vec<BlockHash> = votes
            .iter()
            .filter(|(_, weak)| weak.strong_count() == 0)
            .map(|(hash, _)| *hash)
            .choose_multiple(&mut rng, 2);
        for hash in dead {
            votes.remove(&hash);
        }

        result
    }

    pub fn size(&self) -> usize {
        self.votes.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::StateBlock;
    use keva_crypto::keypair_from_seed;
    use keva_types::{Amount, Link};

    fn test_keys() -> KeyPair {
        keypair_from_seed(&[11u8; 32])
    }

    fn sample_block() -> Arc<Block> {
        Arc::new(Block::State(StateBlock {
            account: Account::from_bytes([1; 32]),
            previous: BlockHash::new([2; 32]),
            representative: Account::from_bytes([3; 32]),
            balance: Amount::new(5),
            link: Link::ZERO,
            signature: Signature([0; 64]),
            work: 0,
        }))
    }

    #[test]
    fn signed_vote_validates() {
        let vote = Vote::new_signed(&test_keys(), 1, vec![BlockHash::new([9; 32])]);
        assert!(vote.validate());
    }

    #[test]
    fn tampered_vote_fails_validation() {
        let mut vote = Vote::new_signed(&test_keys(), 1, vec![BlockHash::new([9; 32])]);
        vote.sequence = 2;
        assert!(!vote.validate());
    }

    #[test]
    fn vote_by_hash_roundtrip() {
        let vote = Vote::new_signed(
            &test_keys(),
            7,
            vec![BlockHash::new([1; 32]), BlockHash::new([2; 32])],
        );
        let mut bytes = Vec::new();
        vote.serialize(&mut bytes);
        let decoded = Vote::deserialize(BlockType::NotABlock, &bytes).unwrap();
        assert_eq!(decoded, vote);
        assert!(decoded.validate());
    }

    #[test]
    fn vote_with_block_roundtrip() {
        let vote = Vote::new_signed_block(&test_keys(), 3, sample_block());
        let mut bytes = Vec::new();
        vote.serialize(&mut bytes);
        let decoded = Vote::deserialize(vote.header_block_type(), &bytes).unwrap();
        assert_eq!(decoded, vote);
        assert!(decoded.validate());
    }

    #[test]
    fn trailing_bytes_rejected() {
        let vote = Vote::new_signed(&test_keys(), 1, vec![BlockHash::new([1; 32])]);
        let mut bytes = Vec::new();
        vote.serialize(&mut bytes);
        bytes.push(0);
        assert!(Vote::deserialize(BlockType::NotABlock, &bytes).is_none());
    }

    #[test]
    fn too_many_hashes_rejected() {
        let hashes: Vec<BlockHash> = (0..13u8).map(|i| BlockHash::new([i; 32])).collect();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&[0u8; 32]);
        bytes.extend_from_slice(&[0u8; 64]);
        bytes.extend_from_slice(&0u64.to_le_bytes());
        for h in &hashes {
            bytes.extend_from_slice(h.as_bytes());
        }
        assert!(Vote::deserialize(BlockType::NotABlock, &bytes).is_none());
    }

    #[test]
    fn sequence_changes_hash() {
        let keys = test_keys();
        let a = Vote::new_signed(&keys, 1, vec![BlockHash::new([1; 32])]);
        let b = Vote::new_signed(&keys, 2, vec![BlockHash::new([1; 32])]);
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn uniquer_collapses_identical_votes() {
        let uniquer = VoteUniquer::new();
        let keys = test_keys();
        let v1 = Arc::new(Vote::new_signed(&keys, 1, vec![BlockHash::new([1; 32])]));
        let v2 = Arc::new(Vote::new_signed(&keys, 1, vec![BlockHash::new([1; 32])]));
        let u1 = uniquer.unique(v1);
        let u2 = uniquer.unique(v2);
        assert!(Arc::ptr_eq(&u1, &u2));
        assert_eq!(uniquer.size(), 1);
    }
}
