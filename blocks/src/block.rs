//! The five block variants and their canonical binary forms.
//!
//! A block's hash covers only its "hashed fields"; signature and work travel
//! with the block but are excluded so work can be regenerated without
//! changing identity. State blocks prepend a 32-byte preamble (the type code
//! in the final byte) before hashing, domain-separating them from the legacy
//! formats. Work nonces are little-endian on the wire for the legacy kinds
//! and big-endian for state blocks — a historical accident every
//! implementation must preserve.

use blake2::Digest;

use keva_crypto::Blake2b256;
use keva_types::{Account, Amount, BlockHash, Link, Root, Signature, Work};

/// One-byte block type codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BlockType {
    Invalid = 0,
    NotABlock = 1,
    Send = 2,
    Receive = 3,
    Open = 4,
    Change = 5,
    State = 6,
}

impl BlockType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Invalid),
            1 => Some(Self::NotABlock),
            2 => Some(Self::Send),
            3 => Some(Self::Receive),
            4 => Some(Self::Open),
            5 => Some(Self::Change),
            6 => Some(Self::State),
            _ => None,
        }
    }

    /// Serialized body size for the concrete kinds, `None` otherwise.
    pub fn body_size(&self) -> Option<usize> {
        match self {
            Self::Send => Some(SendBlock::SIZE),
            Self::Receive => Some(ReceiveBlock::SIZE),
            Self::Open => Some(OpenBlock::SIZE),
            Self::Change => Some(ChangeBlock::SIZE),
            Self::State => Some(StateBlock::SIZE),
            Self::Invalid | Self::NotABlock => None,
        }
    }
}

fn finish_hash(hasher: Blake2b256) -> BlockHash {
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    BlockHash::new(out)
}

// ── Send ────────────────────────────────────────────────────────────────

/// Legacy send: debits the signer, creating a pending entry for
/// `destination`. The new balance is carried explicitly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendBlock {
    pub previous: BlockHash,
    pub destination: Account,
    pub balance: Amount,
    pub signature: Signature,
    pub work: Work,
}

impl SendBlock {
    pub const SIZE: usize = 32 + 32 + 16 + 64 + 8;

    pub fn hash(&self) -> BlockHash {
        let mut h = Blake2b256::new();
        h.update(self.previous.as_bytes());
        h.update(self.destination.as_bytes());
        h.update(&self.balance.to_be_bytes());
        finish_hash(h)
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.previous.as_bytes());
        out.extend_from_slice(self.destination.as_bytes());
        out.extend_from_slice(&self.balance.to_be_bytes());
        out.extend_from_slice(self.signature.as_bytes());
        out.extend_from_slice(&self.work.to_le_bytes());
    }

    pub fn deserialize(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::SIZE {
            return None;
        }
        Some(Self {
            previous: BlockHash::new(bytes[0..32].try_into().ok()?),
            destination: Account::from_bytes(bytes[32..64].try_into().ok()?),
            balance: Amount::from_be_bytes(bytes[64..80].try_into().ok()?),
            signature: Signature(bytes[80..144].try_into().ok()?),
            work: u64::from_le_bytes(bytes[144..152].try_into().ok()?),
        })
    }
}

// ── Receive ─────────────────────────────────────────────────────────────

/// Legacy receive: credits the signer with the amount of the `source` send.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceiveBlock {
    pub previous: BlockHash,
    pub source: BlockHash,
    pub signature: Signature,
    pub work: Work,
}

impl ReceiveBlock {
    pub const SIZE: usize = 32 + 32 + 64 + 8;

    pub fn hash(&self) -> BlockHash {
        let mut h = Blake2b256::new();
        h.update(self.previous.as_bytes());
        h.update(self.source.as_bytes());
        finish_hash(h)
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.previous.as_bytes());
        out.extend_from_slice(self.source.as_bytes());
        out.extend_from_slice(self.signature.as_bytes());
        out.extend_from_slice(&self.work.to_le_bytes());
    }

    pub fn deserialize(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::SIZE {
            return None;
        }
        Some(Self {
            previous: BlockHash::new(bytes[0..32].try_into().ok()?),
            source: BlockHash::new(bytes[32..64].try_into().ok()?),
            signature: Signature(bytes[64..128].try_into().ok()?),
            work: u64::from_le_bytes(bytes[128..136].try_into().ok()?),
        })
    }
}

// ── Open ────────────────────────────────────────────────────────────────

/// Legacy open: the first block of an account chain, receiving `source` and
/// naming the initial representative.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenBlock {
    pub source: BlockHash,
    pub representative: Account,
    pub account: Account,
    pub signature: Signature,
    pub work: Work,
}

impl OpenBlock {
    pub const SIZE: usize = 32 + 32 + 32 + 64 + 8;

    pub fn hash(&self) -> BlockHash {
        let mut h = Blake2b256::new();
        h.update(self.source.as_bytes());
        h.update(self.representative.as_bytes());
        h.update(self.account.as_bytes());
        finish_hash(h)
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.source.as_bytes());
        out.extend_from_slice(self.representative.as_bytes());
        out.extend_from_slice(self.account.as_bytes());
        out.extend_from_slice(self.signature.as_bytes());
        out.extend_from_slice(&self.work.to_le_bytes());
    }

    pub fn deserialize(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::SIZE {
            return None;
        }
        Some(Self {
            source: BlockHash::new(bytes[0..32].try_into().ok()?),
            representative: Account::from_bytes(bytes[32..64].try_into().ok()?),
            account: Account::from_bytes(bytes[64..96].try_into().ok()?),
            signature: Signature(bytes[96..160].try_into().ok()?),
            work: u64::from_le_bytes(bytes[160..168].try_into().ok()?),
        })
    }
}

// ── Change ──────────────────────────────────────────────────────────────

/// Legacy change: redelegates the account's voting weight.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeBlock {
    pub previous: BlockHash,
    pub representative: Account,
    pub signature: Signature,
    pub work: Work,
}

impl ChangeBlock {
    pub const SIZE: usize = 32 + 32 + 64 + 8;

    pub fn hash(&self) -> BlockHash {
        let mut h = Blake2b256::new();
        h.update(self.previous.as_bytes());
        h.update(self.representative.as_bytes());
        finish_hash(h)
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.previous.as_bytes());
        out.extend_from_slice(self.representative.as_bytes());
        out.extend_from_slice(self.signature.as_bytes());
        out.extend_from_slice(&self.work.to_le_bytes());
    }

    pub fn deserialize(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::SIZE {
            return None;
        }
        Some(Self {
            previous: BlockHash::new(bytes[0..32].try_into().ok()?),
            representative: Account::from_bytes(bytes[32..64].try_into().ok()?),
            signature: Signature(bytes[64..128].try_into().ok()?),
            work: u64::from_le_bytes(bytes[128..136].try_into().ok()?),
        })
    }
}

// ── State ───────────────────────────────────────────────────────────────

/// Unified block: carries the full account state, with `link` interpreted by
/// the balance delta (source hash on receive, destination on send, epoch
/// marker, or zero).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateBlock {
    pub account: Account,
    pub previous: BlockHash,
    pub representative: Account,
    pub balance: Amount,
    pub link: Link,
    pub signature: Signature,
    pub work: Work,
}

impl StateBlock {
    pub const SIZE: usize = 32 + 32 + 32 + 16 + 32 + 64 + 8;

    /// 32-byte hash preamble: the state type code in the final byte.
    fn preamble() -> [u8; 32] {
        let mut p = [0u8; 32];
        p[31] = BlockType::State as u8;
        p
    }

    pub fn hash(&self) -> BlockHash {
        let mut h = Blake2b256::new();
        h.update(&Self::preamble());
        h.update(self.account.as_bytes());
        h.update(self.previous.as_bytes());
        h.update(self.representative.as_bytes());
        h.update(&self.balance.to_be_bytes());
        h.update(self.link.as_bytes());
        finish_hash(h)
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.account.as_bytes());
        out.extend_from_slice(self.previous.as_bytes());
        out.extend_from_slice(self.representative.as_bytes());
        out.extend_from_slice(&self.balance.to_be_bytes());
        out.extend_from_slice(self.link.as_bytes());
        out.extend_from_slice(self.signature.as_bytes());
        // State blocks are the one kind with big-endian work on the wire.
        out.extend_from_slice(&self.work.to_be_bytes());
    }

    pub fn deserialize(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::SIZE {
            return None;
        }
        Some(Self {
            account: Account::from_bytes(bytes[0..32].try_into().ok()?),
            previous: BlockHash::new(bytes[32..64].try_into().ok()?),
            representative: Account::from_bytes(bytes[64..96].try_into().ok()?),
            balance: Amount::from_be_bytes(bytes[96..112].try_into().ok()?),
            link: Link(bytes[112..144].try_into().ok()?),
            signature: Signature(bytes[144..208].try_into().ok()?),
            work: u64::from_be_bytes(bytes[208..216].try_into().ok()?),
        })
    }
}

// ── Tagged enum ─────────────────────────────────────────────────────────

/// Any of the five concrete block kinds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Block {
    Send(SendBlock),
    Receive(ReceiveBlock),
    Open(OpenBlock),
    Change(ChangeBlock),
    State(StateBlock),
}

/// Dispatch over the concrete kinds without exposing the enum shape.
pub trait BlockVisitor {
    fn send(&mut self, block: &SendBlock);
    fn receive(&mut self, block: &ReceiveBlock);
    fn open(&mut self, block: &OpenBlock);
    fn change(&mut self, block: &ChangeBlock);
    fn state(&mut self, block: &StateBlock);
}

impl Block {
    pub fn block_type(&self) -> BlockType {
        match self {
            Self::Send(_) => BlockType::Send,
            Self::Receive(_) => BlockType::Receive,
            Self::Open(_) => BlockType::Open,
            Self::Change(_) => BlockType::Change,
            Self::State(_) => BlockType::State,
        }
    }

    pub fn visit(&self, visitor: &mut dyn BlockVisitor) {
        match self {
            Self::Send(b) => visitor.send(b),
            Self::Receive(b) => visitor.receive(b),
            Self::Open(b) => visitor.open(b),
            Self::Change(b) => visitor.change(b),
            Self::State(b) => visitor.state(b),
        }
    }

    pub fn hash(&self) -> BlockHash {
        match self {
            Self::Send(b) => b.hash(),
            Self::Receive(b) => b.hash(),
            Self::Open(b) => b.hash(),
            Self::Change(b) => b.hash(),
            Self::State(b) => b.hash(),
        }
    }

    /// Stable deduplication key: mixes signature and work into the hash so
    /// two copies of one logical block with different work are distinct.
    pub fn full_hash(&self) -> BlockHash {
        let mut h = Blake2b256::new();
        h.update(self.hash().as_bytes());
        h.update(self.signature().as_bytes());
        h.update(&self.work().to_le_bytes());
        finish_hash(h)
    }

    /// The election anchor: `previous` when nonzero, else the account.
    pub fn root(&self) -> Root {
        match self {
            Self::Send(b) => b.previous.into(),
            Self::Receive(b) => b.previous.into(),
            Self::Change(b) => b.previous.into(),
            Self::Open(b) => b.account.into(),
            Self::State(b) => {
                if b.previous.is_zero() {
                    b.account.into()
                } else {
                    b.previous.into()
                }
            }
        }
    }

    pub fn previous(&self) -> BlockHash {
        match self {
            Self::Send(b) => b.previous,
            Self::Receive(b) => b.previous,
            Self::Change(b) => b.previous,
            Self::Open(_) => BlockHash::ZERO,
            Self::State(b) => b.previous,
        }
    }

    /// The referenced send block for receive-like kinds, zero otherwise.
    /// State blocks expose their link; whether it is a source is contextual.
    pub fn source(&self) -> BlockHash {
        match self {
            Self::Receive(b) => b.source,
            Self::Open(b) => b.source,
            Self::Send(_) | Self::Change(_) | Self::State(_) => BlockHash::ZERO,
        }
    }

    pub fn link(&self) -> Link {
        match self {
            Self::State(b) => b.link,
            _ => Link::ZERO,
        }
    }

    pub fn representative(&self) -> Account {
        match self {
            Self::Open(b) => b.representative,
            Self::Change(b) => b.representative,
            Self::State(b) => b.representative,
            Self::Send(_) | Self::Receive(_) => Account::ZERO,
        }
    }

    pub fn account(&self) -> Account {
        match self {
            Self::Open(b) => b.account,
            Self::State(b) => b.account,
            Self::Send(_) | Self::Receive(_) | Self::Change(_) => Account::ZERO,
        }
    }

    pub fn balance(&self) -> Option<Amount> {
        match self {
            Self::Send(b) => Some(b.balance),
            Self::State(b) => Some(b.balance),
            Self::Receive(_) | Self::Open(_) | Self::Change(_) => None,
        }
    }

    pub fn work(&self) -> Work {
        match self {
            Self::Send(b) => b.work,
            Self::Receive(b) => b.work,
            Self::Open(b) => b.work,
            Self::Change(b) => b.work,
            Self::State(b) => b.work,
        }
    }

    pub fn set_work(&mut self, work: Work) {
        match self {
            Self::Send(b) => b.work = work,
            Self::Receive(b) => b.work = work,
            Self::Open(b) => b.work = work,
            Self::Change(b) => b.work = work,
            Self::State(b) => b.work = work,
        }
    }

    pub fn signature(&self) -> Signature {
        match self {
            Self::Send(b) => b.signature,
            Self::Receive(b) => b.signature,
            Self::Open(b) => b.signature,
            Self::Change(b) => b.signature,
            Self::State(b) => b.signature,
        }
    }

    pub fn set_signature(&mut self, signature: Signature) {
        match self {
            Self::Send(b) => b.signature = signature,
            Self::Receive(b) => b.signature = signature,
            Self::Open(b) => b.signature = signature,
            Self::Change(b) => b.signature = signature,
            Self::State(b) => b.signature = signature,
        }
    }

    /// Serialize the body only (no type byte).
    pub fn serialize(&self, out: &mut Vec<u8>) {
        match self {
            Self::Send(b) => b.serialize(out),
            Self::Receive(b) => b.serialize(out),
            Self::Open(b) => b.serialize(out),
            Self::Change(b) => b.serialize(out),
            Self::State(b) => b.serialize(out),
        }
    }

    /// Serialize with a leading type byte, the TCP stream form.
    pub fn serialize_with_type(&self, out: &mut Vec<u8>) {
        out.push(self.block_type() as u8);
        self.serialize(out);
    }

    /// Deserialize a body of the given kind. Rejects length mismatches.
    pub fn deserialize(block_type: BlockType, bytes: &[u8]) -> Option<Self> {
        match block_type {
            BlockType::Send => SendBlock::deserialize(bytes).map(Self::Send),
            BlockType::Receive => ReceiveBlock::deserialize(bytes).map(Self::Receive),
            BlockType::Open => OpenBlock::deserialize(bytes).map(Self::Open),
            BlockType::Change => ChangeBlock::deserialize(bytes).map(Self::Change),
            BlockType::State => StateBlock::deserialize(bytes).map(Self::State),
            BlockType::Invalid | BlockType::NotABlock => None,
        }
    }

    /// Deserialize the type-prefixed form, returning the bytes consumed.
    pub fn deserialize_with_type(bytes: &[u8]) -> Option<(Self, usize)> {
        let block_type = BlockType::from_u8(*bytes.first()?)?;
        let size = block_type.body_size()?;
        if bytes.len() < 1 + size {
            return None;
        }
        let block = Self::deserialize(block_type, &bytes[1..1 + size])?;
        Some((block, 1 + size))
    }
}

/// Whether a block of kind `next` may directly follow one of kind `prev`
/// within an account chain. State blocks may follow anything; once a chain
/// is on state blocks it never goes back to the legacy kinds.
pub fn valid_successor(prev: BlockType, next: BlockType) -> bool {
    match next {
        BlockType::State => true,
        BlockType::Send | BlockType::Receive | BlockType::Change => matches!(
            prev,
            BlockType::Send | BlockType::Receive | BlockType::Open | BlockType::Change
        ),
        // Opens have no predecessor; anything else is not a chain member.
        BlockType::Open | BlockType::Invalid | BlockType::NotABlock => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample_send() -> SendBlock {
        SendBlock {
            previous: BlockHash::new([1; 32]),
            destination: Account::from_bytes([2; 32]),
            balance: Amount::new(1000),
            signature: Signature([3; 64]),
            work: 0x0123_4567_89AB_CDEF,
        }
    }

    pub(crate) fn sample_state() -> StateBlock {
        StateBlock {
            account: Account::from_bytes([4; 32]),
            previous: BlockHash::new([5; 32]),
            representative: Account::from_bytes([6; 32]),
            balance: Amount::new(42),
            link: Link([7; 32]),
            signature: Signature([8; 64]),
            work: 0xFEDC_BA98_7654_3210,
        }
    }

    #[test]
    fn body_sizes() {
        assert_eq!(SendBlock::SIZE, 152);
        assert_eq!(ReceiveBlock::SIZE, 136);
        assert_eq!(OpenBlock::SIZE, 168);
        assert_eq!(ChangeBlock::SIZE, 136);
        assert_eq!(StateBlock::SIZE, 216);
    }

    #[test]
    fn send_binary_roundtrip() {
        let b = sample_send();
        let mut bytes = Vec::new();
        b.serialize(&mut bytes);
        assert_eq!(bytes.len(), SendBlock::SIZE);
        assert_eq!(SendBlock::deserialize(&bytes), Some(b));
    }

    #[test]
    fn receive_binary_roundtrip() {
        let b = ReceiveBlock {
            previous: BlockHash::new([1; 32]),
            source: BlockHash::new([2; 32]),
            signature: Signature([3; 64]),
            work: 99,
        };
        let mut bytes = Vec::new();
        b.serialize(&mut bytes);
        assert_eq!(ReceiveBlock::deserialize(&bytes), Some(b));
    }

    #[test]
    fn open_binary_roundtrip() {
        let b = OpenBlock {
            source: BlockHash::new([1; 32]),
            representative: Account::from_bytes([2; 32]),
            account: Account::from_bytes([3; 32]),
            signature: Signature([4; 64]),
            work: 7,
        };
        let mut bytes = Vec::new();
        b.serialize(&mut bytes);
        assert_eq!(OpenBlock::deserialize(&bytes), Some(b));
    }

    #[test]
    fn change_binary_roundtrip() {
        let b = ChangeBlock {
            previous: BlockHash::new([1; 32]),
            representative: Account::from_bytes([2; 32]),
            signature: Signature([3; 64]),
            work: 11,
        };
        let mut bytes = Vec::new();
        b.serialize(&mut bytes);
        assert_eq!(ChangeBlock::deserialize(&bytes), Some(b));
    }

    #[test]
    fn state_binary_roundtrip() {
        let b = sample_state();
        let mut bytes = Vec::new();
        b.serialize(&mut bytes);
        assert_eq!(bytes.len(), StateBlock::SIZE);
        assert_eq!(StateBlock::deserialize(&bytes), Some(b));
    }

    #[test]
    fn state_work_is_big_endian_on_wire() {
        let b = sample_state();
        let mut bytes = Vec::new();
        b.serialize(&mut bytes);
        assert_eq!(&bytes[208..], &b.work.to_be_bytes());
    }

    #[test]
    fn legacy_work_is_little_endian_on_wire() {
        let b = sample_send();
        let mut bytes = Vec::new();
        b.serialize(&mut bytes);
        assert_eq!(&bytes[144..], &b.work.to_le_bytes());
    }

    #[test]
    fn truncated_body_rejected() {
        let b = sample_state();
        let mut bytes = Vec::new();
        b.serialize(&mut bytes);
        assert_eq!(StateBlock::deserialize(&bytes[..bytes.len() - 1]), None);
    }

    #[test]
    fn hash_excludes_signature_and_work() {
        let mut a = Block::State(sample_state());
        let h = a.hash();
        a.set_signature(Signature([0xEE; 64]));
        a.set_work(1);
        assert_eq!(a.hash(), h);
        assert_ne!(a.full_hash(), Block::State(sample_state()).full_hash());
    }

    #[test]
    fn state_preamble_distinguishes_from_legacy() {
        // A receive block and a state block that happen to share their first
        // two hashed fields must not collide.
        let r = ReceiveBlock {
            previous: BlockHash::new([5; 32]),
            source: BlockHash::new([7; 32]),
            signature: Signature([0; 64]),
            work: 0,
        };
        let s = sample_state();
        assert_ne!(r.hash(), s.hash());
    }

    #[test]
    fn root_selection() {
        let open = Block::Open(OpenBlock {
            source: BlockHash::new([1; 32]),
            representative: Account::from_bytes([2; 32]),
            account: Account::from_bytes([3; 32]),
            signature: Signature([0; 64]),
            work: 0,
        });
        assert_eq!(open.root().as_bytes(), &[3; 32]);

        let mut state = sample_state();
        state.previous = BlockHash::ZERO;
        assert_eq!(
            Block::State(state.clone()).root().as_bytes(),
            state.account.as_bytes()
        );
        state.previous = BlockHash::new([9; 32]);
        assert_eq!(Block::State(state).root().as_bytes(), &[9; 32]);
    }

    #[test]
    fn type_prefixed_roundtrip() {
        let b = Block::Send(sample_send());
        let mut bytes = Vec::new();
        b.serialize_with_type(&mut bytes);
        let (decoded, consumed) = Block::deserialize_with_type(&bytes).unwrap();
        assert_eq!(decoded, b);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn unknown_type_byte_rejected() {
        assert!(Block::deserialize_with_type(&[200, 0, 0]).is_none());
        assert!(Block::deserialize_with_type(&[BlockType::NotABlock as u8]).is_none());
    }

    #[test]
    fn successor_rules() {
        assert!(valid_successor(BlockType::Send, BlockType::Receive));
        assert!(valid_successor(BlockType::Open, BlockType::Send));
        assert!(valid_successor(BlockType::Change, BlockType::Change));
        assert!(valid_successor(BlockType::State, BlockType::State));
        assert!(valid_successor(BlockType::Send, BlockType::State));
        // Legacy kinds may not follow a state block.
        assert!(!valid_successor(BlockType::State, BlockType::Send));
        assert!(!valid_successor(BlockType::State, BlockType::Receive));
        // Opens never have a predecessor.
        assert!(!valid_successor(BlockType::Receive, BlockType::Open));
    }

    #[test]
    fn default_accessors_are_zero() {
        let b = Block::Send(sample_send());
        assert!(b.account().is_zero());
        assert!(b.representative().is_zero());
        assert!(b.link().is_zero());
        assert!(b.source().is_zero());
    }
}
