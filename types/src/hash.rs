//! 256-bit hash scalars for the block lattice.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::account::Account;

/// A 32-byte block hash — identifies one block in an account's chain.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockHash(pub [u8; 32]);

impl BlockHash {
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Parse from 64 uppercase or lowercase hex characters.
    pub fn decode_hex(s: &str) -> Option<Self> {
        if s.len() != 64 {
            return None;
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes).ok()?;
        Some(Self(bytes))
    }

    /// Canonical 64-character uppercase hex form.
    pub fn encode_hex(&self) -> String {
        hex::encode_upper(self.0)
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short: String = self.0[..4].iter().map(|b| format!("{:02X}", b)).collect();
        write!(f, "BlockHash({}…)", short)
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode_hex())
    }
}

/// The anchor a block's vote is held against: `previous` when nonzero,
/// otherwise the account being opened.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Root(pub [u8; 32]);

impl Root {
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl From<BlockHash> for Root {
    fn from(h: BlockHash) -> Self {
        Self(h.0)
    }
}

impl From<Account> for Root {
    fn from(a: Account) -> Self {
        Self(*a.as_bytes())
    }
}

impl From<Root> for BlockHash {
    fn from(r: Root) -> Self {
        Self(r.0)
    }
}

impl fmt::Debug for Root {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short: String = self.0[..4].iter().map(|b| format!("{:02X}", b)).collect();
        write!(f, "Root({}…)", short)
    }
}

impl fmt::Display for Root {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode_upper(self.0))
    }
}

/// The 256-bit link field of a state block.
///
/// Interpreted by context: a source block hash on receive, a destination
/// account on send, the epoch marker on epoch blocks, zero otherwise.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Link(pub [u8; 32]);

impl Link {
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    pub fn as_block_hash(&self) -> BlockHash {
        BlockHash(self.0)
    }

    pub fn as_account(&self) -> Account {
        Account::from_bytes(self.0)
    }
}

impl From<BlockHash> for Link {
    fn from(h: BlockHash) -> Self {
        Self(h.0)
    }
}

impl From<Account> for Link {
    fn from(a: Account) -> Self {
        Self(*a.as_bytes())
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short: String = self.0[..4].iter().map(|b| format!("{:02X}", b)).collect();
        write!(f, "Link({}…)", short)
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode_upper(self.0))
    }
}
