//! Key and signature types.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use zeroize::Zeroize;

use crate::Account;

/// A 32-byte Ed25519 public key. Identical in representation to [`Account`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey(pub [u8; 32]);

impl PublicKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn as_account(&self) -> Account {
        Account::from_bytes(self.0)
    }
}

impl From<Account> for PublicKey {
    fn from(a: Account) -> Self {
        Self(*a.as_bytes())
    }
}

/// A 32-byte Ed25519 secret key.
///
/// Does not implement `Debug`, `Display`, or `Serialize`; the bytes are
/// wiped on drop.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct PrivateKey(pub [u8; 32]);

impl PrivateKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// A 64-byte Ed25519 signature.
#[derive(Clone, Copy)]
pub struct Signature(pub [u8; 64]);

impl Signature {
    pub const ZERO: Self = Self([0u8; 64]);

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    pub fn decode_hex(s: &str) -> Option<Self> {
        if s.len() != 128 {
            return None;
        }
        let mut bytes = [0u8; 64];
        hex::decode_to_slice(s, &mut bytes).ok()?;
        Some(Self(bytes))
    }

    pub fn encode_hex(&self) -> String {
        hex::encode_upper(self.0)
    }
}

impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        self.0[..] == other.0[..]
    }
}

impl Eq for Signature {}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short: String = self.0[..4].iter().map(|b| format!("{:02X}", b)).collect();
        write!(f, "Signature({}…)", short)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode_hex())
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes: Vec<u8> = Deserialize::deserialize(deserializer)?;
        let arr: [u8; 64] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected exactly 64 bytes for Signature"))?;
        Ok(Signature(arr))
    }
}

/// An Ed25519 key pair. Construction lives in `keva-crypto`.
pub struct KeyPair {
    pub public: PublicKey,
    pub private: PrivateKey,
}

impl KeyPair {
    pub fn account(&self) -> Account {
        self.public.as_account()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_hex_roundtrip() {
        let sig = Signature([0x7E; 64]);
        assert_eq!(Signature::decode_hex(&sig.encode_hex()), Some(sig));
    }

    #[test]
    fn signature_equality_is_bytewise() {
        assert_eq!(Signature([1; 64]), Signature([1; 64]));
        assert_ne!(Signature([1; 64]), Signature([2; 64]));
    }

    #[test]
    fn public_key_account_conversion() {
        let pk = PublicKey([0xAA; 32]);
        assert_eq!(pk.as_account().as_bytes(), pk.as_bytes());
    }
}
