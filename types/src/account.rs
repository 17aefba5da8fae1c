//! Account identifiers and their string encoding.
//!
//! An account is an Ed25519 public key. The text form is
//! `keva_` + 52 base32 characters (a 4-bit zero pad followed by the 256-bit
//! key) + 8 base32 characters of checksum. The checksum is the 5-byte
//! BLAKE2b-40 digest of the public key, byte-reversed before encoding.
//! Base32 alphabet: `13456789abcdefghijkmnopqrstuwxyz` (avoids visually
//! ambiguous 0/O, 2/Z, l/I, v).

use blake2::digest::{Update, VariableOutput};
use blake2::Blake2bVar;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix for all keva account strings.
pub const ACCOUNT_PREFIX: &str = "keva_";

/// Base32 alphabet (32 chars).
const BASE32_ALPHABET: &[u8; 32] = b"13456789abcdefghijkmnopqrstuwxyz";

/// Reverse lookup table: ASCII byte → 5-bit value (0xFF = invalid).
const BASE32_DECODE: [u8; 128] = {
    let mut table = [0xFFu8; 128];
    let alpha = BASE32_ALPHABET;
    let mut i = 0;
    while i < 32 {
        table[alpha[i] as usize] = i as u8;
        i += 1;
    }
    table
};

/// Number of base32 characters for the public key (4 pad bits + 256 bits = 260 / 5).
const PUBKEY_CHARS: usize = 52;
/// Number of base32 characters for the checksum (40 bits / 5).
const CHECKSUM_CHARS: usize = 8;

/// A 32-byte account identifier (Ed25519 public key).
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Account(pub [u8; 32]);

impl Account {
    /// The sentinel burn account (public key zero). Opening it is forbidden.
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Parse from 64 hex characters (the raw public key form).
    pub fn decode_hex(s: &str) -> Option<Self> {
        if s.len() != 64 {
            return None;
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes).ok()?;
        Some(Self(bytes))
    }

    pub fn encode_hex(&self) -> String {
        hex::encode_upper(self.0)
    }

    /// Render the `keva_…` text form.
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(ACCOUNT_PREFIX.len() + PUBKEY_CHARS + CHECKSUM_CHARS);
        out.push_str(ACCOUNT_PREFIX);
        out.push_str(&encode_base32(&self.0, 4));
        let mut check = account_checksum(&self.0);
        check.reverse();
        out.push_str(&encode_base32(&check, 0));
        out
    }

    /// Parse the `keva_…` text form, verifying length, alphabet, pad bits,
    /// and checksum.
    pub fn decode(s: &str) -> Option<Self> {
        let encoded = s.strip_prefix(ACCOUNT_PREFIX)?;
        if encoded.len() != PUBKEY_CHARS + CHECKSUM_CHARS {
            return None;
        }
        let key: [u8; 32] = decode_base32_fixed(&encoded[..PUBKEY_CHARS], 4)?;
        let mut check: [u8; 5] = decode_base32_fixed(&encoded[PUBKEY_CHARS..], 0)?;
        check.reverse();
        if check != account_checksum(&key) {
            return None;
        }
        Some(Self(key))
    }
}

/// BLAKE2b-40 digest of a public key.
fn account_checksum(key: &[u8; 32]) -> [u8; 5] {
    let mut hasher = Blake2bVar::new(5).expect("5 is a valid blake2b output size");
    hasher.update(key);
    let mut out = [0u8; 5];
    hasher
        .finalize_variable(&mut out)
        .expect("output buffer sized to digest");
    out
}

/// Encode bytes as base32, MSB first, with `pad_bits` zero bits prepended.
/// `pad_bits + len * 8` must be a multiple of 5.
fn encode_base32(bytes: &[u8], pad_bits: usize) -> String {
    let total_bits = pad_bits + bytes.len() * 8;
    debug_assert_eq!(total_bits % 5, 0);
    let mut out = String::with_capacity(total_bits / 5);
    let mut buffer: u64 = 0;
    let mut bits = pad_bits;
    for &byte in bytes {
        buffer = (buffer << 8) | byte as u64;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(BASE32_ALPHABET[((buffer >> bits) & 0x1F) as usize] as char);
        }
    }
    out
}

/// Decode a base32 string into exactly `N` bytes, skipping `pad_bits` leading
/// zero bits. Returns `None` on invalid characters, nonzero pad, or length
/// mismatch.
fn decode_base32_fixed<const N: usize>(s: &str, pad_bits: usize) -> Option<[u8; N]> {
    let mut buffer: u64 = 0;
    let mut bits = 0usize;
    let mut out = [0u8; N];
    let mut pos = 0;

    for (i, c) in s.bytes().enumerate() {
        if c >= 128 {
            return None;
        }
        let val = BASE32_DECODE[c as usize];
        if val == 0xFF {
            return None;
        }
        if i == 0 && pad_bits > 0 {
            // The pad bits occupy the top of the first character.
            if (val >> (5 - pad_bits)) != 0 {
                return None;
            }
            buffer = val as u64;
            bits = 5 - pad_bits;
            continue;
        }
        buffer = (buffer << 5) | val as u64;
        bits += 5;
        while bits >= 8 {
            bits -= 8;
            if pos == N {
                return None;
            }
            out[pos] = (buffer >> bits) as u8;
            pos += 1;
        }
    }

    if pos != N || bits != 0 {
        return None;
    }
    Some(out)
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short: String = self.0[..4].iter().map(|b| format!("{:02X}", b)).collect();
        write!(f, "Account({}…)", short)
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_shape() {
        let a = Account::from_bytes([0u8; 32]);
        let s = a.encode();
        assert!(s.starts_with("keva_"));
        assert_eq!(s.len(), ACCOUNT_PREFIX.len() + 60);
    }

    #[test]
    fn roundtrip() {
        let a = Account::from_bytes([0x5A; 32]);
        let s = a.encode();
        assert_eq!(Account::decode(&s), Some(a));
    }

    #[test]
    fn roundtrip_varied_keys() {
        for seed in 0u8..16 {
            let mut bytes = [0u8; 32];
            for (i, b) in bytes.iter_mut().enumerate() {
                *b = seed.wrapping_mul(31).wrapping_add(i as u8);
            }
            let a = Account::from_bytes(bytes);
            assert_eq!(Account::decode(&a.encode()), Some(a));
        }
    }

    #[test]
    fn corrupted_checksum_rejected() {
        let a = Account::from_bytes([0x11; 32]);
        let mut s = a.encode();
        let last = s.pop().unwrap();
        s.push(if last == '1' { '3' } else { '1' });
        assert_eq!(Account::decode(&s), None);
    }

    #[test]
    fn wrong_prefix_rejected() {
        let a = Account::from_bytes([0x22; 32]);
        let s = a.encode().replacen("keva_", "nano_", 1);
        assert_eq!(Account::decode(&s), None);
    }

    #[test]
    fn wrong_length_rejected() {
        assert_eq!(Account::decode("keva_short"), None);
        assert_eq!(Account::decode("keva_"), None);
    }

    #[test]
    fn invalid_characters_rejected() {
        let a = Account::from_bytes([0x33; 32]);
        let s = a.encode().replacen('1', "0", 1);
        // '0' is not in the alphabet; either the pad check or the alphabet
        // check rejects the string.
        if s != a.encode() {
            assert_eq!(Account::decode(&s), None);
        }
    }

    #[test]
    fn hex_roundtrip() {
        let a = Account::from_bytes([0x44; 32]);
        assert_eq!(Account::decode_hex(&a.encode_hex()), Some(a));
    }

    #[test]
    fn first_char_pad_bits_enforced() {
        // The first encoded character carries only one significant bit, so it
        // must be '1' (0) or '3' (1).
        let a = Account::from_bytes([0xFF; 32]);
        let s = a.encode();
        let first = s.as_bytes()[ACCOUNT_PREFIX.len()] as char;
        assert!(first == '1' || first == '3');
    }
}
