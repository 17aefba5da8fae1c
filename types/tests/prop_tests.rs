//! Property tests for the scalar codecs.

use keva_types::{Account, Amount, BlockHash, Signature};
use proptest::prelude::*;

proptest! {
    #[test]
    fn block_hash_hex_roundtrip(bytes in prop::array::uniform32(any::<u8>())) {
        let h = BlockHash::new(bytes);
        prop_assert_eq!(BlockHash::decode_hex(&h.encode_hex()), Some(h));
    }

    #[test]
    fn account_encode_roundtrip(bytes in prop::array::uniform32(any::<u8>())) {
        let a = Account::from_bytes(bytes);
        let s = a.encode();
        prop_assert_eq!(s.len(), 65);
        prop_assert_eq!(Account::decode(&s), Some(a));
    }

    #[test]
    fn account_single_char_corruption_detected(
        bytes in prop::array::uniform32(any::<u8>()),
        pos in 5usize..65,
    ) {
        let a = Account::from_bytes(bytes);
        let s = a.encode();
        let original = s.as_bytes()[pos] as char;
        let replacement = if original == 'x' { 'y' } else { 'x' };
        let mut corrupted = s.clone();
        corrupted.replace_range(pos..pos + 1, &replacement.to_string());
        if corrupted != s {
            // Either the alphabet check or the checksum rejects it; it must
            // never decode to the same account bytes.
            prop_assert_ne!(Account::decode(&corrupted), Some(a));
        }
    }

    #[test]
    fn amount_be_roundtrip(raw in any::<u128>()) {
        let a = Amount::new(raw);
        prop_assert_eq!(Amount::from_be_bytes(a.to_be_bytes()), a);
    }

    #[test]
    fn amount_hex_roundtrip(raw in any::<u128>()) {
        let a = Amount::new(raw);
        prop_assert_eq!(Amount::decode_hex(&a.encode_hex()), Some(a));
    }

    #[test]
    fn signature_hex_roundtrip(head in prop::array::uniform32(any::<u8>()),
                               tail in prop::array::uniform32(any::<u8>())) {
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(&head);
        bytes[32..].copy_from_slice(&tail);
        let s = Signature(bytes);
        prop_assert_eq!(Signature::decode_hex(&s.encode_hex()), Some(s));
    }
}
