//! The 8-byte message header.

use keva_blocks::BlockType;
use keva_types::{Network, PROTOCOL_VERSION, PROTOCOL_VERSION_MIN};

/// Serialized header size.
pub const HEADER_SIZE: usize = 8;

/// First magic byte, shared by every network.
pub const MAGIC_PREFIX: u8 = b'X';

/// One-byte message type codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Keepalive = 0x02,
    Publish = 0x03,
    ConfirmReq = 0x04,
    ConfirmAck = 0x05,
    BulkPull = 0x06,
    BulkPush = 0x07,
    FrontierReq = 0x08,
    NodeIdHandshake = 0x0a,
    BulkPullAccount = 0x0b,
}

impl MessageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x02 => Some(Self::Keepalive),
            0x03 => Some(Self::Publish),
            0x04 => Some(Self::ConfirmReq),
            0x05 => Some(Self::ConfirmAck),
            0x06 => Some(Self::BulkPull),
            0x07 => Some(Self::BulkPush),
            0x08 => Some(Self::FrontierReq),
            0x0a => Some(Self::NodeIdHandshake),
            0x0b => Some(Self::BulkPullAccount),
            _ => None,
        }
    }
}

/// Extensions bitset layout: bits 8–11 carry the block type of any inlined
/// block; the low bits are per-message flags.
const BLOCK_TYPE_SHIFT: u16 = 8;
const BLOCK_TYPE_MASK: u16 = 0x0f00;
/// Handshake request-nonce flag; doubles as bulk_pull's count-present flag.
pub const QUERY_FLAG: u16 = 1 << 0;
/// Handshake response flag.
pub const RESPONSE_FLAG: u16 = 1 << 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageHeader {
    pub network: Network,
    pub version_max: u8,
    pub version_using: u8,
    pub version_min: u8,
    pub message_type: MessageType,
    pub extensions: u16,
}

impl MessageHeader {
    pub fn new(network: Network, message_type: MessageType) -> Self {
        Self {
            network,
            version_max: PROTOCOL_VERSION,
            version_using: PROTOCOL_VERSION,
            version_min: PROTOCOL_VERSION_MIN,
            message_type,
            extensions: 0,
        }
    }

    pub fn block_type(&self) -> BlockType {
        let code = ((self.extensions & BLOCK_TYPE_MASK) >> BLOCK_TYPE_SHIFT) as u8;
        BlockType::from_u8(code).unwrap_or(BlockType::Invalid)
    }

    pub fn set_block_type(&mut self, block_type: BlockType) {
        self.extensions = (self.extensions & !BLOCK_TYPE_MASK)
            | (((block_type as u8) as u16) << BLOCK_TYPE_SHIFT);
    }

    pub fn flag(&self, flag: u16) -> bool {
        self.extensions & flag != 0
    }

    pub fn set_flag(&mut self, flag: u16, value: bool) {
        if value {
            self.extensions |= flag;
        } else {
            self.extensions &= !flag;
        }
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        out.push(MAGIC_PREFIX);
        out.push(self.network.magic_letter());
        out.push(self.version_max);
        out.push(self.version_using);
        out.push(self.version_min);
        out.push(self.message_type as u8);
        out.extend_from_slice(&self.extensions.to_le_bytes());
    }

    /// Raw header fields, before magic/network/version policy is applied by
    /// the parser. `None` only for short input or an unknown type code.
    pub fn deserialize(bytes: &[u8]) -> Option<(RawHeader, &[u8])> {
        if bytes.len() < HEADER_SIZE {
            return None;
        }
        let raw = RawHeader {
            magic: [bytes[0], bytes[1]],
            version_max: bytes[2],
            version_using: bytes[3],
            version_min: bytes[4],
            message_type: bytes[5],
            extensions: u16::from_le_bytes([bytes[6], bytes[7]]),
        };
        Some((raw, &bytes[HEADER_SIZE..]))
    }
}

/// Header bytes as read from the wire, before validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawHeader {
    pub magic: [u8; 2],
    pub version_max: u8,
    pub version_using: u8,
    pub version_min: u8,
    pub message_type: u8,
    pub extensions: u16,
}

impl RawHeader {
    /// Structurally plausible magic: 'X' followed by any known network
    /// letter.
    pub fn valid_magic(&self) -> bool {
        self.magic[0] == MAGIC_PREFIX
            && [
                Network::Live.magic_letter(),
                Network::Beta.magic_letter(),
                Network::Test.magic_letter(),
            ]
            .contains(&self.magic[1])
    }

    /// Whether the magic names `network` specifically.
    pub fn valid_network(&self, network: Network) -> bool {
        self.magic[1] == network.magic_letter()
    }

    pub fn into_header(self, network: Network) -> Option<MessageHeader> {
        Some(MessageHeader {
            network,
            version_max: self.version_max,
            version_using: self.version_using,
            version_min: self.version_min,
            message_type: MessageType::from_u8(self.message_type)?,
            extensions: self.extensions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let mut header = MessageHeader::new(Network::Test, MessageType::Publish);
        header.set_block_type(BlockType::State);
        header.set_flag(QUERY_FLAG, true);

        let mut bytes = Vec::new();
        header.serialize(&mut bytes);
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(bytes[0], b'X');
        assert_eq!(bytes[1], b'T');

        let (raw, rest) = MessageHeader::deserialize(&bytes).unwrap();
        assert!(rest.is_empty());
        assert!(raw.valid_magic());
        assert!(raw.valid_network(Network::Test));
        assert!(!raw.valid_network(Network::Live));
        let parsed = raw.into_header(Network::Test).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.block_type(), BlockType::State);
        assert!(parsed.flag(QUERY_FLAG));
        assert!(!parsed.flag(RESPONSE_FLAG));
    }

    #[test]
    fn bad_magic_detected() {
        let mut bytes = Vec::new();
        MessageHeader::new(Network::Live, MessageType::Keepalive).serialize(&mut bytes);
        bytes[1] = b'A';
        let (raw, _) = MessageHeader::deserialize(&bytes).unwrap();
        assert!(!raw.valid_magic());
    }

    #[test]
    fn short_header_rejected() {
        assert!(MessageHeader::deserialize(&[b'X'; 7]).is_none());
    }

    #[test]
    fn unknown_type_code_rejected() {
        let mut bytes = Vec::new();
        MessageHeader::new(Network::Test, MessageType::Keepalive).serialize(&mut bytes);
        bytes[5] = 0x7F;
        let (raw, _) = MessageHeader::deserialize(&bytes).unwrap();
        assert!(raw.into_header(Network::Test).is_none());
    }

    #[test]
    fn block_type_bits_isolated() {
        let mut header = MessageHeader::new(Network::Test, MessageType::ConfirmAck);
        header.set_flag(QUERY_FLAG, true);
        header.set_block_type(BlockType::NotABlock);
        assert_eq!(header.block_type(), BlockType::NotABlock);
        assert!(header.flag(QUERY_FLAG));
        header.set_block_type(BlockType::Send);
        assert_eq!(header.block_type(), BlockType::Send);
    }
}
