//! Strict datagram parsing.
//!
//! Every inbound UDP datagram runs through [`MessageParser::parse`], which
//! enforces the size cap, magic, network, version floor, and proof-of-work
//! on any inlined block before the message reaches dispatch. Failures are
//! classified so counters and peer scoring can tell abuse from damage.

use std::fmt;

use keva_types::{Network, PROTOCOL_VERSION_MIN};
use keva_work::work_valid;

use crate::header::{MessageHeader, MessageType};
use crate::message::{ConfirmReqPayload, Message};

/// IPv6 guarantees delivery of 1280-byte datagrams; after IP and UDP
/// headers, 508 bytes of payload is the floor every path can carry.
pub const MAX_SAFE_UDP_MESSAGE_SIZE: usize = 508;

/// Why a datagram was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseStatus {
    Success,
    InsufficientWork,
    InvalidHeader,
    InvalidMessageType,
    InvalidKeepaliveMessage,
    InvalidPublishMessage,
    InvalidConfirmReqMessage,
    InvalidConfirmAckMessage,
    InvalidNodeIdHandshakeMessage,
    InvalidNetwork,
    InvalidMagic,
    OutdatedVersion,
    MessageSizeTooBig,
}

impl fmt::Display for ParseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "success",
            Self::InsufficientWork => "insufficient_work",
            Self::InvalidHeader => "invalid_header",
            Self::InvalidMessageType => "invalid_message_type",
            Self::InvalidKeepaliveMessage => "invalid_keepalive_message",
            Self::InvalidPublishMessage => "invalid_publish_message",
            Self::InvalidConfirmReqMessage => "invalid_confirm_req_message",
            Self::InvalidConfirmAckMessage => "invalid_confirm_ack_message",
            Self::InvalidNodeIdHandshakeMessage => "invalid_node_id_handshake_message",
            Self::InvalidNetwork => "invalid_network",
            Self::InvalidMagic => "invalid_magic",
            Self::OutdatedVersion => "outdated_version",
            Self::MessageSizeTooBig => "message_size_too_big",
        };
        write!(f, "{}", name)
    }
}

pub struct MessageParser {
    network: Network,
    work_threshold: u64,
}

impl MessageParser {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            work_threshold: network.publish_threshold(),
        }
    }

    /// Parse one datagram. Only the UDP message set is accepted here; the
    /// bootstrap messages arrive over TCP and are decoded by the bootstrap
    /// server directly.
    pub fn parse(&self, bytes: &[u8]) -> Result<Message, ParseStatus> {
        if bytes.len() > MAX_SAFE_UDP_MESSAGE_SIZE {
            return Err(ParseStatus::MessageSizeTooBig);
        }
        let (raw, body) = MessageHeader::deserialize(bytes).ok_or(ParseStatus::InvalidHeader)?;
        if !raw.valid_magic() {
            return Err(ParseStatus::InvalidMagic);
        }
        if !raw.valid_network(self.network) {
            return Err(ParseStatus::InvalidNetwork);
        }
        if raw.version_using < PROTOCOL_VERSION_MIN {
            return Err(ParseStatus::OutdatedVersion);
        }
        let header = raw
            .into_header(self.network)
            .ok_or(ParseStatus::InvalidMessageType)?;

        let failure = match header.message_type {
            MessageType::Keepalive => ParseStatus::InvalidKeepaliveMessage,
            MessageType::Publish => ParseStatus::InvalidPublishMessage,
            MessageType::ConfirmReq => ParseStatus::InvalidConfirmReqMessage,
            MessageType::ConfirmAck => ParseStatus::InvalidConfirmAckMessage,
            MessageType::NodeIdHandshake => ParseStatus::InvalidNodeIdHandshakeMessage,
            // TCP-only messages are not valid datagrams.
            MessageType::BulkPull
            | MessageType::BulkPush
            | MessageType::FrontierReq
            | MessageType::BulkPullAccount => return Err(ParseStatus::InvalidMessageType),
        };

        let message = Message::deserialize_body(&header, body).ok_or(failure)?;
        self.check_work(&message)?;
        Ok(message)
    }

    /// Inlined blocks must clear the publish threshold before anything else
    /// touches them; a flood of bogus blocks costs the sender work.
    fn check_work(&self, message: &Message) -> Result<(), ParseStatus> {
        let block = match message {
            Message::Publish(block) => Some(block),
            Message::ConfirmReq(req) => match &req.payload {
                ConfirmReqPayload::Block(block) => Some(block),
                ConfirmReqPayload::Roots(_) => None,
            },
            Message::ConfirmAck(ack) => match &ack.vote.payload {
                keva_blocks::VotePayload::Block(block) => Some(block),
                keva_blocks::VotePayload::Hashes(_) => None,
            },
            _ => None,
        };
        if let Some(block) = block {
            if !work_valid(&block.root(), block.work(), self.work_threshold) {
                return Err(ParseStatus::InsufficientWork);
            }
        }
        Ok(())
    }
}
