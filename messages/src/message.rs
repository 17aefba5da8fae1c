//! Message bodies and their binary forms.

use std::net::{Ipv6Addr, SocketAddrV6};
use std::sync::Arc;

use keva_blocks::{Block, BlockType, Vote};
use keva_types::{Account, Amount, BlockHash, Network, Root, Signature};

use crate::header::{MessageHeader, MessageType, QUERY_FLAG, RESPONSE_FLAG};

/// Keepalive carries exactly eight peer slots; unused slots are zero.
pub const KEEPALIVE_PEERS: usize = 8;

/// Upper bound on (hash, root) pairs in one confirm_req.
pub const MAX_CONFIRM_REQ_ROOTS: usize = 32;

/// Peer-list announcement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Keepalive {
    pub peers: [SocketAddrV6; KEEPALIVE_PEERS],
}

impl Default for Keepalive {
    fn default() -> Self {
        Self {
            peers: [SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, 0, 0, 0); KEEPALIVE_PEERS],
        }
    }
}

/// What a confirm_req asks about: one inlined block, or bare (hash, root)
/// pairs when the recipient is expected to have the blocks already.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfirmReqPayload {
    Block(Arc<Block>),
    Roots(Vec<(BlockHash, Root)>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfirmReq {
    pub payload: ConfirmReqPayload,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfirmAck {
    pub vote: Arc<Vote>,
}

/// Bootstrap chain-slice request: stream blocks from `end` (exclusive) up
/// to the head named by `start` (an account or a block hash).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BulkPull {
    pub start: Root,
    pub end: BlockHash,
    /// Optional cap on streamed blocks (count-present flag).
    pub count: Option<u32>,
}

/// Pending-entry filter for bulk_pull_account.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PendingAddressFlag {
    PendingHashAndAmount = 0,
    PendingAddressOnly = 1,
    PendingHashAmountAndAddress = 2,
}

impl PendingAddressFlag {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::PendingHashAndAmount),
            1 => Some(Self::PendingAddressOnly),
            2 => Some(Self::PendingHashAmountAndAddress),
            _ => None,
        }
    }
}

/// Bootstrap receivable-funds request for one account.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BulkPullAccount {
    pub account: Account,
    pub minimum_amount: Amount,
    pub flags: PendingAddressFlag,
}

/// Bootstrap frontier walk: stream (account, head) pairs for accounts at or
/// after `start`, modified within `age` seconds, at most `count` of them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrontierReq {
    pub start: Account,
    pub age: u32,
    pub count: u32,
}

/// Identity exchange: a query carries a fresh 32-byte cookie; the response
/// proves key ownership by signing the peer's cookie.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeIdHandshake {
    pub query: Option<[u8; 32]>,
    pub response: Option<(Account, Signature)>,
}

/// Any wire message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    Keepalive(Keepalive),
    Publish(Arc<Block>),
    ConfirmReq(ConfirmReq),
    ConfirmAck(ConfirmAck),
    BulkPull(BulkPull),
    BulkPush,
    FrontierReq(FrontierReq),
    NodeIdHandshake(NodeIdHandshake),
    BulkPullAccount(BulkPullAccount),
}

fn put_endpoint(out: &mut Vec<u8>, endpoint: &SocketAddrV6) {
    out.extend_from_slice(&endpoint.ip().octets());
    out.extend_from_slice(&endpoint.port().to_le_bytes());
}

fn get_endpoint(bytes: &[u8]) -> Option<SocketAddrV6> {
    if bytes.len() < 18 {
        return None;
    }
    let octets: [u8; 16] = bytes[..16].try_into().ok()?;
    let port = u16::from_le_bytes(bytes[16..18].try_into().ok()?);
    Some(SocketAddrV6::new(octets.into(), port, 0, 0))
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Keepalive(_) => MessageType::Keepalive,
            Self::Publish(_) => MessageType::Publish,
            Self::ConfirmReq(_) => MessageType::ConfirmReq,
            Self::ConfirmAck(_) => MessageType::ConfirmAck,
            Self::BulkPull(_) => MessageType::BulkPull,
            Self::BulkPush => MessageType::BulkPush,
            Self::FrontierReq(_) => MessageType::FrontierReq,
            Self::NodeIdHandshake(_) => MessageType::NodeIdHandshake,
            Self::BulkPullAccount(_) => MessageType::BulkPullAccount,
        }
    }

    /// Full wire form: header + body.
    pub fn serialize(&self, network: Network) -> Vec<u8> {
        let mut header = MessageHeader::new(network, self.message_type());
        match self {
            Self::Publish(block) => header.set_block_type(block.block_type()),
            Self::ConfirmReq(req) => match &req.payload {
                ConfirmReqPayload::Block(block) => header.set_block_type(block.block_type()),
                ConfirmReqPayload::Roots(_) => header.set_block_type(BlockType::NotABlock),
            },
            Self::ConfirmAck(ack) => header.set_block_type(ack.vote.header_block_type()),
            Self::BulkPull(pull) => header.set_flag(QUERY_FLAG, pull.count.is_some()),
            Self::NodeIdHandshake(hs) => {
                header.set_flag(QUERY_FLAG, hs.query.is_some());
                header.set_flag(RESPONSE_FLAG, hs.response.is_some());
            }
            _ => {}
        }

        let mut out = Vec::new();
        header.serialize(&mut out);
        match self {
            Self::Keepalive(keepalive) => {
                for peer in &keepalive.peers {
                    put_endpoint(&mut out, peer);
                }
            }
            Self::Publish(block) => block.serialize(&mut out),
            Self::ConfirmReq(req) => match &req.payload {
                ConfirmReqPayload::Block(block) => block.serialize(&mut out),
                ConfirmReqPayload::Roots(roots) => {
                    out.push(roots.len() as u8);
                    for (hash, root) in roots {
                        out.extend_from_slice(hash.as_bytes());
                        out.extend_from_slice(root.as_bytes());
                    }
                }
            },
            Self::ConfirmAck(ack) => ack.vote.serialize(&mut out),
            Self::BulkPull(pull) => {
                out.extend_from_slice(pull.start.as_bytes());
                out.extend_from_slice(pull.end.as_bytes());
                if let Some(count) = pull.count {
                    // Extended parameters: one zero byte, count LE, padding.
                    out.push(0);
                    out.extend_from_slice(&count.to_le_bytes());
                    out.extend_from_slice(&[0u8; 3]);
                }
            }
            Self::BulkPush => {}
            Self::FrontierReq(req) => {
                out.extend_from_slice(req.start.as_bytes());
                out.extend_from_slice(&req.age.to_le_bytes());
                out.extend_from_slice(&req.count.to_le_bytes());
            }
            Self::NodeIdHandshake(hs) => {
                if let Some(cookie) = &hs.query {
                    out.extend_from_slice(cookie);
                }
                if let Some((account, signature)) = &hs.response {
                    out.extend_from_slice(account.as_bytes());
                    out.extend_from_slice(signature.as_bytes());
                }
            }
            Self::BulkPullAccount(req) => {
                out.extend_from_slice(req.account.as_bytes());
                out.extend_from_slice(&req.minimum_amount.to_be_bytes());
                out.push(req.flags as u8);
            }
        }
        out
    }

    /// Decode a body of the kind named in `header`. The body must be
    /// consumed exactly; trailing bytes fail the decode.
    pub fn deserialize_body(header: &MessageHeader, body: &[u8]) -> Option<Message> {
        match header.message_type {
            MessageType::Keepalive => {
                if body.len() != KEEPALIVE_PEERS * 18 {
                    return None;
                }
                let mut keepalive = Keepalive::default();
                for (i, chunk) in body.chunks_exact(18).enumerate() {
                    keepalive.peers[i] = get_endpoint(chunk)?;
                }
                Some(Message::Keepalive(keepalive))
            }
            MessageType::Publish => {
                let block = Block::deserialize(header.block_type(), body)?;
                Some(Message::Publish(Arc::new(block)))
            }
            MessageType::ConfirmReq => {
                if header.block_type() == BlockType::NotABlock {
                    let count = *body.first()? as usize;
                    if count == 0 || count > MAX_CONFIRM_REQ_ROOTS {
                        return None;
                    }
                    let rest = &body[1..];
                    if rest.len() != count * 64 {
                        return None;
                    }
                    let mut roots = Vec::with_capacity(count);
                    for chunk in rest.chunks_exact(64) {
                        let hash = BlockHash::new(chunk[..32].try_into().ok()?);
                        let root = Root(chunk[32..].try_into().ok()?);
                        roots.push((hash, root));
                    }
                    Some(Message::ConfirmReq(ConfirmReq {
                        payload: ConfirmReqPayload::Roots(roots),
                    }))
                } else {
                    let block = Block::deserialize(header.block_type(), body)?;
                    Some(Message::ConfirmReq(ConfirmReq {
                        payload: ConfirmReqPayload::Block(Arc::new(block)),
                    }))
                }
            }
            MessageType::ConfirmAck => {
                let vote = Vote::deserialize(header.block_type(), body)?;
                Some(Message::ConfirmAck(ConfirmAck {
                    vote: Arc::new(vote),
                }))
            }
            MessageType::BulkPull => {
                let with_count = header.flag(QUERY_FLAG);
                let expected = if with_count { 72 } else { 64 };
                if body.len() != expected {
                    return None;
                }
                let start = Root(body[..32].try_into().ok()?);
                let end = BlockHash::new(body[32..64].try_into().ok()?);
                let count = if with_count {
                    if body[64] != 0 {
                        return None;
                    }
                    Some(u32::from_le_bytes(body[65..69].try_into().ok()?))
                } else {
                    None
                };
                Some(Message::BulkPull(BulkPull { start, end, count }))
            }
            MessageType::BulkPush => {
                if !body.is_empty() {
                    return None;
                }
                Some(Message::BulkPush)
            }
            MessageType::FrontierReq => {
                if body.len() != 40 {
                    return None;
                }
                Some(Message::FrontierReq(FrontierReq {
                    start: Account::from_bytes(body[..32].try_into().ok()?),
                    age: u32::from_le_bytes(body[32..36].try_into().ok()?),
                    count: u32::from_le_bytes(body[36..40].try_into().ok()?),
                }))
            }
            MessageType::NodeIdHandshake => {
                let mut offset = 0;
                let query = if header.flag(QUERY_FLAG) {
                    let cookie: [u8; 32] = body.get(..32)?.try_into().ok()?;
                    offset += 32;
                    Some(cookie)
                } else {
                    None
                };
                let response = if header.flag(RESPONSE_FLAG) {
                    let slice = body.get(offset..offset + 96)?;
                    let account = Account::from_bytes(slice[..32].try_into().ok()?);
                    let signature = Signature(slice[32..].try_into().ok()?);
                    offset += 96;
                    Some((account, signature))
                } else {
                    None
                };
                if offset != body.len() || (query.is_none() && response.is_none()) {
                    return None;
                }
                Some(Message::NodeIdHandshake(NodeIdHandshake { query, response }))
            }
            MessageType::BulkPullAccount => {
                if body.len() != 49 {
                    return None;
                }
                Some(Message::BulkPullAccount(BulkPullAccount {
                    account: Account::from_bytes(body[..32].try_into().ok()?),
                    minimum_amount: Amount::from_be_bytes(body[32..48].try_into().ok()?),
                    flags: PendingAddressFlag::from_u8(body[48])?,
                }))
            }
        }
    }
}
