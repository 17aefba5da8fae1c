//! Node-to-node wire messages.
//!
//! Every message carries an 8-byte header (magic, version triple, type,
//! extensions bitset) followed by a type-specific body. Serialization is
//! hand-rolled: these exact bytes cross the network and some of them are
//! hashed and signed, so layout is part of the protocol.

pub mod header;
pub mod message;
pub mod parser;

pub use header::{MessageHeader, MessageType, HEADER_SIZE, QUERY_FLAG, RESPONSE_FLAG};
pub use message::{
    BulkPull, BulkPullAccount, ConfirmAck, ConfirmReq, ConfirmReqPayload, FrontierReq, Keepalive,
    Message, NodeIdHandshake, PendingAddressFlag, KEEPALIVE_PEERS, MAX_CONFIRM_REQ_ROOTS,
};
pub use parser::{MessageParser, ParseStatus, MAX_SAFE_UDP_MESSAGE_SIZE};
