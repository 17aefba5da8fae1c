//! Block-lattice block types for the keva protocol.
//!
//! Five block kinds share a tagged-enum representation with canonical binary
//! and JSON forms. Binary serialization is the exact byte layout that gets
//! hashed and signed, so it is hand-rolled here rather than derived.

pub mod block;
pub mod json;
pub mod uniquer;
pub mod vote;

pub use block::{
    valid_successor, Block, BlockType, BlockVisitor, ChangeBlock, OpenBlock, ReceiveBlock,
    SendBlock, StateBlock,
};
pub use uniquer::BlockUniquer;
pub use vote::{Vote, VotePayload, VoteUniquer, MAX_HASHES_PER_VOTE};
