//! Canonical JSON forms of the block kinds.
//!
//! Keys match the historical wallet format. Two quirks are preserved:
//! legacy send `balance` is 32 uppercase hex digits while state `balance`
//! is decimal, and a state block's `link` is accepted in either hex or
//! account form and emitted as both `link` and `link_as_account`.

use serde_json::{json, Map, Value};

use keva_types::{Account, Amount, BlockHash, Link, Signature, Work};

use crate::block::{Block, ChangeBlock, OpenBlock, ReceiveBlock, SendBlock, StateBlock};

fn work_to_json(work: Work) -> Value {
    Value::String(format!("{:016x}", work))
}

fn get_str<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key)?.as_str()
}

fn parse_work(obj: &Map<String, Value>) -> Option<Work> {
    let s = get_str(obj, "work")?;
    if s.len() != 16 {
        return None;
    }
    u64::from_str_radix(s, 16).ok()
}

fn parse_hash(obj: &Map<String, Value>, key: &str) -> Option<BlockHash> {
    BlockHash::decode_hex(get_str(obj, key)?)
}

fn parse_account(obj: &Map<String, Value>, key: &str) -> Option<Account> {
    Account::decode(get_str(obj, key)?)
}

fn parse_signature(obj: &Map<String, Value>) -> Option<Signature> {
    Signature::decode_hex(get_str(obj, "signature")?)
}

/// A state block's link parses as 64 hex digits or as an account string.
fn parse_link(obj: &Map<String, Value>) -> Option<Link> {
    let s = get_str(obj, "link")?;
    if let Some(hash) = BlockHash::decode_hex(s) {
        return Some(Link::from(hash));
    }
    Account::decode(s).map(Link::from)
}

impl Block {
    pub fn to_json(&self) -> Value {
        match self {
            Block::Send(b) => json!({
                "type": "send",
                "previous": b.previous.encode_hex(),
                "destination": b.destination.encode(),
                "balance": b.balance.encode_hex(),
                "work": work_to_json(b.work),
                "signature": b.signature.encode_hex(),
            }),
            Block::Receive(b) => json!({
                "type": "receive",
                "previous": b.previous.encode_hex(),
                "source": b.source.encode_hex(),
                "work": work_to_json(b.work),
                "signature": b.signature.encode_hex(),
            }),
            Block::Open(b) => json!({
                "type": "open",
                "source": b.source.encode_hex(),
                "representative": b.representative.encode(),
                "account": b.account.encode(),
                "work": work_to_json(b.work),
                "signature": b.signature.encode_hex(),
            }),
            Block::Change(b) => json!({
                "type": "change",
                "previous": b.previous.encode_hex(),
                "representative": b.representative.encode(),
                "work": work_to_json(b.work),
                "signature": b.signature.encode_hex(),
            }),
            Block::State(b) => json!({
                "type": "state",
                "account": b.account.encode(),
                "previous": b.previous.encode_hex(),
                "representative": b.representative.encode(),
                "balance": b.balance.to_string(),
                "link": BlockHash::new(*b.link.as_bytes()).encode_hex(),
                "link_as_account": b.link.as_account().encode(),
                "work": work_to_json(b.work),
                "signature": b.signature.encode_hex(),
            }),
        }
    }

    pub fn from_json(value: &Value) -> Option<Block> {
        let obj = value.as_object()?;
        match get_str(obj, "type")? {
            "send" => Some(Block::Send(SendBlock {
                previous: parse_hash(obj, "previous")?,
                destination: parse_account(obj, "destination")?,
                balance: Amount::decode_hex(get_str(obj, "balance")?)?,
                signature: parse_signature(obj)?,
                work: parse_work(obj)?,
            })),
            "receive" => Some(Block::Receive(ReceiveBlock {
                previous: parse_hash(obj, "previous")?,
                source: parse_hash(obj, "source")?,
                signature: parse_signature(obj)?,
                work: parse_work(obj)?,
            })),
            "open" => Some(Block::Open(OpenBlock {
                source: parse_hash(obj, "source")?,
                representative: parse_account(obj, "representative")?,
                account: parse_account(obj, "account")?,
                signature: parse_signature(obj)?,
                work: parse_work(obj)?,
            })),
            "change" => Some(Block::Change(ChangeBlock {
                previous: parse_hash(obj, "previous")?,
                representative: parse_account(obj, "representative")?,
                signature: parse_signature(obj)?,
                work: parse_work(obj)?,
            })),
            "state" => Some(Block::State(StateBlock {
                account: parse_account(obj, "account")?,
                previous: parse_hash(obj, "previous")?,
                representative: parse_account(obj, "representative")?,
                balance: Amount::decode_dec(get_str(obj, "balance")?)?,
                link: parse_link(obj)?,
                signature: parse_signature(obj)?,
                work: parse_work(obj)?,
            })),
            _ => None,
        }
    }
}
