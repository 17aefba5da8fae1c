//! Per-network genesis constants.
//!
//! Each network has its own genesis open block holding the entire supply.
//! The test network's key is derived from a published seed so tests and dev
//! tooling can sign for it; live and beta carry only the public constants.

use std::sync::Arc;

use keva_blocks::{Block, OpenBlock};
use keva_crypto::{keypair_from_seed, sign_message};
use keva_types::{Account, Amount, KeyPair, Link, Network, Signature};

/// Published seed of the test-network genesis key.
pub const TEST_GENESIS_SEED: [u8; 32] = [
    0xDE, 0xAD, 0xC0, 0xDE, 0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A,
    0x0B, 0x0C, 0x0D, 0x0E, 0x0F, 0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19,
    0x1A, 0x1B,
];

/// Live-network genesis account (public key hex).
const LIVE_GENESIS_ACCOUNT: &str =
    "991CF190094C00F0B68E2E5F75F6BEE95A2E0BD93CEAA4A6734DB9F19B728948";
/// Live-network genesis open block signature.
const LIVE_GENESIS_SIGNATURE: &str =
    "9F0C933C8ADE004D808EA1985FA746A7E95BA2A38F867640F53EC8F180BDFE9E2C1268DEAD7C2664F356E37ABA362BC58E46DBA03E523A7B5A19E4B6EB12BB02";
/// Live-network genesis work nonce.
const LIVE_GENESIS_WORK: u64 = 0x62F0_5417_DD3F_B691;

/// Beta-network genesis account (public key hex).
const BETA_GENESIS_ACCOUNT: &str =
    "A59A47CC4F593E75AE9AD653FDA9358E2F7898D9ACC8C60E80D0495CE20FBA9F";
/// Beta-network genesis open block signature.
const BETA_GENESIS_SIGNATURE: &str =
    "A726490E3325E4FA59C1C900D5B6EEBB15FE13D99F49D475B93F0AACC5635929A0614CF3892764A04D1C6732A0D716FFEB254D4154C6F544D11E6630F201450B";
/// Beta-network genesis work nonce.
const BETA_GENESIS_WORK: u64 = 0x000D_E353_FE03_F439;

/// The epoch-1 marker link: ASCII "epoch v1 block" left-aligned, zero
/// padded. A state block with this link is an epoch upgrade, not a
/// transfer.
pub const EPOCH_LINK: Link = {
    let mut bytes = [0u8; 32];
    let text = *b"epoch v1 block";
    let mut i = 0;
    while i < text.len() {
        bytes[i] = text[i];
        i += 1;
    }
    Link(bytes)
};

/// The genesis block, its account, and the epoch signer for one network.
pub struct Genesis {
    pub block: Arc<Block>,
    pub account: Account,
    /// Accounts upgrade epochs only with this signer's signature.
    pub epoch_signer: Account,
    /// Present on the test network only.
    pub keys: Option<KeyPair>,
}

impl Genesis {
    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Test => {
                let keys = keypair_from_seed(&TEST_GENESIS_SEED);
                let account = keys.account();
                let mut open = OpenBlock {
                    source: keva_types::BlockHash::new(*account.as_bytes()),
                    representative: account,
                    account,
                    signature: Signature::ZERO,
                    work: 0,
                };
                open.signature = sign_message(&keys.private, &keys.public, &open.hash());
                // Work is attached lazily by callers that publish the block;
                // the stored genesis does not revalidate its own work.
                Self {
                    block: Arc::new(Block::Open(open)),
                    account,
                    epoch_signer: account,
                    keys: Some(keys),
                }
            }
            Network::Live => Self::from_constants(
                LIVE_GENESIS_ACCOUNT,
                LIVE_GENESIS_SIGNATURE,
                LIVE_GENESIS_WORK,
            ),
            Network::Beta => Self::from_constants(
                BETA_GENESIS_ACCOUNT,
                BETA_GENESIS_SIGNATURE,
                BETA_GENESIS_WORK,
            ),
        }
    }

    fn from_constants(account_hex: &str, signature_hex: &str, work: u64) -> Self {
        let account =
            Account::decode_hex(account_hex).expect("genesis account constant is valid hex");
        let signature =
            Signature::decode_hex(signature_hex).expect("genesis signature constant is valid hex");
        let open = OpenBlock {
            source: keva_types::BlockHash::new(*account.as_bytes()),
            representative: account,
            account,
            signature,
            work,
        };
        Self {
            block: Arc::new(Block::Open(open)),
            account,
            epoch_signer: account,
            keys: None,
        }
    }

    /// The entire supply, assigned to the genesis account at initialization.
    pub fn amount() -> Amount {
        Amount::MAX
    }
}
