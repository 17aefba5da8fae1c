//! Abstract storage contract for the keva ledger.
//!
//! Record types and read-side traits live here; `keva-store-lmdb` provides
//! the LMDB-backed implementation together with the write batch that makes
//! each block's mutations atomic. The rest of the workspace depends on these
//! traits wherever a concrete environment handle is not required.

pub mod account;
pub mod block;
pub mod error;
pub mod frontier;
pub mod meta;
pub mod online_weight;
pub mod peer;
pub mod pending;
pub mod rep_weights;
pub mod unchecked;
pub mod vote;

pub use account::{AccountInfo, AccountStore, Epoch};
pub use block::{BlockSideband, BlockStore, StoredBlock};
pub use error::StoreError;
pub use frontier::FrontierStore;
pub use meta::MetaStore;
pub use online_weight::OnlineWeightStore;
pub use peer::PeerStore;
pub use pending::{PendingInfo, PendingKey, PendingStore};
pub use rep_weights::RepWeightStore;
pub use unchecked::{SignatureVerification, UncheckedInfo, UncheckedStore};
pub use vote::{StoredVote, VoteStore};
