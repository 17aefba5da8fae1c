//! The keva ledger: validates blocks against persisted account state and
//! applies them transactionally.

pub mod genesis;
pub mod ledger;
pub mod result;

pub use genesis::{Genesis, EPOCH_LINK};
pub use ledger::Ledger;
pub use result::ProcessResult;
