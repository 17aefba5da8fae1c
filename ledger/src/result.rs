//! Outcome taxonomy for block processing.

use std::fmt;

/// Result of validating and applying one block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessResult {
    /// Accepted and committed.
    Progress,
    /// Ed25519/BLAKE2b verification failed.
    BadSignature,
    /// Proof-of-work below the publish threshold.
    InsufficientWork,
    /// Already in the store.
    Old,
    /// A send that would take the balance below zero, or a state send whose
    /// delta disagrees with its balances.
    NegativeSpend,
    /// A different block already occupies this (account, previous) slot.
    Fork,
    /// Receive/open referencing a send that does not exist or was consumed.
    Unreceivable,
    /// Predecessor unknown.
    GapPrevious,
    /// Source send unknown.
    GapSource,
    /// Attempt to open the burn account.
    OpenedBurnAccount,
    /// Receive delta disagrees with the pending entry.
    BalanceMismatch,
    /// Representative change not permitted for this epoch transition.
    RepresentativeMismatch,
    /// Successor kind not allowed after the predecessor kind.
    BlockPosition,
}

impl ProcessResult {
    /// Gaps are retryable once the missing dependency arrives.
    pub fn is_gap(&self) -> bool {
        matches!(self, Self::GapPrevious | Self::GapSource)
    }
}

impl fmt::Display for ProcessResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Progress => "progress",
            Self::BadSignature => "bad_signature",
            Self::InsufficientWork => "insufficient_work",
            Self::Old => "old",
            Self::NegativeSpend => "negative_spend",
            Self::Fork => "fork",
            Self::Unreceivable => "unreceivable",
            Self::GapPrevious => "gap_previous",
            Self::GapSource => "gap_source",
            Self::OpenedBurnAccount => "opened_burn_account",
            Self::BalanceMismatch => "balance_mismatch",
            Self::RepresentativeMismatch => "representative_mismatch",
            Self::BlockPosition => "block_position",
        };
        write!(f, "{}", name)
    }
}
