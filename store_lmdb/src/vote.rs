//! Read-side vote replay-protection queries.

use keva_store::{StoreError, StoredVote, VoteStore};
use keva_types::Account;

use crate::environment::LmdbEnvironment;
use crate::LmdbError;

impl VoteStore for LmdbEnvironment {
    fn vote_get(&self, account: &Account) -> Result<Option<StoredVote>, StoreError> {
        let rtxn = self.read_txn()?;
        let found = self
            .vote_db
            .get(&rtxn, account.as_bytes())
            .map_err(LmdbError::from)?;
        found.map(StoredVote::from_bytes).transpose()
    }

    fn vote_max(&self, account: &Account, sequence: u64) -> Result<u64, StoreError> {
        Ok(match self.vote_get(account)? {
            Some(stored) => stored.sequence.max(sequence),
            None => sequence,
        })
    }
}
