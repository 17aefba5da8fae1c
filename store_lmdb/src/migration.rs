//! Schema versioning and upgrades.
//!
//! The version ladder runs sequentially at startup. Fresh stores are stamped
//! with the current version directly. Historical steps whose source tables
//! never existed in this backend only move the version stamp; the steps that
//! rebuild derived state (representation weights, vote sequences, unchecked,
//! sidebands) do the work for real so a store restored from an older dump
//! converges. The v12→v13 sideband pass is resumable: it runs in bounded
//! batches on a background thread with its progress persisted in `meta`.

use keva_store::meta::VERSION_KEY;
use keva_store::{AccountStore, MetaStore, StoreError};
use keva_types::BlockHash;

use crate::environment::LmdbEnvironment;
use crate::LmdbError;

/// Schema version written by this build.
pub const CURRENT_SCHEMA_VERSION: u64 = 13;

/// Meta key tracking the v12→v13 sideband pass: all zeros except a final 2.
pub const SIDEBAND_PROGRESS_KEY: [u8; 32] = {
    let mut key = [0u8; 32];
    key[31] = 2;
    key
};

/// Blocks rewritten per background write transaction.
pub const SIDEBAND_BATCH: usize = 4096;

/// What `Migrator::run` decided.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MigrationOutcome {
    pub from_version: u64,
    /// True when the caller must drive [`Migrator::sideband_rebuild_step`]
    /// until it reports completion.
    pub background_upgrade: bool,
}

pub struct Migrator;

impl Migrator {
    /// Run the foreground part of the upgrade ladder.
    pub fn run(env: &LmdbEnvironment) -> Result<MigrationOutcome, StoreError> {
        let found = env.version_get()?;
        if found > CURRENT_SCHEMA_VERSION {
            return Err(StoreError::VersionTooNew {
                found,
                supported: CURRENT_SCHEMA_VERSION,
            });
        }

        // A store with no accounts has nothing to upgrade.
        if env.account_count()? == 0 && env.meta_get(&VERSION_KEY)?.is_none() {
            let mut batch = env.write_batch()?;
            batch.version_put(CURRENT_SCHEMA_VERSION)?;
            batch.commit()?;
            return Ok(MigrationOutcome {
                from_version: CURRENT_SCHEMA_VERSION,
                background_upgrade: false,
            });
        }

        let mut version = found;
        while version < 12 {
            let next = version + 1;
            tracing::info!(from = version, to = next, "upgrading ledger schema");
            let mut batch = env.write_batch()?;
            match next {
                5 => Self::rebuild_representation(env, &mut batch)?,
                9 => batch.vote_clear_all()?,
                12 => batch.unchecked_clear()?,
                // The remaining historical steps reshaped tables this
                // backend never carried; only the stamp moves.
                _ => {}
            }
            batch.version_put(next)?;
            batch.commit()?;
            version = next;
        }

        let background_upgrade = version == 12;
        Ok(MigrationOutcome {
            from_version: found,
            background_upgrade,
        })
    }

    /// Recompute the representation table from account heads.
    fn rebuild_representation(
        env: &LmdbEnvironment,
        batch: &mut crate::WriteBatch<'_>,
    ) -> Result<(), StoreError> {
        for (_, info) in env.accounts_iter()? {
            if let Some(rep_block) = batch.block_get(&info.rep_block)? {
                let representative = rep_block.block.representative();
                if !representative.is_zero() {
                    batch.representation_add(&representative, info.balance)?;
                }
            }
        }
        Ok(())
    }

    /// One bounded batch of the v12→v13 sideband pass. Walks every account
    /// chain forward, rewriting each block's successor pointer, resuming
    /// from the persisted cursor. Returns `true` when the pass is complete
    /// and the version stamp has moved to 13.
    pub fn sideband_rebuild_step(env: &LmdbEnvironment) -> Result<bool, StoreError> {
        // Cursor: the hash of the next block to process, or absent to start.
        let cursor = match env.meta_get(&SIDEBAND_PROGRESS_KEY)? {
            Some(bytes) if bytes.len() == 32 => {
                let arr: [u8; 32] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| StoreError::Corrupt("sideband cursor".into()))?;
                Some(BlockHash::new(arr))
            }
            Some(_) => return Err(StoreError::Corrupt("sideband cursor size".into())),
            None => None,
        };

        let accounts = env.accounts_iter()?;
        let mut batch = env.write_batch()?;
        let mut processed = 0usize;

        // Resume: skip accounts whose chains were finished in earlier steps.
        let mut resumed = cursor.is_none();
        for (_, info) in &accounts {
            let mut hash = info.open_block;
            if !resumed {
                if Some(info.open_block) == cursor {
                    resumed = true;
                } else {
                    continue;
                }
            }
            while !hash.is_zero() {
                if processed >= SIDEBAND_BATCH {
                    // Persist the cursor at an account boundary-independent
                    // point: the open block we were working through.
                    batch.meta_put(&SIDEBAND_PROGRESS_KEY, info.open_block.as_bytes())?;
                    batch.commit()?;
                    return Ok(false);
                }
                let stored = batch
                    .block_get(&hash)?
                    .ok_or_else(|| StoreError::Corrupt("chain gap during upgrade".into()))?;
                let previous = stored.block.previous();
                if !previous.is_zero() {
                    batch.block_successor_set(&previous, hash)?;
                }
                hash = stored.sideband.successor;
                processed += 1;
            }
        }

        batch.meta_del(&SIDEBAND_PROGRESS_KEY)?;
        batch.version_put(CURRENT_SCHEMA_VERSION)?;
        batch.commit()?;
        tracing::info!("sideband upgrade complete");
        Ok(true)
    }
}
