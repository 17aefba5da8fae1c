//! LMDB environment: one `heed::Env` plus every named table handle.

use std::path::Path;

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions, RoTxn};

use crate::{LmdbError, WriteBatch};
use keva_store::StoreError;

type Db = Database<Bytes, Bytes>;

/// The unified LMDB store. Table handles are created once at open and are
/// cheap to copy; the environment itself is reference-counted by `heed`.
pub struct LmdbEnvironment {
    env: Env,

    // Ledger tables.
    pub(crate) frontiers_db: Db,
    pub(crate) accounts_v0_db: Db,
    pub(crate) accounts_v1_db: Db,
    pub(crate) send_blocks_db: Db,
    pub(crate) receive_blocks_db: Db,
    pub(crate) open_blocks_db: Db,
    pub(crate) change_blocks_db: Db,
    pub(crate) state_blocks_v0_db: Db,
    pub(crate) state_blocks_v1_db: Db,
    pub(crate) pending_v0_db: Db,
    pub(crate) pending_v1_db: Db,
    pub(crate) representation_db: Db,
    pub(crate) unchecked_db: Db,
    pub(crate) vote_db: Db,
    pub(crate) online_weight_db: Db,
    pub(crate) peers_db: Db,
    pub(crate) meta_db: Db,
}

/// Number of named databases; the environment must be opened with room for
/// all of them.
pub const MAX_DBS: u32 = 17;

impl LmdbEnvironment {
    /// Open or create the environment at `path` with the given map size.
    pub fn open(path: &Path, map_size: usize) -> Result<Self, StoreError> {
        std::fs::create_dir_all(path)
            .map_err(|e| StoreError::Backend(format!("create data dir: {e}")))?;

        // Safety: the environment directory is only opened once per process;
        // the daemon guards this with its startup sequence.
        let env = unsafe {
            EnvOpenOptions::new()
                .max_dbs(MAX_DBS)
                .map_size(map_size)
                .open(path)
                .map_err(LmdbError::from)?
        };

        let mut wtxn = env.write_txn().map_err(LmdbError::from)?;
        let mut open_db = |name: &str| -> Result<Db, LmdbError> {
            Ok(env.create_database(&mut wtxn, Some(name))?)
        };

        let frontiers_db = open_db("frontiers")?;
        let accounts_v0_db = open_db("accounts")?;
        let accounts_v1_db = open_db("accounts_v1")?;
        let send_blocks_db = open_db("send")?;
        let receive_blocks_db = open_db("receive")?;
        let open_blocks_db = open_db("open")?;
        let change_blocks_db = open_db("change")?;
        let state_blocks_v0_db = open_db("state")?;
        let state_blocks_v1_db = open_db("state_v1")?;
        let pending_v0_db = open_db("pending")?;
        let pending_v1_db = open_db("pending_v1")?;
        let representation_db = open_db("representation")?;
        let unchecked_db = open_db("unchecked")?;
        let vote_db = open_db("vote")?;
        let online_weight_db = open_db("online_weight")?;
        let peers_db = open_db("peers")?;
        let meta_db = open_db("meta")?;
        wtxn.commit().map_err(LmdbError::from)?;

        Ok(Self {
            env,
            frontiers_db,
            accounts_v0_db,
            accounts_v1_db,
            send_blocks_db,
            receive_blocks_db,
            open_blocks_db,
            change_blocks_db,
            state_blocks_v0_db,
            state_blocks_v1_db,
            pending_v0_db,
            pending_v1_db,
            representation_db,
            unchecked_db,
            vote_db,
            online_weight_db,
            peers_db,
            meta_db,
        })
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    /// Begin a read transaction (snapshot of the last commit).
    pub fn read_txn(&self) -> Result<RoTxn<'_>, StoreError> {
        Ok(self.env.read_txn().map_err(LmdbError::from)?)
    }

    /// Begin a write batch. Only one writer exists at a time; LMDB blocks
    /// until the previous writer commits or aborts.
    pub fn write_batch(&self) -> Result<WriteBatch<'_>, StoreError> {
        WriteBatch::new(self)
    }

    /// The six block tables in lookup order; the epoch-1 state table comes
    /// first since current chains land there.
    pub(crate) fn block_tables(&self) -> [Db; 6] {
        [
            self.state_blocks_v1_db,
            self.state_blocks_v0_db,
            self.send_blocks_db,
            self.receive_blocks_db,
            self.open_blocks_db,
            self.change_blocks_db,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_directory_and_tables() {
        let dir = tempfile::tempdir().expect("tempdir");
        let env = LmdbEnvironment::open(&dir.path().join("ledger"), 16 * 1024 * 1024)
            .expect("open environment");
        let rtxn = env.read_txn().expect("read txn");
        assert_eq!(env.frontiers_db.len(&rtxn).unwrap(), 0);
        assert_eq!(env.meta_db.len(&rtxn).unwrap(), 0);
    }

    #[test]
    fn reopen_preserves_data() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ledger");
        {
            let env = LmdbEnvironment::open(&path, 16 * 1024 * 1024).unwrap();
            let mut batch = env.write_batch().unwrap();
            batch.meta_put(&[9u8; 32], b"value").unwrap();
            batch.commit().unwrap();
        }
        let env = LmdbEnvironment::open(&path, 16 * 1024 * 1024).unwrap();
        let rtxn = env.read_txn().unwrap();
        let value = env.meta_db.get(&rtxn, &[9u8; 32]).unwrap();
        assert_eq!(value, Some(&b"value"[..]));
    }
}
