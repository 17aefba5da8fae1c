//! Write batching — one LMDB write transaction wrapping every mutation a
//! block (or a batch of blocks) makes, so commits are atomic per block.
//!
//! The batch also exposes read accessors that go through its own
//! transaction: when several blocks are processed in one batch, later blocks
//! must see the uncommitted writes of earlier ones. Dropping the batch
//! without calling [`WriteBatch::commit`] aborts the transaction.

use heed::RwTxn;

use keva_blocks::BlockType;
use keva_store::{
    AccountInfo, BlockSideband, Epoch, PendingInfo, PendingKey, StoreError, StoredBlock,
    StoredVote, UncheckedInfo,
};
use keva_types::{Account, Amount, BlockHash};

use crate::environment::LmdbEnvironment;
use crate::LmdbError;

pub struct WriteBatch<'a> {
    txn: RwTxn<'a>,
    env: &'a LmdbEnvironment,
}

impl<'a> WriteBatch<'a> {
    pub(crate) fn new(env: &'a LmdbEnvironment) -> Result<Self, StoreError> {
        let txn = env.env().write_txn().map_err(LmdbError::from)?;
        Ok(Self { txn, env })
    }

    // ── Blocks ──────────────────────────────────────────────────────────

    /// Store a block with its sideband. `epoch` routes state blocks to the
    /// right partition; legacy kinds have fixed tables.
    pub fn block_put(
        &mut self,
        hash: &BlockHash,
        stored: &StoredBlock,
        epoch: Epoch,
    ) -> Result<(), StoreError> {
        let db = match (stored.block.block_type(), epoch) {
            (BlockType::State, Epoch::Epoch0) => self.env.state_blocks_v0_db,
            (BlockType::State, Epoch::Epoch1) => self.env.state_blocks_v1_db,
            (BlockType::Send, _) => self.env.send_blocks_db,
            (BlockType::Receive, _) => self.env.receive_blocks_db,
            (BlockType::Open, _) => self.env.open_blocks_db,
            (BlockType::Change, _) => self.env.change_blocks_db,
            (BlockType::Invalid | BlockType::NotABlock, _) => {
                return Err(StoreError::Corrupt("unstorable block type".into()))
            }
        };
        db.put(&mut self.txn, hash.as_bytes(), &stored.to_bytes())
            .map_err(LmdbError::from)?;
        Ok(())
    }

    pub fn block_get(&self, hash: &BlockHash) -> Result<Option<StoredBlock>, StoreError> {
        for db in self.env.block_tables() {
            if let Some(bytes) = db.get(&self.txn, hash.as_bytes()).map_err(LmdbError::from)? {
                return StoredBlock::from_bytes(bytes).map(Some);
            }
        }
        Ok(None)
    }

    pub fn block_exists(&self, hash: &BlockHash) -> Result<bool, StoreError> {
        Ok(self.block_get(hash)?.is_some())
    }

    pub fn block_del(&mut self, hash: &BlockHash) -> Result<(), StoreError> {
        for db in self.env.block_tables() {
            if db
                .delete(&mut self.txn, hash.as_bytes())
                .map_err(LmdbError::from)?
            {
                return Ok(());
            }
        }
        Ok(())
    }

    /// Rewrite a stored block's sideband successor pointer in place.
    pub fn block_successor_set(
        &mut self,
        hash: &BlockHash,
        successor: BlockHash,
    ) -> Result<(), StoreError> {
        for db in self.env.block_tables() {
            let found = db
                .get(&self.txn, hash.as_bytes())
                .map_err(LmdbError::from)?
                .map(StoredBlock::from_bytes)
                .transpose()?;
            if let Some(mut stored) = found {
                stored.sideband.successor = successor;
                db.put(&mut self.txn, hash.as_bytes(), &stored.to_bytes())
                    .map_err(LmdbError::from)?;
                return Ok(());
            }
        }
        Err(StoreError::NotFound)
    }

    // ── Frontiers ───────────────────────────────────────────────────────

    pub fn frontier_put(&mut self, hash: &BlockHash, account: &Account) -> Result<(), StoreError> {
        self.env
            .frontiers_db
            .put(&mut self.txn, hash.as_bytes(), account.as_bytes())
            .map_err(LmdbError::from)?;
        Ok(())
    }

    pub fn frontier_del(&mut self, hash: &BlockHash) -> Result<(), StoreError> {
        self.env
            .frontiers_db
            .delete(&mut self.txn, hash.as_bytes())
            .map_err(LmdbError::from)?;
        Ok(())
    }

    pub fn frontier_get(&self, hash: &BlockHash) -> Result<Option<Account>, StoreError> {
        let found = self
            .env
            .frontiers_db
            .get(&self.txn, hash.as_bytes())
            .map_err(LmdbError::from)?;
        Ok(found.and_then(|bytes| {
            let arr: [u8; 32] = bytes.try_into().ok()?;
            Some(Account::from_bytes(arr))
        }))
    }

    // ── Accounts ────────────────────────────────────────────────────────

    /// Store account info in the partition named by `info.epoch`, clearing
    /// any stale record in the other partition (epoch upgrades move rows).
    pub fn account_put(&mut self, account: &Account, info: &AccountInfo) -> Result<(), StoreError> {
        let (target, other) = match info.epoch {
            Epoch::Epoch0 => (self.env.accounts_v0_db, self.env.accounts_v1_db),
            Epoch::Epoch1 => (self.env.accounts_v1_db, self.env.accounts_v0_db),
        };
        other
            .delete(&mut self.txn, account.as_bytes())
            .map_err(LmdbError::from)?;
        target
            .put(&mut self.txn, account.as_bytes(), &info.to_bytes())
            .map_err(LmdbError::from)?;
        Ok(())
    }

    pub fn account_get(&self, account: &Account) -> Result<Option<AccountInfo>, StoreError> {
        for db in [self.env.accounts_v1_db, self.env.accounts_v0_db] {
            if let Some(bytes) = db
                .get(&self.txn, account.as_bytes())
                .map_err(LmdbError::from)?
            {
                return AccountInfo::from_bytes(bytes).map(Some);
            }
        }
        Ok(None)
    }

    pub fn account_del(&mut self, account: &Account) -> Result<(), StoreError> {
        for db in [self.env.accounts_v1_db, self.env.accounts_v0_db] {
            db.delete(&mut self.txn, account.as_bytes())
                .map_err(LmdbError::from)?;
        }
        Ok(())
    }

    // ── Pending ─────────────────────────────────────────────────────────

    pub fn pending_put(&mut self, key: &PendingKey, info: &PendingInfo) -> Result<(), StoreError> {
        let db = match info.epoch {
            Epoch::Epoch0 => self.env.pending_v0_db,
            Epoch::Epoch1 => self.env.pending_v1_db,
        };
        db.put(&mut self.txn, &key.to_bytes(), &info.to_bytes())
            .map_err(LmdbError::from)?;
        Ok(())
    }

    pub fn pending_get(&self, key: &PendingKey) -> Result<Option<PendingInfo>, StoreError> {
        for db in [self.env.pending_v1_db, self.env.pending_v0_db] {
            if let Some(bytes) = db.get(&self.txn, &key.to_bytes()).map_err(LmdbError::from)? {
                return PendingInfo::from_bytes(bytes).map(Some);
            }
        }
        Ok(None)
    }

    pub fn pending_del(&mut self, key: &PendingKey) -> Result<(), StoreError> {
        for db in [self.env.pending_v1_db, self.env.pending_v0_db] {
            db.delete(&mut self.txn, &key.to_bytes())
                .map_err(LmdbError::from)?;
        }
        Ok(())
    }

    // ── Representation ──────────────────────────────────────────────────

    pub fn representation_get(&self, account: &Account) -> Result<Amount, StoreError> {
        let found = self
            .env
            .representation_db
            .get(&self.txn, account.as_bytes())
            .map_err(LmdbError::from)?;
        Ok(match found {
            Some(bytes) => {
                let arr: [u8; 16] = bytes
                    .try_into()
                    .map_err(|_| StoreError::Corrupt("weight record size".into()))?;
                Amount::from_be_bytes(arr)
            }
            None => Amount::ZERO,
        })
    }

    /// Additive weight update. Deltas wrap modulo 2^128, matching the
    /// unsigned arithmetic the weight invariant is stated in; a zero result
    /// removes the row.
    pub fn representation_add(
        &mut self,
        account: &Account,
        delta: Amount,
    ) -> Result<(), StoreError> {
        let current = self.representation_get(account)?;
        let updated = Amount::new(current.raw().wrapping_add(delta.raw()));
        if updated.is_zero() {
            self.env
                .representation_db
                .delete(&mut self.txn, account.as_bytes())
                .map_err(LmdbError::from)?;
        } else {
            self.env
                .representation_db
                .put(&mut self.txn, account.as_bytes(), &updated.to_be_bytes())
                .map_err(LmdbError::from)?;
        }
        Ok(())
    }

    /// Subtractive weight update, the inverse of [`Self::representation_add`].
    pub fn representation_sub(
        &mut self,
        account: &Account,
        delta: Amount,
    ) -> Result<(), StoreError> {
        self.representation_add(account, Amount::new(delta.raw().wrapping_neg()))
    }

    // ── Unchecked ───────────────────────────────────────────────────────

    fn unchecked_key(dependency: &BlockHash, hash: &BlockHash) -> [u8; 64] {
        let mut key = [0u8; 64];
        key[..32].copy_from_slice(dependency.as_bytes());
        key[32..].copy_from_slice(hash.as_bytes());
        key
    }

    pub fn unchecked_put(
        &mut self,
        dependency: &BlockHash,
        hash: &BlockHash,
        info: &UncheckedInfo,
    ) -> Result<(), StoreError> {
        let key = Self::unchecked_key(dependency, hash);
        self.env
            .unchecked_db
            .put(&mut self.txn, &key, &info.to_bytes())
            .map_err(LmdbError::from)?;
        Ok(())
    }

    pub fn unchecked_del(
        &mut self,
        dependency: &BlockHash,
        hash: &BlockHash,
    ) -> Result<(), StoreError> {
        let key = Self::unchecked_key(dependency, hash);
        self.env
            .unchecked_db
            .delete(&mut self.txn, &key)
            .map_err(LmdbError::from)?;
        Ok(())
    }

    /// Remove and return every block waiting on `dependency`.
    pub fn unchecked_drain(
        &mut self,
        dependency: &BlockHash,
    ) -> Result<Vec<UncheckedInfo>, StoreError> {
        let mut keys = Vec::new();
        let mut infos = Vec::new();
        {
            let iter = self
                .env
                .unchecked_db
                .prefix_iter(&self.txn, dependency.as_bytes())
                .map_err(LmdbError::from)?;
            for entry in iter {
                let (key, value) = entry.map_err(LmdbError::from)?;
                keys.push(key.to_vec());
                infos.push(UncheckedInfo::from_bytes(value)?);
            }
        }
        for key in keys {
            self.env
                .unchecked_db
                .delete(&mut self.txn, &key)
                .map_err(LmdbError::from)?;
        }
        Ok(infos)
    }

    pub fn unchecked_clear(&mut self) -> Result<(), StoreError> {
        self.env
            .unchecked_db
            .clear(&mut self.txn)
            .map_err(LmdbError::from)?;
        Ok(())
    }

    // ── Votes ───────────────────────────────────────────────────────────

    pub fn vote_put(&mut self, account: &Account, vote: &StoredVote) -> Result<(), StoreError> {
        self.env
            .vote_db
            .put(&mut self.txn, account.as_bytes(), &vote.to_bytes())
            .map_err(LmdbError::from)?;
        Ok(())
    }

    /// Drop every stored vote record (used by the schema upgrade that
    /// invalidated historical sequence numbers).
    pub fn vote_clear_all(&mut self) -> Result<(), StoreError> {
        self.env
            .vote_db
            .clear(&mut self.txn)
            .map_err(LmdbError::from)?;
        Ok(())
    }

    pub fn vote_get(&self, account: &Account) -> Result<Option<StoredVote>, StoreError> {
        let found = self
            .env
            .vote_db
            .get(&self.txn, account.as_bytes())
            .map_err(LmdbError::from)?;
        found.map(StoredVote::from_bytes).transpose()
    }

    // ── Online weight ───────────────────────────────────────────────────

    pub fn online_weight_put(&mut self, timestamp: u64, amount: Amount) -> Result<(), StoreError> {
        self.env
            .online_weight_db
            .put(
                &mut self.txn,
                &timestamp.to_be_bytes(),
                &amount.to_be_bytes(),
            )
            .map_err(LmdbError::from)?;
        Ok(())
    }

    /// Trim the sample table to the newest `keep` rows.
    pub fn online_weight_prune(&mut self, keep: usize) -> Result<(), StoreError> {
        let mut keys: Vec<Vec<u8>> = Vec::new();
        {
            let iter = self
                .env
                .online_weight_db
                .iter(&self.txn)
                .map_err(LmdbError::from)?;
            for entry in iter {
                let (key, _) = entry.map_err(LmdbError::from)?;
                keys.push(key.to_vec());
            }
        }
        if keys.len() > keep {
            let excess = keys.len() - keep;
            for key in keys.into_iter().take(excess) {
                self.env
                    .online_weight_db
                    .delete(&mut self.txn, &key)
                    .map_err(LmdbError::from)?;
            }
        }
        Ok(())
    }

    // ── Peers ───────────────────────────────────────────────────────────

    pub fn peer_put(&mut self, endpoint: &std::net::SocketAddrV6) -> Result<(), StoreError> {
        let key = keva_store::peer::endpoint_key(endpoint);
        self.env
            .peers_db
            .put(&mut self.txn, &key, &[])
            .map_err(LmdbError::from)?;
        Ok(())
    }

    pub fn peer_del(&mut self, endpoint: &std::net::SocketAddrV6) -> Result<(), StoreError> {
        let key = keva_store::peer::endpoint_key(endpoint);
        self.env
            .peers_db
            .delete(&mut self.txn, &key)
            .map_err(LmdbError::from)?;
        Ok(())
    }

    pub fn peers_clear(&mut self) -> Result<(), StoreError> {
        self.env
            .peers_db
            .clear(&mut self.txn)
            .map_err(LmdbError::from)?;
        Ok(())
    }

    // ── Meta ────────────────────────────────────────────────────────────

    pub fn meta_put(&mut self, key: &[u8; 32], value: &[u8]) -> Result<(), StoreError> {
        self.env
            .meta_db
            .put(&mut self.txn, key, value)
            .map_err(LmdbError::from)?;
        Ok(())
    }

    pub fn meta_del(&mut self, key: &[u8; 32]) -> Result<(), StoreError> {
        self.env
            .meta_db
            .delete(&mut self.txn, key)
            .map_err(LmdbError::from)?;
        Ok(())
    }

    pub fn version_put(&mut self, version: u64) -> Result<(), StoreError> {
        let mut value = [0u8; 32];
        value[24..].copy_from_slice(&version.to_be_bytes());
        self.meta_put(&keva_store::meta::VERSION_KEY, &value)
    }

    // ── Commit ──────────────────────────────────────────────────────────

    /// Commit all batched operations; the only fsync in the batch.
    pub fn commit(self) -> Result<(), StoreError> {
        self.txn.commit().map_err(LmdbError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LmdbEnvironment;
    use keva_blocks::{Block, StateBlock};
    use keva_store::{AccountStore, BlockStore};
    use keva_types::{Link, Signature};

    fn temp_env() -> (tempfile::TempDir, LmdbEnvironment) {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let env = LmdbEnvironment::open(dir.path(), 32 * 1024 * 1024).expect("failed to open env");
        (dir, env)
    }

    fn sample_stored(previous: BlockHash, height: u64) -> StoredBlock {
        let block = Block::State(StateBlock {
            account: Account::from_bytes([1; 32]),
            previous,
            representative: Account::from_bytes([2; 32]),
            balance: Amount::new(100),
            link: Link::ZERO,
            signature: Signature([3; 64]),
            work: 4,
        });
        StoredBlock {
            sideband: BlockSideband {
                successor: BlockHash::ZERO,
                account: block.account(),
                balance: Amount::new(100),
                height,
                timestamp: 1000,
            },
            block,
        }
    }

    #[test]
    fn block_put_get_roundtrip() {
        let (_dir, env) = temp_env();
        let stored = sample_stored(BlockHash::ZERO, 1);
        let hash = stored.block.hash();

        let mut batch = env.write_batch().unwrap();
        batch.block_put(&hash, &stored, Epoch::Epoch0).unwrap();
        batch.commit().unwrap();

        assert_eq!(env.block_get(&hash).unwrap(), Some(stored));
        assert!(env.block_exists(&hash).unwrap());
    }

    #[test]
    fn dropped_batch_does_not_persist() {
        let (_dir, env) = temp_env();
        let stored = sample_stored(BlockHash::ZERO, 1);
        let hash = stored.block.hash();
        {
            let mut batch = env.write_batch().unwrap();
            batch.block_put(&hash, &stored, Epoch::Epoch0).unwrap();
            // dropped here — implicit abort
        }
        assert!(!env.block_exists(&hash).unwrap());
    }

    #[test]
    fn reads_see_uncommitted_writes_in_same_batch() {
        let (_dir, env) = temp_env();
        let stored = sample_stored(BlockHash::ZERO, 1);
        let hash = stored.block.hash();

        let mut batch = env.write_batch().unwrap();
        batch.block_put(&hash, &stored, Epoch::Epoch0).unwrap();
        assert!(batch.block_exists(&hash).unwrap());
        drop(batch);
    }

    #[test]
    fn successor_set_rewrites_sideband() {
        let (_dir, env) = temp_env();
        let stored = sample_stored(BlockHash::ZERO, 1);
        let hash = stored.block.hash();
        let successor = BlockHash::new([0xEE; 32]);

        let mut batch = env.write_batch().unwrap();
        batch.block_put(&hash, &stored, Epoch::Epoch0).unwrap();
        batch.block_successor_set(&hash, successor).unwrap();
        batch.commit().unwrap();

        assert_eq!(env.block_get(&hash).unwrap().unwrap().sideband.successor, successor);
    }

    #[test]
    fn account_partitions_move_on_epoch_change() {
        let (_dir, env) = temp_env();
        let account = Account::from_bytes([7; 32]);
        let mut info = AccountInfo {
            head: BlockHash::new([1; 32]),
            rep_block: BlockHash::new([1; 32]),
            open_block: BlockHash::new([1; 32]),
            balance: Amount::new(5),
            modified: 0,
            block_count: 1,
            epoch: Epoch::Epoch0,
        };

        let mut batch = env.write_batch().unwrap();
        batch.account_put(&account, &info).unwrap();
        batch.commit().unwrap();

        info.epoch = Epoch::Epoch1;
        let mut batch = env.write_batch().unwrap();
        batch.account_put(&account, &info).unwrap();
        batch.commit().unwrap();

        // The read path must find exactly the v1 record.
        let found = env.account_get(&account).unwrap().unwrap();
        assert_eq!(found.epoch, Epoch::Epoch1);
        let rtxn = env.read_txn().unwrap();
        assert!(env
            .accounts_v0_db
            .get(&rtxn, account.as_bytes())
            .unwrap()
            .is_none());
    }

    #[test]
    fn pending_lifecycle() {
        let (_dir, env) = temp_env();
        let key = PendingKey::new(Account::from_bytes([1; 32]), BlockHash::new([2; 32]));
        let info = PendingInfo {
            source: Account::from_bytes([3; 32]),
            amount: Amount::new(9),
            epoch: Epoch::Epoch0,
        };

        let mut batch = env.write_batch().unwrap();
        batch.pending_put(&key, &info).unwrap();
        assert_eq!(batch.pending_get(&key).unwrap(), Some(info.clone()));
        batch.pending_del(&key).unwrap();
        assert_eq!(batch.pending_get(&key).unwrap(), None);
        batch.commit().unwrap();
    }

    #[test]
    fn representation_add_and_sub() {
        let (_dir, env) = temp_env();
        let rep = Account::from_bytes([4; 32]);

        let mut batch = env.write_batch().unwrap();
        batch.representation_add(&rep, Amount::new(100)).unwrap();
        batch.representation_add(&rep, Amount::new(50)).unwrap();
        assert_eq!(batch.representation_get(&rep).unwrap(), Amount::new(150));
        batch.representation_sub(&rep, Amount::new(150)).unwrap();
        assert_eq!(batch.representation_get(&rep).unwrap(), Amount::ZERO);
        batch.commit().unwrap();
    }

    #[test]
    fn unchecked_drain_returns_all_dependents() {
        let (_dir, env) = temp_env();
        let dependency = BlockHash::new([0xAA; 32]);
        let mut batch = env.write_batch().unwrap();
        for i in 0..3u8 {
            let stored = sample_stored(BlockHash::new([i; 32]), 1);
            let info = UncheckedInfo::new(
                &stored.block,
                Account::ZERO,
                100,
                keva_store::SignatureVerification::Unknown,
            );
            batch
                .unchecked_put(&dependency, &stored.block.hash(), &info)
                .unwrap();
        }
        let drained = batch.unchecked_drain(&dependency).unwrap();
        assert_eq!(drained.len(), 3);
        assert!(batch.unchecked_drain(&dependency).unwrap().is_empty());
        batch.commit().unwrap();
    }

    #[test]
    fn online_weight_prune_keeps_newest() {
        let (_dir, env) = temp_env();
        let mut batch = env.write_batch().unwrap();
        for ts in 0..10u64 {
            batch.online_weight_put(ts, Amount::new(ts as u128)).unwrap();
        }
        batch.online_weight_prune(3).unwrap();
        batch.commit().unwrap();

        use keva_store::OnlineWeightStore;
        let samples = env.online_weight_iter().unwrap();
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].0, 7);
        assert_eq!(samples[2].0, 9);
    }

    #[test]
    fn version_round_trip() {
        let (_dir, env) = temp_env();
        let mut batch = env.write_batch().unwrap();
        batch.version_put(13).unwrap();
        batch.commit().unwrap();

        use keva_store::MetaStore;
        assert_eq!(env.version_get().unwrap(), 13);
    }
}
