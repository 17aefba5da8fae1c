//! Block validation and state transitions.
//!
//! `Ledger::process` applies exactly one block inside a caller-supplied
//! write batch; every mutation it makes (block + sideband, account info,
//! pending, representation, frontier) commits or aborts together.
//! `Ledger::rollback` reverses committed blocks from a chain tip back to a
//! named hash, recursively unwinding dependent receives on other chains.

use std::sync::Arc;

use keva_blocks::{
    valid_successor, Block, BlockType, BlockVisitor, ChangeBlock, OpenBlock, ReceiveBlock,
    SendBlock, StateBlock,
};
use keva_crypto::validate_message;
use keva_store::{
    AccountInfo, AccountStore, BlockSideband, BlockStore, Epoch, PendingInfo, PendingKey,
    RepWeightStore, StoreError, StoredBlock,
};
use keva_store_lmdb::{LmdbStore, WriteBatch};
use keva_types::{unix_seconds, Account, Amount, BlockHash, Network, PublicKey};
use keva_work::work_valid;

use crate::genesis::{Genesis, EPOCH_LINK};
use crate::result::ProcessResult;

pub struct Ledger {
    store: Arc<LmdbStore>,
    network: Network,
    genesis: Genesis,
}

impl Ledger {
    pub fn new(store: Arc<LmdbStore>, network: Network) -> Self {
        Self {
            store,
            network,
            genesis: Genesis::for_network(network),
        }
    }

    pub fn store(&self) -> &Arc<LmdbStore> {
        &self.store
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn genesis(&self) -> &Genesis {
        &self.genesis
    }

    pub fn genesis_account(&self) -> Account {
        self.genesis.account
    }

    /// Write the genesis block into an empty store. Idempotent.
    pub fn initialize(&self) -> Result<(), StoreError> {
        if self.store.block_exists(&self.genesis.block.hash())? {
            return Ok(());
        }
        let hash = self.genesis.block.hash();
        let mut batch = self.store.write_batch()?;
        let stored = StoredBlock {
            block: (*self.genesis.block).clone(),
            sideband: BlockSideband {
                successor: BlockHash::ZERO,
                account: self.genesis.account,
                balance: Genesis::amount(),
                height: 1,
                timestamp: unix_seconds(),
            },
        };
        batch.block_put(&hash, &stored, Epoch::Epoch0)?;
        batch.account_put(
            &self.genesis.account,
            &AccountInfo {
                head: hash,
                rep_block: hash,
                open_block: hash,
                balance: Genesis::amount(),
                modified: unix_seconds(),
                block_count: 1,
                epoch: Epoch::Epoch0,
            },
        )?;
        batch.frontier_put(&hash, &self.genesis.account)?;
        batch.representation_add(&self.genesis.account, Genesis::amount())?;
        batch.commit()?;
        tracing::info!(genesis = %hash, network = self.network.as_str(), "ledger initialized");
        Ok(())
    }

    /// Validate and apply one block inside `batch`.
    pub fn process(
        &self,
        batch: &mut WriteBatch<'_>,
        block: &Block,
    ) -> Result<ProcessResult, StoreError> {
        if !work_valid(&block.root(), block.work(), self.network.publish_threshold()) {
            return Ok(ProcessResult::InsufficientWork);
        }
        let mut processor = LedgerProcessor {
            ledger: self,
            batch,
            result: Ok(ProcessResult::Progress),
        };
        block.visit(&mut processor);
        processor.result
    }

    /// Roll the owning chain back until `hash` itself has been undone.
    /// Returns the removed blocks, tip first.
    pub fn rollback(
        &self,
        batch: &mut WriteBatch<'_>,
        hash: &BlockHash,
    ) -> Result<Vec<Block>, StoreError> {
        let target = batch
            .block_get(hash)?
            .ok_or(StoreError::NotFound)?;
        let account = target.sideband.account;
        let mut removed = Vec::new();
        loop {
            let info = batch
                .account_get(&account)?
                .ok_or_else(|| StoreError::Corrupt("rollback on unopened account".into()))?;
            let head = info.head;
            self.rollback_one(batch, &head, &info, &mut removed)?;
            if head == *hash {
                break;
            }
        }
        Ok(removed)
    }

    /// Undo the current head block of an account chain.
    fn rollback_one(
        &self,
        batch: &mut WriteBatch<'_>,
        head: &BlockHash,
        info: &AccountInfo,
        removed: &mut Vec<Block>,
    ) -> Result<(), StoreError> {
        let stored = batch.block_get(head)?.ok_or(StoreError::NotFound)?;
        let account = stored.sideband.account;
        let previous = stored.block.previous();
        let prev_stored = if previous.is_zero() {
            None
        } else {
            Some(batch.block_get(&previous)?.ok_or(StoreError::NotFound)?)
        };
        let prev_balance = prev_stored
            .as_ref()
            .map(|s| s.sideband.balance)
            .unwrap_or(Amount::ZERO);
        let balance = stored.sideband.balance;
        let representative = self.representative_at(batch, head)?;

        match &stored.block {
            Block::Send(b) => {
                self.take_back_pending(batch, &b.destination, head, removed)?;
                let amount = prev_balance - balance;
                batch.representation_add(&representative, amount)?;
            }
            Block::Receive(b) => {
                let amount = balance - prev_balance;
                self.restore_pending(batch, &account, &b.source, amount)?;
                batch.representation_sub(&representative, amount)?;
            }
            Block::Open(b) => {
                self.restore_pending(batch, &account, &b.source, balance)?;
                batch.representation_sub(&b.representative, balance)?;
            }
            Block::Change(b) => {
                let prev_rep = self.representative_at(batch, &previous)?;
                batch.representation_sub(&b.representative, balance)?;
                batch.representation_add(&prev_rep, balance)?;
            }
            Block::State(b) => {
                batch.representation_sub(&b.representative, balance)?;
                if let Some(prev) = prev_stored.as_ref() {
                    let prev_rep = self.representative_at(batch, &prev.block.hash())?;
                    batch.representation_add(&prev_rep, prev_balance)?;
                }
                if balance < prev_balance {
                    // Undoing a send: its pending entry must disappear,
                    // unwinding the receiver first when already claimed.
                    self.take_back_pending(batch, &b.link.as_account(), head, removed)?;
                } else if balance > prev_balance && !b.link.is_zero() {
                    let amount = balance - prev_balance;
                    self.restore_pending(batch, &account, &b.link.as_block_hash(), amount)?;
                }
                // Epoch rollback (balance unchanged, epoch link) only moves
                // the account back to the v0 partition below.
            }
        }

        batch.block_del(head)?;
        batch.frontier_del(head)?;

        if let Some(prev) = prev_stored {
            batch.block_successor_set(&previous, BlockHash::ZERO)?;
            batch.frontier_put(&previous, &account)?;
            let epoch = match (&stored.block, info.epoch) {
                // Rolling back the upgrade block restores epoch 0.
                (Block::State(b), Epoch::Epoch1) if b.link == EPOCH_LINK => Epoch::Epoch0,
                (_, epoch) => epoch,
            };
            batch.account_put(
                &account,
                &AccountInfo {
                    head: previous,
                    rep_block: self.representative_block_at(batch, &previous)?,
                    open_block: info.open_block,
                    balance: prev.sideband.balance,
                    modified: unix_seconds(),
                    block_count: info.block_count - 1,
                    epoch,
                },
            )?;
        } else {
            batch.account_del(&account)?;
        }

        removed.push(stored.block);
        Ok(())
    }

    /// Remove the pending entry a send created; if a receiver has already
    /// consumed it, roll the receiver's chain back first until the entry
    /// reappears.
    fn take_back_pending(
        &self,
        batch: &mut WriteBatch<'_>,
        destination: &Account,
        send_hash: &BlockHash,
        removed: &mut Vec<Block>,
    ) -> Result<(), StoreError> {
        let key = PendingKey::new(*destination, *send_hash);
        while batch.pending_get(&key)?.is_none() {
            let info = batch
                .account_get(destination)?
                .ok_or_else(|| StoreError::Corrupt("consumed pending with no receiver".into()))?;
            let head = info.head;
            self.rollback_one(batch, &head, &info, removed)?;
        }
        batch.pending_del(&key)
    }

    /// Re-create the pending entry a receive consumed.
    fn restore_pending(
        &self,
        batch: &mut WriteBatch<'_>,
        receiver: &Account,
        source: &BlockHash,
        amount: Amount,
    ) -> Result<(), StoreError> {
        let source_account = batch
            .block_get(source)?
            .map(|s| s.sideband.account)
            .ok_or_else(|| StoreError::Corrupt("receive rollback with missing source".into()))?;
        let epoch = batch
            .account_get(&source_account)?
            .map(|i| i.epoch)
            .unwrap_or(Epoch::Epoch0);
        batch.pending_put(
            &PendingKey::new(*receiver, *source),
            &PendingInfo {
                source: source_account,
                amount,
                epoch,
            },
        )
    }

    /// The representative in force at `hash`: walk back to the nearest block
    /// that names one.
    fn representative_at(
        &self,
        batch: &WriteBatch<'_>,
        hash: &BlockHash,
    ) -> Result<Account, StoreError> {
        let block_hash = self.representative_block_at(batch, hash)?;
        let stored = batch.block_get(&block_hash)?.ok_or(StoreError::NotFound)?;
        Ok(stored.block.representative())
    }

    /// The nearest block at or before `hash` that names a representative.
    fn representative_block_at(
        &self,
        batch: &WriteBatch<'_>,
        hash: &BlockHash,
    ) -> Result<BlockHash, StoreError> {
        let mut current = *hash;
        loop {
            let stored = batch.block_get(&current)?.ok_or(StoreError::NotFound)?;
            match stored.block.block_type() {
                BlockType::Open | BlockType::Change | BlockType::State => return Ok(current),
                _ => current = stored.block.previous(),
            }
        }
    }

    /// Resolve a confirmed election in favor of `winner`: roll back the
    /// committed occupant of the same root, then apply the winner.
    pub fn winner_supersedes(
        &self,
        batch: &mut WriteBatch<'_>,
        winner: &Block,
    ) -> Result<ProcessResult, StoreError> {
        if batch.block_exists(&winner.hash())? {
            return Ok(ProcessResult::Old);
        }
        let root = winner.root();
        let occupant = match batch.block_get(&BlockHash::new(*root.as_bytes()))? {
            Some(root_block) => root_block.sideband.successor,
            None => batch
                .account_get(&Account::from_bytes(*root.as_bytes()))?
                .map(|info| info.open_block)
                .unwrap_or(BlockHash::ZERO),
        };
        if !occupant.is_zero() {
            let removed = self.rollback(batch, &occupant)?;
            tracing::debug!(
                winner = %winner.hash(),
                rolled_back = removed.len(),
                "fork resolved against committed chain"
            );
        }
        self.process(batch, winner)
    }

    // ── Read-side queries ───────────────────────────────────────────────

    pub fn block_exists(&self, hash: &BlockHash) -> Result<bool, StoreError> {
        self.store.block_exists(hash)
    }

    pub fn block_get(&self, hash: &BlockHash) -> Result<Option<StoredBlock>, StoreError> {
        self.store.block_get(hash)
    }

    pub fn account_info(&self, account: &Account) -> Result<Option<AccountInfo>, StoreError> {
        self.store.account_get(account)
    }

    pub fn latest(&self, account: &Account) -> Result<Option<BlockHash>, StoreError> {
        Ok(self.store.account_get(account)?.map(|info| info.head))
    }

    /// Balance at an account's head; zero for unopened accounts. Read
    /// failures are logged and reported as zero — the store layer treats
    /// them as fatal separately.
    pub fn balance(&self, account: &Account) -> Amount {
        match self.store.account_get(account) {
            Ok(info) => info.map(|i| i.balance).unwrap_or(Amount::ZERO),
            Err(err) => {
                tracing::error!(%account, %err, "balance query failed");
                Amount::ZERO
            }
        }
    }

    /// Voting weight delegated to a representative.
    pub fn weight(&self, representative: &Account) -> Amount {
        match self.store.representation_get(representative) {
            Ok(weight) => weight,
            Err(err) => {
                tracing::error!(%representative, %err, "weight query failed");
                Amount::ZERO
            }
        }
    }

    /// Whether `block` could extend its chain as currently committed; used
    /// to pick which fork candidate we publish in response to conflicts.
    pub fn could_fit(&self, block: &Block) -> Result<bool, StoreError> {
        let previous = block.previous();
        if previous.is_zero() {
            return Ok(true);
        }
        self.store.block_exists(&previous)
    }
}

// ── Per-kind processing ─────────────────────────────────────────────────

struct LedgerProcessor<'a, 'txn> {
    ledger: &'a Ledger,
    batch: &'a mut WriteBatch<'txn>,
    result: Result<ProcessResult, StoreError>,
}

impl LedgerProcessor<'_, '_> {
    /// Common legacy-kind prelude: dedup, gap, position, and fork checks.
    /// `Err(result)` in the inner value short-circuits processing with that
    /// outcome; `Ok` carries the owning account and its info.
    fn check_legacy_head(
        &mut self,
        hash: &BlockHash,
        previous: &BlockHash,
        block_type: BlockType,
    ) -> Result<Result<(Account, AccountInfo), ProcessResult>, StoreError> {
        if self.batch.block_exists(hash)? {
            return Ok(Err(ProcessResult::Old));
        }
        let prev_stored = match self.batch.block_get(previous)? {
            Some(stored) => stored,
            None => return Ok(Err(ProcessResult::GapPrevious)),
        };
        if !valid_successor(prev_stored.block.block_type(), block_type) {
            return Ok(Err(ProcessResult::BlockPosition));
        }
        // The frontier table maps heads to owners; a previous that is no
        // longer a head means another block already took the slot.
        let account = match self.batch.frontier_get(previous)? {
            Some(account) => account,
            None => return Ok(Err(ProcessResult::Fork)),
        };
        let info = self
            .batch
            .account_get(&account)?
            .ok_or_else(|| StoreError::Corrupt("frontier without account info".into()))?;
        Ok(Ok((account, info)))
    }

    fn store_block(
        &mut self,
        hash: BlockHash,
        block: &Block,
        account: Account,
        balance: Amount,
        height: u64,
        epoch: Epoch,
    ) -> Result<(), StoreError> {
        let stored = StoredBlock {
            block: block.clone(),
            sideband: BlockSideband {
                successor: BlockHash::ZERO,
                account,
                balance,
                height,
                timestamp: unix_seconds(),
            },
        };
        self.batch.block_put(&hash, &stored, epoch)?;
        let previous = block.previous();
        if !previous.is_zero() {
            self.batch.block_successor_set(&previous, hash)?;
            self.batch.frontier_del(&previous)?;
        }
        self.batch.frontier_put(&hash, &account)?;
        Ok(())
    }

    fn process_send(&mut self, block: &SendBlock) -> Result<ProcessResult, StoreError> {
        let hash = block.hash();
        let (account, info) =
            match self.check_legacy_head(&hash, &block.previous, BlockType::Send)? {
                Ok(found) => found,
                Err(result) => return Ok(result),
            };
        if !validate_message(&PublicKey::from(account), &hash, &block.signature) {
            return Ok(ProcessResult::BadSignature);
        }
        if block.balance > info.balance {
            return Ok(ProcessResult::NegativeSpend);
        }
        let amount = info.balance - block.balance;
        let representative = self.ledger.representative_at(self.batch, &info.rep_block)?;

        self.store_block(
            hash,
            &Block::Send(block.clone()),
            account,
            block.balance,
            info.block_count + 1,
            info.epoch,
        )?;
        self.batch.pending_put(
            &PendingKey::new(block.destination, hash),
            &PendingInfo {
                source: account,
                amount,
                epoch: info.epoch,
            },
        )?;
        self.batch.representation_sub(&representative, amount)?;
        self.batch.account_put(
            &account,
            &AccountInfo {
                head: hash,
                balance: block.balance,
                modified: unix_seconds(),
                block_count: info.block_count + 1,
                ..info
            },
        )?;
        Ok(ProcessResult::Progress)
    }

    fn process_receive(&mut self, block: &ReceiveBlock) -> Result<ProcessResult, StoreError> {
        let hash = block.hash();
        let (account, info) =
            match self.check_legacy_head(&hash, &block.previous, BlockType::Receive)? {
                Ok(found) => found,
                Err(result) => return Ok(result),
            };
        if !validate_message(&PublicKey::from(account), &hash, &block.signature) {
            return Ok(ProcessResult::BadSignature);
        }
        if !self.batch.block_exists(&block.source)? {
            return Ok(ProcessResult::GapSource);
        }
        let key = PendingKey::new(account, block.source);
        let pending = match self.batch.pending_get(&key)? {
            Some(pending) => pending,
            None => return Ok(ProcessResult::Unreceivable),
        };
        if pending.epoch != Epoch::Epoch0 {
            // Upgraded sends are only claimable with state blocks.
            return Ok(ProcessResult::Unreceivable);
        }
        let balance = info
            .balance
            .checked_add(pending.amount)
            .ok_or_else(|| StoreError::Corrupt("balance overflow".into()))?;
        let representative = self.ledger.representative_at(self.batch, &info.rep_block)?;

        self.batch.pending_del(&key)?;
        self.store_block(
            hash,
            &Block::Receive(block.clone()),
            account,
            balance,
            info.block_count + 1,
            info.epoch,
        )?;
        self.batch
            .representation_add(&representative, pending.amount)?;
        self.batch.account_put(
            &account,
            &AccountInfo {
                head: hash,
                balance,
                modified: unix_seconds(),
                block_count: info.block_count + 1,
                ..info
            },
        )?;
        Ok(ProcessResult::Progress)
    }

    fn process_open(&mut self, block: &OpenBlock) -> Result<ProcessResult, StoreError> {
        let hash = block.hash();
        if self.batch.block_exists(&hash)? {
            return Ok(ProcessResult::Old);
        }
        if block.account.is_zero() {
            return Ok(ProcessResult::OpenedBurnAccount);
        }
        if !validate_message(&PublicKey::from(block.account), &hash, &block.signature) {
            return Ok(ProcessResult::BadSignature);
        }
        if self.batch.account_get(&block.account)?.is_some() {
            return Ok(ProcessResult::Fork);
        }
        if !self.batch.block_exists(&block.source)? {
            return Ok(ProcessResult::GapSource);
        }
        let key = PendingKey::new(block.account, block.source);
        let pending = match self.batch.pending_get(&key)? {
            Some(pending) => pending,
            None => return Ok(ProcessResult::Unreceivable),
        };
        if pending.epoch != Epoch::Epoch0 {
            return Ok(ProcessResult::Unreceivable);
        }

        self.batch.pending_del(&key)?;
        self.store_block(
            hash,
            &Block::Open(block.clone()),
            block.account,
            pending.amount,
            1,
            Epoch::Epoch0,
        )?;
        self.batch
            .representation_add(&block.representative, pending.amount)?;
        self.batch.account_put(
            &block.account,
            &AccountInfo {
                head: hash,
                rep_block: hash,
                open_block: hash,
                balance: pending.amount,
                modified: unix_seconds(),
                block_count: 1,
                epoch: Epoch::Epoch0,
            },
        )?;
        Ok(ProcessResult::Progress)
    }

    fn process_change(&mut self, block: &ChangeBlock) -> Result<ProcessResult, StoreError> {
        let hash = block.hash();
        let (account, info) =
            match self.check_legacy_head(&hash, &block.previous, BlockType::Change)? {
                Ok(found) => found,
                Err(result) => return Ok(result),
            };
        if !validate_message(&PublicKey::from(account), &hash, &block.signature) {
            return Ok(ProcessResult::BadSignature);
        }
        let old_representative = self.ledger.representative_at(self.batch, &info.rep_block)?;

        self.store_block(
            hash,
            &Block::Change(block.clone()),
            account,
            info.balance,
            info.block_count + 1,
            info.epoch,
        )?;
        self.batch
            .representation_sub(&old_representative, info.balance)?;
        self.batch
            .representation_add(&block.representative, info.balance)?;
        self.batch.account_put(
            &account,
            &AccountInfo {
                head: hash,
                rep_block: hash,
                modified: unix_seconds(),
                block_count: info.block_count + 1,
                ..info
            },
        )?;
        Ok(ProcessResult::Progress)
    }

    fn process_state(&mut self, block: &StateBlock) -> Result<ProcessResult, StoreError> {
        let hash = block.hash();
        if self.batch.block_exists(&hash)? {
            return Ok(ProcessResult::Old);
        }
        let is_epoch = block.link == EPOCH_LINK;

        let signer = if is_epoch {
            self.ledger.genesis.epoch_signer
        } else {
            block.account
        };
        if !validate_message(&PublicKey::from(signer), &hash, &block.signature) {
            return Ok(ProcessResult::BadSignature);
        }

        let existing = self.batch.account_get(&block.account)?;
        match &existing {
            Some(info) => {
                if block.previous.is_zero() {
                    return Ok(ProcessResult::Fork);
                }
                if !self.batch.block_exists(&block.previous)? {
                    return Ok(ProcessResult::GapPrevious);
                }
                if info.head != block.previous {
                    return Ok(ProcessResult::Fork);
                }
            }
            None => {
                if !block.previous.is_zero() {
                    return Ok(ProcessResult::GapPrevious);
                }
                if block.account.is_zero() {
                    return Ok(ProcessResult::OpenedBurnAccount);
                }
            }
        }

        if is_epoch {
            return self.process_epoch(block, hash, existing);
        }

        let prev_balance = existing
            .as_ref()
            .map(|info| info.balance)
            .unwrap_or(Amount::ZERO);
        let mut consumed_pending: Option<(PendingKey, PendingInfo)> = None;

        if block.balance < prev_balance {
            // Send: the delta becomes a pending entry for the link account.
            let amount = prev_balance - block.balance;
            let epoch = existing
                .as_ref()
                .map(|info| info.epoch)
                .unwrap_or(Epoch::Epoch0);
            self.batch.pending_put(
                &PendingKey::new(block.link.as_account(), hash),
                &PendingInfo {
                    source: block.account,
                    amount,
                    epoch,
                },
            )?;
        } else if !block.link.is_zero() {
            // Receive: the link names the source send.
            let source = block.link.as_block_hash();
            if !self.batch.block_exists(&source)? {
                return Ok(ProcessResult::GapSource);
            }
            let key = PendingKey::new(block.account, source);
            let pending = match self.batch.pending_get(&key)? {
                Some(pending) => pending,
                None => return Ok(ProcessResult::Unreceivable),
            };
            let delta = block.balance - prev_balance;
            if pending.amount != delta {
                return Ok(ProcessResult::BalanceMismatch);
            }
            if pending.epoch == Epoch::Epoch1 {
                if let Some(info) = existing.as_ref() {
                    let current_rep = self.ledger.representative_at(self.batch, &info.rep_block)?;
                    if block.representative != current_rep {
                        return Ok(ProcessResult::RepresentativeMismatch);
                    }
                }
            }
            consumed_pending = Some((key, pending));
        } else if block.balance != prev_balance {
            return Ok(ProcessResult::BalanceMismatch);
        }

        if let Some((key, _)) = &consumed_pending {
            self.batch.pending_del(key)?;
        }

        // Weight accounting: the old representative loses the old balance,
        // the named representative gains the new one.
        if let Some(info) = existing.as_ref() {
            let old_rep = self.ledger.representative_at(self.batch, &info.rep_block)?;
            self.batch.representation_sub(&old_rep, info.balance)?;
        }
        self.batch
            .representation_add(&block.representative, block.balance)?;

        let epoch = existing
            .as_ref()
            .map(|info| info.epoch)
            .unwrap_or(Epoch::Epoch0);
        let height = existing
            .as_ref()
            .map(|info| info.block_count + 1)
            .unwrap_or(1);
        let open_block = existing
            .as_ref()
            .map(|info| info.open_block)
            .unwrap_or(hash);

        self.store_block(
            hash,
            &Block::State(block.clone()),
            block.account,
            block.balance,
            height,
            epoch,
        )?;
        self.batch.account_put(
            &block.account,
            &AccountInfo {
                head: hash,
                rep_block: hash,
                open_block,
                balance: block.balance,
                modified: unix_seconds(),
                block_count: height,
                epoch,
            },
        )?;
        Ok(ProcessResult::Progress)
    }

    /// Epoch upgrade: no value moves, no representative changes; the
    /// account transfers to the epoch-1 partition.
    fn process_epoch(
        &mut self,
        block: &StateBlock,
        hash: BlockHash,
        existing: Option<AccountInfo>,
    ) -> Result<ProcessResult, StoreError> {
        match existing {
            Some(info) => {
                if info.epoch != Epoch::Epoch0 {
                    return Ok(ProcessResult::BlockPosition);
                }
                if block.balance != info.balance {
                    return Ok(ProcessResult::BalanceMismatch);
                }
                let current_rep = self.ledger.representative_at(self.batch, &info.rep_block)?;
                if block.representative != current_rep {
                    return Ok(ProcessResult::RepresentativeMismatch);
                }
                self.store_block(
                    hash,
                    &Block::State(block.clone()),
                    block.account,
                    block.balance,
                    info.block_count + 1,
                    Epoch::Epoch1,
                )?;
                self.batch.account_put(
                    &block.account,
                    &AccountInfo {
                        head: hash,
                        rep_block: hash,
                        open_block: info.open_block,
                        balance: info.balance,
                        modified: unix_seconds(),
                        block_count: info.block_count + 1,
                        epoch: Epoch::Epoch1,
                    },
                )?;
            }
            None => {
                if !block.balance.is_zero() {
                    return Ok(ProcessResult::BalanceMismatch);
                }
                if !block.representative.is_zero() {
                    return Ok(ProcessResult::RepresentativeMismatch);
                }
                self.store_block(
                    hash,
                    &Block::State(block.clone()),
                    block.account,
                    Amount::ZERO,
                    1,
                    Epoch::Epoch1,
                )?;
                self.batch.account_put(
                    &block.account,
                    &AccountInfo {
                        head: hash,
                        rep_block: hash,
                        open_block: hash,
                        balance: Amount::ZERO,
                        modified: unix_seconds(),
                        block_count: 1,
                        epoch: Epoch::Epoch1,
                    },
                )?;
            }
        }
        Ok(ProcessResult::Progress)
    }
}

impl BlockVisitor for LedgerProcessor<'_, '_> {
    fn send(&mut self, block: &SendBlock) {
        self.result = self.process_send(block);
    }

    fn receive(&mut self, block: &ReceiveBlock) {
        self.result = self.process_receive(block);
    }

    fn open(&mut self, block: &OpenBlock) {
        self.result = self.process_open(block);
    }

    fn change(&mut self, block: &ChangeBlock) {
        self.result = self.process_change(block);
    }

    fn state(&mut self, block: &StateBlock) {
        self.result = self.process_state(block);
    }
}
