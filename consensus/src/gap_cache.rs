//! Gap cache: vote-weight-triggered lazy bootstrap.
//!
//! When votes arrive for a hash we do not hold, the voters accumulate here.
//! Once their combined ledger weight clears the bootstrap threshold the
//! hash is worth fetching — enough of the network considers it real — and
//! the entry is surfaced for a lazy bootstrap seed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use keva_ledger::Ledger;
use keva_types::{Account, Amount, BlockHash};

use crate::online_weight::OnlineWeight;

/// Bounded entry count; oldest evicted first.
const MAX_ENTRIES: usize = 256;
/// Voters tracked per entry.
const MAX_VOTERS: usize = 16;
/// Entries expire after this long without confirmation.
const ENTRY_TTL: Duration = Duration::from_secs(3600);

struct GapEntry {
    arrival: Instant,
    voters: Vec<Account>,
}

pub struct GapCache {
    ledger: Arc<Ledger>,
    online: Arc<OnlineWeight>,
    entries: Mutex<HashMap<BlockHash, GapEntry>>,
}

impl GapCache {
    pub fn new(ledger: Arc<Ledger>, online: Arc<OnlineWeight>) -> Self {
        Self {
            ledger,
            online,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Note a missing dependency (no voter yet).
    pub fn add(&self, hash: BlockHash) {
        let mut entries = self.entries.lock().unwrap();
        Self::bound(&mut entries);
        entries.entry(hash).or_insert_with(|| GapEntry {
            arrival: Instant::now(),
            voters: Vec::new(),
        });
    }

    /// Record a vote for an unknown hash. Returns true when accumulated
    /// voter weight crosses the bootstrap threshold — the entry is removed
    /// and the caller should start a lazy bootstrap seeded with `hash`.
    pub fn vote(&self, hash: BlockHash, voter: Account) -> bool {
        let mut entries = self.entries.lock().unwrap();
        Self::bound(&mut entries);
        let entry = entries.entry(hash).or_insert_with(|| GapEntry {
            arrival: Instant::now(),
            voters: Vec::new(),
        });
        if entry.voters.len() < MAX_VOTERS && !entry.voters.contains(&voter) {
            entry.voters.push(voter);
        }
        let tally = entry
            .voters
            .iter()
            .fold(Amount::ZERO, |sum, account| {
                sum.checked_add(self.ledger.weight(account))
                    .unwrap_or(Amount::MAX)
            });
        let threshold = self.online.bootstrap_threshold();
        if !threshold.is_zero() && tally >= threshold {
            entries.remove(&hash);
            tracing::debug!(%hash, %tally, "gap cache triggered lazy bootstrap");
            true
        } else {
            false
        }
    }

    fn bound(entries: &mut HashMap<BlockHash, GapEntry>) {
        entries.retain(|_, entry| entry.arrival.elapsed() <= ENTRY_TTL);
        while entries.len() >= MAX_ENTRIES {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, entry)| entry.arrival)
                .map(|(hash, _)| *hash)
            {
                entries.remove(&oldest);
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
