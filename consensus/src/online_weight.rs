//! Online weight sampling.
//!
//! Quorum is measured against the weight that is actually voting, not the
//! total delegated supply. Representatives seen voting within the sample
//! period count as online; their summed ledger weight is periodically
//! written to the `online_weight` table, and the trend — the median of the
//! retained samples — smooths short outages out of the quorum denominator.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use keva_ledger::Ledger;
use keva_store::OnlineWeightStore;
use keva_types::{unix_seconds, Account, Amount, NetworkParams};

pub struct OnlineWeight {
    ledger: Arc<Ledger>,
    params: NetworkParams,
    inner: Mutex<Inner>,
}

struct Inner {
    /// rep → last time we saw a vote from it.
    online: HashMap<Account, Instant>,
    /// Median of the persisted samples.
    trend: Amount,
}

impl OnlineWeight {
    pub fn new(ledger: Arc<Ledger>, params: NetworkParams) -> Self {
        let trend = Self::compute_trend(&ledger);
        Self {
            ledger,
            params,
            inner: Mutex::new(Inner {
                online: HashMap::new(),
                trend,
            }),
        }
    }

    fn compute_trend(ledger: &Ledger) -> Amount {
        let mut samples: Vec<Amount> = match ledger.store().online_weight_iter() {
            Ok(samples) => samples.into_iter().map(|(_, amount)| amount).collect(),
            Err(err) => {
                tracing::error!(%err, "online weight samples unreadable");
                Vec::new()
            }
        };
        if samples.is_empty() {
            return Amount::ZERO;
        }
        samples.sort();
        samples[samples.len() / 2]
    }

    /// Record that `rep` voted just now.
    pub fn observe(&self, rep: Account) {
        if self.ledger.weight(&rep).is_zero() {
            return;
        }
        self.inner.lock().unwrap().online.insert(rep, Instant::now());
    }

    /// Sum of ledger weights of representatives seen within the period.
    pub fn online(&self) -> Amount {
        let period = Duration::from_secs(self.params.network.weight_period_secs());
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        inner.online.retain(|_, seen| now.duration_since(*seen) <= period);
        inner
            .online
            .keys()
            .fold(Amount::ZERO, |sum, rep| {
                sum.checked_add(self.ledger.weight(rep)).unwrap_or(Amount::MAX)
            })
    }

    /// Median of the persisted samples.
    pub fn trend(&self) -> Amount {
        self.inner.lock().unwrap().trend
    }

    /// Persist the current online weight as a sample, prune to the network
    /// sample count, and refresh the trend.
    pub fn sample(&self) {
        let online = self.online();
        let result = (|| {
            let mut batch = self.ledger.store().write_batch()?;
            batch.online_weight_put(unix_seconds(), online)?;
            batch.online_weight_prune(self.params.network.weight_samples())?;
            batch.commit()
        })();
        if let Err(err) = result {
            tracing::error!(%err, "online weight sample failed");
            return;
        }
        let trend = Self::compute_trend(&self.ledger);
        self.inner.lock().unwrap().trend = trend;
    }

    /// The quorum delta: winner weight required to confirm an election.
    pub fn delta(&self) -> Amount {
        let base = self
            .trend()
            .max(Amount::new(self.params.network.online_weight_minimum()));
        Amount::new(base.raw() / 100 * self.params.quorum_percent as u128)
    }

    /// Threshold of accumulated vote weight on an unknown hash that should
    /// trigger a lazy bootstrap.
    pub fn bootstrap_threshold(&self) -> Amount {
        Amount::new(self.online().raw() / self.params.network.bootstrap_fraction())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keva_store_lmdb::LmdbStore;
    use keva_types::Network;

    fn ledger() -> (tempfile::TempDir, Arc<Ledger>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LmdbStore::open(dir.path(), 64 * 1024 * 1024).unwrap());
        let ledger = Arc::new(Ledger::new(store, Network::Test));
        ledger.initialize().unwrap();
        (dir, ledger)
    }

    #[test]
    fn genesis_rep_counts_when_observed() {
        let (_dir, ledger) = ledger();
        let genesis = ledger.genesis_account();
        let online = OnlineWeight::new(ledger, NetworkParams::new(Network::Test));
        assert!(online.online().is_zero());
        online.observe(genesis);
        assert_eq!(online.online(), Amount::MAX);
    }

    #[test]
    fn weightless_reps_ignored() {
        let (_dir, ledger) = ledger();
        let online = OnlineWeight::new(ledger, NetworkParams::new(Network::Test));
        online.observe(Account::from_bytes([9; 32]));
        assert!(online.online().is_zero());
    }

    #[test]
    fn sampling_updates_trend() {
        let (_dir, ledger) = ledger();
        let genesis = ledger.genesis_account();
        let online = OnlineWeight::new(ledger, NetworkParams::new(Network::Test));
        assert!(online.trend().is_zero());
        online.observe(genesis);
        online.sample();
        assert_eq!(online.trend(), Amount::MAX);
        // Quorum is half the trend on test (quorum_percent = 50, no floor).
        assert_eq!(online.delta(), Amount::new(u128::MAX / 100 * 50));
    }

    #[test]
    fn delta_respects_minimum_floor() {
        let (_dir, ledger) = ledger();
        let params = NetworkParams::new(Network::Live);
        let online = OnlineWeight::new(ledger, params);
        // No samples: the floor drives the quorum.
        let floor = Network::Live.online_weight_minimum();
        assert_eq!(online.delta(), Amount::new(floor / 100 * 50));
    }
}
