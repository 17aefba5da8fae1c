//! Process-local counters.
//!
//! A private prometheus registry; counters are incremented on the hot paths
//! and dumped through logs on demand. No exposition endpoint — the RPC
//! surface is out of scope, but the counters keep operator-level visibility
//! of drop reasons and throughput.

use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

pub struct NodeMetrics {
    pub registry: Registry,
    pub blocks_processed: IntCounter,
    pub blocks_forked: IntCounter,
    pub elections_confirmed: IntCounter,
    pub votes_generated: IntCounter,
    pub parse_failures: IntCounterVec,
    pub bootstrap_pulls: IntCounter,
}

impl NodeMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();
        let blocks_processed =
            IntCounter::new("keva_blocks_processed", "Blocks accepted into the ledger")
                .expect("valid counter definition");
        let blocks_forked = IntCounter::new("keva_blocks_forked", "Fork results observed")
            .expect("valid counter definition");
        let elections_confirmed =
            IntCounter::new("keva_elections_confirmed", "Elections reaching quorum")
                .expect("valid counter definition");
        let votes_generated = IntCounter::new("keva_votes_generated", "Votes signed and sent")
            .expect("valid counter definition");
        let parse_failures = IntCounterVec::new(
            Opts::new("keva_parse_failures", "Datagrams rejected by the parser"),
            &["status"],
        )
        .expect("valid counter definition");
        let bootstrap_pulls =
            IntCounter::new("keva_bootstrap_pulls", "Completed bootstrap pulls")
                .expect("valid counter definition");

        for collector in [
            Box::new(blocks_processed.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(blocks_forked.clone()),
            Box::new(elections_confirmed.clone()),
            Box::new(votes_generated.clone()),
            Box::new(parse_failures.clone()),
            Box::new(bootstrap_pulls.clone()),
        ] {
            registry
                .register(collector)
                .expect("collectors registered once");
        }

        Self {
            registry,
            blocks_processed,
            blocks_forked,
            elections_confirmed,
            votes_generated,
            parse_failures,
            bootstrap_pulls,
        }
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}
