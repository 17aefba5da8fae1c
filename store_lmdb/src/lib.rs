//! LMDB storage backend for the keva ledger.
//!
//! One `heed` environment holds every logical table as a named database.
//! Reads are served from per-call read transactions (snapshot-consistent,
//! concurrent with the writer); all mutations flow through [`WriteBatch`],
//! a single LMDB write transaction per processed block or batch.

pub mod account;
pub mod block;
pub mod environment;
pub mod error;
pub mod frontier;
pub mod meta;
pub mod migration;
pub mod online_weight;
pub mod peer;
pub mod pending;
pub mod rep_weights;
pub mod unchecked;
pub mod vote;
pub mod write_batch;

pub use environment::LmdbEnvironment;
pub use error::LmdbError;
pub use migration::{Migrator, CURRENT_SCHEMA_VERSION};
pub use write_batch::WriteBatch;

/// Convenience alias — the unified LMDB store wrapping all tables.
pub type LmdbStore = LmdbEnvironment;
