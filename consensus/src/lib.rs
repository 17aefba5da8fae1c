//! Weighted representative consensus: the active election machine, vote
//! generation and caching, online-weight sampling, and the caches that feed
//! bootstrap when votes reference blocks we have not seen.

pub mod active_elections;
pub mod block_arrival;
pub mod election;
pub mod gap_cache;
pub mod online_weight;
pub mod rep_crawler;
pub mod vote_generator;
pub mod votes_cache;

use std::net::SocketAddrV6;

use keva_messages::Message;

/// Outbound network traffic: a message and its destinations. The node owns
/// the receiving end and the socket; consensus components never block on
/// network I/O while holding their locks.
pub type OutboundSink = tokio::sync::mpsc::Sender<(Message, Vec<SocketAddrV6>)>;

pub use active_elections::{ActiveElections, VoteOutcome};
pub use block_arrival::BlockArrival;
pub use election::{Election, ElectionStatus, VoteRecord};
pub use gap_cache::GapCache;
pub use online_weight::OnlineWeight;
pub use rep_crawler::RepCrawler;
pub use vote_generator::VoteGenerator;
pub use votes_cache::VotesCache;
