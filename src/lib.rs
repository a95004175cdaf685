//! chain-feeds turns an occasionally-reorganizing chain into an ordered stream of typed
//! domain events.
//!
//! The core is [`BlockFeed`]: it drives a cursor over block numbers, applies a
//! confirmation offset and an optional staleness bound, and delivers [`BlockEvent`]s to
//! caller-supplied handlers either continuously (tip following) or over a bounded,
//! rate-limited historical range (backfill). [`LogFeed`] layers log retrieval for a
//! configured set of contract addresses on top of the block cadence and signals a
//! block-commit boundary after each block's logs.
//!
//! [`registry::Listener`] classifies raw logs by contract address and topic signature,
//! decodes them into typed registry messages (agent/scanner lifecycle, dispatch links)
//! and routes them to the handlers registered for each message kind.
//!
//! # Termination
//!
//! Every subscription ends with exactly one terminal value: a chain-client error, a
//! handler error, range completion ([`FeedError::EndBlockReached`]) or cancellation
//! ([`FeedError::Cancelled`]). Skips driven by policy — confirmation depth not reached,
//! block older than the configured maximum age — are not errors and never terminate a
//! subscription. Restart/resume policy belongs to the caller.
//!
//! # Ordering
//!
//! Within one subscription, delivered blocks are strictly increasing in height, and logs
//! for block N are never delivered before block N-1's after-block handler has returned.
//!
//! # Reorgs
//!
//! Each follow loop keeps a bounded cache of recently seen block hashes. When a block at
//! a previously seen height comes back with a different hash, or a block's parent hash
//! does not match the cached predecessor, the feed logs a warning, purges the cache from
//! that height upward, delivers the freshly fetched block and keeps going. The running
//! reorg count is surfaced through [`health::Reporter::health`].

pub mod client;
pub mod domain;
pub mod feeds;
pub mod health;
pub mod registry;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

mod error;

pub use client::ChainClient;
pub use domain::{Block, BlockEvent, EventType};
pub use error::FeedError;
pub use feeds::{
    handler_fn, BlockFeed, BlockFeedBuilder, EventHandler, Feed, LogFeed, LogFeedBuilder,
    LogHandler, DEFAULT_CACHE_CAPACITY, DEFAULT_POLL_INTERVAL,
};
