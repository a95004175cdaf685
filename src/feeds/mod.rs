//! Block and log follow loops.
//!
//! [`BlockFeed`] produces a confirmation-safe, monotonically increasing stream of blocks;
//! [`LogFeed`] rides on its cadence and exposes per-block logs for a configured address
//! set. Both implement [`Feed`] and report liveness through
//! [`crate::health::Reporter`].

mod blocks;
mod cache;
mod logs;

pub use blocks::{BlockFeed, BlockFeedBuilder};
pub use logs::{LogFeed, LogFeedBuilder};

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::{domain::Block, health::Reporter, FeedError};
use alloy::rpc::types::Log;

/// Default wait between polls while no eligible block exists at the tip.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default bound on the recent-block cache used for reorg detection.
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// A caller-supplied per-item handler.
///
/// Implement the trait directly when the per-item work is async; [`handler_fn`] adapts a
/// plain closure. Returning an error makes that error the subscription's terminal.
#[async_trait]
pub trait EventHandler<T: Send + Sync>: Send {
    async fn handle(&mut self, event: &T) -> Result<(), FeedError>;
}

/// Adapts a synchronous closure into a boxed [`EventHandler`].
pub fn handler_fn<T, F>(f: F) -> Box<dyn EventHandler<T>>
where
    T: Send + Sync + 'static,
    F: FnMut(&T) -> Result<(), FeedError> + Send + 'static,
{
    struct FnHandler<F>(F);

    #[async_trait]
    impl<T, F> EventHandler<T> for FnHandler<F>
    where
        T: Send + Sync,
        F: FnMut(&T) -> Result<(), FeedError> + Send,
    {
        async fn handle(&mut self, event: &T) -> Result<(), FeedError> {
            (self.0)(event)
        }
    }

    Box::new(FnHandler(f))
}

/// Per-log callback pair used by [`LogFeed::for_each_log`].
///
/// `handle_after_block` runs exactly once after every log of a block has been handled
/// successfully, so consumers can treat it as a block-commit boundary.
#[async_trait]
pub trait LogHandler: Send {
    /// Called once per log, in block order then log order. `block` is `None` for
    /// one-shot queries that carry no block context.
    async fn handle_log(&mut self, block: Option<&Block>, log: &Log) -> Result<(), FeedError>;

    async fn handle_after_block(&mut self, _block: &Block) -> Result<(), FeedError> {
        Ok(())
    }
}

/// Common feed contract implemented by [`BlockFeed`] and [`LogFeed`].
#[async_trait]
pub trait Feed: Reporter {
    type Event: Send + Sync;

    /// Registers a handler and returns the subscription's terminal signal.
    ///
    /// The receiver yields exactly one value — the error, cancellation or completion
    /// that stopped the follow loop — and then stays idle.
    async fn subscribe(
        &self,
        handler: Box<dyn EventHandler<Self::Event>>,
    ) -> oneshot::Receiver<FeedError>;

    /// Spawns the continuous follow loop. Idempotent.
    fn start(&self);

    fn is_started(&self) -> bool;

    /// Spawns a bounded backfill pass over `start..=end` (inclusive), throttled to at
    /// most `rate` block-fetch attempts per second when `rate` is set. Idempotent with
    /// respect to [`Feed::start`].
    fn start_range(&self, start: u64, end: u64, rate: Option<u64>);
}

/// One registered subscriber: its handler plus the unsent terminal slot.
pub(crate) struct Subscriber<T: Send + Sync> {
    pub(crate) handler: Box<dyn EventHandler<T>>,
    pub(crate) terminal: Option<oneshot::Sender<FeedError>>,
}

impl<T: Send + Sync> Subscriber<T> {
    pub(crate) fn new(handler: Box<dyn EventHandler<T>>) -> (Self, oneshot::Receiver<FeedError>) {
        let (tx, rx) = oneshot::channel();
        (Self { handler, terminal: Some(tx) }, rx)
    }
}
