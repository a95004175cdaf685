//! Confirmation-safe block follow loop.
//!
//! The feed drives a cursor over block numbers. A block at height `next - offset` is
//! fetched only once the chain head has reached `next`, which means `offset` additional
//! blocks have been mined on top of it before it is processed. Blocks older than the
//! configured maximum age are skipped without stalling the cursor, so a feed recovering
//! from a long pause can fast-forward through history it no longer cares about.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex as StdMutex,
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use tokio::{
    sync::{oneshot, Mutex},
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::{
    client::ChainClient,
    domain::BlockEvent,
    feeds::{cache::BlockCache, EventHandler, Feed, Subscriber, DEFAULT_CACHE_CAPACITY,
        DEFAULT_POLL_INTERVAL},
    health::{Report, Reporter, Reports},
    FeedError,
};

/// Builder/configuration for [`BlockFeed`].
#[derive(Clone, Debug)]
pub struct BlockFeedBuilder {
    /// Next block number the cursor evaluates; the first fetched height is
    /// `start_block - offset`.
    pub start_block: u64,
    /// Required confirmation depth.
    pub offset: u64,
    /// Optional staleness bound on delivered blocks.
    pub max_block_age: Option<Duration>,
    /// Fetch per-block trace data alongside each block.
    pub tracing: bool,
    /// Wait between polls while no eligible block exists.
    pub poll_interval: Duration,
    /// Recent-block cache bound; `0` disables reorg detection.
    pub cache_capacity: usize,
    pub name: String,
    cancel: CancellationToken,
}

impl Default for BlockFeedBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockFeedBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            start_block: 0,
            offset: 0,
            max_block_age: None,
            tracing: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            name: "block-feed".to_owned(),
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn start_block(mut self, start_block: u64) -> Self {
        self.start_block = start_block;
        self
    }

    /// Sets the confirmation depth: a block is not processed until `offset` further
    /// blocks have been mined on top of it.
    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Drops delivery of blocks whose timestamp is older than `max_block_age`.
    /// The cursor still advances past them.
    #[must_use]
    pub fn max_block_age(mut self, max_block_age: Duration) -> Self {
        self.max_block_age = Some(max_block_age);
        self
    }

    /// Enables per-block trace fetching. A trace fetch failure is terminal, the same as
    /// a block fetch failure.
    #[must_use]
    pub fn tracing(mut self, tracing: bool) -> Self {
        self.tracing = tracing;
        self
    }

    #[must_use]
    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    #[must_use]
    pub fn cache_capacity(mut self, cache_capacity: usize) -> Self {
        self.cache_capacity = cache_capacity;
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the cancellation token the follow loop observes before each unit of work.
    #[must_use]
    pub fn cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Builds the feed.
    ///
    /// # Errors
    ///
    /// [`FeedError::InvalidStartBlock`] if `start_block` is below `offset` (the first
    /// fetched height would underflow).
    pub fn build<C: ChainClient>(self, client: Arc<C>) -> Result<BlockFeed<C>, FeedError> {
        if self.start_block < self.offset {
            return Err(FeedError::InvalidStartBlock);
        }
        Ok(BlockFeed {
            inner: Arc::new(Inner {
                client,
                cancel: self.cancel,
                name: self.name,
                tracing: self.tracing,
                offset: self.offset,
                max_block_age: self.max_block_age,
                poll_interval: self.poll_interval,
                cache_capacity: self.cache_capacity,
                cursor: StdMutex::new(Cursor { next: self.start_block, end: None, rate: None }),
                subs: Mutex::new(Vec::new()),
                started: AtomicBool::new(false),
                last_block: AtomicU64::new(0),
                reorg_count: AtomicU64::new(0),
            }),
        })
    }
}

/// Cursor state owned by one feed and mutated only by its own loop.
#[derive(Debug, Clone, Copy)]
struct Cursor {
    /// Next block number to evaluate.
    next: u64,
    /// Inclusive final height for range mode.
    end: Option<u64>,
    /// Max block-fetch attempts per second for range mode.
    rate: Option<u64>,
}

struct Inner<C> {
    client: Arc<C>,
    cancel: CancellationToken,
    name: String,
    tracing: bool,
    offset: u64,
    max_block_age: Option<Duration>,
    poll_interval: Duration,
    cache_capacity: usize,
    cursor: StdMutex<Cursor>,
    subs: Mutex<Vec<Subscriber<BlockEvent>>>,
    started: AtomicBool,
    last_block: AtomicU64,
    reorg_count: AtomicU64,
}

/// Confirmation-safe block feed. Cheap to clone; clones share the same cursor,
/// subscribers and lifecycle flags.
pub struct BlockFeed<C: ChainClient> {
    inner: Arc<Inner<C>>,
}

impl<C: ChainClient> Clone for BlockFeed<C> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<C: ChainClient> BlockFeed<C> {
    /// Runs the follow loop over all registered subscribers and returns the terminal
    /// error that stopped it. Every subscriber's terminal signal receives the same
    /// value.
    ///
    /// This is the synchronous variant of [`Feed::start`]; range mode and tests drive
    /// the feed through it directly.
    pub async fn for_each_block(&self) -> FeedError {
        let terminal = {
            let mut fanout = Fanout { subs: &self.inner.subs };
            self.run_with_handler(&mut fanout).await
        };

        let mut subs = self.inner.subs.lock().await;
        for sub in subs.iter_mut() {
            if let Some(tx) = sub.terminal.take() {
                _ = tx.send(terminal.clone());
            }
        }

        terminal
    }

    /// Core follow loop, delivering to a single handler.
    ///
    /// One iteration: cancellation check, end-of-range check, rate-limiter tick, head
    /// query, eligibility check (`latest >= next`, else wait and retry), block fetch at
    /// `next - offset`, optional trace fetch, reorg check, cursor advance, staleness
    /// check, delivery.
    pub(crate) async fn run_with_handler(
        &self,
        handler: &mut (dyn EventHandler<BlockEvent> + '_),
    ) -> FeedError {
        let inner = &*self.inner;
        // The loop may be driven directly rather than through `start`; either way the
        // feed counts as started once it is running.
        inner.started.store(true, Ordering::SeqCst);
        let Cursor { mut next, end, rate } = *inner.cursor.lock().expect("cursor lock poisoned");

        let mut cache = BlockCache::new(inner.cache_capacity);
        let mut limiter = rate.filter(|r| *r > 0).map(|r| {
            let period = Duration::from_secs(1) / u32::try_from(r).unwrap_or(u32::MAX);
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        debug!(
            feed = %inner.name,
            start = next,
            end = ?end,
            offset = inner.offset,
            tracing = inner.tracing,
            "starting block follow loop"
        );

        loop {
            if inner.cancel.is_cancelled() {
                return FeedError::Cancelled;
            }

            if let Some(end) = end {
                if next - inner.offset > end {
                    info!(feed = %inner.name, end = end, "range completed");
                    return FeedError::EndBlockReached;
                }
            }

            if let Some(limiter) = limiter.as_mut() {
                tokio::select! {
                    () = inner.cancel.cancelled() => return FeedError::Cancelled,
                    _ = limiter.tick() => {}
                }
            }

            let latest = match inner.client.block_number().await {
                Ok(latest) => latest,
                Err(e) => return e,
            };

            // Confirmation window: the block at `next - offset` is eligible only once
            // the head has reached `next`.
            if latest < next {
                trace!(feed = %inner.name, latest = latest, next = next, "no eligible block");
                tokio::select! {
                    () = inner.cancel.cancelled() => return FeedError::Cancelled,
                    () = tokio::time::sleep(inner.poll_interval) => {}
                }
                continue;
            }

            let height = next - inner.offset;
            let block = match inner.client.block_by_number(height).await {
                Ok(Some(block)) => block,
                Ok(None) => return FeedError::BlockNotFound(height),
                Err(e) => return e,
            };

            let traces = if inner.tracing {
                match inner.client.trace_block(height).await {
                    Ok(traces) => traces,
                    Err(e) => return e,
                }
            } else {
                Vec::new()
            };

            self.check_reorg(&mut cache, &block);
            cache.insert(height, block.hash);
            inner.last_block.store(height, Ordering::Relaxed);

            // The cursor moves forward regardless of whether the block is delivered:
            // staleness filtering must never block progress.
            next += 1;
            inner.cursor.lock().expect("cursor lock poisoned").next = next;

            if let Some(max_age) = inner.max_block_age {
                if block_age(block.timestamp) > max_age {
                    debug!(
                        feed = %inner.name,
                        block_number = block.number,
                        timestamp = block.timestamp,
                        "skipping stale block"
                    );
                    continue;
                }
            }

            let event = BlockEvent::with_traces(block, traces);
            if let Err(terminal) = handler.handle(&event).await {
                return terminal;
            }
        }
    }

    /// Flags a reorg when the fetched block contradicts the cache: a different hash at
    /// an already-seen height, or a parent hash that does not match the cached
    /// predecessor. The corrected block is still delivered; cached state at and above
    /// the affected height is invalidated.
    fn check_reorg(&self, cache: &mut BlockCache, block: &crate::domain::Block) {
        let reorged = match cache.get(block.number) {
            Some(seen) => seen != block.hash,
            None => block.number > 0 && cache
                .get(block.number - 1)
                .is_some_and(|parent| parent != block.parent_hash),
        };
        if reorged {
            warn!(
                feed = %self.inner.name,
                block_number = block.number,
                block_hash = %block.hash,
                "reorg detected, invalidating cached blocks at and above this height"
            );
            self.inner.reorg_count.fetch_add(1, Ordering::Relaxed);
            cache.purge_from(block.number);
        }
    }

    /// Reconfigures the cursor for a bounded range pass. The cursor is seeded at
    /// `start + offset` so the delivered heights are exactly `start..=end`.
    pub(crate) fn set_range(&self, start: u64, end: u64, rate: Option<u64>) {
        let mut cursor = self.inner.cursor.lock().expect("cursor lock poisoned");
        cursor.next = start + self.inner.offset;
        cursor.end = Some(end);
        cursor.rate = rate;
    }

    pub(crate) fn mark_started(&self) -> bool {
        self.inner.started.swap(true, Ordering::SeqCst)
    }

    fn spawn_loop(&self) {
        let feed = self.clone();
        tokio::spawn(async move {
            let terminal = feed.for_each_block().await;
            info!(feed = %feed.inner.name, terminal = %terminal, "block feed stopped");
        });
    }
}

#[async_trait]
impl<C: ChainClient> Feed for BlockFeed<C> {
    type Event = BlockEvent;

    async fn subscribe(
        &self,
        handler: Box<dyn EventHandler<BlockEvent>>,
    ) -> oneshot::Receiver<FeedError> {
        let (sub, rx) = Subscriber::new(handler);
        self.inner.subs.lock().await.push(sub);
        rx
    }

    fn start(&self) {
        if self.mark_started() {
            return;
        }
        self.spawn_loop();
    }

    fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst)
    }

    fn start_range(&self, start: u64, end: u64, rate: Option<u64>) {
        if self.mark_started() {
            return;
        }
        self.set_range(start, end, rate);
        self.spawn_loop();
    }
}

impl<C: ChainClient> Reporter for BlockFeed<C> {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn health(&self) -> Reports {
        vec![
            Report::ok("started", self.is_started().to_string()),
            Report::ok(
                "last-block",
                self.inner.last_block.load(Ordering::Relaxed).to_string(),
            ),
            Report::ok(
                "reorgs-detected",
                self.inner.reorg_count.load(Ordering::Relaxed).to_string(),
            ),
        ]
    }
}

/// Delivers one event to every registered subscriber in registration order.
struct Fanout<'a> {
    subs: &'a Mutex<Vec<Subscriber<BlockEvent>>>,
}

#[async_trait]
impl EventHandler<BlockEvent> for Fanout<'_> {
    async fn handle(&mut self, event: &BlockEvent) -> Result<(), FeedError> {
        let mut subs = self.subs.lock().await;
        for sub in subs.iter_mut() {
            sub.handler.handle(event).await?;
        }
        Ok(())
    }
}

fn block_age(timestamp: u64) -> Duration {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    Duration::from_secs(now.saturating_sub(timestamp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockChainClient;

    #[test]
    fn builder_defaults() {
        let builder = BlockFeedBuilder::new();
        assert_eq!(builder.start_block, 0);
        assert_eq!(builder.offset, 0);
        assert_eq!(builder.poll_interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(builder.cache_capacity, DEFAULT_CACHE_CAPACITY);
        assert!(!builder.tracing);
        assert!(builder.max_block_age.is_none());
    }

    #[test]
    fn build_rejects_start_below_offset() {
        let client = Arc::new(MockChainClient::new());
        let result = BlockFeedBuilder::new().start_block(1).offset(2).build(client);
        assert!(matches!(result, Err(FeedError::InvalidStartBlock)));
    }

    #[test]
    fn builder_methods_update_configuration() {
        let builder = BlockFeedBuilder::new()
            .start_block(7)
            .offset(2)
            .tracing(true)
            .cache_capacity(5)
            .name("tip-feed");
        assert_eq!(builder.start_block, 7);
        assert_eq!(builder.offset, 2);
        assert!(builder.tracing);
        assert_eq!(builder.cache_capacity, 5);
        assert_eq!(builder.name, "tip-feed");
    }
}
