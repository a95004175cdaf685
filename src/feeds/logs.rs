//! Log follow loop layered on [`BlockFeed`]'s cadence.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use alloy::{
    primitives::Address,
    rpc::types::{Filter, Log},
};
use async_trait::async_trait;
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    client::ChainClient,
    domain::{Block, BlockEvent},
    feeds::{
        BlockFeed, BlockFeedBuilder, EventHandler, Feed, LogHandler, Subscriber,
        DEFAULT_CACHE_CAPACITY, DEFAULT_POLL_INTERVAL,
    },
    health::{Report, Reporter, Reports},
    FeedError,
};

/// Builder/configuration for [`LogFeed`].
#[derive(Clone, Debug)]
pub struct LogFeedBuilder {
    /// Contract addresses whose logs are retrieved.
    pub addresses: Vec<Address>,
    pub start_block: u64,
    /// Confirmation depth applied by the internal block feed.
    pub offset: u64,
    pub poll_interval: Duration,
    pub cache_capacity: usize,
    pub name: String,
    cancel: CancellationToken,
}

impl Default for LogFeedBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LogFeedBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            addresses: Vec::new(),
            start_block: 0,
            offset: 0,
            poll_interval: DEFAULT_POLL_INTERVAL,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            name: "log-feed".to_owned(),
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn addresses(mut self, addresses: Vec<Address>) -> Self {
        self.addresses = addresses;
        self
    }

    #[must_use]
    pub fn start_block(mut self, start_block: u64) -> Self {
        self.start_block = start_block;
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
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

    #[must_use]
    pub fn cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Builds the feed and its internal, non-tracing block feed.
    ///
    /// # Errors
    ///
    /// [`FeedError::InvalidStartBlock`] if `start_block` is below `offset`.
    pub fn build<C: ChainClient>(self, client: Arc<C>) -> Result<LogFeed<C>, FeedError> {
        let blocks = BlockFeedBuilder::new()
            .start_block(self.start_block)
            .offset(self.offset)
            .poll_interval(self.poll_interval)
            .cache_capacity(self.cache_capacity)
            .cancellation(self.cancel)
            .name(format!("{}.blocks", self.name))
            .build(Arc::clone(&client))?;
        Ok(LogFeed {
            inner: Arc::new(Inner {
                client,
                blocks,
                addresses: self.addresses,
                name: self.name,
                subs: Mutex::new(Vec::new()),
                started: AtomicBool::new(false),
            }),
        })
    }
}

struct Inner<C: ChainClient> {
    client: Arc<C>,
    blocks: BlockFeed<C>,
    addresses: Vec<Address>,
    name: String,
    subs: Mutex<Vec<Subscriber<Log>>>,
    started: AtomicBool,
}

/// Per-address log feed driven by an internal [`BlockFeed`]. Cheap to clone.
pub struct LogFeed<C: ChainClient> {
    inner: Arc<Inner<C>>,
}

impl<C: ChainClient> Clone for LogFeed<C> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<C: ChainClient> LogFeed<C> {
    /// One-shot query for the logs of the last `blocks_ago` blocks, as of the current
    /// head. No confirmation offset is applied; intended for reconciliation passes.
    ///
    /// Logs come back in block order, then within-block order, exactly as returned by
    /// the chain client.
    ///
    /// # Errors
    ///
    /// Any chain-client error.
    pub async fn get_logs_for_last_blocks(&self, blocks_ago: u64) -> Result<Vec<Log>, FeedError> {
        let latest = self.inner.client.block_number().await?;
        let from = latest.saturating_sub(blocks_ago);
        let filter = self.address_filter(from, latest);
        self.inner.client.get_logs(&filter).await
    }

    /// Continuous mode: for every block produced by the internal block feed, fetches the
    /// block's logs restricted to the configured addresses, invokes
    /// [`LogHandler::handle_log`] once per log in order, then
    /// [`LogHandler::handle_after_block`] exactly once.
    ///
    /// Logs for block N are never delivered before block N-1's after-block call has
    /// returned. Returns the terminal error that stopped the loop, with the same
    /// semantics as [`BlockFeed::for_each_block`].
    pub async fn for_each_log(&self, handler: &mut (dyn LogHandler + '_)) -> FeedError {
        let mut per_block = PerBlock { feed: self, handler };
        self.inner.blocks.run_with_handler(&mut per_block).await
    }

    fn address_filter(&self, from: u64, to: u64) -> Filter {
        Filter::new()
            .address(self.inner.addresses.clone())
            .from_block(from)
            .to_block(to)
    }

    async fn run_subscribers(&self) -> FeedError {
        let terminal = {
            let mut fanout = LogFanout { subs: &self.inner.subs };
            self.for_each_log(&mut fanout).await
        };

        let mut subs = self.inner.subs.lock().await;
        for sub in subs.iter_mut() {
            if let Some(tx) = sub.terminal.take() {
                _ = tx.send(terminal.clone());
            }
        }

        terminal
    }

    fn spawn_loop(&self) {
        let feed = self.clone();
        tokio::spawn(async move {
            let terminal = feed.run_subscribers().await;
            info!(feed = %feed.inner.name, terminal = %terminal, "log feed stopped");
        });
    }
}

#[async_trait]
impl<C: ChainClient> Feed for LogFeed<C> {
    type Event = Log;

    async fn subscribe(&self, handler: Box<dyn EventHandler<Log>>) -> oneshot::Receiver<FeedError> {
        let (sub, rx) = Subscriber::new(handler);
        self.inner.subs.lock().await.push(sub);
        rx
    }

    fn start(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return;
        }
        self.spawn_loop();
    }

    fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst)
    }

    fn start_range(&self, start: u64, end: u64, rate: Option<u64>) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.blocks.set_range(start, end, rate);
        self.spawn_loop();
    }
}

impl<C: ChainClient> Reporter for LogFeed<C> {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn health(&self) -> Reports {
        let mut reports = vec![Report::ok("started", self.is_started().to_string())];
        reports.extend(self.inner.blocks.health().into_iter().map(|mut report| {
            report.name = format!("blocks.{}", report.name);
            report
        }));
        reports
    }
}

/// Fetches and fans out one block's logs, then signals the block boundary.
struct PerBlock<'a, C: ChainClient> {
    feed: &'a LogFeed<C>,
    handler: &'a mut (dyn LogHandler + 'a),
}

#[async_trait]
impl<C: ChainClient> EventHandler<BlockEvent> for PerBlock<'_, C> {
    async fn handle(&mut self, event: &BlockEvent) -> Result<(), FeedError> {
        let number = event.block.number;
        let filter = self.feed.address_filter(number, number);
        let logs = self.feed.inner.client.get_logs(&filter).await?;
        for log in &logs {
            self.handler.handle_log(Some(&event.block), log).await?;
        }
        self.handler.handle_after_block(&event.block).await
    }
}

/// Delivers each log to every registered subscriber; block boundaries are not part of
/// the channel-style subscription contract.
struct LogFanout<'a> {
    subs: &'a Mutex<Vec<Subscriber<Log>>>,
}

#[async_trait]
impl LogHandler for LogFanout<'_> {
    async fn handle_log(&mut self, _block: Option<&Block>, log: &Log) -> Result<(), FeedError> {
        let mut subs = self.subs.lock().await;
        for sub in subs.iter_mut() {
            sub.handler.handle(log).await?;
        }
        Ok(())
    }
}
