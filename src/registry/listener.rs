//! Classifies registry logs and routes typed messages to registered handlers.

use std::sync::Arc;

use alloy::{
    primitives::Address,
    rpc::types::Log,
    sol_types::SolEvent,
};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    client::ChainClient,
    domain::Block,
    feeds::{LogFeed, LogFeedBuilder, LogHandler},
    registry::{
        contracts::{AgentRegistry, Dispatch, ScannerRegistry},
        messages::{
            AgentMessage, AgentSaveMessage, DispatchMessage, ScannerMessage, ScannerSaveMessage,
        },
        resolver::RegistryResolver,
    },
    FeedError,
};

type MessageHandler<M> = Box<dyn FnMut(&M) -> Result<(), FeedError> + Send>;
type AfterBlockHandler = Box<dyn FnMut(&Block) -> Result<(), FeedError> + Send>;

/// Handler set routed to by the listener.
///
/// Every slot is optional: a recognized event with no registered handler is dropped
/// without error.
#[derive(Default)]
pub struct Handlers {
    /// Invoked once per block after all of its logs have been handled.
    pub after_block: Option<AfterBlockHandler>,

    pub save_agent: Option<MessageHandler<AgentSaveMessage>>,
    pub agent_action: Option<MessageHandler<AgentMessage>>,
    pub save_scanner: Option<MessageHandler<ScannerSaveMessage>>,
    pub scanner_action: Option<MessageHandler<ScannerMessage>>,
    pub dispatch: Option<MessageHandler<DispatchMessage>>,
}

/// Caller-supplied listener configuration.
pub struct ListenerConfig {
    pub name: String,
    /// First block height the underlying log feed evaluates.
    pub start_block: u64,
    /// Confirmation depth applied to the log feed.
    pub block_offset: u64,
    pub handlers: Handlers,
}

/// Watches the registry contracts and dispatches their events as typed messages.
pub struct Listener<C: ChainClient> {
    cancel: CancellationToken,
    handlers: Handlers,
    logs: LogFeed<C>,
    agent_addr: Address,
    scanner_addr: Address,
    dispatch_addr: Address,
}

impl<C: ChainClient> Listener<C> {
    /// Resolves the registry contract addresses and builds the listener and its log
    /// feed.
    ///
    /// # Errors
    ///
    /// Resolver failures and [`FeedError::InvalidStartBlock`] from the log feed
    /// builder.
    pub async fn new(
        client: Arc<C>,
        resolver: &dyn RegistryResolver,
        cfg: ListenerConfig,
        cancel: CancellationToken,
    ) -> Result<Self, FeedError> {
        let contracts = resolver.resolve_registry_contracts().await?;
        let logs = LogFeedBuilder::new()
            .name(cfg.name)
            .addresses(vec![
                contracts.agent_registry,
                contracts.scanner_registry,
                contracts.dispatch,
            ])
            .start_block(cfg.start_block)
            .offset(cfg.block_offset)
            .cancellation(cancel.clone())
            .build(client)?;

        Ok(Self {
            cancel,
            handlers: cfg.handlers,
            logs,
            agent_addr: contracts.agent_registry,
            scanner_addr: contracts.scanner_registry,
            dispatch_addr: contracts.dispatch,
        })
    }

    /// Returns the underlying log feed (shared handle).
    pub fn log_feed(&self) -> LogFeed<C> {
        self.logs.clone()
    }

    /// Continuous mode: follows the chain and dispatches every registry event.
    /// Returns the terminal error that stopped the feed.
    pub async fn listen(&mut self) -> FeedError {
        let logs = self.logs.clone();
        logs.for_each_log(self).await
    }

    /// One-shot reconciliation pass over the logs of the last `blocks_ago` blocks, as of
    /// the current head. Events are dispatched without block context.
    ///
    /// # Errors
    ///
    /// Chain-client errors and handler errors.
    pub async fn process_last_blocks(&mut self, blocks_ago: u64) -> Result<(), FeedError> {
        let logs = self.logs.clone();
        for log in logs.get_logs_for_last_blocks(blocks_ago).await? {
            self.handle_log(None, &log).await?;
        }
        Ok(())
    }

    fn handle_agent_registry_event(&mut self, log: &Log) -> Result<(), FeedError> {
        if is_event::<AgentRegistry::AgentUpdated>(log) {
            let event = decode::<AgentRegistry::AgentUpdated>(log)?;
            if let Some(handler) = self.handlers.save_agent.as_mut() {
                return handler(&AgentSaveMessage::from_updated(&event, tx_hash(log)));
            }
        } else if is_event::<AgentRegistry::AgentEnabled>(log) {
            let event = decode::<AgentRegistry::AgentEnabled>(log)?;
            if let Some(handler) = self.handlers.agent_action.as_mut() {
                return handler(&AgentMessage::from_enabled(&event, tx_hash(log)));
            }
        }
        Ok(())
    }

    fn handle_scanner_registry_event(&mut self, log: &Log) -> Result<(), FeedError> {
        if is_event::<ScannerRegistry::ScannerUpdated>(log) {
            let event = decode::<ScannerRegistry::ScannerUpdated>(log)?;
            if let Some(handler) = self.handlers.save_scanner.as_mut() {
                return handler(&ScannerSaveMessage::from_updated(&event, tx_hash(log)));
            }
        } else if is_event::<ScannerRegistry::ScannerEnabled>(log) {
            let event = decode::<ScannerRegistry::ScannerEnabled>(log)?;
            if let Some(handler) = self.handlers.scanner_action.as_mut() {
                return handler(&ScannerMessage::from_enabled(&event, tx_hash(log)));
            }
        }
        Ok(())
    }

    fn handle_dispatch_event(&mut self, log: &Log) -> Result<(), FeedError> {
        if is_event::<Dispatch::Link>(log) {
            let event = decode::<Dispatch::Link>(log)?;
            if let Some(handler) = self.handlers.dispatch.as_mut() {
                return handler(&DispatchMessage::from_link(&event, tx_hash(log)));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<C: ChainClient> LogHandler for Listener<C> {
    async fn handle_log(&mut self, _block: Option<&Block>, log: &Log) -> Result<(), FeedError> {
        if self.cancel.is_cancelled() {
            return Err(FeedError::Cancelled);
        }
        let source = log.address();
        if source == self.agent_addr {
            return self.handle_agent_registry_event(log);
        }
        if source == self.dispatch_addr {
            return self.handle_dispatch_event(log);
        }
        if source == self.scanner_addr {
            return self.handle_scanner_registry_event(log);
        }
        // Unwatched source: not an error, the feed may watch more addresses than it has
        // handlers for.
        debug!(address = %source, "ignoring log from unwatched contract");
        Ok(())
    }

    async fn handle_after_block(&mut self, block: &Block) -> Result<(), FeedError> {
        if self.cancel.is_cancelled() {
            return Err(FeedError::Cancelled);
        }
        if let Some(handler) = self.handlers.after_block.as_mut() {
            return handler(block);
        }
        Ok(())
    }
}

fn is_event<E: SolEvent>(log: &Log) -> bool {
    log.topic0() == Some(&E::SIGNATURE_HASH)
}

fn decode<E: SolEvent>(log: &Log) -> Result<E, FeedError> {
    E::decode_log(&log.inner)
        .map(|decoded| decoded.data)
        .map_err(|source| FeedError::Decode { event: E::SIGNATURE, source: Arc::new(source) })
}

fn tx_hash(log: &Log) -> String {
    log.transaction_hash.map(|hash| hash.to_string()).unwrap_or_default()
}
