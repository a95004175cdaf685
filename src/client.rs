//! The chain RPC collaborator interface.
//!
//! Feeds are written against [`ChainClient`] rather than a concrete transport so the
//! follow loops can be exercised with a deterministic in-memory double (see
//! [`crate::test_utils::MockChainClient`]). The trait assumes no retry or backoff
//! behavior beyond what the implementation itself provides; any error it returns is
//! terminal for the subscription observing it.

use alloy::rpc::types::{trace::parity::LocalizedTransactionTrace, Filter, Log};
use async_trait::async_trait;

use crate::{domain::Block, FeedError};

/// Minimal chain node capability set used by the feeds.
#[async_trait]
pub trait ChainClient: Send + Sync + 'static {
    /// Returns the current head height.
    async fn block_number(&self) -> Result<u64, FeedError>;

    /// Returns the block at `number`, or `None` if the node does not know it.
    async fn block_by_number(&self, number: u64) -> Result<Option<Block>, FeedError>;

    /// Returns the intra-block traces for the block at `number`.
    async fn trace_block(&self, number: u64)
        -> Result<Vec<LocalizedTransactionTrace>, FeedError>;

    /// Returns the logs matching `filter`, in block order then log order.
    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, FeedError>;
}
