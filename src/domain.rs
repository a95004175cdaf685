//! Domain types delivered by the feeds.

use alloy::{primitives::B256, rpc::types::trace::parity::LocalizedTransactionTrace};
use serde::{Deserialize, Serialize};

/// A chain block as seen by the feeds.
///
/// For two blocks delivered consecutively by one subscription (no skip in between),
/// `next.parent_hash == previous.hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub hash: B256,
    #[serde(rename = "parentHash")]
    pub parent_hash: B256,
    pub number: u64,
    /// Unix timestamp (seconds) from the block header.
    pub timestamp: u64,
}

/// Kind tag carried by a [`BlockEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Block,
}

/// Unit of delivery to block subscribers.
#[derive(Debug, Clone)]
pub struct BlockEvent {
    pub event_type: EventType,
    pub block: Block,
    /// Populated only when the producing feed was built with tracing enabled.
    pub traces: Vec<LocalizedTransactionTrace>,
}

impl BlockEvent {
    pub fn new(block: Block) -> Self {
        Self { event_type: EventType::Block, block, traces: Vec::new() }
    }

    pub fn with_traces(block: Block, traces: Vec<LocalizedTransactionTrace>) -> Self {
        Self { event_type: EventType::Block, block, traces }
    }
}
