use std::sync::Arc;

use alloy::transports::{RpcError, TransportErrorKind};
use thiserror::Error;

use crate::registry::Action;

/// Errors emitted by feeds and the registry listener.
///
/// A subscription's follow loop ends with exactly one `FeedError` value — its terminal.
/// [`FeedError::Cancelled`] and [`FeedError::EndBlockReached`] are ordinary shutdown
/// outcomes; everything else indicates a failure the caller must decide how to recover
/// from (typically by restarting from the last processed height).
///
/// Values are `Clone` so one terminal can be fanned out to every subscriber.
#[derive(Error, Debug, Clone)]
pub enum FeedError {
    /// The chain client's transport returned an error.
    #[error("rpc error: {0}")]
    Rpc(Arc<RpcError<TransportErrorKind>>),

    /// A block that passed the eligibility check could not be retrieved.
    #[error("block {0} not found")]
    BlockNotFound(u64),

    /// The cancellation token fired. Checked before each unit of work.
    #[error("feed cancelled")]
    Cancelled,

    /// A bounded range pass processed its final block.
    #[error("end block reached")]
    EndBlockReached,

    /// A recognized log failed ABI decoding.
    #[error("failed to decode {event} log: {source}")]
    Decode {
        event: &'static str,
        source: Arc<alloy::sol_types::Error>,
    },

    /// A wire message was not valid JSON for its schema.
    #[error("invalid message: {0}")]
    InvalidMessage(Arc<serde_json::Error>),

    /// A wire message carried a different action tag than the parser expects.
    #[error("unexpected action {actual} for {expected} message")]
    UnexpectedAction { expected: Action, actual: Action },

    /// A caller-supplied handler failed; the value is the handler's own error.
    #[error("handler failed: {0}")]
    Handler(Arc<anyhow::Error>),

    /// The configured start block is below the confirmation offset.
    #[error("start block must be at least the confirmation offset")]
    InvalidStartBlock,
}

impl From<RpcError<TransportErrorKind>> for FeedError {
    fn from(error: RpcError<TransportErrorKind>) -> Self {
        FeedError::Rpc(Arc::new(error))
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(error: serde_json::Error) -> Self {
        FeedError::InvalidMessage(Arc::new(error))
    }
}

impl From<anyhow::Error> for FeedError {
    fn from(error: anyhow::Error) -> Self {
        FeedError::Handler(Arc::new(error))
    }
}
