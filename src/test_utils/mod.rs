//! Deterministic in-memory doubles and fixtures for exercising the feeds.
//!
//! [`MockChainClient`] plays back a scripted sequence of head heights and serves blocks,
//! traces and logs from in-memory maps, while recording the calls the feeds make so
//! tests can assert on fetch order and poll counts.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::Mutex as StdMutex,
    time::{SystemTime, UNIX_EPOCH},
};

use alloy::{
    primitives::{keccak256, Address, Bytes, B256, U256},
    rpc::types::{
        trace::parity::{
            Action, CallAction, CallType, LocalizedTransactionTrace, TransactionTrace,
        },
        Filter, Log,
    },
    sol_types::SolEvent,
    transports::TransportErrorKind,
};
use async_trait::async_trait;

use crate::{client::ChainClient, domain::Block, FeedError};

#[derive(Default)]
struct State {
    heads: VecDeque<u64>,
    blocks: HashMap<u64, Block>,
    traces: HashMap<u64, Vec<LocalizedTransactionTrace>>,
    trace_failures: HashSet<u64>,
    logs: HashMap<u64, Vec<Log>>,
    head_calls: u64,
    fetched_blocks: Vec<u64>,
}

/// Scripted [`ChainClient`] double.
///
/// `block_number` consumes the scripted head sequence one entry per call and keeps
/// repeating the final entry once the script runs out, so a follow loop can keep polling
/// a parked head without the test having to script every poll.
#[derive(Default)]
pub struct MockChainClient {
    state: StdMutex<State>,
}

impl MockChainClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends heights to the head script.
    pub fn push_heads(&self, heads: impl IntoIterator<Item = u64>) {
        self.state.lock().unwrap().heads.extend(heads);
    }

    pub fn insert_block(&self, block: Block) {
        self.state.lock().unwrap().blocks.insert(block.number, block);
    }

    pub fn insert_blocks(&self, blocks: impl IntoIterator<Item = Block>) {
        let mut state = self.state.lock().unwrap();
        for block in blocks {
            state.blocks.insert(block.number, block);
        }
    }

    pub fn set_traces(&self, number: u64, traces: Vec<LocalizedTransactionTrace>) {
        self.state.lock().unwrap().traces.insert(number, traces);
    }

    /// Makes `trace_block` fail for `number` with a transport error.
    pub fn fail_trace(&self, number: u64) {
        self.state.lock().unwrap().trace_failures.insert(number);
    }

    pub fn push_log(&self, number: u64, log: Log) {
        self.state.lock().unwrap().logs.entry(number).or_default().push(log);
    }

    /// Number of `block_number` calls observed so far.
    pub fn head_calls(&self) -> u64 {
        self.state.lock().unwrap().head_calls
    }

    /// Heights passed to `block_by_number`, in call order.
    pub fn fetched_blocks(&self) -> Vec<u64> {
        self.state.lock().unwrap().fetched_blocks.clone()
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn block_number(&self) -> Result<u64, FeedError> {
        let mut state = self.state.lock().unwrap();
        state.head_calls += 1;
        if state.heads.len() > 1 {
            Ok(state.heads.pop_front().unwrap_or_default())
        } else {
            state.heads.front().copied().ok_or(FeedError::BlockNotFound(0))
        }
    }

    async fn block_by_number(&self, number: u64) -> Result<Option<Block>, FeedError> {
        let mut state = self.state.lock().unwrap();
        state.fetched_blocks.push(number);
        Ok(state.blocks.get(&number).cloned())
    }

    async fn trace_block(
        &self,
        number: u64,
    ) -> Result<Vec<LocalizedTransactionTrace>, FeedError> {
        let state = self.state.lock().unwrap();
        if state.trace_failures.contains(&number) {
            return Err(TransportErrorKind::custom_str("trace backend unavailable").into());
        }
        Ok(state.traces.get(&number).cloned().unwrap_or_default())
    }

    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, FeedError> {
        let state = self.state.lock().unwrap();
        let from = filter
            .block_option
            .get_from_block()
            .and_then(|tag| tag.as_number())
            .unwrap_or(0);
        let to = filter
            .block_option
            .get_to_block()
            .and_then(|tag| tag.as_number())
            .unwrap_or(u64::MAX);

        let mut matched = Vec::new();
        for number in from..=to {
            let Some(logs) = state.logs.get(&number) else { continue };
            for log in logs {
                if filter.address.matches(&log.address()) {
                    matched.push(log.clone());
                }
            }
        }
        Ok(matched)
    }
}

/// Builds a parent-linked chain of `len` blocks numbered `1..=len`, timestamped now.
pub fn chain(len: u64) -> Vec<Block> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let mut blocks = Vec::with_capacity(len as usize);
    let mut parent_hash = B256::ZERO;
    for number in 1..=len {
        let hash = block_hash(number, 0);
        blocks.push(Block { hash, parent_hash, number, timestamp: now });
        parent_hash = hash;
    }
    blocks
}

/// Deterministic hash for block `number`; a different `fork` yields a different hash at
/// the same height, which is how reorg fixtures are built.
pub fn block_hash(number: u64, fork: u64) -> B256 {
    let mut seed = [0u8; 16];
    seed[..8].copy_from_slice(&number.to_be_bytes());
    seed[8..].copy_from_slice(&fork.to_be_bytes());
    keccak256(seed)
}

/// Minimal call trace localized to block `number`.
pub fn call_trace(number: u64) -> LocalizedTransactionTrace {
    LocalizedTransactionTrace {
        trace: TransactionTrace {
            action: Action::Call(CallAction {
                from: Address::ZERO,
                call_type: CallType::Call,
                gas: 21_000,
                input: Bytes::new(),
                to: Address::ZERO,
                value: U256::ZERO,
            }),
            error: None,
            result: None,
            subtraces: 0,
            trace_address: Vec::new(),
        },
        block_hash: Some(block_hash(number, 0)),
        block_number: Some(number),
        transaction_hash: Some(block_hash(number, u64::MAX)),
        transaction_position: Some(0),
    }
}

/// Builds an RPC log carrying `event`, emitted by `address` in block `number`.
pub fn event_log<E: SolEvent>(address: Address, number: u64, event: &E) -> Log {
    Log {
        inner: alloy::primitives::Log { address, data: event.encode_log_data() },
        block_number: Some(number),
        block_hash: Some(block_hash(number, 0)),
        transaction_hash: Some(block_hash(number, u64::MAX)),
        ..Default::default()
    }
}
