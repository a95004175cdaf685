//! End-to-end follow-loop behavior against a scripted chain client.

use std::{
    sync::{Arc, Mutex},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use tokio_util::sync::CancellationToken;

use chain_feeds::{
    domain::BlockEvent,
    health::Reporter,
    test_utils::{call_trace, chain, MockChainClient},
    handler_fn, BlockFeed, BlockFeedBuilder, Feed, FeedError,
};

fn feed_with(
    client: &Arc<MockChainClient>,
    configure: impl FnOnce(BlockFeedBuilder) -> BlockFeedBuilder,
) -> BlockFeed<MockChainClient> {
    configure(BlockFeedBuilder::new().poll_interval(Duration::from_millis(10)))
        .build(Arc::clone(client))
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn delivers_blocks_in_order_and_signals_terminal() {
    let client = Arc::new(MockChainClient::new());
    client.insert_blocks(chain(3));
    client.push_heads([1, 2, 3]);

    let cancel = CancellationToken::new();
    let feed = feed_with(&client, |b| b.start_block(1).cancellation(cancel.clone()));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let rx = feed
        .subscribe(handler_fn(move |event: &BlockEvent| {
            let mut seen = sink.lock().unwrap();
            seen.push(event.block.clone());
            if seen.len() == 3 {
                cancel.cancel();
            }
            Ok(())
        }))
        .await;

    let terminal = feed.for_each_block().await;
    assert!(matches!(terminal, FeedError::Cancelled));
    assert!(matches!(rx.await, Ok(FeedError::Cancelled)));

    let seen = seen.lock().unwrap();
    assert_eq!(seen.iter().map(|b| b.number).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert_eq!(seen[1].parent_hash, seen[0].hash);
    assert_eq!(seen[2].parent_hash, seen[1].hash);
}

#[tokio::test(start_paused = true)]
async fn handler_error_becomes_the_terminal() {
    let client = Arc::new(MockChainClient::new());
    client.insert_blocks(chain(2));
    client.push_heads([2]);

    let feed = feed_with(&client, |b| b.start_block(1));
    let rx = feed
        .subscribe(handler_fn(|event: &BlockEvent| {
            if event.block.number == 2 {
                return Err(anyhow::anyhow!("sink unavailable").into());
            }
            Ok(())
        }))
        .await;

    let terminal = feed.for_each_block().await;
    assert!(matches!(terminal, FeedError::Handler(_)));
    assert!(matches!(rx.await, Ok(FeedError::Handler(_))));
}

#[tokio::test(start_paused = true)]
async fn stale_blocks_are_skipped_without_stalling_the_cursor() {
    let client = Arc::new(MockChainClient::new());
    let mut blocks = chain(3);
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
    blocks[1].timestamp = now - 3600;
    client.insert_blocks(blocks);
    client.push_heads([3]);

    let cancel = CancellationToken::new();
    let feed = feed_with(&client, |b| {
        b.start_block(1)
            .max_block_age(Duration::from_secs(600))
            .cancellation(cancel.clone())
    });

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    feed.subscribe(handler_fn(move |event: &BlockEvent| {
        let mut seen = sink.lock().unwrap();
        seen.push(event.block.number);
        if event.block.number == 3 {
            cancel.cancel();
        }
        Ok(())
    }))
    .await;

    let terminal = feed.for_each_block().await;
    assert!(matches!(terminal, FeedError::Cancelled));
    assert_eq!(*seen.lock().unwrap(), vec![1, 3]);
}

#[tokio::test(start_paused = true)]
async fn confirmation_offset_gates_fetches_on_the_head() {
    let client = Arc::new(MockChainClient::new());
    client.insert_blocks(chain(4));
    client.push_heads([3, 3, 3, 3, 4]);

    let cancel = CancellationToken::new();
    let feed = feed_with(&client, |b| {
        b.start_block(2).offset(1).cancellation(cancel.clone())
    });

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    feed.subscribe(handler_fn(move |event: &BlockEvent| {
        let mut seen = sink.lock().unwrap();
        seen.push(event.block.number);
        if seen.len() == 3 {
            cancel.cancel();
        }
        Ok(())
    }))
    .await;

    let terminal = feed.for_each_block().await;
    assert!(matches!(terminal, FeedError::Cancelled));
    // heads 3,3 allow heights 1 and 2; the two parked polls fetch nothing; head 4
    // releases height 3.
    assert_eq!(client.fetched_blocks(), vec![1, 2, 3]);
    assert_eq!(client.head_calls(), 5);
    assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn tracing_feed_attaches_block_traces() {
    let client = Arc::new(MockChainClient::new());
    client.insert_blocks(chain(2));
    client.push_heads([2]);
    client.set_traces(1, vec![call_trace(1), call_trace(1)]);

    let cancel = CancellationToken::new();
    let feed = feed_with(&client, |b| {
        b.start_block(1).tracing(true).cancellation(cancel.clone())
    });

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    feed.subscribe(handler_fn(move |event: &BlockEvent| {
        let mut seen = sink.lock().unwrap();
        seen.push((event.block.number, event.traces.len()));
        if event.block.number == 2 {
            cancel.cancel();
        }
        Ok(())
    }))
    .await;

    let terminal = feed.for_each_block().await;
    assert!(matches!(terminal, FeedError::Cancelled));
    assert_eq!(*seen.lock().unwrap(), vec![(1, 2), (2, 0)]);
}

#[tokio::test(start_paused = true)]
async fn trace_fetch_failure_is_terminal() {
    let client = Arc::new(MockChainClient::new());
    client.insert_blocks(chain(1));
    client.push_heads([1]);
    client.fail_trace(1);

    let feed = feed_with(&client, |b| b.start_block(1).tracing(true));
    let delivered = Arc::new(Mutex::new(0u32));
    let sink = Arc::clone(&delivered);
    let rx = feed
        .subscribe(handler_fn(move |_event: &BlockEvent| {
            *sink.lock().unwrap() += 1;
            Ok(())
        }))
        .await;

    let terminal = feed.for_each_block().await;
    assert!(matches!(terminal, FeedError::Rpc(_)));
    assert!(matches!(rx.await, Ok(FeedError::Rpc(_))));
    assert_eq!(*delivered.lock().unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn range_mode_delivers_the_bounds_and_completes() {
    let client = Arc::new(MockChainClient::new());
    client.insert_blocks(chain(5));
    client.push_heads([5]);

    let feed = feed_with(&client, |b| b);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let rx = feed
        .subscribe(handler_fn(move |event: &BlockEvent| {
            sink.lock().unwrap().push(event.block.number);
            Ok(())
        }))
        .await;

    feed.start_range(1, 5, Some(1000));
    assert!(feed.is_started());

    assert!(matches!(rx.await, Ok(FeedError::EndBlockReached)));
    assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3, 4, 5]);
}

#[tokio::test(start_paused = true)]
async fn reorged_block_is_delivered_and_counted() {
    let client = Arc::new(MockChainClient::new());
    let mut blocks = chain(2);
    // break the parent link so block 2 contradicts the cached hash of block 1
    blocks[1].parent_hash = chain_feeds::test_utils::block_hash(1, 1);
    client.insert_blocks(blocks);
    client.push_heads([2]);

    let cancel = CancellationToken::new();
    let feed = feed_with(&client, |b| b.start_block(1).cancellation(cancel.clone()));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    feed.subscribe(handler_fn(move |event: &BlockEvent| {
        let mut seen = sink.lock().unwrap();
        seen.push(event.block.number);
        if event.block.number == 2 {
            cancel.cancel();
        }
        Ok(())
    }))
    .await;

    let terminal = feed.for_each_block().await;
    assert!(matches!(terminal, FeedError::Cancelled));
    assert_eq!(*seen.lock().unwrap(), vec![1, 2]);

    let reorgs = feed
        .health()
        .into_iter()
        .find(|report| report.name == "reorgs-detected")
        .unwrap();
    assert_eq!(reorgs.details, "1");
}
