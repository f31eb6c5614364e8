// SPDX-License-Identifier: PMPL-1.0-or-later
//! Live-tail and pump behaviour across log implementations

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use seqlog_core::{
    pump, CancellationToken, Item, JsonCodec, Log, LogError, MemLog, OffsetLog, QuerySpec, Sink,
    StoreLog,
};
use seqlog_storage::{InMemoryBackend, SharedBackend};

/// Collects every poured item.
#[derive(Default)]
struct Collect {
    items: Mutex<Vec<Item<i64>>>,
}

#[async_trait]
impl Sink<i64> for Collect {
    type Error = LogError;

    async fn pour(&self, item: Item<i64>, _cancel: &CancellationToken) -> Result<(), LogError> {
        self.items.lock().unwrap().push(item);
        Ok(())
    }
}

async fn live_wakeup(log: Arc<dyn Log<i64>>) {
    let token = CancellationToken::new();
    let mut qry = log.query(&[QuerySpec::Live(true)]).unwrap();

    // Nothing there yet: the first call must block.
    let blocked = tokio::time::timeout(Duration::from_millis(30), qry.next(&token)).await;
    assert!(blocked.is_err(), "live query returned before any append");

    let writer = Arc::clone(&log);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        writer.append(7).await.unwrap();
    });
    let item = tokio::time::timeout(Duration::from_secs(5), qry.next(&token))
        .await
        .expect("live query never woke up")
        .unwrap();
    assert_eq!(item, Some(Item::Value(7)));

    // Blocks again until the next append.
    let blocked = tokio::time::timeout(Duration::from_millis(30), qry.next(&token)).await;
    assert!(blocked.is_err());

    log.append(8).await.unwrap();
    let item = qry.next(&token).await.unwrap();
    assert_eq!(item, Some(Item::Value(8)));
}

#[tokio::test]
async fn test_live_wakeup_mem() {
    let log: MemLog<i64> = MemLog::new();
    live_wakeup(Arc::new(log)).await;
}

#[tokio::test]
async fn test_live_wakeup_store() {
    let backend: SharedBackend = Arc::new(InMemoryBackend::new());
    let log: StoreLog<i64> = StoreLog::open(backend, "live/", JsonCodec).await.unwrap();
    live_wakeup(Arc::new(log)).await;
}

#[tokio::test]
async fn test_live_wakeup_offset() {
    let dir = tempfile::tempdir().unwrap();
    let log: OffsetLog<i64> = OffsetLog::open(dir.path().join("live"), JsonCodec).unwrap();
    live_wakeup(Arc::new(log)).await;
}

#[tokio::test]
async fn test_live_query_from_bound_skips_history() {
    let log: MemLog<i64> = MemLog::new();
    for v in [1, 2, 3] {
        log.append(v).await.unwrap();
    }
    let token = CancellationToken::new();
    let mut qry = log
        .query(&[QuerySpec::Live(true), QuerySpec::Gt(2), QuerySpec::SeqWrap(true)])
        .unwrap();

    let writer = log.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        writer.append(4).await.unwrap();
    });
    let item = qry.next(&token).await.unwrap().unwrap();
    assert_eq!(item.seq(), Some(3));
    assert_eq!(item.into_value(), Some(4));
}

#[tokio::test]
async fn test_pump_drains_bounded_query() {
    let log: MemLog<i64> = MemLog::new();
    for v in 0..10 {
        log.append(v).await.unwrap();
    }
    let sink = Collect::default();
    let mut qry = log.query(&[QuerySpec::Gte(5)]).unwrap();
    let poured = pump(&mut qry, &sink, &CancellationToken::new()).await.unwrap();
    assert_eq!(poured, 5);
    let items = sink.items.lock().unwrap();
    assert_eq!(items.first(), Some(&Item::Value(5)));
    assert_eq!(items.last(), Some(&Item::Value(9)));
}

#[tokio::test]
async fn test_pump_live_stops_on_cancel() {
    let log: MemLog<i64> = MemLog::new();
    log.append(1).await.unwrap();
    let sink = Arc::new(Collect::default());
    let token = CancellationToken::new();

    let mut qry = log.query(&[QuerySpec::Live(true)]).unwrap();
    let task_sink = Arc::clone(&sink);
    let task_token = token.clone();
    let task = tokio::spawn(async move { pump(&mut qry, task_sink.as_ref(), &task_token).await });

    log.append(2).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    token.cancel();

    let result = task.await.unwrap();
    assert!(result.unwrap_err().is_cancelled());
    assert_eq!(sink.items.lock().unwrap().len(), 2);
    assert_eq!(log.seq().subscriber_count(), 0);
}
