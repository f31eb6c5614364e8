// SPDX-License-Identifier: PMPL-1.0-or-later
//! Multilog behaviour over the in-memory and redb backends

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use seqlog_core::{
    pump, Addr, CancellationToken, Item, JsonCodec, Log, MemLog, QuerySpec, Seq, SeqWrapped, Sink,
};
use seqlog_multilog::{has, MultiLog, MultiLogError, MultiLogSink, SinkFunc, StoreMultiLog};
use seqlog_storage::{InMemoryBackend, RedbBackend, SharedBackend};
use serde::{Deserialize, Serialize};

fn mem_multilog() -> StoreMultiLog<String> {
    let backend: SharedBackend = Arc::new(InMemoryBackend::new());
    StoreMultiLog::new(backend, JsonCodec)
}

async fn values(log: &dyn Log<String>) -> Vec<String> {
    log.query(&[])
        .unwrap()
        .collect(&CancellationToken::new())
        .await
        .unwrap()
        .into_iter()
        .filter_map(Item::into_value)
        .collect()
}

#[tokio::test]
async fn test_sublogs_are_isolated() {
    let mlog = mem_multilog();
    let a = mlog.get(&Addr::from("a")).await.unwrap();
    let ab = mlog.get(&Addr::from("ab")).await.unwrap();

    assert_eq!(a.append("a0".into()).await.unwrap(), 0);
    assert_eq!(ab.append("ab0".into()).await.unwrap(), 0);
    assert_eq!(a.append("a1".into()).await.unwrap(), 1);

    assert_eq!(values(a.as_ref()).await, vec!["a0", "a1"]);
    assert_eq!(values(ab.as_ref()).await, vec!["ab0"]);
}

#[tokio::test]
async fn test_handles_for_one_address_share_the_head() {
    let mlog = mem_multilog();
    let addr = Addr::from("feed");
    let first = mlog.get(&addr).await.unwrap();
    let second = mlog.get(&addr).await.unwrap();

    first.append("x".into()).await.unwrap();
    assert_eq!(second.current_seq(), 0);
    assert_eq!(second.get(0).await.unwrap(), "x");
}

#[tokio::test]
async fn test_list_only_reports_written_addresses() {
    let mlog = mem_multilog();
    let _untouched = mlog.get(&Addr::from("empty")).await.unwrap();
    for name in ["zed", "alice", "bob"] {
        let log = mlog.get(&Addr::from(name)).await.unwrap();
        log.append(name.to_string()).await.unwrap();
    }

    let listed = mlog.list().await.unwrap();
    assert_eq!(
        listed,
        vec![Addr::from("alice"), Addr::from("bob"), Addr::from("zed")]
    );
}

#[tokio::test]
async fn test_has_tracks_content() {
    let mlog = mem_multilog();
    let addr = Addr::from("maybe");
    assert!(!has(&mlog, &addr).await.unwrap());

    mlog.get(&addr).await.unwrap().append("v".into()).await.unwrap();
    assert!(has(&mlog, &addr).await.unwrap());

    mlog.delete(&addr).await.unwrap();
    assert!(!has(&mlog, &addr).await.unwrap());
}

#[tokio::test]
async fn test_delete_invalidates_old_handles() {
    let mlog = mem_multilog();
    let addr = Addr::from("doomed");
    let old = mlog.get(&addr).await.unwrap();
    old.append("one".into()).await.unwrap();
    old.append("two".into()).await.unwrap();

    mlog.delete(&addr).await.unwrap();

    assert!(old.get(0).await.unwrap_err().is_sublog_deleted());
    assert!(old.append("three".into()).await.unwrap_err().is_sublog_deleted());
    assert!(old.query(&[]).err().unwrap().is_sublog_deleted());

    let fresh = mlog.get(&addr).await.unwrap();
    assert_eq!(fresh.current_seq(), -1);
    assert_eq!(fresh.append("again".into()).await.unwrap(), 0);
    assert!(mlog.list().await.unwrap().contains(&addr));
}

#[tokio::test]
async fn test_closing_one_handle_keeps_the_sublog_open() {
    let mlog = mem_multilog();
    let addr = Addr::from("shared");
    let first = mlog.get(&addr).await.unwrap();
    let watcher = mlog.get(&addr).await.unwrap();
    first.append("one".into()).await.unwrap();
    first.close().await.unwrap();

    assert!(matches!(
        first.append("nope".into()).await,
        Err(seqlog_core::LogError::Closed)
    ));
    assert!(!watcher.seq().is_closed());

    let again = mlog.get(&addr).await.unwrap();
    assert_eq!(again.append("two".into()).await.unwrap(), 1);
    assert_eq!(again.get(0).await.unwrap(), "one");
    assert_eq!(watcher.current_seq(), 1);
    assert_eq!(values(watcher.as_ref()).await, vec!["one", "two"]);
}

#[tokio::test]
async fn test_list_skips_keys_of_other_owners() {
    let backend: SharedBackend = Arc::new(InMemoryBackend::new());
    let mlog: StoreMultiLog<String> = StoreMultiLog::new(Arc::clone(&backend), JsonCodec);
    mlog.get(&Addr::from("a")).await.unwrap().append("x".into()).await.unwrap();
    // An index sharing the backend writes its sequence marker here.
    backend.put(b"__current_seq", &7u64.to_be_bytes()).await.unwrap();

    assert_eq!(mlog.list().await.unwrap(), vec![Addr::from("a")]);
}

#[tokio::test]
async fn test_delete_wakes_live_query() {
    let mlog = mem_multilog();
    let addr = Addr::from("tail");
    let log = mlog.get(&addr).await.unwrap();
    let mut qry = log.query(&[QuerySpec::Live(true)]).unwrap();

    let task = tokio::spawn(async move { qry.next(&CancellationToken::new()).await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    mlog.delete(&addr).await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("live query was not woken by delete")
        .unwrap();
    assert!(result.unwrap_err().is_sublog_deleted());
}

#[tokio::test]
async fn test_live_query_on_sublog() {
    let mlog = mem_multilog();
    let addr = Addr::from("live");
    let reader = mlog.get(&addr).await.unwrap();
    let mut qry = reader.query(&[QuerySpec::Live(true), QuerySpec::SeqWrap(true)]).unwrap();

    let writer = mlog.get(&addr).await.unwrap();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        writer.append("hello".into()).await.unwrap();
    });

    let item = tokio::time::timeout(Duration::from_secs(5), qry.next(&CancellationToken::new()))
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(item.seq(), Some(0));
    assert_eq!(item.into_value().as_deref(), Some("hello"));
}

#[tokio::test]
async fn test_closed_multilog_rejects_operations() {
    let mlog = mem_multilog();
    let log = mlog.get(&Addr::from("x")).await.unwrap();
    mlog.close().await.unwrap();

    assert!(matches!(
        mlog.get(&Addr::from("x")).await,
        Err(MultiLogError::Closed)
    ));
    assert!(log.append("late".into()).await.is_err());
    // Closing twice is fine.
    mlog.close().await.unwrap();
}

#[tokio::test]
async fn test_redb_multilog_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("multi.redb");
    {
        let backend: SharedBackend = Arc::new(RedbBackend::open(&path).unwrap());
        let mlog: StoreMultiLog<String> = StoreMultiLog::new(backend, JsonCodec);
        for (addr, v) in [("a", "1"), ("b", "2"), ("a", "3")] {
            mlog.get(&Addr::from(addr))
                .await
                .unwrap()
                .append(v.to_string())
                .await
                .unwrap();
        }
        mlog.close().await.unwrap();
    }

    let backend: SharedBackend = Arc::new(RedbBackend::open(&path).unwrap());
    let mlog: StoreMultiLog<String> = StoreMultiLog::new(backend, JsonCodec);
    assert_eq!(mlog.list().await.unwrap(), vec![Addr::from("a"), Addr::from("b")]);
    let a = mlog.get(&Addr::from("a")).await.unwrap();
    assert_eq!(a.current_seq(), 1);
    assert_eq!(values(a.as_ref()).await, vec!["1", "3"]);
}

// --- MultiLogSink ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Post {
    author: String,
    text: String,
}

/// Routes each post into the sub-log of its author.
struct ByAuthor;

#[async_trait]
impl SinkFunc<Post> for ByAuthor {
    async fn apply(
        &self,
        _seq: Seq,
        value: Post,
        mlog: &dyn MultiLog<Post>,
    ) -> Result<(), MultiLogError> {
        let log = mlog.get(&Addr::from(value.author.as_str())).await?;
        log.append(value).await?;
        Ok(())
    }
}

fn post(author: &str, text: &str) -> Post {
    Post {
        author: author.into(),
        text: text.into(),
    }
}

#[tokio::test]
async fn test_sink_routes_stream_into_sublogs() {
    let source: MemLog<Post> = MemLog::new();
    for p in [post("ann", "hi"), post("bo", "yo"), post("ann", "bye")] {
        source.append(p).await.unwrap();
    }

    let backend: SharedBackend = Arc::new(InMemoryBackend::new());
    let sink = MultiLogSink::new(StoreMultiLog::new(backend, JsonCodec), ByAuthor);
    let mut qry = source.query(&[QuerySpec::SeqWrap(true)]).unwrap();
    let poured = pump(&mut qry, &sink, &CancellationToken::new()).await.unwrap();
    assert_eq!(poured, 3);

    assert_eq!(sink.list().await.unwrap(), vec![Addr::from("ann"), Addr::from("bo")]);
    let ann = sink.get(&Addr::from("ann")).await.unwrap();
    assert_eq!(ann.current_seq(), 1);
    assert_eq!(ann.get(1).await.unwrap(), post("ann", "bye"));
}

#[tokio::test]
async fn test_sink_sublogs_are_read_only() {
    let backend: SharedBackend = Arc::new(InMemoryBackend::new());
    let sink = MultiLogSink::new(StoreMultiLog::new(backend, JsonCodec), ByAuthor);
    let log = sink.get(&Addr::from("ann")).await.unwrap();
    let err = log.append(post("ann", "sneaky")).await.unwrap_err();
    assert!(matches!(err, seqlog_core::LogError::ReadOnly));

    // The wrapped multilog stays writable.
    sink.inner()
        .get(&Addr::from("ann"))
        .await
        .unwrap()
        .append(post("ann", "ok"))
        .await
        .unwrap();
    assert_eq!(log.current_seq(), 0);
}

#[tokio::test]
async fn test_sink_requires_seq_wrapped_items() {
    let source: MemLog<Post> = MemLog::new();
    source.append(post("ann", "hi")).await.unwrap();

    let backend: SharedBackend = Arc::new(InMemoryBackend::new());
    let sink = MultiLogSink::new(StoreMultiLog::new(backend, JsonCodec), ByAuthor);
    let mut qry = source.query(&[]).unwrap();
    let err = pump(&mut qry, &sink, &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, MultiLogError::MissingSeq));
}

#[tokio::test]
async fn test_cancelled_pour_routes_nothing() {
    let backend: SharedBackend = Arc::new(InMemoryBackend::new());
    let sink = MultiLogSink::new(StoreMultiLog::new(backend, JsonCodec), ByAuthor);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = sink
        .pour(Item::Wrapped(SeqWrapped::new(0, post("ann", "late"))), &cancel)
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    assert!(sink.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_closing_a_sink_reader_leaves_the_writer_alone() {
    let backend: SharedBackend = Arc::new(InMemoryBackend::new());
    let sink = MultiLogSink::new(StoreMultiLog::new(backend, JsonCodec), ByAuthor);
    let addr = Addr::from("ann");
    let reader = sink.get(&addr).await.unwrap();
    reader.close().await.unwrap();
    assert!(reader.query(&[]).is_err());

    let source: MemLog<Post> = MemLog::new();
    source.append(post("ann", "after")).await.unwrap();
    let mut items = source.query(&[QuerySpec::SeqWrap(true)]).unwrap();
    pump(&mut items, &sink, &CancellationToken::new()).await.unwrap();

    let fresh = sink.get(&addr).await.unwrap();
    assert_eq!(fresh.get(0).await.unwrap(), post("ann", "after"));
}
