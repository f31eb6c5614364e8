// SPDX-License-Identifier: PMPL-1.0-or-later
//! Bitmap multilog: sequence-number sub-logs over the in-memory and redb backends

use std::sync::Arc;
use std::time::Duration;

use seqlog_core::{Addr, CancellationToken, Item, Log, LogError, QuerySpec, Seq};
use seqlog_multilog::{has, MultiLog, MultiLogError, RoaringMultiLog};
use seqlog_storage::{InMemoryBackend, RedbBackend, SharedBackend};

fn mem_multilog() -> RoaringMultiLog {
    let backend: SharedBackend = Arc::new(InMemoryBackend::new());
    RoaringMultiLog::new(backend)
}

async fn members(log: &dyn Log<Seq>, specs: &[QuerySpec]) -> Vec<Seq> {
    log.query(specs)
        .unwrap()
        .collect(&CancellationToken::new())
        .await
        .unwrap()
        .into_iter()
        .filter_map(Item::into_value)
        .collect()
}

#[tokio::test]
async fn test_positions_map_to_appended_sequences() {
    let mlog = mem_multilog();
    let log = mlog.get(&Addr::from("ann")).await.unwrap();
    assert_eq!(log.current_seq(), -1);

    for (pos, main_seq) in [3i64, 8, 1_000_000].into_iter().enumerate() {
        assert_eq!(log.append(main_seq).await.unwrap(), pos as Seq);
    }
    assert_eq!(log.get(1).await.unwrap(), 8);
    assert!(log.get(3).await.unwrap_err().is_out_of_bounds());

    assert_eq!(members(log.as_ref(), &[]).await, vec![3, 8, 1_000_000]);
    assert_eq!(
        members(log.as_ref(), &[QuerySpec::Reverse(true), QuerySpec::Limit(2)]).await,
        vec![1_000_000, 8]
    );
    assert_eq!(members(log.as_ref(), &[QuerySpec::Gt(0)]).await, vec![8, 1_000_000]);
}

#[tokio::test]
async fn test_out_of_order_and_negative_values_are_rejected() {
    let mlog = mem_multilog();
    let log = mlog.get(&Addr::from("a")).await.unwrap();
    log.append(5).await.unwrap();

    assert!(matches!(log.append(5).await, Err(LogError::InvalidValue(_))));
    assert!(matches!(log.append(2).await, Err(LogError::InvalidValue(_))));
    assert!(matches!(log.append(-1).await, Err(LogError::InvalidValue(_))));
    assert_eq!(log.current_seq(), 0);
    assert_eq!(log.append(6).await.unwrap(), 1);
}

#[tokio::test]
async fn test_list_reports_written_addresses_in_order() {
    let backend: SharedBackend = Arc::new(InMemoryBackend::new());
    let mlog = RoaringMultiLog::new(Arc::clone(&backend));
    let _untouched = mlog.get(&Addr::from("empty")).await.unwrap();
    for (i, name) in ["zed", "alice", "bob"].into_iter().enumerate() {
        mlog.get(&Addr::from(name)).await.unwrap().append(i as Seq).await.unwrap();
    }
    backend.put(b"__current_seq", &3u64.to_be_bytes()).await.unwrap();

    assert_eq!(
        mlog.list().await.unwrap(),
        vec![Addr::from("alice"), Addr::from("bob"), Addr::from("zed")]
    );
}

#[tokio::test]
async fn test_delete_invalidates_handles_and_starts_over() {
    let mlog = mem_multilog();
    let addr = Addr::from("gone");
    let old = mlog.get(&addr).await.unwrap();
    old.append(10).await.unwrap();
    old.append(11).await.unwrap();
    assert!(has(&mlog, &addr).await.unwrap());

    mlog.delete(&addr).await.unwrap();
    assert!(old.get(0).await.unwrap_err().is_sublog_deleted());
    assert!(old.append(12).await.unwrap_err().is_sublog_deleted());
    assert!(mlog.list().await.unwrap().is_empty());
    assert!(!has(&mlog, &addr).await.unwrap());

    // A fresh sub-log accepts values below the deleted one's last.
    let fresh = mlog.get(&addr).await.unwrap();
    assert_eq!(fresh.append(1).await.unwrap(), 0);
}

#[tokio::test]
async fn test_closing_a_handle_keeps_the_bitmap_open() {
    let mlog = mem_multilog();
    let addr = Addr::from("a");
    let first = mlog.get(&addr).await.unwrap();
    first.append(4).await.unwrap();
    first.close().await.unwrap();

    let again = mlog.get(&addr).await.unwrap();
    assert_eq!(again.append(9).await.unwrap(), 1);
    assert_eq!(again.get(0).await.unwrap(), 4);
}

#[tokio::test]
async fn test_live_query_sees_later_appends() {
    let mlog = mem_multilog();
    let addr = Addr::from("tail");
    let reader = mlog.get(&addr).await.unwrap();
    let mut qry = reader.query(&[QuerySpec::Live(true), QuerySpec::SeqWrap(true)]).unwrap();

    let writer = mlog.get(&addr).await.unwrap();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        writer.append(42).await.unwrap();
    });

    let item = tokio::time::timeout(Duration::from_secs(5), qry.next(&CancellationToken::new()))
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(item.seq(), Some(0));
    assert_eq!(item.into_value(), Some(42));
}

#[tokio::test]
async fn test_closed_multilog_rejects_operations() {
    let mlog = mem_multilog();
    let log = mlog.get(&Addr::from("x")).await.unwrap();
    mlog.close().await.unwrap();

    assert!(matches!(mlog.list().await, Err(MultiLogError::Closed)));
    assert!(matches!(log.append(1).await, Err(LogError::Closed)));
    mlog.close().await.unwrap();
}

#[tokio::test]
async fn test_redb_bitmaps_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bitmaps.redb");
    {
        let backend: SharedBackend = Arc::new(RedbBackend::open(&path).unwrap());
        let mlog = RoaringMultiLog::new(backend);
        for (addr, seq) in [("a", 0i64), ("b", 1), ("a", 2), ("a", 70_000)] {
            mlog.get(&Addr::from(addr)).await.unwrap().append(seq).await.unwrap();
        }
        mlog.delete(&Addr::from("b")).await.unwrap();
        mlog.close().await.unwrap();
    }

    let backend: SharedBackend = Arc::new(RedbBackend::open(&path).unwrap());
    let mlog = RoaringMultiLog::new(backend);
    assert_eq!(mlog.list().await.unwrap(), vec![Addr::from("a")]);
    let a = mlog.get(&Addr::from("a")).await.unwrap();
    assert_eq!(a.current_seq(), 2);
    assert_eq!(members(a.as_ref(), &[]).await, vec![0, 2, 70_000]);
    assert_eq!(a.append(70_001).await.unwrap(), 3);
}
