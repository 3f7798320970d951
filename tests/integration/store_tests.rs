//! Image store integration tests.
//!
//! Tests verify:
//! - Concurrent inserts produce distinct, retrievable ids
//! - Expiry on read and sweeping under a manual clock
//! - The background sweeper

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use bytes::Bytes;
use chrono::Duration;

use htmlshot::error::StoreError;
use htmlshot::store::{spawn_sweeper, ImageStore, ManualClock};

fn store_with_clock(ttl_secs: u64) -> (Arc<ImageStore>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::starting_now());
    let store = Arc::new(ImageStore::with_clock(
        StdDuration::from_secs(ttl_secs),
        clock.clone(),
    ));
    (store, clock)
}

#[tokio::test]
async fn test_concurrent_puts_yield_distinct_ids() {
    let (store, _clock) = store_with_clock(3600);

    let mut tasks = Vec::new();
    for i in 0..100u32 {
        let store = Arc::clone(&store);
        tasks.push(tokio::spawn(async move {
            let payload = Bytes::from(i.to_be_bytes().to_vec());
            (store.put(payload.clone()).await, payload)
        }));
    }

    let mut ids = HashSet::new();
    for task in tasks {
        let (id, payload) = task.await.unwrap();
        assert!(ids.insert(id), "duplicate id {}", id);

        let stored = store.get(&id).await.unwrap();
        assert_eq!(stored.bytes(), &payload);
    }

    assert_eq!(ids.len(), 100);
    assert_eq!(store.len().await, 100);
}

#[tokio::test]
async fn test_concurrent_reads_of_expired_entry() {
    let (store, clock) = store_with_clock(60);
    let id = store.put(Bytes::from_static(b"png")).await;

    clock.advance(Duration::seconds(61));

    let mut tasks = Vec::new();
    for _ in 0..10 {
        let store = Arc::clone(&store);
        tasks.push(tokio::spawn(async move { store.get(&id).await }));
    }

    let mut expired = 0;
    for task in tasks {
        match task.await.unwrap() {
            Err(StoreError::Expired) => expired += 1,
            Err(StoreError::NotFound) => {}
            other => panic!("unexpected lookup result {:?}", other.map(|i| i.id())),
        }
    }

    // Exactly one reader evicts the entry
    assert_eq!(expired, 1);
    assert!(!store.contains(&id).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sweep_races_with_reads_and_puts() {
    const EXPIRED: usize = 200;
    const FRESH: usize = 200;

    let (store, clock) = store_with_clock(60);

    let mut expired_ids = Vec::with_capacity(EXPIRED);
    for i in 0..EXPIRED {
        expired_ids.push(store.put(Bytes::from(format!("old-{}", i))).await);
    }
    clock.advance(Duration::seconds(61));

    let sweeps: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let mut removed = 0;
                for _ in 0..10 {
                    removed += store.sweep().await;
                    tokio::task::yield_now().await;
                }
                removed
            })
        })
        .collect();

    // Two readers per expired id
    let reads: Vec<_> = expired_ids
        .iter()
        .chain(expired_ids.iter())
        .map(|&id| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.get(&id).await })
        })
        .collect();

    let puts: Vec<_> = (0..FRESH)
        .map(|i| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let payload = Bytes::from(format!("fresh-{}", i));
                (store.put(payload.clone()).await, payload)
            })
        })
        .collect();

    let mut swept = 0;
    for sweep in sweeps {
        swept += sweep.await.unwrap();
    }

    let mut expired_reads = 0;
    for read in reads {
        match read.await.unwrap() {
            Err(StoreError::Expired) => expired_reads += 1,
            Err(StoreError::NotFound) => {}
            other => panic!("expired id was served: {:?}", other.map(|i| i.id())),
        }
    }

    let mut fresh = Vec::with_capacity(FRESH);
    for put in puts {
        fresh.push(put.await.unwrap());
    }

    // Every expired entry is evicted exactly once, by a sweep or a reader
    assert_eq!(swept + expired_reads, EXPIRED);
    for id in &expired_ids {
        assert!(!store.contains(id).await);
    }

    for (id, payload) in &fresh {
        let image = store.get(id).await.unwrap();
        assert_eq!(image.bytes(), payload);
    }

    assert_eq!(store.sweep().await, 0);
    assert_eq!(store.len().await, FRESH);
}

#[tokio::test]
async fn test_sweep_only_removes_expired() {
    let (store, clock) = store_with_clock(3600);

    let old = store.put(Bytes::from_static(b"old")).await;
    clock.advance(Duration::minutes(30));
    let fresh = store.put(Bytes::from_static(b"fresh")).await;
    clock.advance(Duration::minutes(31));

    assert_eq!(store.sweep().await, 1);
    assert_eq!(store.sweep().await, 0);

    assert!(!store.contains(&old).await);
    assert!(store.get(&fresh).await.is_ok());
}

#[tokio::test]
async fn test_background_sweeper_evicts_expired_entries() {
    let (store, clock) = store_with_clock(60);
    store.put(Bytes::from_static(b"a")).await;
    store.put(Bytes::from_static(b"b")).await;

    clock.advance(Duration::minutes(5));

    let handle = spawn_sweeper(Arc::clone(&store), StdDuration::from_millis(10));

    let mut remaining = store.len().await;
    for _ in 0..100 {
        if remaining == 0 {
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
        remaining = store.len().await;
    }

    handle.abort();
    assert_eq!(remaining, 0);
}
