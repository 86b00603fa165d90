//! Batch Coordinator Integration Tests
//!
//! Tests for chunk boundaries, partial failure and ETag reuse.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use ccscout::adapters::{Conditional, SourceError};
use ccscout::core::{BatchCoordinator, ManualClock, VolatileCache};

fn ids(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("vid{:04}", i)).collect()
}

fn coordinator() -> (BatchCoordinator, Arc<VolatileCache>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::default());
    let cache = Arc::new(VolatileCache::with_clock(
        Duration::from_secs(1800),
        clock.clone(),
    ));
    (BatchCoordinator::new(cache.clone()), cache, clock)
}

#[tokio::test]
async fn test_120_ids_make_three_batches() {
    let (coordinator, _cache, _clock) = coordinator();
    let sizes = Mutex::new(Vec::new());

    let outcome = coordinator
        .fetch_details("videos", &ids(120), |chunk, _etag| {
            sizes.lock().unwrap().push(chunk.len());
            async move {
                Ok::<_, SourceError>(Conditional::Modified {
                    body: chunk.iter().map(|id| id.to_uppercase()).collect::<Vec<_>>(),
                    etag: None,
                })
            }
        })
        .await;

    assert_eq!(*sizes.lock().unwrap(), vec![50, 50, 20]);
    let expected: Vec<_> = ids(120).iter().map(|id| id.to_uppercase()).collect();
    assert_eq!(outcome.into_result().unwrap(), expected);
}

#[tokio::test]
async fn test_failed_run_is_not_cached_as_a_whole() {
    let (coordinator, _cache, _clock) = coordinator();
    let fail_last = Mutex::new(true);
    let calls = Mutex::new(0);

    let fetch = |chunk: Vec<String>, _etag: Option<String>| {
        *calls.lock().unwrap() += 1;
        let fail = *fail_last.lock().unwrap() && chunk.len() < 50;
        async move {
            if fail {
                Err(SourceError::Network {
                    provider: "test".into(),
                    message: "connection reset".into(),
                })
            } else {
                Ok(Conditional::Modified {
                    body: chunk,
                    etag: None,
                })
            }
        }
    };

    let partial = coordinator.fetch_details("videos", &ids(120), fetch).await;
    assert_eq!(partial.items.len(), 100);
    assert_eq!(partial.failure.as_ref().unwrap().batch_index, 2);

    // Retry: the two good chunks come from cache, only the last is requested
    *fail_last.lock().unwrap() = false;
    let retry = coordinator.fetch_details("videos", &ids(120), fetch).await;
    assert!(retry.is_complete());
    assert_eq!(retry.items, ids(120));
    assert_eq!(retry.requests, 1);
    assert_eq!(*calls.lock().unwrap(), 4);
}

#[tokio::test]
async fn test_cached_chunk_follows_request_order() {
    let (coordinator, _cache, _clock) = coordinator();
    let fetch = |chunk: Vec<String>, _etag: Option<String>| async move {
        Ok::<_, SourceError>(Conditional::Modified {
            body: chunk,
            etag: None,
        })
    };

    let first = coordinator.fetch_details("videos", &ids(5), fetch).await;
    assert_eq!(first.items, ids(5));

    // Same ids reordered: the chunk key matches but the order must follow the request
    let mut reversed = ids(5);
    reversed.reverse();
    let second = coordinator.fetch_details("videos", &reversed, fetch).await;
    assert_eq!(second.requests, 0);
    assert_eq!(second.items, reversed);
}

#[tokio::test]
async fn test_not_modified_does_not_extend_ttl() {
    let (coordinator, cache, clock) = coordinator();
    let fetch = |chunk: Vec<String>, etag: Option<String>| async move {
        match etag {
            Some(_) => Ok::<_, SourceError>(Conditional::NotModified),
            None => Ok(Conditional::Modified {
                body: chunk,
                etag: Some("W/\"abc\"".to_string()),
            }),
        }
    };

    coordinator.fetch_details("videos", &ids(10), fetch).await;
    clock.advance(chrono::Duration::minutes(31));

    let revalidated = coordinator.fetch_details("videos", &ids(10), fetch).await;
    assert_eq!(revalidated.items, ids(10));
    assert_eq!(revalidated.requests, 1);

    // The batch entry is still expired after the 304
    let stale = cache.clear_expired();
    assert_eq!(stale, 1);
}
