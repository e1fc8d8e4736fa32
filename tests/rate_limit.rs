//! Rate limiter integration tests over the in-memory store

use std::sync::Arc;

use grapevine::ratelimit::{RateDecision, RateLimiter};
use grapevine::store::memory::MemoryRateStore;
use grapevine::store::RateStore;

fn limiter() -> (RateLimiter, Arc<MemoryRateStore>) {
    let store = Arc::new(MemoryRateStore::new());
    (RateLimiter::new(store.clone()), store)
}

#[tokio::test]
async fn test_three_allowed_then_denied_then_window_recovers() {
    let (limiter, _) = limiter();
    let t0 = 1_000_000;

    for i in 0..3 {
        assert!(limiter
            .check_and_record_at("follow:alice", 3, 1000, t0 + i * 10)
            .await
            .unwrap()
            .is_allowed());
    }

    let denied = limiter
        .check_and_record_at("follow:alice", 3, 1000, t0 + 30)
        .await
        .unwrap();
    assert!(matches!(denied, RateDecision::Denied { .. }));

    // One millisecond past the oldest entry's expiry, one slot opens
    assert!(limiter
        .check_and_record_at("follow:alice", 3, 1000, t0 + 1001)
        .await
        .unwrap()
        .is_allowed());
}

#[tokio::test]
async fn test_retry_after_tracks_oldest_entry() {
    let (limiter, _) = limiter();
    let t0 = 50_000;

    limiter
        .check_and_record_at("k", 2, 1000, t0)
        .await
        .unwrap();
    limiter
        .check_and_record_at("k", 2, 1000, t0 + 600)
        .await
        .unwrap();

    let denied = limiter
        .check_and_record_at("k", 2, 1000, t0 + 800)
        .await
        .unwrap();
    match denied {
        RateDecision::Denied { retry_after_ms } => {
            // Oldest entry at t0 leaves the window at t0 + 1000
            assert_eq!(retry_after_ms, 200);
        }
        other => panic!("expected denial, got {:?}", other),
    }
}

#[tokio::test]
async fn test_keys_do_not_share_budget() {
    let (limiter, _) = limiter();
    let t0 = 9_000;

    assert!(limiter
        .check_and_record_at("follow:alice", 1, 1000, t0)
        .await
        .unwrap()
        .is_allowed());
    assert!(!limiter
        .check_and_record_at("follow:alice", 1, 1000, t0 + 1)
        .await
        .unwrap()
        .is_allowed());

    assert!(limiter
        .check_and_record_at("follow:bob", 1, 1000, t0 + 2)
        .await
        .unwrap()
        .is_allowed());
}

#[tokio::test]
async fn test_status_never_consumes_budget() {
    let (limiter, _) = limiter();
    let t0 = 70_000;

    limiter
        .check_and_record_at("k", 5, 1000, t0)
        .await
        .unwrap();
    limiter
        .check_and_record_at("k", 5, 1000, t0 + 250)
        .await
        .unwrap();

    for _ in 0..10 {
        let status = limiter.status_at("k", 1000, t0 + 500).await.unwrap();
        assert_eq!(status.count, 2);
        assert_eq!(status.window_end_ms, t0 + 500);
        assert_eq!(status.entry_ages_ms, vec![250, 500]);
    }
}

#[tokio::test]
async fn test_old_entries_fall_out_of_status() {
    let (limiter, _) = limiter();
    let t0 = 30_000;

    limiter
        .check_and_record_at("k", 10, 1000, t0)
        .await
        .unwrap();
    limiter
        .check_and_record_at("k", 10, 1000, t0 + 900)
        .await
        .unwrap();

    // Half the entries are outside the window at t0 + 1500
    let status = limiter.status_at("k", 1000, t0 + 1500).await.unwrap();
    assert_eq!(status.count, 1);
    assert_eq!(status.entry_ages_ms, vec![600]);
}

#[tokio::test]
async fn test_global_sweep_clears_expired_entries_across_keys() {
    let (limiter, store) = limiter();
    let t0 = 200_000;

    for key in ["follow:alice", "follow:bob", "follow:carol"] {
        store.record(key, t0).await.unwrap();
    }
    store.record("follow:alice", t0 + 5_000).await.unwrap();

    let removed = limiter.cleanup_entries_before(t0 + 2_000).await;
    assert_eq!(removed, 3);

    // The fresh entry survives the sweep
    assert_eq!(store.count_since("follow:alice", 0).await.unwrap(), 1);
    assert_eq!(store.count_since("follow:bob", 0).await.unwrap(), 0);
}

#[tokio::test]
async fn test_sweep_respects_batching() {
    let store = Arc::new(MemoryRateStore::new());
    let limiter = RateLimiter::new(store.clone()).with_sweep_batch(2);

    for ts in 0..7 {
        store.record("k", ts).await.unwrap();
    }

    // 7 entries, batch 2: the loop drains them across four batches
    let removed = limiter.cleanup_entries_before(100).await;
    assert_eq!(removed, 7);
    assert_eq!(store.count_since("k", 0).await.unwrap(), 0);
}
