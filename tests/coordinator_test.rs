//! Tests for [`FetchCoordinator`]: single-flight, retries, stale-if-error,
//! not-found invalidation and caller cancellation.

mod common;

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde_json::json;

use common::{MockSource, fast_retry, procedure_json, transient};
use procedex::cache::{CacheConfig, EntryCache};
use procedex::{FetchCoordinator, FetchKey, Freshness, ProcedexError, RetryConfig};

fn coordinator(source: &Arc<MockSource>, cache: CacheConfig) -> FetchCoordinator {
    FetchCoordinator::new(
        source.clone(),
        Arc::new(EntryCache::new(cache)),
        fast_retry(),
    )
}

/// Procedures expire after 30ms but stay available as a fallback.
fn short_ttl() -> CacheConfig {
    CacheConfig::new()
        .ttl(Duration::from_millis(30))
        .max_stale(None)
}

#[tokio::test]
async fn concurrent_misses_share_one_fetch() {
    let source = Arc::new(
        MockSource::new()
            .with_procedure(1, "Business registration", &[])
            .with_delay(Duration::from_millis(50)),
    );
    let coordinator = coordinator(&source, CacheConfig::default());
    let key = FetchKey::procedure(1);

    let results = join_all((0..16).map(|_| coordinator.resolve(key))).await;

    assert_eq!(source.calls(key), 1);
    let first = results[0].as_ref().unwrap();
    for result in &results {
        assert_eq!(result.as_ref().unwrap(), first);
    }
    assert_eq!(coordinator.in_flight_count(), 0);
}

#[tokio::test]
async fn distinct_keys_fetch_independently() {
    let source = Arc::new(
        MockSource::new()
            .with_procedure(1, "One", &[])
            .with_procedure(2, "Two", &[]),
    );
    let coordinator = coordinator(&source, CacheConfig::default());

    let (a, b) = tokio::join!(
        coordinator.resolve(FetchKey::procedure(1)),
        coordinator.resolve(FetchKey::procedure(2))
    );

    assert!(a.is_ok() && b.is_ok());
    assert_eq!(source.total_calls(), 2);
}

#[tokio::test]
async fn fresh_hit_skips_upstream() {
    let source = Arc::new(MockSource::new().with_procedure(1, "One", &[]));
    let coordinator = coordinator(&source, CacheConfig::default());
    let key = FetchKey::procedure(1);

    coordinator.resolve(key).await.unwrap();
    let again = coordinator.resolve(key).await.unwrap();

    assert_eq!(again.freshness, Freshness::Fresh);
    assert_eq!(source.calls(key), 1);
}

#[tokio::test]
async fn transient_failure_is_retried_transparently() {
    let key = FetchKey::procedure(42);
    let source = Arc::new(MockSource::new().with_procedure(42, "Import permit", &[]));
    source.fail_next(key, transient());
    let coordinator = coordinator(&source, CacheConfig::default());

    let resolved = coordinator.resolve(key).await.unwrap();

    assert_eq!(resolved.freshness, Freshness::Fresh);
    assert_eq!(resolved.entity.as_procedure().unwrap().id, 42);
    assert_eq!(source.calls(key), 2);
}

#[tokio::test]
async fn exhausted_retries_without_cache_propagate_error() {
    let key = FetchKey::procedure(5);
    let source = Arc::new(MockSource::new());
    source.fail_always(key, transient());
    let coordinator = coordinator(&source, CacheConfig::default());

    let err = coordinator.resolve(key).await.unwrap_err();

    assert_eq!(err, transient());
    assert_eq!(source.calls(key), 3);
    assert!(coordinator.cache().get(&key).is_none());
}

#[tokio::test]
async fn expired_entry_is_served_when_refetch_fails() {
    let key = FetchKey::procedure(1);
    let source = Arc::new(MockSource::new().with_procedure(1, "Business registration", &[]));
    let coordinator = coordinator(&source, short_ttl());

    let fresh = coordinator.resolve(key).await.unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    source.fail_always(key, transient());

    let stale = coordinator.resolve(key).await.unwrap();

    assert_eq!(stale.freshness, Freshness::Stale);
    assert_eq!(stale.entity, fresh.entity);
    assert_eq!(source.calls(key), 1 + 3);
}

#[tokio::test]
async fn expired_entry_is_replaced_when_refetch_succeeds() {
    let key = FetchKey::procedure(1);
    let source = Arc::new(MockSource::new().with_procedure(1, "Old title", &[]));
    let coordinator = coordinator(&source, short_ttl());

    coordinator.resolve(key).await.unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    source.put(key, procedure_json(1, "New title", &[]));

    let refreshed = coordinator.resolve(key).await.unwrap();

    assert_eq!(refreshed.freshness, Freshness::Fresh);
    assert_eq!(refreshed.entity.as_procedure().unwrap().title, "New title");
}

#[tokio::test]
async fn not_found_invalidates_and_is_not_retried() {
    let key = FetchKey::procedure(9);
    let source = Arc::new(MockSource::new().with_procedure(9, "Withdrawn", &[]));
    let coordinator = coordinator(&source, short_ttl());

    coordinator.resolve(key).await.unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    source.delete(key);

    let err = coordinator.resolve(key).await.unwrap_err();

    assert_eq!(err, ProcedexError::NotFound(key));
    assert_eq!(source.calls(key), 2);
    assert!(coordinator.cache().get(&key).is_none());
}

#[tokio::test]
async fn refetch_bypasses_fresh_entry() {
    let key = FetchKey::procedure(1);
    let source = Arc::new(MockSource::new().with_procedure(1, "Old title", &[]));
    let coordinator = coordinator(&source, CacheConfig::default());

    coordinator.resolve(key).await.unwrap();
    source.put(key, procedure_json(1, "New title", &[]));
    let refetched = coordinator.refetch(key).await.unwrap();

    assert_eq!(refetched.entity.as_procedure().unwrap().title, "New title");
    let cached = coordinator.cache().get(&key).unwrap();
    assert_eq!(cached.entity.as_procedure().unwrap().title, "New title");
}

#[tokio::test]
async fn corrupt_payload_is_retried_and_never_cached() {
    let key = FetchKey::procedure(3);
    let source = Arc::new(MockSource::new().with(key, json!({ "title": ["not", "a", "string"] })));
    let coordinator = coordinator(&source, CacheConfig::default());

    let err = coordinator.resolve(key).await.unwrap_err();

    assert!(matches!(err, ProcedexError::Corrupt { .. }));
    assert_eq!(source.calls(key), 3);
    assert!(coordinator.cache().get(&key).is_none());
}

#[tokio::test]
async fn mismatched_id_is_corrupt() {
    let key = FetchKey::procedure(3);
    let source = Arc::new(MockSource::new().with(key, procedure_json(4, "Other", &[])));
    let coordinator = FetchCoordinator::new(
        source.clone(),
        Arc::new(EntryCache::default()),
        RetryConfig::disabled(),
    );

    let err = coordinator.resolve(key).await.unwrap_err();

    assert!(matches!(err, ProcedexError::Corrupt { .. }));
    assert_eq!(source.calls(key), 1);
}

#[tokio::test]
async fn abandoned_caller_does_not_cancel_shared_fetch() {
    let key = FetchKey::procedure(1);
    let source = Arc::new(
        MockSource::new()
            .with_procedure(1, "Business registration", &[])
            .with_delay(Duration::from_millis(80)),
    );
    let coordinator = coordinator(&source, CacheConfig::default());

    let impatient = tokio::time::timeout(Duration::from_millis(10), coordinator.resolve(key));
    let patient = coordinator.resolve(key);
    let (impatient, patient) = tokio::join!(impatient, patient);

    assert!(impatient.is_err(), "impatient caller should time out");
    assert!(patient.is_ok());
    assert_eq!(source.calls(key), 1);
}

#[tokio::test]
async fn fetch_completes_after_its_only_caller_gives_up() {
    let key = FetchKey::procedure(1);
    let source = Arc::new(
        MockSource::new()
            .with_procedure(1, "Business registration", &[])
            .with_delay(Duration::from_millis(40)),
    );
    let coordinator = coordinator(&source, CacheConfig::default());

    let abandoned = tokio::time::timeout(Duration::from_millis(5), coordinator.resolve(key)).await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(120)).await;

    assert_eq!(coordinator.in_flight_count(), 0);
    let cached = coordinator.cache().get(&key).expect("fetch filled the cache");
    assert_eq!(cached.freshness, Freshness::Fresh);

    coordinator.resolve(key).await.unwrap();
    assert_eq!(source.calls(key), 1);
}

#[tokio::test]
async fn waiters_share_the_failure() {
    let key = FetchKey::procedure(8);
    let source = Arc::new(MockSource::new().with_delay(Duration::from_millis(20)));
    let coordinator = FetchCoordinator::new(
        source.clone(),
        Arc::new(EntryCache::default()),
        RetryConfig::disabled(),
    );

    let results = join_all((0..4).map(|_| coordinator.resolve(key))).await;

    assert_eq!(source.calls(key), 1);
    for result in results {
        assert_eq!(result.unwrap_err(), ProcedexError::NotFound(key));
    }
}
