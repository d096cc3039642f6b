//! Single-flight fetch coordination on top of the entry cache.
//!
//! [`FetchCoordinator::resolve`] serves fresh cache hits directly. On a miss
//! it either joins the fetch already in flight for that key or starts one.
//! Each fetch runs in its own task, so a caller that gives up waiting does
//! not cancel the work other waiters depend on.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tracing::{debug, warn};

use super::retry::{RetryConfig, with_retry};
use super::source::EntitySource;
use crate::cache::EntryCache;
use crate::telemetry;
use crate::types::{Entity, FetchKey, Freshness, Resolved};
use crate::{ProcedexError, Result};

type SharedFetch = Shared<BoxFuture<'static, Result<Resolved>>>;
type InFlight = Arc<Mutex<HashMap<FetchKey, SharedFetch>>>;

/// Deduplicates upstream fetches per [`FetchKey`] and fills the cache.
pub struct FetchCoordinator {
    source: Arc<dyn EntitySource>,
    cache: Arc<EntryCache>,
    retry: RetryConfig,
    in_flight: InFlight,
}

impl FetchCoordinator {
    pub fn new(source: Arc<dyn EntitySource>, cache: Arc<EntryCache>, retry: RetryConfig) -> Self {
        Self {
            source,
            cache,
            retry,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn cache(&self) -> &Arc<EntryCache> {
        &self.cache
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Resolve a key, preferring a fresh cache entry.
    ///
    /// On a miss, at most one upstream fetch runs per key; concurrent
    /// callers share its outcome. If that fetch fails with a transient or
    /// corrupt-payload error and an expired entry is still cached, the
    /// expired value is returned marked [`Freshness::Stale`]. A `NotFound`
    /// outcome invalidates the cached entry and is never masked.
    pub async fn resolve(&self, key: FetchKey) -> Result<Resolved> {
        match self.cache.get(&key) {
            Some(hit) if hit.is_fresh() => {
                debug!(%key, "cache hit");
                metrics::counter!(telemetry::CACHE_HITS_TOTAL, "kind" => key.kind.as_str())
                    .increment(1);
                return Ok(hit);
            }
            Some(_) => debug!(%key, "cache entry expired"),
            None => debug!(%key, "cache miss"),
        }
        metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "kind" => key.kind.as_str())
            .increment(1);
        self.join_or_start(key, false).await
    }

    /// Fetch a key from upstream even if a fresh entry is cached.
    ///
    /// Still single-flight: joins a fetch already in flight for the key.
    pub async fn refetch(&self, key: FetchKey) -> Result<Resolved> {
        self.join_or_start(key, true).await
    }

    /// Number of keys with a fetch currently outstanding.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    async fn join_or_start(&self, key: FetchKey, force: bool) -> Result<Resolved> {
        let fetch = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            match in_flight.get(&key) {
                Some(existing) => {
                    debug!(%key, "joining in-flight fetch");
                    metrics::counter!(telemetry::COALESCED_TOTAL, "kind" => key.kind.as_str())
                        .increment(1);
                    existing.clone()
                }
                None => {
                    // A fetch may have completed between the cache read and taking the lock.
                    if !force && let Some(hit) = self.cache.get(&key).filter(Resolved::is_fresh) {
                        return Ok(hit);
                    }
                    let fetch = self.spawn_fetch(key);
                    in_flight.insert(key, fetch.clone());
                    fetch
                }
            }
        };
        fetch.await
    }

    /// Start the upstream fetch for `key` on its own task.
    ///
    /// Must be called with the in-flight lock held, so the task cannot
    /// deregister itself before it has been registered.
    fn spawn_fetch(&self, key: FetchKey) -> SharedFetch {
        let task = FetchTask {
            key,
            source: Arc::clone(&self.source),
            cache: Arc::clone(&self.cache),
            retry: self.retry.clone(),
            in_flight: Arc::clone(&self.in_flight),
        };
        let handle = tokio::spawn(task.run());
        async move {
            handle.await.unwrap_or_else(|e| {
                Err(ProcedexError::Internal(format!(
                    "fetch task for {key} did not complete: {e}"
                )))
            })
        }
        .boxed()
        .shared()
    }
}

struct FetchTask {
    key: FetchKey,
    source: Arc<dyn EntitySource>,
    cache: Arc<EntryCache>,
    retry: RetryConfig,
    in_flight: InFlight,
}

impl FetchTask {
    async fn run(self) -> Result<Resolved> {
        let _registration = Deregister {
            key: self.key,
            in_flight: Arc::clone(&self.in_flight),
        };
        let key = self.key;
        let kind = key.kind.as_str();
        let started = Instant::now();

        let source = &self.source;
        let outcome = with_retry(&self.retry, key, || async move {
            let raw = source.fetch(key).await?;
            Entity::decode(key, raw)
        })
        .await;

        metrics::histogram!(telemetry::FETCH_DURATION_SECONDS, "kind" => kind)
            .record(started.elapsed().as_secs_f64());

        match outcome {
            Ok(entity) => {
                self.cache.insert(key, entity.clone())?;
                metrics::counter!(telemetry::FETCHES_TOTAL, "kind" => kind, "status" => "ok")
                    .increment(1);
                Ok(Resolved::fresh(entity))
            }
            Err(ProcedexError::NotFound(missing)) => {
                metrics::counter!(telemetry::FETCHES_TOTAL, "kind" => kind, "status" => "not_found")
                    .increment(1);
                self.cache.invalidate(&key);
                Err(ProcedexError::NotFound(missing))
            }
            Err(e) => {
                metrics::counter!(telemetry::FETCHES_TOTAL, "kind" => kind, "status" => "error")
                    .increment(1);
                if !e.is_transient() {
                    return Err(e);
                }
                match self.cache.get(&key) {
                    Some(cached) => {
                        if cached.freshness == Freshness::Stale {
                            metrics::counter!(telemetry::STALE_SERVED_TOTAL, "kind" => kind)
                                .increment(1);
                        }
                        warn!(%key, error = %e, freshness = ?cached.freshness, "upstream fetch failed, serving cached value");
                        Ok(cached)
                    }
                    None => Err(e),
                }
            }
        }
    }
}

/// Removes the in-flight registration when the fetch task ends, including on panic.
struct Deregister {
    key: FetchKey,
    in_flight: InFlight,
}

impl Drop for Deregister {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}
