//! TTL-tracking entry cache for decoded upstream entities.
//!
//! Freshness is judged lazily at read time: an entry past its TTL is still
//! returned (marked [`Freshness::Stale`]) so the fetch coordinator can fall
//! back to it when a refetch fails. Entries are only dropped when
//! overwritten, invalidated, evicted for capacity, or once they outlive
//! `ttl + max_stale`.
//!
//! Backed by moka's concurrent cache: operations on distinct keys never
//! block each other, and writes to one key are atomic.

use std::time::{Duration, Instant};

use moka::Expiry;
use moka::sync::Cache;
use tracing::{debug, error};

use crate::types::{Entity, EntityKind, FetchKey, Freshness, Resolved};
use crate::{ProcedexError, Result};

/// Time-to-live per entity kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlPolicy {
    pub procedure: Duration,
    pub steps: Duration,
    pub requirements: Duration,
    pub costs: Duration,
    pub institution: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self::uniform(Duration::from_secs(3600))
    }
}

impl TtlPolicy {
    /// Same TTL for every kind.
    pub fn uniform(ttl: Duration) -> Self {
        Self {
            procedure: ttl,
            steps: ttl,
            requirements: ttl,
            costs: ttl,
            institution: ttl,
        }
    }

    pub fn for_kind(&self, kind: EntityKind) -> Duration {
        match kind {
            EntityKind::Procedure => self.procedure,
            EntityKind::Steps => self.steps,
            EntityKind::Requirements => self.requirements,
            EntityKind::Costs => self.costs,
            EntityKind::Institution => self.institution,
        }
    }

    /// Override the TTL of one kind.
    pub fn with(mut self, kind: EntityKind, ttl: Duration) -> Self {
        let slot = match kind {
            EntityKind::Procedure => &mut self.procedure,
            EntityKind::Steps => &mut self.steps,
            EntityKind::Requirements => &mut self.requirements,
            EntityKind::Costs => &mut self.costs,
            EntityKind::Institution => &mut self.institution,
        };
        *slot = ttl;
        self
    }
}

/// Configuration for the entry cache.
///
/// ```rust
/// # use procedex::cache::CacheConfig;
/// # use procedex::EntityKind;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .max_entries(5_000)
///     .ttl(Duration::from_secs(600))
///     .kind_ttl(EntityKind::Institution, Duration::from_secs(86_400));
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of cached entries. Default: 10,000.
    pub max_entries: u64,
    /// How long an expired entry stays available as a stale fallback.
    /// `None` keeps it until overwritten. Default: 24 hours.
    pub max_stale: Option<Duration>,
    /// Time-to-live per entity kind. Default: 1 hour for every kind.
    pub ttl: TtlPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            max_stale: Some(Duration::from_secs(24 * 3600)),
            ttl: TtlPolicy::default(),
        }
    }
}

impl CacheConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of cached entries.
    pub fn max_entries(mut self, n: u64) -> Self {
        self.max_entries = n;
        self
    }

    /// Set the stale fallback window (`None` = unbounded).
    pub fn max_stale(mut self, window: Option<Duration>) -> Self {
        self.max_stale = window;
        self
    }

    /// Set the same TTL for every kind.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = TtlPolicy::uniform(ttl);
        self
    }

    /// Set the TTL for one kind.
    pub fn kind_ttl(mut self, kind: EntityKind, ttl: Duration) -> Self {
        self.ttl = self.ttl.with(kind, ttl);
        self
    }
}

/// A cached entity with its fetch timestamp and TTL.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: FetchKey,
    pub value: Entity,
    pub fetched_at: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }

    /// `now - fetched_at <= ttl`.
    pub fn is_fresh(&self) -> bool {
        self.age() <= self.ttl
    }

    pub fn freshness(&self) -> Freshness {
        if self.is_fresh() {
            Freshness::Fresh
        } else {
            Freshness::Stale
        }
    }
}

/// Evicts entries once they outlive `ttl + max_stale`.
struct StaleWindow {
    max_stale: Option<Duration>,
}

impl Expiry<FetchKey, CacheEntry> for StaleWindow {
    fn expire_after_create(
        &self,
        _key: &FetchKey,
        value: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        self.max_stale.map(|window| value.ttl.saturating_add(window))
    }

    fn expire_after_update(
        &self,
        key: &FetchKey,
        value: &CacheEntry,
        updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        self.expire_after_create(key, value, updated_at)
    }
}

/// Thread-safe, bounded cache of decoded entities keyed on [`FetchKey`].
pub struct EntryCache {
    entries: Cache<FetchKey, CacheEntry>,
    config: CacheConfig,
}

impl EntryCache {
    /// Create a new cache with the given configuration.
    pub fn new(config: CacheConfig) -> Self {
        let entries = Cache::builder()
            .max_capacity(config.max_entries)
            .expire_after(StaleWindow {
                max_stale: config.max_stale,
            })
            .build();
        Self { entries, config }
    }

    /// Look up a key.
    ///
    /// Returns `None` only when no entry exists; expired entries come back
    /// marked [`Freshness::Stale`].
    pub fn get(&self, key: &FetchKey) -> Option<Resolved> {
        self.entries.get(key).map(|entry| Resolved {
            freshness: entry.freshness(),
            entity: entry.value,
        })
    }

    /// Raw entry, including its timestamp.
    pub fn entry(&self, key: &FetchKey) -> Option<CacheEntry> {
        self.entries.get(key)
    }

    /// Insert or overwrite an entry with an explicit TTL, stamping `fetched_at = now`.
    ///
    /// Rejects values whose kind does not match the key, leaving any
    /// existing entry untouched.
    pub fn put(&self, key: FetchKey, value: Entity, ttl: Duration) -> Result<()> {
        if value.kind() != key.kind {
            error!(%key, actual = %value.kind(), "refusing to cache entity under mismatched key");
            return Err(ProcedexError::Internal(format!(
                "entity of kind {} cannot be cached under {key}",
                value.kind()
            )));
        }
        debug!(%key, ttl_secs = ttl.as_secs(), "caching entity");
        self.entries.insert(
            key,
            CacheEntry {
                key,
                value,
                fetched_at: Instant::now(),
                ttl,
            },
        );
        Ok(())
    }

    /// Insert or overwrite an entry using the configured TTL for its kind.
    pub fn insert(&self, key: FetchKey, value: Entity) -> Result<()> {
        self.put(key, value, self.ttl_for(key.kind))
    }

    /// Remove an entry entirely.
    pub fn invalidate(&self, key: &FetchKey) {
        debug!(%key, "invalidating cache entry");
        self.entries.invalidate(key);
    }

    /// Evict all entries.
    pub fn clear(&self) {
        self.entries.invalidate_all();
        self.entries.run_pending_tasks();
    }

    /// Configured TTL for a kind.
    pub fn ttl_for(&self, kind: EntityKind) -> Duration {
        self.config.ttl.for_kind(kind)
    }

    /// How long expired entries remain available as a fallback.
    pub fn max_stale(&self) -> Option<Duration> {
        self.config.max_stale
    }

    /// Number of entries currently in the cache.
    pub fn len(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.entry_count()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EntryCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Institution;
    use std::sync::Arc;

    fn institution(id: u64) -> Entity {
        Entity::Institution(Arc::new(Institution {
            id,
            name: format!("Institution {id}"),
            description: None,
            address: None,
            phone: None,
            email: None,
            website: None,
        }))
    }

    #[test]
    fn ttl_policy_overrides_single_kind() {
        let policy = TtlPolicy::uniform(Duration::from_secs(10))
            .with(EntityKind::Costs, Duration::from_secs(99));
        assert_eq!(policy.for_kind(EntityKind::Costs), Duration::from_secs(99));
        assert_eq!(policy.for_kind(EntityKind::Steps), Duration::from_secs(10));
    }

    #[test]
    fn mismatched_kind_is_rejected() {
        let cache = EntryCache::default();
        let key = FetchKey::procedure(1);
        let err = cache
            .put(key, institution(1), Duration::from_secs(60))
            .unwrap_err();
        assert!(matches!(err, ProcedexError::Internal(_)));
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn insert_uses_kind_ttl() {
        let config = CacheConfig::new().kind_ttl(EntityKind::Institution, Duration::from_secs(5));
        let cache = EntryCache::new(config);
        let key = FetchKey::institution(3);
        cache.insert(key, institution(3)).unwrap();
        assert_eq!(cache.entry(&key).unwrap().ttl, Duration::from_secs(5));
    }

    #[test]
    fn config_builder_pattern() {
        let config = CacheConfig::new()
            .max_entries(500)
            .max_stale(None)
            .ttl(Duration::from_secs(60));
        assert_eq!(config.max_entries, 500);
        assert_eq!(config.max_stale, None);
        assert_eq!(config.ttl, TtlPolicy::uniform(Duration::from_secs(60)));
    }
}
