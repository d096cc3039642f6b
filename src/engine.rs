//! Wiring of the cache, fetch coordinator, keyword index, index builder and
//! query resolver into one owned engine.

use std::sync::Arc;

use tracing::info;

use crate::cache::{CacheConfig, EntryCache};
use crate::config::{Config, UpstreamConfig};
use crate::fetch::{EntitySource, FetchCoordinator, HttpSource, RetryConfig};
use crate::index::{IndexBuilder, IndexConfig, KeywordIndex};
use crate::query::{QueryConfig, QueryResolver};
use crate::{ProcedexError, Result};

/// Main entry point for creating engine instances.
pub struct Procedex;

impl Procedex {
    /// Create a new builder for configuring the engine.
    pub fn builder() -> ProcedexBuilder {
        ProcedexBuilder::new()
    }
}

/// Builder for configuring engine instances.
pub struct ProcedexBuilder {
    source: Option<Arc<dyn EntitySource>>,
    upstream: Option<UpstreamConfig>,
    cache: CacheConfig,
    retry: RetryConfig,
    index: IndexConfig,
    query: QueryConfig,
}

impl ProcedexBuilder {
    pub fn new() -> Self {
        Self {
            source: None,
            upstream: None,
            cache: CacheConfig::default(),
            retry: RetryConfig::default(),
            index: IndexConfig::default(),
            query: QueryConfig::default(),
        }
    }

    /// Builder preloaded from a loaded [`Config`].
    pub fn from_config(config: &Config) -> Self {
        Self::new()
            .upstream(config.upstream.clone())
            .cache(config.cache_config())
            .retry(config.retry_config())
            .index(config.index_config())
            .query(config.query_config())
    }

    /// Use a custom fetch source instead of the HTTP client.
    pub fn source(mut self, source: Arc<dyn EntitySource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Fetch from the eRegulations HTTP API.
    pub fn upstream(mut self, upstream: UpstreamConfig) -> Self {
        self.upstream = Some(upstream);
        self
    }

    pub fn cache(mut self, config: CacheConfig) -> Self {
        self.cache = config;
        self
    }

    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }

    pub fn index(mut self, config: IndexConfig) -> Self {
        self.index = config;
        self
    }

    pub fn query(mut self, config: QueryConfig) -> Self {
        self.query = config;
        self
    }

    /// Build the engine.
    ///
    /// A custom source takes precedence over upstream configuration.
    pub fn build(self) -> Result<Engine> {
        let source: Arc<dyn EntitySource> = match (self.source, self.upstream) {
            (Some(source), _) => source,
            (None, Some(upstream)) => Arc::new(HttpSource::new(&upstream)?),
            (None, None) => {
                return Err(ProcedexError::Configuration(
                    "no fetch source configured: set a source or upstream config".to_string(),
                ));
            }
        };
        if self.query.default_limit == 0 {
            return Err(ProcedexError::Configuration(
                "query default_limit must be at least 1".to_string(),
            ));
        }

        let cache = Arc::new(EntryCache::new(self.cache));
        let coordinator = Arc::new(FetchCoordinator::new(
            Arc::clone(&source),
            Arc::clone(&cache),
            self.retry,
        ));
        let index = Arc::new(KeywordIndex::new(&self.index));
        let builder = Arc::new(IndexBuilder::new(
            Arc::clone(&coordinator),
            Arc::clone(&index),
            self.index.build_concurrency,
        ));
        let resolver = QueryResolver::new(Arc::clone(&coordinator), Arc::clone(&index), self.query);

        info!(source = source.name(), "procedex engine ready");
        Ok(Engine {
            cache,
            coordinator,
            index,
            builder,
            resolver,
        })
    }
}

impl Default for ProcedexBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns every shared structure; nothing is process-global.
#[derive(Clone)]
pub struct Engine {
    cache: Arc<EntryCache>,
    coordinator: Arc<FetchCoordinator>,
    index: Arc<KeywordIndex>,
    builder: Arc<IndexBuilder>,
    resolver: QueryResolver,
}

impl Engine {
    pub fn builder() -> ProcedexBuilder {
        ProcedexBuilder::new()
    }

    pub fn cache(&self) -> &Arc<EntryCache> {
        &self.cache
    }

    pub fn coordinator(&self) -> &Arc<FetchCoordinator> {
        &self.coordinator
    }

    pub fn index(&self) -> &Arc<KeywordIndex> {
        &self.index
    }

    pub fn index_builder(&self) -> &Arc<IndexBuilder> {
        &self.builder
    }

    pub fn resolver(&self) -> &QueryResolver {
        &self.resolver
    }

    /// Drop every cached entity and indexed term.
    pub fn dispose(&self) {
        self.builder.reset();
        self.cache.clear();
        info!("procedex engine disposed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_without_source_fails() {
        let err = Procedex::builder().build().err().unwrap();
        assert!(matches!(err, ProcedexError::Configuration(_)));
    }

    #[test]
    fn build_from_default_config_uses_http() {
        let engine = ProcedexBuilder::from_config(&Config::default())
            .build()
            .unwrap();
        assert_eq!(engine.coordinator().source_name(), "eregulations-http");
        assert!(engine.index().is_empty());
    }
}
