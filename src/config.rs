//! Configuration loading.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (CLI flag)
//! 2. `~/.procedex/config.toml` (user)
//! 3. `/etc/procedex/config.toml` (system)
//!
//! Every section and key is optional. When no file is found the defaults
//! apply. The upstream API key may also come from `EREGULATIONS_API_KEY`.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::cache::{CacheConfig, TtlPolicy};
use crate::fetch::RetryConfig;
use crate::index::IndexConfig;
use crate::query::QueryConfig;
use crate::{ProcedexError, Result};

/// Environment variable consulted when no API key is configured.
pub const API_KEY_ENV_VAR: &str = "EREGULATIONS_API_KEY";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub index: IndexSection,
    #[serde(default)]
    pub query: QuerySection,
}

/// Upstream eRegulations API settings.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// API root (default: https://api-tanzania.tradeportal.org).
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer token. Falls back to `EREGULATIONS_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Per-request timeout in seconds (default: 30).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl UpstreamConfig {
    /// Configured API key, falling back to the environment.
    pub fn api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(API_KEY_ENV_VAR).ok())
            .filter(|key| !key.is_empty())
    }
}

fn default_base_url() -> String {
    "https://api-tanzania.tradeportal.org".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

/// `[cache]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
    /// Seconds an expired entry stays available as a fallback; 0 = unbounded.
    #[serde(default = "default_max_stale")]
    pub max_stale_secs: u64,
    #[serde(default = "default_ttl")]
    pub procedure_ttl_secs: u64,
    #[serde(default = "default_ttl")]
    pub steps_ttl_secs: u64,
    #[serde(default = "default_ttl")]
    pub requirements_ttl_secs: u64,
    #[serde(default = "default_ttl")]
    pub costs_ttl_secs: u64,
    #[serde(default = "default_ttl")]
    pub institution_ttl_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            max_stale_secs: default_max_stale(),
            procedure_ttl_secs: default_ttl(),
            steps_ttl_secs: default_ttl(),
            requirements_ttl_secs: default_ttl(),
            costs_ttl_secs: default_ttl(),
            institution_ttl_secs: default_ttl(),
        }
    }
}

fn default_max_entries() -> u64 {
    10_000
}

fn default_max_stale() -> u64 {
    86_400
}

fn default_ttl() -> u64 {
    3_600
}

impl From<&CacheSection> for CacheConfig {
    fn from(section: &CacheSection) -> Self {
        let max_stale = match section.max_stale_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        CacheConfig {
            max_entries: section.max_entries,
            max_stale,
            ttl: TtlPolicy {
                procedure: Duration::from_secs(section.procedure_ttl_secs),
                steps: Duration::from_secs(section.steps_ttl_secs),
                requirements: Duration::from_secs(section.requirements_ttl_secs),
                costs: Duration::from_secs(section.costs_ttl_secs),
                institution: Duration::from_secs(section.institution_ttl_secs),
            },
        }
    }
}

/// `[retry]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    /// 0 disables the per-attempt timeout.
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            attempt_timeout_secs: default_attempt_timeout(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> u64 {
    500
}

fn default_max_delay() -> u64 {
    30_000
}

fn default_attempt_timeout() -> u64 {
    30
}

impl From<&RetrySection> for RetryConfig {
    fn from(section: &RetrySection) -> Self {
        let attempt_timeout = match section.attempt_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        RetryConfig::new()
            .max_attempts(section.max_attempts)
            .initial_delay(Duration::from_millis(section.initial_delay_ms))
            .max_delay(Duration::from_millis(section.max_delay_ms))
            .attempt_timeout(attempt_timeout)
    }
}

/// `[index]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexSection {
    #[serde(default = "default_min_term_len")]
    pub min_term_len: usize,
    #[serde(default = "default_build_concurrency")]
    pub build_concurrency: usize,
}

impl Default for IndexSection {
    fn default() -> Self {
        Self {
            min_term_len: default_min_term_len(),
            build_concurrency: default_build_concurrency(),
        }
    }
}

fn default_min_term_len() -> usize {
    3
}

fn default_build_concurrency() -> usize {
    8
}

impl From<&IndexSection> for IndexConfig {
    fn from(section: &IndexSection) -> Self {
        IndexConfig::new()
            .min_term_len(section.min_term_len)
            .build_concurrency(section.build_concurrency)
    }
}

/// `[query]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct QuerySection {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
    /// 0 disables the lookup deadline.
    #[serde(default = "default_lookup_timeout")]
    pub lookup_timeout_secs: u64,
}

impl Default for QuerySection {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            lookup_timeout_secs: default_lookup_timeout(),
        }
    }
}

fn default_limit() -> usize {
    5
}

fn default_max_limit() -> usize {
    50
}

fn default_lookup_timeout() -> u64 {
    60
}

impl From<&QuerySection> for QueryConfig {
    fn from(section: &QuerySection) -> Self {
        let lookup_timeout = match section.lookup_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        QueryConfig::new()
            .default_limit(section.default_limit)
            .max_limit(section.max_limit)
            .lookup_timeout(lookup_timeout)
    }
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided; must exist)
    /// 2. `~/.procedex/config.toml`
    /// 3. `/etc/procedex/config.toml`
    ///
    /// Falls back to defaults when no file is found.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::load_from_file(&path),
            None => {
                debug!("no config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ProcedexError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            ProcedexError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })?;
        debug!(?path, "loaded config");
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.index.min_term_len == 0 {
            return Err(ProcedexError::Configuration(
                "index.min_term_len must be at least 1".to_string(),
            ));
        }
        if self.index.build_concurrency == 0 {
            return Err(ProcedexError::Configuration(
                "index.build_concurrency must be at least 1".to_string(),
            ));
        }
        if self.query.default_limit == 0 || self.query.default_limit > self.query.max_limit {
            return Err(ProcedexError::Configuration(format!(
                "query.default_limit must be between 1 and max_limit ({})",
                self.query.max_limit
            )));
        }
        if self.cache.max_entries == 0 {
            return Err(ProcedexError::Configuration(
                "cache.max_entries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::from(&self.cache)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::from(&self.retry)
    }

    pub fn index_config(&self) -> IndexConfig {
        IndexConfig::from(&self.index)
    }

    pub fn query_config(&self) -> QueryConfig {
        QueryConfig::from(&self.query)
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(ProcedexError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".procedex").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/procedex/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }
}
