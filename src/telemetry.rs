//! Telemetry metric name constants.
//!
//! Centralised metric names for procedex operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `procedex_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `kind`: entity kind (e.g. "procedure", "costs")
//! - `status`: outcome: "ok", "not_found" or "error"

/// Fresh cache hits served without touching upstream.
///
/// Labels: `kind`.
pub const CACHE_HITS_TOTAL: &str = "procedex_cache_hits_total";

/// Lookups that found no fresh entry (absent or expired).
///
/// Labels: `kind`.
pub const CACHE_MISSES_TOTAL: &str = "procedex_cache_misses_total";

/// TTL-expired values served because the refetch failed.
///
/// Labels: `kind`.
pub const STALE_SERVED_TOTAL: &str = "procedex_stale_served_total";

/// Upstream fetches started (one per single-flight, not per attempt).
///
/// Labels: `kind`, `status`.
pub const FETCHES_TOTAL: &str = "procedex_fetches_total";

/// Duration of a single-flight fetch including retries, in seconds.
///
/// Labels: `kind`.
pub const FETCH_DURATION_SECONDS: &str = "procedex_fetch_duration_seconds";

/// Retry attempts (not counting the initial request).
///
/// Labels: `kind`.
pub const RETRIES_TOTAL: &str = "procedex_retries_total";

/// Callers that joined a fetch already in flight instead of starting one.
///
/// Labels: `kind`.
pub const COALESCED_TOTAL: &str = "procedex_coalesced_total";

/// Procedures indexed by the index builder.
///
/// Labels: `status` ("ok" | "error").
pub const INDEXED_TOTAL: &str = "procedex_indexed_total";

/// Keyword searches executed.
pub const SEARCHES_TOTAL: &str = "procedex_searches_total";
