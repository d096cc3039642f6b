//! The upstream fetch capability.
//!
//! A source performs exactly one attempt per call and reports failures
//! through the crate error taxonomy:
//! - `NotFound` when upstream confirms the entity does not exist
//! - `Http` / `Api` (5xx) / `RateLimited` / `Timeout` for transient failures
//!
//! Retry, backoff, caching and deduplication are layered on top by the
//! [`FetchCoordinator`](super::FetchCoordinator); sources must not retry.

use async_trait::async_trait;

use crate::Result;
use crate::types::FetchKey;

/// Fetches raw JSON payloads for entity keys.
#[async_trait]
pub trait EntitySource: Send + Sync {
    /// Source name for logging/debugging.
    fn name(&self) -> &str;

    /// Fetch the raw payload for `key` (single attempt).
    async fn fetch(&self, key: FetchKey) -> Result<serde_json::Value>;
}
