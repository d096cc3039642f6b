//! Procedex error types

use std::time::Duration;

use serde::Serialize;

use crate::types::FetchKey;

/// Procedex error types.
///
/// Cloneable so that the outcome of a single upstream fetch can be handed to
/// every caller waiting on it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProcedexError {
    // Upstream/network errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("not found: {0}")]
    NotFound(FetchKey),

    // Data errors
    /// Upstream payload did not decode into the shape expected for its kind.
    #[error("corrupt payload for {key}: {reason}")]
    Corrupt { key: FetchKey, reason: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A cache or index invariant was violated. Should be unreachable.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Failure taxonomy used for retry and cache decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Network, timeout, rate limit, 5xx. Retryable, eligible for stale fallback.
    Transient,
    /// Upstream confirmed absence. Invalidates the cache entry, never retried.
    NotFound,
    /// Unparseable payload. Retried like `Transient`, never cached.
    Corrupt,
    /// Invariant violation inside the engine.
    Internal,
    /// Bad input or configuration supplied by the caller.
    Caller,
}

/// Outward failure kinds surfaced to the calling layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NotFound,
    UpstreamError,
    Timeout,
}

impl ProcedexError {
    /// Classify this error for retry and cache policy.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Http(_) | Self::RateLimited { .. } | Self::Timeout(_) => ErrorClass::Transient,
            Self::Api { status, .. } if *status >= 500 || *status == 408 => ErrorClass::Transient,
            Self::Api { .. } => ErrorClass::Caller,
            Self::NotFound(_) => ErrorClass::NotFound,
            Self::Corrupt { .. } => ErrorClass::Corrupt,
            Self::Internal(_) => ErrorClass::Internal,
            Self::InvalidInput(_) | Self::Configuration(_) => ErrorClass::Caller,
        }
    }

    /// Whether a retry may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self.class(), ErrorClass::Transient | ErrorClass::Corrupt)
    }

    /// Server-provided delay hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Map to the failure kind exposed to callers.
    pub fn outcome(&self) -> FailureKind {
        match self {
            Self::NotFound(_) => FailureKind::NotFound,
            Self::Timeout(_) => FailureKind::Timeout,
            _ => FailureKind::UpstreamError,
        }
    }
}

/// Result type alias for Procedex operations
pub type Result<T> = std::result::Result<T, ProcedexError>;
