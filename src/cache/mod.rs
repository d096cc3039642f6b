//! Caching subsystem.
//!
//! - [`EntryCache`]: bounded store of decoded upstream entities keyed on
//!   [`FetchKey`](crate::FetchKey), with per-kind TTLs and a stale fallback
//!   window. Populated exclusively by the
//!   [`FetchCoordinator`](crate::fetch::FetchCoordinator).

pub mod entry;

pub use entry::{CacheConfig, CacheEntry, EntryCache, TtlPolicy};
