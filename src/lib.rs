//! Procedex - procedure index & cache resolution engine
//!
//! Fronts the eRegulations procedure catalog (procedures, steps,
//! requirements, costs, institutions) with lookups that are cached with
//! per-kind TTLs, deduplicated per key while in flight, and served stale
//! when upstream fails. A keyword index over procedure text answers
//! free-form searches.
//!
//! # Example
//!
//! ```rust,no_run
//! use procedex::{EntityKind, Procedex, UpstreamConfig};
//!
//! #[tokio::main]
//! async fn main() -> procedex::Result<()> {
//!     let engine = Procedex::builder()
//!         .upstream(UpstreamConfig::default())
//!         .build()?;
//!
//!     let summary = engine.index_builder().build_all(&[1, 2, 3]).await;
//!     println!("indexed {} procedures", summary.succeeded.len());
//!
//!     let hits = engine
//!         .resolver()
//!         .search_by_keyword("business registration", Some(5))
//!         .await?;
//!     for hit in hits {
//!         println!("{} {}", hit.id, hit.title);
//!     }
//!
//!     let costs = engine.resolver().lookup_by_id(EntityKind::Costs, 1).await?;
//!     println!("{:?}", costs.freshness);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod index;
pub mod query;
pub mod render;
pub mod telemetry;
pub mod types;
pub mod version;

// Re-export main types at crate root
pub use config::{Config, UpstreamConfig};
pub use engine::{Engine, Procedex, ProcedexBuilder};
pub use error::{ErrorClass, FailureKind, ProcedexError, Result};
pub use fetch::{EntitySource, FetchCoordinator, HttpSource, RetryConfig};
pub use index::{BuildSummary, IndexBuilder, IndexState, KeywordIndex, SearchHit};
pub use query::{
    Answer, AnswerSection, ProcedureSummary, QueryIntent, QueryResolver, StepDetail,
};

pub use types::{
    Entity, EntityKind, FetchKey, Freshness, Institution, ProcedureRecord, Resolved,
};
