//! Keyword search over procedure text.
//!
//! - [`KeywordIndex`]: term postings with a reverse map, updated in place
//! - [`IndexBuilder`]: resolves procedures and feeds them into the index

pub mod builder;
pub mod keyword;

pub use builder::{BuildFailure, BuildSummary, IndexBuilder, IndexState};
pub use keyword::{IndexConfig, KeywordIndex, SearchHit, normalize};
