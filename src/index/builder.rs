//! Populates the keyword index from procedures resolved through the fetch
//! coordinator.
//!
//! Lifecycle: `Empty → Building → Ready → Refreshing → Ready`. Mutations
//! are applied to the live index in place, so searches keep answering from
//! whatever is already indexed while a build or refresh runs.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::StreamExt;
use futures_util::stream;
use serde::Serialize;
use serde::ser::SerializeStruct;
use tracing::{debug, info, warn};

use super::keyword::KeywordIndex;
use crate::fetch::FetchCoordinator;
use crate::telemetry;
use crate::types::{FetchKey, Freshness};
use crate::{ProcedexError, Result};

/// Where the index is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexState {
    /// Nothing has been built yet.
    Empty,
    /// Initial or full build in progress.
    Building,
    /// No build in progress.
    Ready,
    /// Incremental update of an already built index in progress.
    Refreshing,
}

impl fmt::Display for IndexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Empty => "empty",
            Self::Building => "building",
            Self::Ready => "ready",
            Self::Refreshing => "refreshing",
        };
        f.write_str(name)
    }
}

/// A procedure that could not be indexed.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildFailure {
    pub id: u64,
    pub error: ProcedexError,
}

impl Serialize for BuildFailure {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("BuildFailure", 3)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("kind", &self.error.outcome())?;
        state.serialize_field("message", &self.error.to_string())?;
        state.end()
    }
}

/// Outcome of a bulk build, in input order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BuildSummary {
    pub succeeded: Vec<u64>,
    pub failed: Vec<BuildFailure>,
}

impl BuildSummary {
    pub fn failed_ids(&self) -> Vec<u64> {
        self.failed.iter().map(|f| f.id).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

#[derive(Debug)]
struct Lifecycle {
    state: IndexState,
    active: usize,
}

/// Feeds resolved procedure records into a [`KeywordIndex`].
pub struct IndexBuilder {
    coordinator: Arc<FetchCoordinator>,
    index: Arc<KeywordIndex>,
    concurrency: usize,
    lifecycle: Mutex<Lifecycle>,
}

impl IndexBuilder {
    pub fn new(coordinator: Arc<FetchCoordinator>, index: Arc<KeywordIndex>, concurrency: usize) -> Self {
        Self {
            coordinator,
            index,
            concurrency: concurrency.max(1),
            lifecycle: Mutex::new(Lifecycle {
                state: IndexState::Empty,
                active: 0,
            }),
        }
    }

    pub fn index(&self) -> &Arc<KeywordIndex> {
        &self.index
    }

    pub fn state(&self) -> IndexState {
        self.lock_lifecycle().state
    }

    /// Resolve and index every id, continuing past failures.
    ///
    /// Ids are resolved with bounded concurrency; cached procedures are not
    /// refetched. A procedure upstream reports as missing is also removed
    /// from the index.
    pub async fn build_all(&self, ids: &[u64]) -> BuildSummary {
        let _phase = self.enter(first_build_or_refresh);
        self.build_ids(ids).await
    }

    /// Clear the index, then build it from `ids`.
    pub async fn rebuild_all(&self, ids: &[u64]) -> BuildSummary {
        let _phase = self.enter(|_| IndexState::Building);
        self.index.rebuild();
        self.build_ids(ids).await
    }

    /// Refetch and re-index one procedure, bypassing a fresh cache entry.
    pub async fn refresh(&self, id: u64) -> Result<()> {
        let _phase = self.enter(first_build_or_refresh);
        self.index_one(id, true).await
    }

    /// Clear the index and return to `Empty`.
    pub fn reset(&self) {
        self.index.rebuild();
        let mut lifecycle = self.lock_lifecycle();
        if lifecycle.active == 0 {
            lifecycle.state = IndexState::Empty;
        }
    }

    async fn build_ids(&self, ids: &[u64]) -> BuildSummary {
        info!(count = ids.len(), concurrency = self.concurrency, "building keyword index");
        let outcomes: Vec<(u64, Result<()>)> = stream::iter(ids.iter().copied())
            .map(|id| async move { (id, self.index_one(id, false).await) })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut summary = BuildSummary::default();
        for (id, outcome) in outcomes {
            match outcome {
                Ok(()) => summary.succeeded.push(id),
                Err(error) => summary.failed.push(BuildFailure { id, error }),
            }
        }
        info!(
            succeeded = summary.succeeded.len(),
            failed = summary.failed.len(),
            indexed = self.index.len(),
            "keyword index build finished"
        );
        summary
    }

    async fn index_one(&self, id: u64, force: bool) -> Result<()> {
        let key = FetchKey::procedure(id);
        let resolved = if force {
            self.coordinator.refetch(key).await
        } else {
            self.coordinator.resolve(key).await
        };

        let outcome = match resolved {
            Ok(resolved) => match resolved.entity.as_procedure() {
                Some(record) => {
                    if resolved.freshness == Freshness::Stale {
                        debug!(id, "indexing stale procedure record");
                    }
                    self.index.index(id, &record.index_text());
                    Ok(())
                }
                None => Err(ProcedexError::Internal(format!(
                    "{key} resolved to a {} entity",
                    resolved.entity.kind()
                ))),
            },
            Err(ProcedexError::NotFound(missing)) => {
                if self.index.remove(id) {
                    info!(id, "procedure no longer exists upstream, removed from index");
                }
                Err(ProcedexError::NotFound(missing))
            }
            Err(e) => Err(e),
        };

        match &outcome {
            Ok(()) => {
                metrics::counter!(telemetry::INDEXED_TOTAL, "status" => "ok").increment(1);
            }
            Err(e) => {
                warn!(id, error = %e, "failed to index procedure");
                metrics::counter!(telemetry::INDEXED_TOTAL, "status" => "error").increment(1);
            }
        }
        outcome
    }

    /// Enters the phase `select` picks from the current state, under one lock.
    fn enter(&self, select: impl FnOnce(IndexState) -> IndexState) -> PhaseGuard<'_> {
        let mut lifecycle = self.lock_lifecycle();
        lifecycle.active += 1;
        // A full build in progress dominates concurrent refreshes.
        if lifecycle.state != IndexState::Building {
            lifecycle.state = select(lifecycle.state);
        }
        debug!(state = %lifecycle.state, active = lifecycle.active, "index lifecycle");
        PhaseGuard { builder: self }
    }

    fn lock_lifecycle(&self) -> std::sync::MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Work against an unbuilt index is its first build.
fn first_build_or_refresh(state: IndexState) -> IndexState {
    match state {
        IndexState::Empty => IndexState::Building,
        _ => IndexState::Refreshing,
    }
}

/// Returns the builder to `Ready` once the last active phase ends, even if cancelled.
struct PhaseGuard<'a> {
    builder: &'a IndexBuilder,
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        let mut lifecycle = self.builder.lock_lifecycle();
        lifecycle.active = lifecycle.active.saturating_sub(1);
        if lifecycle.active == 0 {
            lifecycle.state = IndexState::Ready;
        }
    }
}
