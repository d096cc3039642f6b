//! Top-level query operations: lookup by id, keyword search, questions
//! about a procedure, and free-form requests.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde::Serialize;
use tracing::{debug, warn};

use super::answer::{AnswerSection, select_section};
use super::intent::{QueryIntent, parse_intent, procedure_id_from_url};
use crate::fetch::FetchCoordinator;
use crate::index::KeywordIndex;
use crate::render;
use crate::types::{EntityKind, FetchKey, Freshness, ProcedureRecord, Resolved, Step};
use crate::{ProcedexError, Result};

/// Reply when a request could not be routed.
pub const UNKNOWN_QUERY_MESSAGE: &str = "I couldn't understand your query. Please try asking \
about a specific procedure, steps, requirements, costs, or search for procedures using keywords.";

/// Query resolver configuration.
///
/// ```rust
/// # use procedex::query::QueryConfig;
/// # use std::time::Duration;
/// let config = QueryConfig::new()
///     .default_limit(10)
///     .lookup_timeout(Some(Duration::from_secs(5)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryConfig {
    /// Search results returned when the caller gives no limit. Default: 5.
    pub default_limit: usize,
    /// Upper bound on any requested limit. Default: 50.
    pub max_limit: usize,
    /// How long a caller waits on a lookup. Default: 60s.
    pub lookup_timeout: Option<Duration>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: 5,
            max_limit: 50,
            lookup_timeout: Some(Duration::from_secs(60)),
        }
    }
}

impl QueryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_limit(mut self, limit: usize) -> Self {
        self.default_limit = limit;
        self
    }

    pub fn max_limit(mut self, limit: usize) -> Self {
        self.max_limit = limit;
        self
    }

    /// Set the caller-side lookup deadline (`None` = wait indefinitely).
    pub fn lookup_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    /// Requested limit, defaulted and capped.
    pub fn effective_limit(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.default_limit).min(self.max_limit)
    }
}

/// Short description of a procedure in search results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcedureSummary {
    pub id: u64,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub step_count: usize,
    /// Distinct query terms matched.
    pub score: usize,
    pub freshness: Freshness,
}

impl ProcedureSummary {
    pub fn new(record: &ProcedureRecord, score: usize, freshness: Freshness) -> Self {
        Self {
            id: record.id,
            title: record.title.clone(),
            category: record.category.clone(),
            description: record.description.clone(),
            url: record.url.clone(),
            step_count: record.step_count(),
            score,
            freshness,
        }
    }
}

/// Answer to a question about one procedure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub procedure_id: u64,
    pub section: AnswerSection,
    pub text: String,
    /// `Stale` if any record the answer was drawn from was stale.
    pub freshness: Freshness,
}

/// One step of a procedure, located by its step id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepDetail {
    pub procedure_id: u64,
    /// 1-based position across all blocks.
    pub number: usize,
    pub step: Step,
    pub freshness: Freshness,
}

impl StepDetail {
    pub fn text(&self) -> String {
        render::step_detail(self.procedure_id, self.number, &self.step)
    }
}

/// What a free-form request resolved to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum QueryResult {
    Entity(Resolved),
    Search(Vec<ProcedureSummary>),
    Unknown { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    pub intent: QueryIntent,
    pub confidence: f32,
    pub result: QueryResult,
}

/// Entry point for callers; owns no state beyond shared handles.
#[derive(Clone)]
pub struct QueryResolver {
    coordinator: Arc<FetchCoordinator>,
    index: Arc<KeywordIndex>,
    config: QueryConfig,
}

impl QueryResolver {
    pub fn new(coordinator: Arc<FetchCoordinator>, index: Arc<KeywordIndex>, config: QueryConfig) -> Self {
        Self {
            coordinator,
            index,
            config,
        }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Resolve one entity through the cache and fetch coordinator.
    ///
    /// A caller that hits `lookup_timeout` gets `Timeout`; the fetch itself
    /// keeps running for any other waiters and still fills the cache.
    pub async fn lookup_by_id(&self, kind: EntityKind, id: u64) -> Result<Resolved> {
        let key = FetchKey::new(kind, id);
        match self.config.lookup_timeout {
            Some(limit) => tokio::time::timeout(limit, self.coordinator.resolve(key))
                .await
                .unwrap_or_else(|_| {
                    warn!(%key, timeout_ms = limit.as_millis() as u64, "lookup timed out");
                    Err(ProcedexError::Timeout(limit))
                }),
            None => self.coordinator.resolve(key).await,
        }
    }

    /// Resolve the procedure a page link points at.
    ///
    /// Fails with `InvalidInput` when the link carries no procedure id.
    pub async fn lookup_by_url(&self, url: &str) -> Result<Resolved> {
        let id = procedure_id_from_url(url).ok_or_else(|| {
            ProcedexError::InvalidInput(format!("could not extract procedure ID from URL: {url}"))
        })?;
        self.lookup_by_id(EntityKind::Procedure, id).await
    }

    /// Find one step of a procedure by step id, served from the procedure record.
    ///
    /// `Ok(None)` when the procedure exists but has no such step.
    pub async fn step_details(
        &self,
        procedure_id: u64,
        step_id: u64,
    ) -> Result<Option<StepDetail>> {
        let resolved = self.lookup_by_id(EntityKind::Procedure, procedure_id).await?;
        let record = resolved
            .entity
            .as_procedure()
            .ok_or_else(|| mismatch(FetchKey::procedure(procedure_id), &resolved))?;
        let found = record
            .steps()
            .enumerate()
            .find(|(_, step)| step.id == Some(step_id))
            .map(|(i, step)| StepDetail {
                procedure_id,
                number: i + 1,
                step: step.clone(),
                freshness: resolved.freshness,
            });
        if found.is_none() {
            debug!(procedure_id, step_id, "step not found in procedure");
        }
        Ok(found)
    }

    /// Search the keyword index and summarize each hit.
    ///
    /// Hits upstream reports as deleted are removed from the index and the
    /// search is run again, so the result still holds up to `limit`
    /// procedures. Other failed hits are skipped; an error is returned only
    /// when every hit failed.
    pub async fn search_by_keyword(
        &self,
        query: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ProcedureSummary>> {
        let limit = self.config.effective_limit(limit);
        loop {
            let hits = self.index.search(query, limit);
            let lookups = hits
                .iter()
                .map(|hit| self.lookup_by_id(EntityKind::Procedure, hit.procedure_id));
            let outcomes = join_all(lookups).await;

            let mut summaries = Vec::with_capacity(hits.len());
            let mut first_error = None;
            let mut pruned = false;
            for (hit, outcome) in hits.iter().zip(outcomes) {
                match outcome {
                    Ok(resolved) => match resolved.entity.as_procedure() {
                        Some(record) => summaries.push(ProcedureSummary::new(
                            record,
                            hit.score,
                            resolved.freshness,
                        )),
                        None => {
                            warn!(id = hit.procedure_id, "procedure key resolved to another kind")
                        }
                    },
                    Err(ProcedexError::NotFound(_)) => {
                        debug!(id = hit.procedure_id, "search hit no longer exists upstream");
                        self.index.remove(hit.procedure_id);
                        pruned = true;
                    }
                    Err(e) => {
                        warn!(id = hit.procedure_id, error = %e, "skipping search hit");
                        first_error.get_or_insert(e);
                    }
                }
            }

            // Every pass that prunes shrinks the index, so this terminates.
            if pruned {
                continue;
            }
            return match first_error {
                Some(e) if summaries.is_empty() => Err(e),
                _ => Ok(summaries),
            };
        }
    }

    /// Answer a question about a procedure from the section it asks about.
    ///
    /// Fails with `NotFound` only when the procedure itself is missing; a
    /// missing costs or requirements record is answered in the text.
    pub async fn answer_about_procedure(&self, id: u64, question: &str) -> Result<Answer> {
        let resolved = self.lookup_by_id(EntityKind::Procedure, id).await?;
        let record = resolved.entity.as_procedure().ok_or_else(|| {
            ProcedexError::Internal(format!("procedure/{id} resolved to a {} entity", resolved.entity.kind()))
        })?;
        let section = select_section(question);
        debug!(id, %section, "answering procedure question");

        let mut freshness = resolved.freshness;
        let body = match section {
            AnswerSection::Steps => {
                let steps: Vec<_> = record.steps().cloned().collect();
                render::steps(&steps)
            }
            AnswerSection::Costs => match self.lookup_by_id(EntityKind::Costs, id).await {
                Ok(costs) => {
                    freshness = worst(freshness, costs.freshness);
                    match costs.entity.as_costs() {
                        Some(set) => render::costs(set),
                        None => return Err(mismatch(FetchKey::costs(id), &costs)),
                    }
                }
                Err(ProcedexError::NotFound(_)) => render::no_costs(id),
                Err(e) => return Err(e),
            },
            AnswerSection::Requirements => {
                match self.lookup_by_id(EntityKind::Requirements, id).await {
                    Ok(requirements) => {
                        freshness = worst(freshness, requirements.freshness);
                        match requirements.entity.as_requirements() {
                            Some(set) => render::requirements(set),
                            None => {
                                return Err(mismatch(FetchKey::requirements(id), &requirements));
                            }
                        }
                    }
                    Err(ProcedexError::NotFound(_)) => render::no_requirements(id),
                    Err(e) => return Err(e),
                }
            }
            AnswerSection::Institutions => render::institution_refs(&record.institutions()),
            AnswerSection::Timeline => render::timeline(record),
            AnswerSection::Summary => render::procedure_summary(record),
        };

        Ok(Answer {
            procedure_id: id,
            section,
            text: format!("{}\n\n{body}", section.heading(id)),
            freshness,
        })
    }

    /// Route a free-form request and execute it.
    pub async fn handle_query(&self, text: &str) -> Result<QueryResponse> {
        let intent = parse_intent(text);
        debug!(?intent, "routed query");
        let result = match &intent {
            QueryIntent::Procedure { id } => {
                QueryResult::Entity(self.lookup_by_id(EntityKind::Procedure, *id).await?)
            }
            QueryIntent::ProcedureUrl { id, .. } => {
                QueryResult::Entity(self.lookup_by_id(EntityKind::Procedure, *id).await?)
            }
            QueryIntent::Steps { procedure_id } => {
                QueryResult::Entity(self.lookup_by_id(EntityKind::Steps, *procedure_id).await?)
            }
            QueryIntent::Requirements { procedure_id } => QueryResult::Entity(
                self.lookup_by_id(EntityKind::Requirements, *procedure_id)
                    .await?,
            ),
            QueryIntent::Costs { procedure_id } => {
                QueryResult::Entity(self.lookup_by_id(EntityKind::Costs, *procedure_id).await?)
            }
            QueryIntent::Institution { id } => {
                QueryResult::Entity(self.lookup_by_id(EntityKind::Institution, *id).await?)
            }
            QueryIntent::Search { query, .. } => {
                QueryResult::Search(self.search_by_keyword(query, None).await?)
            }
            QueryIntent::Unknown => QueryResult::Unknown {
                message: UNKNOWN_QUERY_MESSAGE.to_string(),
            },
        };
        Ok(QueryResponse {
            confidence: intent.confidence(),
            intent,
            result,
        })
    }
}

fn worst(a: Freshness, b: Freshness) -> Freshness {
    if a == Freshness::Stale || b == Freshness::Stale {
        Freshness::Stale
    } else {
        Freshness::Fresh
    }
}

fn mismatch(key: FetchKey, resolved: &Resolved) -> ProcedexError {
    ProcedexError::Internal(format!("{key} resolved to a {} entity", resolved.entity.kind()))
}
