//! In-memory keyword index over procedure text.
//!
//! Two maps are kept in step with each other:
//! - `postings`: normalized term → ids of procedures containing it
//! - `reverse`: procedure id → its current term set
//!
//! Updating one procedure touches only that procedure's terms. Both maps are
//! sharded `DashMap`s, so mutations lock one reverse entry plus the posting
//! sets being changed, never the whole index. Lock order is always
//! `reverse` before `postings`; searches only read `postings` and never
//! wait on a build in progress.

use std::collections::{BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock};

use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;

use crate::telemetry;

/// Keyword index configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexConfig {
    /// Terms shorter than this many characters are dropped. Default: 3.
    pub min_term_len: usize,
    /// Procedures fetched concurrently during a bulk build. Default: 8.
    pub build_concurrency: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            min_term_len: 3,
            build_concurrency: 8,
        }
    }
}

impl IndexConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min_term_len(mut self, len: usize) -> Self {
        self.min_term_len = len.max(1);
        self
    }

    pub fn build_concurrency(mut self, n: usize) -> Self {
        self.build_concurrency = n.max(1);
        self
    }
}

/// One search result: a procedure and the number of distinct query terms it matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub procedure_id: u64,
    pub score: usize,
}

/// Split text into its distinct index terms.
///
/// Lowercases, splits on anything that is not alphanumeric, and drops
/// terms shorter than `min_term_len` characters.
pub fn normalize(text: &str, min_term_len: usize) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.chars().count() >= min_term_len)
        .map(str::to_lowercase)
        .collect()
}

/// Term → procedure postings with a reverse map for incremental updates.
pub struct KeywordIndex {
    postings: DashMap<String, BTreeSet<u64>>,
    reverse: DashMap<u64, BTreeSet<String>>,
    /// Shared by `index`/`remove`, exclusive for `rebuild`.
    maintenance: RwLock<()>,
    min_term_len: usize,
}

impl KeywordIndex {
    pub fn new(config: &IndexConfig) -> Self {
        Self {
            postings: DashMap::new(),
            reverse: DashMap::new(),
            maintenance: RwLock::new(()),
            min_term_len: config.min_term_len.max(1),
        }
    }

    pub fn min_term_len(&self) -> usize {
        self.min_term_len
    }

    /// Terms `text` would be indexed under.
    pub fn normalize(&self, text: &str) -> BTreeSet<String> {
        normalize(text, self.min_term_len)
    }

    /// Index (or re-index) a procedure.
    ///
    /// Terms the procedure was previously indexed under but that no longer
    /// appear in `text` are dropped first. Text without any term leaves the
    /// procedure unindexed.
    pub fn index(&self, procedure_id: u64, text: &str) {
        let terms = self.normalize(text);
        let _shared = self
            .maintenance
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        {
            let mut current = self.reverse.entry(procedure_id).or_default();
            for term in current.difference(&terms) {
                self.unpost(term, procedure_id);
            }
            for term in terms.difference(&current) {
                self.postings
                    .entry(term.clone())
                    .or_default()
                    .insert(procedure_id);
            }
            debug!(procedure_id, terms = terms.len(), "indexed procedure");
            *current = terms;
        }
        self.reverse
            .remove_if(&procedure_id, |_, terms| terms.is_empty());
    }

    /// Remove a procedure from every posting set. Returns whether it was indexed.
    pub fn remove(&self, procedure_id: u64) -> bool {
        let _shared = self
            .maintenance
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let removed = match self.reverse.get_mut(&procedure_id) {
            Some(mut current) => {
                for term in current.iter() {
                    self.unpost(term, procedure_id);
                }
                current.clear();
                true
            }
            None => false,
        };
        if removed {
            self.reverse
                .remove_if(&procedure_id, |_, terms| terms.is_empty());
            debug!(procedure_id, "removed procedure from index");
        }
        removed
    }

    /// Procedures matching the most distinct query terms.
    ///
    /// Sorted by descending score, ties by ascending id, at most `limit` hits.
    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        metrics::counter!(telemetry::SEARCHES_TOTAL).increment(1);
        let terms = self.normalize(query);
        if terms.is_empty() || limit == 0 {
            return Vec::new();
        }

        let mut scores: HashMap<u64, usize> = HashMap::new();
        for term in &terms {
            if let Some(ids) = self.postings.get(term) {
                for id in ids.iter() {
                    *scores.entry(*id).or_default() += 1;
                }
            }
        }

        let mut hits: Vec<SearchHit> = scores
            .into_iter()
            .map(|(procedure_id, score)| SearchHit {
                procedure_id,
                score,
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then(a.procedure_id.cmp(&b.procedure_id))
        });
        hits.truncate(limit);
        debug!(query, hits = hits.len(), "keyword search");
        hits
    }

    /// Drop every term and posting.
    ///
    /// Concurrent searches may observe a partially cleared index.
    pub fn rebuild(&self) {
        let _exclusive = self
            .maintenance
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        self.reverse.clear();
        self.postings.clear();
        debug!("keyword index cleared");
    }

    /// Current terms of a procedure, sorted.
    pub fn terms_for(&self, procedure_id: u64) -> Vec<String> {
        self.reverse
            .get(&procedure_id)
            .map(|terms| terms.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Procedures posted under a term, ascending.
    pub fn postings(&self, term: &str) -> Vec<u64> {
        self.postings
            .get(&term.to_lowercase())
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, procedure_id: u64) -> bool {
        self.reverse.contains_key(&procedure_id)
    }

    /// Indexed procedure ids, ascending.
    pub fn procedure_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.reverse.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Number of indexed procedures.
    pub fn len(&self) -> usize {
        self.reverse.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reverse.is_empty()
    }

    /// Number of distinct terms.
    pub fn term_count(&self) -> usize {
        self.postings.len()
    }

    fn unpost(&self, term: &str, procedure_id: u64) {
        if let Some(mut ids) = self.postings.get_mut(term) {
            ids.remove(&procedure_id);
        }
        self.postings.remove_if(term, |_, ids| ids.is_empty());
    }
}

impl Default for KeywordIndex {
    fn default() -> Self {
        Self::new(&IndexConfig::default())
    }
}
