//! Hybrid search over the lexical and semantic indices.
//!
//! Candidates are the committed index rows passing the caller's filters.
//! Each candidate gets a lexical score (length-normalized term frequency)
//! and a semantic score (embedding cosine); both are max-normalized over
//! the candidate set and blended with configurable weights. Ordering is
//! fully deterministic: blended score desc, updated_at desc, id asc.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::category::LegalCategory;
use crate::entry::EntryId;
use crate::error::SearchError;
use crate::index::lexical::{LexicalIndex, distinct_tokens};
use crate::index::semantic::{SemanticIndex, cosine};

/// Result type for search operations.
pub type SearchResult<T> = std::result::Result<T, SearchError>;

/// Maximum accepted query length in chars.
pub const MAX_QUERY_LEN: usize = 1024;

/// Ranking weights and limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Weight of the normalized lexical score.
    pub lexical_weight: f32,
    /// Weight of the normalized semantic score.
    pub semantic_weight: f32,
    /// Additive boost applied when a soft category preference matches.
    pub category_boost: f32,
    /// Result count when the caller does not pass a limit.
    pub default_limit: usize,
    /// Hard cap on the result count.
    pub max_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            lexical_weight: 0.5,
            semantic_weight: 0.5,
            category_boost: 0.15,
            default_limit: 20,
            max_limit: 100,
        }
    }
}

/// Caller-supplied restrictions and preferences.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Hard filter: only entries of this category.
    pub category: Option<LegalCategory>,
    /// Hard filter: only entries carrying all of these tags.
    pub tags: Vec<String>,
    /// Soft preference: entries of this category get `category_boost`
    /// added to their blended score. Used by the consultation
    /// orchestrator so cross-category knowledge stays discoverable.
    pub boost_category: Option<LegalCategory>,
}

/// A ranked search hit with its component scores exposed.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub entry_id: EntryId,
    pub category: LegalCategory,
    /// Normalized lexical component in [0, 1].
    pub lexical_score: f32,
    /// Normalized semantic component in [0, 1].
    pub semantic_score: f32,
    /// Blended score (including any category boost), clamped to [0, 1].
    pub blended_score: f32,
    /// Whether the soft category boost applied to this hit.
    pub boosted: bool,
    pub updated_at: u64,
}

/// The hybrid search engine. Cheap to share: it only holds index handles.
pub struct SearchEngine {
    lexical: Arc<LexicalIndex>,
    semantic: Arc<SemanticIndex>,
    config: SearchConfig,
}

impl SearchEngine {
    pub fn new(
        lexical: Arc<LexicalIndex>,
        semantic: Arc<SemanticIndex>,
        config: SearchConfig,
    ) -> Self {
        Self {
            lexical,
            semantic,
            config,
        }
    }

    /// The active ranking configuration.
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Run a search. `limit = None` uses the configured default; any value
    /// is clamped to the hard cap. An empty candidate set is a valid empty
    /// result, not an error.
    pub fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
        limit: Option<usize>,
    ) -> SearchResult<Vec<SearchHit>> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        let length = trimmed.chars().count();
        if length > MAX_QUERY_LEN {
            return Err(SearchError::QueryTooLong {
                length,
                max: MAX_QUERY_LEN,
            });
        }
        let query_terms: BTreeSet<String> = distinct_tokens(trimmed);
        if query_terms.is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let limit = limit
            .unwrap_or(self.config.default_limit)
            .min(self.config.max_limit);

        // Candidate set: committed rows passing the hard filters.
        let filter_tags: BTreeSet<String> = filters
            .tags
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        let candidates: Vec<(EntryId, Arc<crate::index::lexical::LexRow>)> = self
            .lexical
            .snapshot_rows()
            .into_iter()
            .filter(|(_, row)| {
                filters.category.is_none_or(|c| row.category == c)
                    && filter_tags.iter().all(|t| row.tags.contains(t))
            })
            .collect();

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        // Raw lexical scores: Σ tf over query terms, length-normalized.
        let tf_acc = self.lexical.accumulate_tf(&query_terms);
        let raw_lexical: Vec<f32> = candidates
            .iter()
            .map(|(id, row)| {
                let tf = tf_acc.get(id).copied().unwrap_or(0) as f32;
                if row.token_count > 0 {
                    tf / row.token_count as f32
                } else {
                    0.0
                }
            })
            .collect();

        // Raw semantic scores: cosine clamped to [0, 1].
        let query_embedding = self.semantic.embed(trimmed);
        let raw_semantic: Vec<f32> = candidates
            .iter()
            .map(|(id, _)| {
                self.semantic
                    .get(*id)
                    .map(|v| cosine(&query_embedding, &v).max(0.0))
                    .unwrap_or(0.0)
            })
            .collect();

        let lex_norm = max_normalize(&raw_lexical);
        let sem_norm = max_normalize(&raw_semantic);

        let mut hits: Vec<SearchHit> = candidates
            .iter()
            .enumerate()
            .map(|(i, (id, row))| {
                let blended = self.config.lexical_weight * lex_norm[i]
                    + self.config.semantic_weight * sem_norm[i];
                let boosted = filters.boost_category.is_some_and(|c| row.category == c);
                let blended = if boosted {
                    (blended + self.config.category_boost).min(1.0)
                } else {
                    blended
                };
                SearchHit {
                    entry_id: *id,
                    category: row.category,
                    lexical_score: lex_norm[i],
                    semantic_score: sem_norm[i],
                    blended_score: blended,
                    boosted,
                    updated_at: row.updated_at,
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            b.blended_score
                .partial_cmp(&a.blended_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.updated_at.cmp(&a.updated_at))
                .then_with(|| a.entry_id.cmp(&b.entry_id))
        });
        hits.truncate(limit);

        tracing::debug!(
            query = trimmed,
            candidates = candidates.len(),
            returned = hits.len(),
            "search completed"
        );
        Ok(hits)
    }
}

/// Normalize scores into [0, 1] by dividing by the maximum.
///
/// A uniformly zero set stays zero: a set where nothing matches must not
/// be inflated into looking relevant.
fn max_normalize(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().cloned().fold(0.0f32, f32::max);
    if max > 0.0 {
        scores.iter().map(|s| s / max).collect()
    } else {
        vec![0.0; scores.len()]
    }
}

impl std::fmt::Debug for SearchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchEngine")
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::lexical::tokenize;
    use crate::index::semantic::EmbeddingDim;

    struct Fixture {
        lexical: Arc<LexicalIndex>,
        semantic: Arc<SemanticIndex>,
        engine: SearchEngine,
    }

    fn fixture() -> Fixture {
        let lexical = Arc::new(LexicalIndex::new());
        let semantic = Arc::new(SemanticIndex::new(EmbeddingDim::TEST));
        let engine = SearchEngine::new(
            Arc::clone(&lexical),
            Arc::clone(&semantic),
            SearchConfig::default(),
        );
        Fixture {
            lexical,
            semantic,
            engine,
        }
    }

    fn index(
        f: &Fixture,
        raw_id: u64,
        category: LegalCategory,
        tags: &[&str],
        updated_at: u64,
        text: &str,
    ) {
        let id = EntryId::new(raw_id).unwrap();
        f.lexical.upsert(
            id,
            1,
            category,
            tags.iter().map(|t| t.to_string()).collect(),
            updated_at,
            &tokenize(text),
        );
        f.semantic.upsert(id, text);
    }

    #[test]
    fn empty_query_rejected() {
        let f = fixture();
        assert!(matches!(
            f.engine.search("   ", &SearchFilters::default(), None),
            Err(SearchError::EmptyQuery)
        ));
        // Punctuation-only input carries no indexable terms.
        assert!(matches!(
            f.engine.search("？！", &SearchFilters::default(), None),
            Err(SearchError::EmptyQuery)
        ));
    }

    #[test]
    fn overlong_query_rejected() {
        let f = fixture();
        let long = "法".repeat(MAX_QUERY_LEN + 1);
        assert!(matches!(
            f.engine.search(&long, &SearchFilters::default(), None),
            Err(SearchError::QueryTooLong { .. })
        ));
    }

    #[test]
    fn no_candidates_is_empty_ok() {
        let f = fixture();
        let hits = f
            .engine
            .search("合同", &SearchFilters::default(), None)
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn term_overlap_ranks_higher() {
        let f = fixture();
        index(&f, 1, LegalCategory::CivilLaw, &[], 100, "合同纠纷的处理与赔偿责任");
        index(&f, 2, LegalCategory::LaborLaw, &[], 100, "劳动合同的订立与解除");
        index(&f, 3, LegalCategory::EnvironmentalLaw, &[], 100, "环境污染的治理措施");

        let hits = f
            .engine
            .search("合同纠纷", &SearchFilters::default(), None)
            .unwrap();
        assert_eq!(hits[0].entry_id.get(), 1);
        assert!(hits[0].blended_score > hits[1].blended_score);
        // The environmental entry shares no terms.
        let env = hits.iter().find(|h| h.entry_id.get() == 3);
        if let Some(env) = env {
            assert_eq!(env.lexical_score, 0.0);
        }
    }

    #[test]
    fn contract_query_ranks_civil_entry_first() {
        // A 合同 query over one civil and one labor entry.
        let f = fixture();
        index(&f, 1, LegalCategory::CivilLaw, &[], 100, "合同纠纷的典型案例，合同条款的解释");
        index(&f, 2, LegalCategory::LaborLaw, &[], 100, "劳动合同与工资支付争议");

        let hits = f
            .engine
            .search("合同", &SearchFilters::default(), Some(10))
            .unwrap();
        assert_eq!(hits.len(), 2);
        let pos_1 = hits.iter().position(|h| h.entry_id.get() == 1).unwrap();
        let pos_2 = hits.iter().position(|h| h.entry_id.get() == 2).unwrap();
        assert!(pos_1 <= pos_2);
    }

    #[test]
    fn category_hard_filter_restricts() {
        let f = fixture();
        index(&f, 1, LegalCategory::CivilLaw, &[], 100, "合同纠纷");
        index(&f, 2, LegalCategory::LaborLaw, &[], 100, "劳动合同");

        let hits = f
            .engine
            .search(
                "合同",
                &SearchFilters {
                    category: Some(LegalCategory::LaborLaw),
                    ..Default::default()
                },
                None,
            )
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entry_id.get(), 2);
    }

    #[test]
    fn tag_filter_requires_all_tags() {
        let f = fixture();
        index(&f, 1, LegalCategory::CivilLaw, &["合同", "案例"], 100, "合同纠纷案例");
        index(&f, 2, LegalCategory::CivilLaw, &["合同"], 100, "合同条款解释");

        let hits = f
            .engine
            .search(
                "合同",
                &SearchFilters {
                    tags: vec!["合同".into(), "案例".into()],
                    ..Default::default()
                },
                None,
            )
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entry_id.get(), 1);
    }

    #[test]
    fn soft_boost_prefers_category_without_excluding() {
        let f = fixture();
        index(&f, 1, LegalCategory::CivilLaw, &[], 100, "合同纠纷处理");
        index(&f, 2, LegalCategory::LaborLaw, &[], 100, "合同纠纷处理");

        let hits = f
            .engine
            .search(
                "合同纠纷",
                &SearchFilters {
                    boost_category: Some(LegalCategory::LaborLaw),
                    ..Default::default()
                },
                None,
            )
            .unwrap();
        // Both remain discoverable; the boosted one ranks first.
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].entry_id.get(), 2);
        assert!(hits[0].boosted);
        assert!(!hits[1].boosted);
    }

    #[test]
    fn deterministic_tie_break_by_updated_then_id() {
        let f = fixture();
        index(&f, 3, LegalCategory::CivilLaw, &[], 100, "合同纠纷");
        index(&f, 1, LegalCategory::CivilLaw, &[], 100, "合同纠纷");
        index(&f, 2, LegalCategory::CivilLaw, &[], 200, "合同纠纷");

        let hits = f
            .engine
            .search("合同纠纷", &SearchFilters::default(), None)
            .unwrap();
        let ids: Vec<u64> = hits.iter().map(|h| h.entry_id.get()).collect();
        // Identical scores: newer updated_at first, then ascending id.
        assert_eq!(ids, vec![2, 1, 3]);
    }

    #[test]
    fn limit_clamped_to_hard_cap() {
        let f = fixture();
        for i in 1..=5 {
            index(&f, i, LegalCategory::CivilLaw, &[], 100, "合同条款");
        }
        let hits = f
            .engine
            .search("合同", &SearchFilters::default(), Some(2))
            .unwrap();
        assert_eq!(hits.len(), 2);

        let hits = f
            .engine
            .search("合同", &SearchFilters::default(), Some(10_000))
            .unwrap();
        assert_eq!(hits.len(), 5); // cap is 100, only 5 exist
    }

    #[test]
    fn component_scores_within_unit_interval() {
        let f = fixture();
        index(&f, 1, LegalCategory::CivilLaw, &[], 100, "合同纠纷与违约责任");
        index(&f, 2, LegalCategory::CivilLaw, &[], 100, "侵权责任的构成");

        let hits = f
            .engine
            .search("合同违约", &SearchFilters::default(), None)
            .unwrap();
        for hit in &hits {
            assert!((0.0..=1.0).contains(&hit.lexical_score));
            assert!((0.0..=1.0).contains(&hit.semantic_score));
            assert!((0.0..=1.0).contains(&hit.blended_score));
        }
    }
}
