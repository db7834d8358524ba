//! The consultation orchestrator.
//!
//! Coordinates the pipeline: validate → classify → retrieve → compose →
//! score → persist. Stages within one consultation run strictly
//! sequentially; independent consultations (including batch items) run in
//! parallel up to a configured concurrency limit. Every outcome — success,
//! validation failure, timeout, composition failure, cancellation — leaves
//! exactly one record in the log.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::category::LegalCategory;
use crate::classify::Classifier;
use crate::entry::now_epoch_secs;
use crate::error::{ComposeError, ConsultError};
use crate::search::{SearchEngine, SearchFilters};
use crate::store::KnowledgeStore;

use super::compose::{Citation, ComposeRequest, Composer, render_template, snippet};
use super::log::ConsultationLog;
use super::{
    CancelToken, ClassifiedAs, ConsultRequest, ConsultationId, ConsultationRecord,
    ConsultationStatus, FailureReason,
};

/// Orchestrator policy knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsultConfig {
    /// End-to-end deadline per consultation in milliseconds.
    pub deadline_ms: u64,
    /// How many retrieved entries are offered for citation.
    pub citation_limit: usize,
    /// Bounded retries for transient composition failures.
    pub max_retries: u32,
    /// Base backoff between retries in milliseconds (doubles per attempt).
    pub retry_backoff_ms: u64,
    /// Maximum in-flight consultations within one batch.
    pub batch_concurrency: usize,
    /// Weight of classifier confidence in the final score.
    pub classifier_weight: f32,
    /// Weight of mean retrieval relevance in the final score.
    pub retrieval_weight: f32,
    /// Maximum accepted question length in chars.
    pub max_question_len: usize,
    /// Snippet length offered to the composer per citation.
    pub snippet_chars: usize,
}

impl Default for ConsultConfig {
    fn default() -> Self {
        Self {
            deadline_ms: 30_000,
            citation_limit: 5,
            max_retries: 2,
            retry_backoff_ms: 50,
            batch_concurrency: 4,
            classifier_weight: 0.4,
            retrieval_weight: 0.6,
            max_question_len: 2_000,
            snippet_chars: 100,
        }
    }
}

/// The consultation orchestrator. All collaborators are injected, so any
/// of them can be replaced with a test double.
pub struct Orchestrator {
    classifier: Arc<Classifier>,
    search: Arc<SearchEngine>,
    store: Arc<KnowledgeStore>,
    composer: Arc<dyn Composer>,
    log: Arc<ConsultationLog>,
    config: ConsultConfig,
}

impl Orchestrator {
    pub fn new(
        classifier: Arc<Classifier>,
        search: Arc<SearchEngine>,
        store: Arc<KnowledgeStore>,
        composer: Arc<dyn Composer>,
        log: Arc<ConsultationLog>,
        config: ConsultConfig,
    ) -> Self {
        Self {
            classifier,
            search,
            store,
            composer,
            log,
            config,
        }
    }

    /// The active policy configuration.
    pub fn config(&self) -> &ConsultConfig {
        &self.config
    }

    /// Run one consultation to its terminal state.
    ///
    /// Returns `Err` only when the record itself could not be persisted;
    /// domain failures (validation, timeout, composition) are reported as
    /// a persisted record with `status == Failed`.
    pub fn consult(
        &self,
        request: &ConsultRequest,
    ) -> Result<Arc<ConsultationRecord>, ConsultError> {
        self.consult_with_cancel(request, &CancelToken::new())
    }

    /// Run one consultation with a cancellation token.
    ///
    /// Cancellation is honored between stages up to the start of
    /// composition; after that the consultation runs to its single
    /// terminal state.
    pub fn consult_with_cancel(
        &self,
        request: &ConsultRequest,
        cancel: &CancelToken,
    ) -> Result<Arc<ConsultationRecord>, ConsultError> {
        let started = Instant::now();
        let deadline_ms = request.deadline_ms.unwrap_or(self.config.deadline_ms);
        let deadline = started + Duration::from_millis(deadline_ms);
        let id = self.log.next_id()?;
        let created_at = now_epoch_secs();

        // received: validate the question.
        let question = request.question.trim().to_string();
        let question_len = question.chars().count();
        if question.is_empty() || question_len > self.config.max_question_len {
            tracing::warn!(%id, question_len, "consultation rejected at intake");
            return self.finish_failed(
                id,
                request,
                &question,
                None,
                request.category.unwrap_or(LegalCategory::Uncategorized),
                FailureReason::InvalidQuestion,
                created_at,
            );
        }

        // classified: advisory output; an explicit override wins.
        let classification = match self.classifier.classify(&question) {
            Ok(c) => c,
            Err(_) => {
                return self.finish_failed(
                    id,
                    request,
                    &question,
                    None,
                    request.category.unwrap_or(LegalCategory::Uncategorized),
                    FailureReason::InvalidQuestion,
                    created_at,
                );
            }
        };
        let advisory = ClassifiedAs {
            category: classification.category,
            confidence: classification.confidence,
        };
        let resolved = request.category.unwrap_or(classification.category);

        if cancel.is_cancelled() {
            return self.finish_failed(
                id,
                request,
                &question,
                Some(advisory),
                resolved,
                FailureReason::Cancelled,
                created_at,
            );
        }
        if Instant::now() >= deadline {
            return self.finish_failed(
                id,
                request,
                &question,
                Some(advisory),
                resolved,
                FailureReason::Timeout,
                created_at,
            );
        }

        // retrieved: soft category boost, never a hard filter, so
        // cross-category knowledge stays discoverable.
        let filters = SearchFilters {
            boost_category: (resolved != LegalCategory::Uncategorized).then_some(resolved),
            ..Default::default()
        };
        let hits = match self
            .search
            .search(&question, &filters, Some(self.config.citation_limit))
        {
            Ok(hits) => hits,
            // A question with no indexable terms retrieves nothing;
            // composition falls back to the category-level answer.
            Err(_) => Vec::new(),
        };
        let citations: Vec<Citation> = hits
            .iter()
            .filter_map(|hit| {
                self.store.get(hit.entry_id).map(|entry| Citation {
                    entry_id: hit.entry_id,
                    title: entry.title.clone(),
                    snippet: snippet(&entry.content, self.config.snippet_chars),
                })
            })
            .collect();

        if cancel.is_cancelled() {
            return self.finish_failed(
                id,
                request,
                &question,
                Some(advisory),
                resolved,
                FailureReason::Cancelled,
                created_at,
            );
        }
        if Instant::now() >= deadline {
            return self.finish_failed(
                id,
                request,
                &question,
                Some(advisory),
                resolved,
                FailureReason::Timeout,
                created_at,
            );
        }

        // composed: bounded retries for transient failures.
        let answer = match self.compose_with_retry(
            &question,
            request.context.as_deref(),
            resolved,
            &citations,
            deadline,
        ) {
            Ok(answer) => answer,
            Err(ComposeError::Timeout { .. }) => {
                return self.finish_failed(
                    id,
                    request,
                    &question,
                    Some(advisory),
                    resolved,
                    FailureReason::Timeout,
                    created_at,
                );
            }
            Err(e) => {
                tracing::error!(%id, error = %e, "composition failed after retries");
                return self.finish_failed(
                    id,
                    request,
                    &question,
                    Some(advisory),
                    resolved,
                    FailureReason::Compose,
                    created_at,
                );
            }
        };
        if Instant::now() >= deadline {
            // The composer blocked past the deadline; the outcome is still
            // a single terminal state, but it is a timeout.
            return self.finish_failed(
                id,
                request,
                &question,
                Some(advisory),
                resolved,
                FailureReason::Timeout,
                created_at,
            );
        }

        // completed: combine classifier confidence with retrieval relevance.
        let mean_relevance = if hits.is_empty() {
            0.0
        } else {
            hits.iter().map(|h| h.blended_score).sum::<f32>() / hits.len() as f32
        };
        let confidence = (self.config.classifier_weight * classification.confidence
            + self.config.retrieval_weight * mean_relevance)
            .clamp(0.0, 1.0);

        let record = self.log.append(ConsultationRecord {
            id,
            user: request.user.clone(),
            question,
            context: request.context.clone(),
            category: resolved,
            classified: Some(advisory),
            answer,
            confidence: Some(confidence),
            sources: citations.iter().map(|c| c.entry_id).collect(),
            status: ConsultationStatus::Completed,
            failure: None,
            created_at,
        })?;
        tracing::info!(
            %id,
            category = %resolved,
            confidence,
            sources = record.sources.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "consultation completed"
        );
        Ok(record)
    }

    /// Apply the whole pipeline to each question, bounding in-flight work.
    ///
    /// Partial failure is isolated per item: one failing question never
    /// aborts its siblings.
    pub fn consult_batch(
        &self,
        requests: Vec<ConsultRequest>,
    ) -> Vec<Result<Arc<ConsultationRecord>, ConsultError>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.batch_concurrency.max(1))
            .thread_name(|i| format!("maat-consult-{i}"))
            .build();
        match pool {
            Ok(pool) => pool.install(|| {
                requests
                    .into_par_iter()
                    .map(|request| self.consult(&request))
                    .collect()
            }),
            Err(e) => {
                tracing::error!(error = %e, "batch pool unavailable; running sequentially");
                requests.iter().map(|r| self.consult(r)).collect()
            }
        }
    }

    fn compose_with_retry(
        &self,
        question: &str,
        context: Option<&str>,
        category: LegalCategory,
        citations: &[Citation],
        deadline: Instant,
    ) -> Result<String, ComposeError> {
        let mut attempt: u32 = 0;
        loop {
            let budget_ms = deadline
                .saturating_duration_since(Instant::now())
                .as_millis() as u64;
            if budget_ms == 0 {
                return Err(ComposeError::Timeout { timeout_ms: 0 });
            }
            let request = ComposeRequest {
                question,
                context,
                category,
                citations,
                budget_ms,
            };
            match self.composer.compose(&request) {
                Ok(answer) if !answer.trim().is_empty() => return Ok(answer),
                // Empty output violates the composition contract; the
                // deterministic template always has something to say.
                Ok(_) => return Ok(render_template(&request)),
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    let backoff = self.config.retry_backoff_ms << attempt;
                    let jitter =
                        rand::thread_rng().gen_range(0..=self.config.retry_backoff_ms / 2 + 1);
                    let wait = Duration::from_millis(backoff + jitter);
                    if Instant::now() + wait >= deadline {
                        return Err(e);
                    }
                    tracing::warn!(
                        attempt,
                        backend = self.composer.name(),
                        "transient composition failure; backing off"
                    );
                    std::thread::sleep(wait);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn finish_failed(
        &self,
        id: ConsultationId,
        request: &ConsultRequest,
        question: &str,
        classified: Option<ClassifiedAs>,
        category: LegalCategory,
        reason: FailureReason,
        created_at: u64,
    ) -> Result<Arc<ConsultationRecord>, ConsultError> {
        let record = self.log.append(ConsultationRecord {
            id,
            user: request.user.clone(),
            question: question.to_string(),
            context: request.context.clone(),
            category,
            classified,
            answer: String::new(),
            confidence: None,
            sources: Vec::new(),
            status: ConsultationStatus::Failed,
            failure: Some(reason),
            created_at,
        })?;
        tracing::warn!(%id, ?reason, "consultation failed");
        Ok(record)
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("composer", &self.composer.name())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Classifier;
    use crate::consult::compose::TemplateComposer;
    use crate::entry::EntryDraft;
    use crate::index::Indexer;
    use crate::index::lexical::LexicalIndex;
    use crate::index::semantic::{EmbeddingDim, SemanticIndex};
    use crate::search::SearchConfig;

    /// Composer double that sleeps when the question asks it to.
    struct SleepyComposer {
        sleep_marker: &'static str,
        sleep: Duration,
    }

    impl Composer for SleepyComposer {
        fn compose(&self, request: &ComposeRequest<'_>) -> Result<String, ComposeError> {
            if request.question.contains(self.sleep_marker) {
                std::thread::sleep(self.sleep);
            }
            Ok(render_template(request))
        }

        fn name(&self) -> &'static str {
            "sleepy"
        }
    }

    /// Composer double that fails transiently N times before succeeding.
    struct FlakyComposer {
        failures: std::sync::atomic::AtomicU32,
    }

    impl Composer for FlakyComposer {
        fn compose(&self, request: &ComposeRequest<'_>) -> Result<String, ComposeError> {
            if self
                .failures
                .fetch_update(
                    std::sync::atomic::Ordering::SeqCst,
                    std::sync::atomic::Ordering::SeqCst,
                    |n| if n > 0 { Some(n - 1) } else { None },
                )
                .is_ok()
            {
                return Err(ComposeError::RequestFailed {
                    message: "connection reset".into(),
                });
            }
            Ok(render_template(request))
        }

        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    struct Fixture {
        store: Arc<KnowledgeStore>,
        indexer: Indexer,
        orchestrator: Orchestrator,
        log: Arc<ConsultationLog>,
    }

    fn fixture_with(composer: Arc<dyn Composer>, config: ConsultConfig) -> Fixture {
        let lexical = Arc::new(LexicalIndex::new());
        let semantic = Arc::new(SemanticIndex::new(EmbeddingDim::TEST));
        let indexer = Indexer::start(Arc::clone(&lexical), Arc::clone(&semantic)).unwrap();
        let store = Arc::new(KnowledgeStore::new(indexer.queue(), 10_000));
        let search = Arc::new(SearchEngine::new(
            Arc::clone(&lexical),
            Arc::clone(&semantic),
            SearchConfig::default(),
        ));
        let classifier = Arc::new(Classifier::new(EmbeddingDim::TEST, 0.1));
        let log = Arc::new(ConsultationLog::new());
        let orchestrator = Orchestrator::new(
            classifier,
            search,
            Arc::clone(&store),
            composer,
            Arc::clone(&log),
            config,
        );
        Fixture {
            store,
            indexer,
            orchestrator,
            log,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(TemplateComposer), ConsultConfig::default())
    }

    fn seed_contract_entry(f: &Fixture) {
        f.store
            .create(EntryDraft {
                title: "合同纠纷典型案例".into(),
                content: "某公司与供应商签订采购合同，因质量问题产生纠纷，合同约定了违约责任。".into(),
                category: LegalCategory::CivilLaw,
                tags: vec!["合同".into()],
                source: "最高人民法院".into(),
            })
            .unwrap();
        f.indexer.quiesce();
    }

    #[test]
    fn empty_question_persists_failed_record() {
        let f = fixture();
        let record = f
            .orchestrator
            .consult(&ConsultRequest::question("   "))
            .unwrap();
        assert_eq!(record.status, ConsultationStatus::Failed);
        assert_eq!(record.failure, Some(FailureReason::InvalidQuestion));
        assert!(record.confidence.is_none());
        assert_eq!(f.log.len(), 1);
    }

    #[test]
    fn consult_with_empty_store_completes_with_fallback() {
        let f = fixture();
        let record = f
            .orchestrator
            .consult(&ConsultRequest::question("什么是合同?"))
            .unwrap();
        assert_eq!(record.status, ConsultationStatus::Completed);
        assert!(!record.answer.trim().is_empty());
        assert!(record.sources.is_empty());
        let confidence = record.confidence.unwrap();
        assert!((0.0..=1.0).contains(&confidence));
        assert!(confidence < 0.5, "fallback answers are low-confidence");
    }

    #[test]
    fn consult_cites_retrieved_entries() {
        let f = fixture();
        seed_contract_entry(&f);

        let record = f
            .orchestrator
            .consult(&ConsultRequest::question("合同纠纷如何处理?"))
            .unwrap();
        assert_eq!(record.status, ConsultationStatus::Completed);
        assert_eq!(record.sources.len(), 1);
        assert!(record.answer.contains("合同纠纷典型案例"));
        assert!(record.classified.is_some());
    }

    #[test]
    fn category_override_wins_but_classifier_is_recorded() {
        let f = fixture();
        seed_contract_entry(&f);

        let mut request = ConsultRequest::question("合同违约的赔偿标准?");
        request.category = Some(LegalCategory::LaborLaw);
        let record = f.orchestrator.consult(&request).unwrap();

        assert_eq!(record.category, LegalCategory::LaborLaw);
        let advisory = record.classified.unwrap();
        assert_eq!(advisory.category, LegalCategory::CivilLaw);
    }

    #[test]
    fn deadline_exceeded_fails_with_timeout() {
        let f = fixture_with(
            Arc::new(SleepyComposer {
                sleep_marker: "慢",
                sleep: Duration::from_millis(150),
            }),
            ConsultConfig {
                deadline_ms: 50,
                ..Default::default()
            },
        );
        let record = f
            .orchestrator
            .consult(&ConsultRequest::question("这个问题很慢"))
            .unwrap();
        assert_eq!(record.status, ConsultationStatus::Failed);
        assert_eq!(record.failure, Some(FailureReason::Timeout));
        assert!(record.confidence.is_none());
    }

    #[test]
    fn transient_failures_are_retried() {
        let f = fixture_with(
            Arc::new(FlakyComposer {
                failures: std::sync::atomic::AtomicU32::new(2),
            }),
            ConsultConfig {
                retry_backoff_ms: 1,
                ..Default::default()
            },
        );
        let record = f
            .orchestrator
            .consult(&ConsultRequest::question("合同问题"))
            .unwrap();
        assert_eq!(record.status, ConsultationStatus::Completed);
    }

    #[test]
    fn exhausted_retries_fail_with_compose() {
        let f = fixture_with(
            Arc::new(FlakyComposer {
                failures: std::sync::atomic::AtomicU32::new(10),
            }),
            ConsultConfig {
                max_retries: 1,
                retry_backoff_ms: 1,
                ..Default::default()
            },
        );
        let record = f
            .orchestrator
            .consult(&ConsultRequest::question("合同问题"))
            .unwrap();
        assert_eq!(record.status, ConsultationStatus::Failed);
        assert_eq!(record.failure, Some(FailureReason::Compose));
    }

    #[test]
    fn cancellation_before_compose_is_honored() {
        let f = fixture();
        let token = CancelToken::new();
        token.cancel();
        let record = f
            .orchestrator
            .consult_with_cancel(&ConsultRequest::question("合同问题"), &token)
            .unwrap();
        assert_eq!(record.status, ConsultationStatus::Failed);
        assert_eq!(record.failure, Some(FailureReason::Cancelled));
    }

    #[test]
    fn batch_isolates_per_item_failure() {
        let f = fixture_with(
            Arc::new(SleepyComposer {
                sleep_marker: "慢",
                sleep: Duration::from_millis(200),
            }),
            ConsultConfig {
                deadline_ms: 80,
                ..Default::default()
            },
        );
        let results = f.orchestrator.consult_batch(vec![
            ConsultRequest::question("合同纠纷怎么办?"),
            ConsultRequest::question("这个问题很慢"),
            ConsultRequest::question("劳动合同如何解除?"),
        ]);
        assert_eq!(results.len(), 3);
        let records: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(records[0].status, ConsultationStatus::Completed);
        assert_eq!(records[1].status, ConsultationStatus::Failed);
        assert_eq!(records[1].failure, Some(FailureReason::Timeout));
        assert_eq!(records[2].status, ConsultationStatus::Completed);
        assert_eq!(f.log.len(), 3);
    }
}
