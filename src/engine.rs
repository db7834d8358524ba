//! Engine facade: top-level API for the maat system.
//!
//! The `Engine` owns all subsystems — knowledge store, relation graph,
//! indexer, search engine, classifier, composer, orchestrator, and
//! consultation log — and wires them together explicitly, so every
//! collaborator can be swapped for a test double.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::category::LegalCategory;
use crate::classify::{Classification, Classifier};
use crate::consult::compose::{Composer, RemoteComposer, RemoteComposerConfig, TemplateComposer};
use crate::consult::log::ConsultationLog;
use crate::consult::orchestrator::{ConsultConfig, Orchestrator};
use crate::consult::{CancelToken, ConsultRequest, ConsultationRecord};
use crate::entry::{EntryDraft, EntryId, EntryPatch, KnowledgeEntry};
use crate::error::{ConsultError, EngineError, GraphError, MaatResult};
use crate::graph::index::{Neighbor, RelationDirection, RelationGraph};
use crate::graph::traverse::{ClosureConfig, ClosureResult, related_entries, transitive_closure};
use crate::graph::{Relation, RelationType};
use crate::import;
use crate::index::lexical::LexicalIndex;
use crate::index::semantic::{EmbeddingDim, SemanticIndex};
use crate::index::{IndexEvent, Indexer};
use crate::search::{SearchConfig, SearchEngine, SearchFilters, SearchHit};
use crate::store::{DurableStore, KnowledgeStore, StoreStats};

/// Which composition backend the orchestrator uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum ComposerChoice {
    /// Deterministic template composition (default, always available).
    Template,
    /// Remote Ollama-style composition service.
    Remote(RemoteComposerConfig),
}

impl Default for ComposerChoice {
    fn default() -> Self {
        ComposerChoice::Template
    }
}

/// Configuration for the maat engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Data directory for persistence. `None` for memory-only mode.
    pub data_dir: Option<PathBuf>,
    /// Embedding dimension for the semantic index and classifier.
    pub embedding_dim: EmbeddingDim,
    /// Maximum entry content length in chars.
    pub max_content_len: usize,
    /// Classifier threshold below which questions are uncategorized.
    pub classifier_min_confidence: f32,
    /// Search ranking configuration.
    pub search: SearchConfig,
    /// Consultation orchestrator configuration.
    pub consult: ConsultConfig,
    /// Composition backend.
    pub composer: ComposerChoice,
}

impl EngineConfig {
    /// Built-in defaults (also what `Default` yields after normalization).
    pub fn standard() -> Self {
        Self {
            data_dir: None,
            embedding_dim: EmbeddingDim::DEFAULT,
            max_content_len: 200_000,
            classifier_min_confidence: 0.1,
            search: SearchConfig::default(),
            consult: ConsultConfig::default(),
            composer: ComposerChoice::Template,
        }
    }

    /// Load configuration from a TOML file. Missing fields take defaults.
    pub fn from_toml_file(path: &Path) -> Result<Self, EngineError> {
        let raw = std::fs::read_to_string(path).map_err(|e| EngineError::ConfigRead {
            path: path.display().to_string(),
            source: e,
        })?;
        let mut config: EngineConfig =
            toml::from_str(&raw).map_err(|e| EngineError::ConfigParse {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        config.normalize();
        Ok(config)
    }

    /// Replace zero-value fields (from `Default` or sparse TOML) with the
    /// standard defaults.
    pub fn normalize(&mut self) {
        let standard = Self::standard();
        if self.embedding_dim.0 == 0 {
            self.embedding_dim = standard.embedding_dim;
        }
        if self.max_content_len == 0 {
            self.max_content_len = standard.max_content_len;
        }
        if self.classifier_min_confidence <= 0.0 {
            self.classifier_min_confidence = standard.classifier_min_confidence;
        }
    }

    fn validate(&self) -> Result<(), EngineError> {
        if self.embedding_dim.0 == 0 {
            return Err(EngineError::InvalidConfig {
                message: "embedding_dim must be > 0".into(),
            });
        }
        if self.search.lexical_weight < 0.0 || self.search.semantic_weight < 0.0 {
            return Err(EngineError::InvalidConfig {
                message: "search weights must be non-negative".into(),
            });
        }
        if self.search.lexical_weight + self.search.semantic_weight <= 0.0 {
            return Err(EngineError::InvalidConfig {
                message: "at least one search weight must be positive".into(),
            });
        }
        Ok(())
    }
}

/// The maat legal knowledge engine.
pub struct Engine {
    config: EngineConfig,
    store: Arc<KnowledgeStore>,
    graph: Arc<RelationGraph>,
    indexer: Indexer,
    search: Arc<SearchEngine>,
    classifier: Arc<Classifier>,
    orchestrator: Orchestrator,
    log: Arc<ConsultationLog>,
    durable: Option<Arc<DurableStore>>,
}

impl Engine {
    /// Create a new engine with the given configuration.
    pub fn new(mut config: EngineConfig) -> MaatResult<Self> {
        config.normalize();
        config.validate()?;

        tracing::info!(
            dim = config.embedding_dim.0,
            persistent = config.data_dir.is_some(),
            "initializing maat engine"
        );

        let lexical = Arc::new(LexicalIndex::new());
        let semantic = Arc::new(SemanticIndex::new(config.embedding_dim));
        let indexer = Indexer::start(Arc::clone(&lexical), Arc::clone(&semantic))?;

        let (store, log, durable) = if let Some(dir) = &config.data_dir {
            std::fs::create_dir_all(dir).map_err(|_| EngineError::DataDir {
                path: dir.display().to_string(),
            })?;
            let durable = Arc::new(DurableStore::open(dir)?);
            let store = KnowledgeStore::with_persistence(
                indexer.queue(),
                config.max_content_len,
                Arc::clone(&durable),
            )?;
            let log = ConsultationLog::with_persistence(Arc::clone(&durable))?;
            (store, log, Some(durable))
        } else {
            (
                KnowledgeStore::new(indexer.queue(), config.max_content_len),
                ConsultationLog::new(),
                None,
            )
        };
        let store = Arc::new(store);
        let log = Arc::new(log);

        // Rebuild the indices synchronously from the loaded entries, so
        // search is consistent the moment the engine is up.
        let graph = Arc::new(RelationGraph::new());
        for entry in store.snapshot() {
            if entry.active {
                indexer.apply_now(IndexEvent::upsert(&entry));
            } else {
                indexer.apply_now(IndexEvent::deactivate(&entry));
                graph.mark_inactive(entry.id);
            }
        }
        if let Some(durable) = &durable {
            for relation in durable.load_relations()? {
                // Persisted relations already passed validation; a failure
                // here means the data directory was edited by hand.
                if let Err(e) = graph.add_relation(&relation) {
                    tracing::warn!(error = %e, "skipping invalid persisted relation");
                }
            }
        }

        let search = Arc::new(SearchEngine::new(
            Arc::clone(&lexical),
            Arc::clone(&semantic),
            config.search.clone(),
        ));
        let classifier = Arc::new(Classifier::new(
            config.embedding_dim,
            config.classifier_min_confidence,
        ));
        let composer: Arc<dyn Composer> = match &config.composer {
            ComposerChoice::Template => Arc::new(TemplateComposer),
            ComposerChoice::Remote(remote) => Arc::new(RemoteComposer::new(remote.clone())),
        };
        let orchestrator = Orchestrator::new(
            Arc::clone(&classifier),
            Arc::clone(&search),
            Arc::clone(&store),
            composer,
            Arc::clone(&log),
            config.consult.clone(),
        );

        Ok(Self {
            config,
            store,
            graph,
            indexer,
            search,
            classifier,
            orchestrator,
            log,
            durable,
        })
    }

    // -----------------------------------------------------------------
    // Knowledge store operations
    // -----------------------------------------------------------------

    /// Create a knowledge entry.
    pub fn create_entry(&self, draft: EntryDraft) -> MaatResult<Arc<KnowledgeEntry>> {
        Ok(self.store.create(draft)?)
    }

    /// Apply a versioned partial update to an entry.
    pub fn update_entry(&self, id: EntryId, patch: EntryPatch) -> MaatResult<Arc<KnowledgeEntry>> {
        Ok(self.store.update(id, patch)?)
    }

    /// Soft-delete an entry and exclude it from graph traversal.
    pub fn deactivate_entry(&self, id: EntryId) -> MaatResult<Arc<KnowledgeEntry>> {
        let entry = self.store.deactivate(id)?;
        self.graph.mark_inactive(id);
        Ok(entry)
    }

    /// Fetch an entry by id (active or deactivated).
    pub fn get_entry(&self, id: EntryId) -> Option<Arc<KnowledgeEntry>> {
        self.store.get(id)
    }

    /// List active entries, optionally restricted to a category.
    pub fn list_entries(
        &self,
        category: Option<LegalCategory>,
        skip: usize,
        limit: usize,
    ) -> Vec<Arc<KnowledgeEntry>> {
        match category {
            Some(category) => self.store.list_by_category(category, skip, limit),
            None => self.store.list(skip, limit),
        }
    }

    /// Knowledge base statistics.
    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }

    // -----------------------------------------------------------------
    // Relation graph operations
    // -----------------------------------------------------------------

    /// Add a typed relation between two existing entries.
    pub fn add_relation(
        &self,
        source: EntryId,
        target: EntryId,
        relation_type: RelationType,
        confidence: f32,
    ) -> MaatResult<Relation> {
        if !self.store.contains(source) {
            return Err(GraphError::UnknownEndpoint { id: source.get() }.into());
        }
        if !self.store.contains(target) {
            return Err(GraphError::UnknownEndpoint { id: target.get() }.into());
        }
        let relation = Relation::new(source, target, relation_type, confidence);
        self.graph.add_relation(&relation)?;
        if let Some(durable) = &self.durable {
            durable.put_relation(&relation)?;
        }
        Ok(relation)
    }

    /// One-hop neighbors of an entry.
    pub fn neighbors(
        &self,
        id: EntryId,
        direction: RelationDirection,
        relation_type: Option<RelationType>,
    ) -> Vec<Neighbor> {
        self.graph.neighbors(id, direction, relation_type)
    }

    /// Bounded, cycle-tolerant transitive closure from an entry.
    pub fn transitive_closure(&self, id: EntryId, config: &ClosureConfig) -> ClosureResult {
        transitive_closure(&self.graph, id, config)
    }

    /// Related entries (one hop, both directions).
    pub fn related_entries(&self, id: EntryId, limit: usize) -> Vec<Neighbor> {
        related_entries(&self.graph, id, limit)
    }

    // -----------------------------------------------------------------
    // Search, classification, consultation
    // -----------------------------------------------------------------

    /// Hybrid search over active entries.
    pub fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
        limit: Option<usize>,
    ) -> MaatResult<Vec<SearchHit>> {
        Ok(self.search.search(query, filters, limit)?)
    }

    /// Classify a question against the legal taxonomy.
    pub fn classify(&self, question: &str) -> MaatResult<Classification> {
        Ok(self.classifier.classify(question)?)
    }

    /// Run one consultation to its terminal state.
    pub fn consult(&self, request: &ConsultRequest) -> MaatResult<Arc<ConsultationRecord>> {
        Ok(self.orchestrator.consult(request)?)
    }

    /// Run one consultation with a cancellation token.
    pub fn consult_with_cancel(
        &self,
        request: &ConsultRequest,
        cancel: &CancelToken,
    ) -> MaatResult<Arc<ConsultationRecord>> {
        Ok(self.orchestrator.consult_with_cancel(request, cancel)?)
    }

    /// Batch consultation with per-item failure isolation.
    pub fn consult_batch(
        &self,
        requests: Vec<ConsultRequest>,
    ) -> Vec<Result<Arc<ConsultationRecord>, ConsultError>> {
        self.orchestrator.consult_batch(requests)
    }

    /// Consultation history, newest first.
    pub fn consultations(
        &self,
        user: Option<&str>,
        skip: usize,
        limit: usize,
    ) -> Vec<Arc<ConsultationRecord>> {
        self.log.recent(user, skip, limit)
    }

    // -----------------------------------------------------------------
    // Import
    // -----------------------------------------------------------------

    /// Import a file: parse it into drafts and create entries through the
    /// knowledge store's `create` contract.
    pub fn import_path(
        &self,
        path: &Path,
        category: LegalCategory,
    ) -> MaatResult<Vec<Arc<KnowledgeEntry>>> {
        let drafts = import::parse_path(path, category)?;
        let mut created = Vec::with_capacity(drafts.len());
        for draft in drafts {
            created.push(self.store.create(draft)?);
        }
        tracing::info!(file = %path.display(), entries = created.len(), "import finished");
        Ok(created)
    }

    // -----------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------

    /// Block until all pending index refreshes are applied.
    ///
    /// One-shot CLI commands call this for read-your-writes; long-running
    /// callers rely on eventual consistency instead.
    pub fn quiesce_index(&self) {
        self.indexer.quiesce();
    }

    /// Get the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Summary information about the engine state.
    pub fn info(&self) -> EngineInfo {
        let stats = self.store.stats();
        EngineInfo {
            entries: self.store.len(),
            active_entries: stats.total,
            relations: self.graph.relation_count(),
            consultations: self.log.len(),
            pending_refreshes: self.indexer.pending(),
            embedding_dim: self.config.embedding_dim.0,
            persistent: self.durable.is_some(),
        }
    }
}

/// Summary information about the engine state.
#[derive(Debug, Clone)]
pub struct EngineInfo {
    pub entries: usize,
    pub active_entries: usize,
    pub relations: usize,
    pub consultations: usize,
    pub pending_refreshes: usize,
    pub embedding_dim: usize,
    pub persistent: bool,
}

impl std::fmt::Display for EngineInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "maat engine info")?;
        writeln!(f, "  entries:        {} ({} active)", self.entries, self.active_entries)?;
        writeln!(f, "  relations:      {}", self.relations)?;
        writeln!(f, "  consultations:  {}", self.consultations)?;
        writeln!(f, "  pending index:  {}", self.pending_refreshes)?;
        writeln!(f, "  embedding dim:  {}", self.embedding_dim)?;
        writeln!(f, "  persistent:     {}", self.persistent)?;
        Ok(())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("graph", &self.graph)
            .finish()
    }
}
