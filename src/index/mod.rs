//! Indexer: eventually consistent lexical + semantic indices.
//!
//! The knowledge store enqueues an [`IndexEvent`] on every successful
//! mutation; a background worker consumes the queue and re-indexes the
//! affected entry. Search never blocks on refresh — it reads whatever rows
//! are committed. Re-indexing is idempotent and last-write-wins by entry
//! version: out-of-order notifications for an older version are discarded.

pub mod lexical;
pub mod semantic;

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};

use dashmap::DashMap;

use crate::category::LegalCategory;
use crate::entry::{EntryId, KnowledgeEntry};
use crate::error::IndexError;

use self::lexical::{LexicalIndex, tokenize};
use self::semantic::SemanticIndex;

/// A refresh notification emitted by the knowledge store.
#[derive(Debug, Clone)]
pub enum IndexEvent {
    /// Entry created or updated: (re-)index this version's content.
    Upsert {
        id: EntryId,
        version: u64,
        title: String,
        content: String,
        category: LegalCategory,
        tags: BTreeSet<String>,
        updated_at: u64,
    },
    /// Entry deactivated: drop it from the indices.
    Deactivate { id: EntryId, version: u64 },
}

impl IndexEvent {
    /// Build an upsert event from an entry snapshot.
    pub fn upsert(entry: &KnowledgeEntry) -> Self {
        IndexEvent::Upsert {
            id: entry.id,
            version: entry.version,
            title: entry.title.clone(),
            content: entry.content.clone(),
            category: entry.category,
            tags: entry.tags.clone(),
            updated_at: entry.updated_at,
        }
    }

    /// Build a deactivation event from an entry snapshot.
    pub fn deactivate(entry: &KnowledgeEntry) -> Self {
        IndexEvent::Deactivate {
            id: entry.id,
            version: entry.version,
        }
    }
}

/// Sending half of the refresh queue, handed to the knowledge store.
#[derive(Clone)]
pub struct IndexQueue {
    tx: mpsc::Sender<IndexEvent>,
    pending: Arc<AtomicUsize>,
}

impl IndexQueue {
    /// Enqueue a refresh notification. If the worker has shut down the
    /// event is dropped — the engine is tearing down anyway.
    pub fn push(&self, event: IndexEvent) {
        self.pending.fetch_add(1, Ordering::AcqRel);
        if self.tx.send(event).is_err() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            tracing::warn!("index refresh queue closed; event dropped");
        }
    }
}

impl std::fmt::Debug for IndexQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexQueue")
            .field("pending", &self.pending.load(Ordering::Acquire))
            .finish()
    }
}

/// Per-entry index state: the version high-water mark plus a tombstone
/// flag set on deactivation, so a stale upsert can never resurrect a
/// deactivated entry.
#[derive(Debug, Clone, Copy, Default)]
struct IndexState {
    version: u64,
    tombstone: bool,
}

struct IndexerInner {
    lexical: Arc<LexicalIndex>,
    semantic: Arc<SemanticIndex>,
    states: DashMap<EntryId, IndexState>,
    pending: Arc<AtomicUsize>,
}

impl IndexerInner {
    /// Apply one event, enforcing last-write-wins by version.
    fn apply(&self, event: IndexEvent) {
        match event {
            IndexEvent::Upsert {
                id,
                version,
                title,
                content,
                category,
                tags,
                updated_at,
            } => {
                {
                    let mut state = self.states.entry(id).or_default();
                    if state.tombstone || version < state.version {
                        tracing::debug!(%id, version, "discarding stale index event");
                        return;
                    }
                    state.version = version;
                }
                let text = format!("{title}\n{content}");
                let tokens = tokenize(&text);
                self.lexical
                    .upsert(id, version, category, tags, updated_at, &tokens);
                self.semantic.upsert(id, &text);
                tracing::debug!(%id, version, tokens = tokens.len(), "entry indexed");
            }
            IndexEvent::Deactivate { id, version } => {
                {
                    let mut state = self.states.entry(id).or_default();
                    if version < state.version {
                        return;
                    }
                    state.version = version;
                    state.tombstone = true;
                }
                self.lexical.remove(id);
                self.semantic.remove(id);
                tracing::debug!(%id, "entry dropped from indices");
            }
        }
    }
}

/// The indexer: owns the refresh worker and the two indices.
pub struct Indexer {
    inner: Arc<IndexerInner>,
    queue: IndexQueue,
}

impl Indexer {
    /// Start the indexer with a background refresh worker.
    pub fn start(
        lexical: Arc<LexicalIndex>,
        semantic: Arc<SemanticIndex>,
    ) -> Result<Self, IndexError> {
        let (tx, rx) = mpsc::channel::<IndexEvent>();
        let pending = Arc::new(AtomicUsize::new(0));
        let inner = Arc::new(IndexerInner {
            lexical,
            semantic,
            states: DashMap::new(),
            pending: Arc::clone(&pending),
        });

        let worker_inner = Arc::clone(&inner);
        std::thread::Builder::new()
            .name("maat-indexer".into())
            .spawn(move || {
                while let Ok(event) = rx.recv() {
                    worker_inner.apply(event);
                    worker_inner.pending.fetch_sub(1, Ordering::AcqRel);
                }
                tracing::debug!("index refresh worker exiting");
            })
            .map_err(|e| IndexError::WorkerSpawn {
                message: e.to_string(),
            })?;

        Ok(Self {
            inner,
            queue: IndexQueue { tx, pending },
        })
    }

    /// The queue handle to wire into the knowledge store.
    pub fn queue(&self) -> IndexQueue {
        self.queue.clone()
    }

    /// Apply an event synchronously, bypassing the queue. Used for the
    /// initial index rebuild when loading persisted entries.
    pub fn apply_now(&self, event: IndexEvent) {
        self.inner.apply(event);
    }

    /// Block until every queued refresh has been applied.
    ///
    /// Search does not need this — it reads committed rows — but one-shot
    /// CLI commands and tests want read-your-writes.
    pub fn quiesce(&self) {
        while self.inner.pending.load(Ordering::Acquire) > 0 {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
    }

    /// Number of events awaiting application.
    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Indexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Indexer")
            .field("pending", &self.pending())
            .field("lexical", &self.inner.lexical)
            .field("semantic", &self.inner.semantic)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::semantic::EmbeddingDim;

    fn test_indexer() -> (Indexer, Arc<LexicalIndex>, Arc<SemanticIndex>) {
        let lexical = Arc::new(LexicalIndex::new());
        let semantic = Arc::new(SemanticIndex::new(EmbeddingDim::TEST));
        let indexer = Indexer::start(Arc::clone(&lexical), Arc::clone(&semantic)).unwrap();
        (indexer, lexical, semantic)
    }

    fn upsert_event(raw_id: u64, version: u64, content: &str) -> IndexEvent {
        IndexEvent::Upsert {
            id: EntryId::new(raw_id).unwrap(),
            version,
            title: "条目".into(),
            content: content.into(),
            category: LegalCategory::CivilLaw,
            tags: BTreeSet::new(),
            updated_at: 100,
        }
    }

    #[test]
    fn queued_events_are_applied() {
        let (indexer, lexical, semantic) = test_indexer();
        let queue = indexer.queue();
        queue.push(upsert_event(1, 1, "合同纠纷"));
        indexer.quiesce();

        let id = EntryId::new(1).unwrap();
        assert!(lexical.row(id).is_some());
        assert!(semantic.get(id).is_some());
    }

    #[test]
    fn stale_version_is_discarded() {
        let (indexer, lexical, _) = test_indexer();
        indexer.apply_now(upsert_event(1, 3, "新版内容"));
        indexer.apply_now(upsert_event(1, 2, "旧版内容"));

        let row = lexical.row(EntryId::new(1).unwrap()).unwrap();
        assert_eq!(row.version, 3);
    }

    #[test]
    fn reapplying_same_version_is_idempotent() {
        let (indexer, lexical, _) = test_indexer();
        indexer.apply_now(upsert_event(1, 1, "合同"));
        indexer.apply_now(upsert_event(1, 1, "合同"));
        assert_eq!(lexical.len(), 1);
    }

    #[test]
    fn tombstone_blocks_resurrection() {
        let (indexer, lexical, semantic) = test_indexer();
        let id = EntryId::new(1).unwrap();
        indexer.apply_now(upsert_event(1, 2, "合同"));
        indexer.apply_now(IndexEvent::Deactivate { id, version: 2 });
        // A redelivered upsert for the same version must not re-add the entry.
        indexer.apply_now(upsert_event(1, 2, "合同"));

        assert!(lexical.row(id).is_none());
        assert!(semantic.get(id).is_none());
    }

    #[test]
    fn quiesce_on_empty_queue_returns() {
        let (indexer, _, _) = test_indexer();
        indexer.quiesce();
        assert_eq!(indexer.pending(), 0);
    }
}
