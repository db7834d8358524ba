//! Knowledge store: the durable repository of versioned legal knowledge.
//!
//! The store exclusively owns the [`KnowledgeEntry`] lifecycle: entries are
//! created by authoring/import, mutated only through versioned updates with
//! optimistic concurrency, and never hard-deleted (deactivation only).
//! Every successful mutation enqueues an index-refresh notification and,
//! when persistence is configured, writes through to redb.

pub mod durable;

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::category::LegalCategory;
use crate::entry::{
    AtomicEntryAllocator, EntryDraft, EntryId, EntryPatch, KnowledgeEntry, normalize_tags,
    now_epoch_secs,
};
use crate::error::StoreError;
use crate::index::{IndexEvent, IndexQueue};

pub use self::durable::DurableStore;

/// Durable counter name for the entry id allocator.
pub(crate) const ENTRY_COUNTER: &str = "next_entry_id";

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Aggregate statistics over active entries.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StoreStats {
    /// Number of active entries.
    pub total: usize,
    /// Active entry count per category id.
    pub by_category: BTreeMap<String, usize>,
    /// Most frequent tags across active entries, count descending.
    pub top_tags: Vec<(String, usize)>,
    /// Most recent `updated_at` across active entries (0 when empty).
    pub last_updated: u64,
}

/// The knowledge store.
pub struct KnowledgeStore {
    entries: DashMap<EntryId, Arc<KnowledgeEntry>>,
    allocator: AtomicEntryAllocator,
    queue: IndexQueue,
    durable: Option<Arc<DurableStore>>,
    max_content_len: usize,
}

impl KnowledgeStore {
    /// Create a memory-only store.
    pub fn new(queue: IndexQueue, max_content_len: usize) -> Self {
        Self {
            entries: DashMap::new(),
            allocator: AtomicEntryAllocator::new(),
            queue,
            durable: None,
            max_content_len,
        }
    }

    /// Create a store backed by the durable layer, loading persisted
    /// entries and resuming the id allocator from its high-water mark.
    pub fn with_persistence(
        queue: IndexQueue,
        max_content_len: usize,
        durable: Arc<DurableStore>,
    ) -> StoreResult<Self> {
        let entries = DashMap::new();
        let mut max_id = 0u64;
        for entry in durable.load_entries()? {
            max_id = max_id.max(entry.id.get());
            entries.insert(entry.id, Arc::new(entry));
        }
        let next = durable.get_counter(ENTRY_COUNTER)?.unwrap_or(max_id + 1);
        tracing::info!(entries = entries.len(), next_id = next, "knowledge store loaded");

        Ok(Self {
            entries,
            allocator: AtomicEntryAllocator::starting_from(next.max(max_id + 1)),
            queue,
            durable: Some(durable),
            max_content_len,
        })
    }

    fn persist(&self, entry: &KnowledgeEntry) -> StoreResult<()> {
        if let Some(durable) = &self.durable {
            durable.put_entry(entry)?;
            durable.put_counter(ENTRY_COUNTER, self.allocator.peek_next())?;
        }
        Ok(())
    }

    /// Create a new entry with version 1.
    pub fn create(&self, draft: EntryDraft) -> StoreResult<Arc<KnowledgeEntry>> {
        draft.validate(self.max_content_len)?;

        let id = self.allocator.next_id()?;
        let now = now_epoch_secs();
        let entry = Arc::new(KnowledgeEntry {
            id,
            title: draft.title.trim().to_string(),
            content: draft.content,
            category: draft.category,
            tags: normalize_tags(&draft.tags),
            source: draft.source,
            version: 1,
            active: true,
            created_at: now,
            updated_at: now,
        });

        self.persist(&entry)?;
        self.entries.insert(id, Arc::clone(&entry));
        self.queue.push(IndexEvent::upsert(&entry));
        tracing::info!(%id, category = %entry.category, "knowledge entry created");
        Ok(entry)
    }

    /// Apply a versioned partial update.
    ///
    /// Fails with `NotFound` if the id is unknown or the entry is inactive,
    /// and with `Conflict` if `patch.expected_version` is stale. On success
    /// the version increments by exactly 1.
    pub fn update(&self, id: EntryId, patch: EntryPatch) -> StoreResult<Arc<KnowledgeEntry>> {
        if patch.is_empty() {
            return Err(StoreError::Validation {
                message: "patch contains no fields".into(),
            });
        }
        if let Some(category) = patch.category {
            if category == LegalCategory::Uncategorized {
                return Err(StoreError::Validation {
                    message: "entries cannot be moved to the uncategorized fallback".into(),
                });
            }
        }

        let updated = {
            // get_mut holds the shard lock: the version check and the swap
            // are atomic with respect to concurrent updates of this entry.
            let mut slot = self
                .entries
                .get_mut(&id)
                .ok_or(StoreError::NotFound { id: id.get() })?;
            let current = slot.value();
            if !current.active {
                return Err(StoreError::NotFound { id: id.get() });
            }
            if patch.expected_version != current.version {
                return Err(StoreError::Conflict {
                    id: id.get(),
                    expected: patch.expected_version,
                    current: current.version,
                });
            }

            let mut next = (**current).clone();
            if let Some(title) = patch.title {
                if title.trim().is_empty() {
                    return Err(StoreError::Validation {
                        message: "title must not be empty".into(),
                    });
                }
                next.title = title.trim().to_string();
            }
            if let Some(content) = patch.content {
                if content.trim().is_empty() {
                    return Err(StoreError::Validation {
                        message: "content must not be empty".into(),
                    });
                }
                if content.chars().count() > self.max_content_len {
                    return Err(StoreError::Validation {
                        message: format!(
                            "content exceeds maximum length of {} chars",
                            self.max_content_len
                        ),
                    });
                }
                next.content = content;
            }
            if let Some(category) = patch.category {
                next.category = category;
            }
            if let Some(tags) = patch.tags {
                next.tags = normalize_tags(&tags);
            }
            if let Some(source) = patch.source {
                next.source = source;
            }
            next.version += 1;
            next.updated_at = now_epoch_secs();

            let updated = Arc::new(next);
            *slot.value_mut() = Arc::clone(&updated);
            updated
        };

        self.persist(&updated)?;
        self.queue.push(IndexEvent::upsert(&updated));
        tracing::info!(%id, version = updated.version, "knowledge entry updated");
        Ok(updated)
    }

    /// Soft-delete an entry. Idempotent: deactivating an already-inactive
    /// entry succeeds without side effects.
    pub fn deactivate(&self, id: EntryId) -> StoreResult<Arc<KnowledgeEntry>> {
        let (entry, transitioned) = {
            let mut slot = self
                .entries
                .get_mut(&id)
                .ok_or(StoreError::NotFound { id: id.get() })?;
            if !slot.value().active {
                (Arc::clone(slot.value()), false)
            } else {
                let mut next = (**slot.value()).clone();
                next.active = false;
                let deactivated = Arc::new(next);
                *slot.value_mut() = Arc::clone(&deactivated);
                (deactivated, true)
            }
        };

        if transitioned {
            self.persist(&entry)?;
            self.queue.push(IndexEvent::deactivate(&entry));
            tracing::info!(%id, "knowledge entry deactivated");
        }
        Ok(entry)
    }

    /// Fetch an entry by id, active or not (soft delete keeps history).
    pub fn get(&self, id: EntryId) -> Option<Arc<KnowledgeEntry>> {
        self.entries.get(&id).map(|e| Arc::clone(e.value()))
    }

    /// Whether an entry with this id exists at all.
    pub fn contains(&self, id: EntryId) -> bool {
        self.entries.contains_key(&id)
    }

    fn page(
        &self,
        filter: impl Fn(&KnowledgeEntry) -> bool,
        skip: usize,
        limit: usize,
    ) -> Vec<Arc<KnowledgeEntry>> {
        let mut matching: Vec<Arc<KnowledgeEntry>> = self
            .entries
            .iter()
            .filter(|e| e.value().active && filter(e.value()))
            .map(|e| Arc::clone(e.value()))
            .collect();
        matching.sort_by_key(|e| e.id);
        matching.into_iter().skip(skip).take(limit).collect()
    }

    /// Active entries ordered by id, paginated.
    pub fn list(&self, skip: usize, limit: usize) -> Vec<Arc<KnowledgeEntry>> {
        self.page(|_| true, skip, limit)
    }

    /// Active entries of one category, ordered by id, paginated.
    pub fn list_by_category(
        &self,
        category: LegalCategory,
        skip: usize,
        limit: usize,
    ) -> Vec<Arc<KnowledgeEntry>> {
        self.page(|e| e.category == category, skip, limit)
    }

    /// Aggregate statistics over active entries.
    pub fn stats(&self) -> StoreStats {
        let mut total = 0usize;
        let mut by_category: BTreeMap<String, usize> = BTreeMap::new();
        let mut tag_counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut last_updated = 0u64;

        for e in self.entries.iter() {
            let entry = e.value();
            if !entry.active {
                continue;
            }
            total += 1;
            *by_category.entry(entry.category.id().to_string()).or_insert(0) += 1;
            for tag in &entry.tags {
                *tag_counts.entry(tag.clone()).or_insert(0) += 1;
            }
            last_updated = last_updated.max(entry.updated_at);
        }

        let mut top_tags: Vec<(String, usize)> = tag_counts.into_iter().collect();
        top_tags.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_tags.truncate(10);

        StoreStats {
            total,
            by_category,
            top_tags,
            last_updated,
        }
    }

    /// Number of entries including deactivated ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of active entries.
    pub fn active_len(&self) -> usize {
        self.entries.iter().filter(|e| e.value().active).count()
    }

    /// Snapshot of every entry (active and inactive), for index rebuilds.
    pub fn snapshot(&self) -> Vec<Arc<KnowledgeEntry>> {
        self.entries.iter().map(|e| Arc::clone(e.value())).collect()
    }
}

impl std::fmt::Debug for KnowledgeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeStore")
            .field("entries", &self.entries.len())
            .field("persistent", &self.durable.is_some())
            .finish()
    }
}
