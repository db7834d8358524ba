//! Core knowledge entry types.
//!
//! Every piece of legal knowledge (statute text, case summary, practice note)
//! is a [`KnowledgeEntry`] identified by an [`EntryId`]. Ids are allocated by
//! [`AtomicEntryAllocator`] and never reused; entries are soft-deleted only.

use std::collections::BTreeSet;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::category::LegalCategory;
use crate::error::StoreError;

/// Unique, niche-optimized identifier for a knowledge entry.
///
/// Uses `NonZeroU64` so that `Option<EntryId>` is the same size as `EntryId`
/// (the niche optimization lets the compiler use 0 as the `None` discriminant).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct EntryId(NonZeroU64);

impl EntryId {
    /// Create an `EntryId` from a raw `u64`. Returns `None` if `raw` is zero.
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(EntryId)
    }

    /// Get the underlying `u64` value.
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "entry:{}", self.0)
    }
}

/// Current UNIX timestamp in seconds.
pub(crate) fn now_epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// A versioned knowledge entry.
///
/// The id is immutable once assigned; `version` starts at 1 and increments by
/// exactly 1 on every content-affecting update. Deactivation flips `active`
/// without touching the version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    /// Unique identifier.
    pub id: EntryId,
    /// Human-readable title.
    pub title: String,
    /// Full text content.
    pub content: String,
    /// Legal domain from the fixed taxonomy.
    pub category: LegalCategory,
    /// Deduplicated, order-normalized tags.
    pub tags: BTreeSet<String>,
    /// Free-text provenance (e.g., "全国人大", "最高人民法院").
    pub source: String,
    /// Monotonic version within this entry's lineage, starting at 1.
    pub version: u64,
    /// Soft-delete flag.
    pub active: bool,
    /// Creation time (seconds since UNIX epoch).
    pub created_at: u64,
    /// Last content-affecting update (seconds since UNIX epoch).
    pub updated_at: u64,
}

/// Input for creating a new knowledge entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryDraft {
    pub title: String,
    pub content: String,
    pub category: LegalCategory,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub source: String,
}

impl EntryDraft {
    /// Validate the draft against the store limits.
    pub fn validate(&self, max_content_len: usize) -> Result<(), StoreError> {
        if self.title.trim().is_empty() {
            return Err(StoreError::Validation {
                message: "title must not be empty".into(),
            });
        }
        if self.content.trim().is_empty() {
            return Err(StoreError::Validation {
                message: "content must not be empty".into(),
            });
        }
        if self.content.chars().count() > max_content_len {
            return Err(StoreError::Validation {
                message: format!(
                    "content exceeds maximum length of {max_content_len} chars"
                ),
            });
        }
        if self.category == LegalCategory::Uncategorized {
            return Err(StoreError::Validation {
                message: "entries cannot be created in the uncategorized fallback".into(),
            });
        }
        Ok(())
    }
}

/// Partial update for an existing entry.
///
/// `expected_version` carries the caller's optimistic-concurrency token:
/// the update is rejected with a conflict if it no longer matches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntryPatch {
    /// The version the caller last read.
    pub expected_version: u64,
    pub title: Option<String>,
    pub content: Option<String>,
    pub category: Option<LegalCategory>,
    pub tags: Option<Vec<String>>,
    pub source: Option<String>,
}

impl EntryPatch {
    /// Whether the patch carries any field at all.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.category.is_none()
            && self.tags.is_none()
            && self.source.is_none()
    }
}

/// Thread-safe entry id allocator.
///
/// Produces monotonically increasing ids starting from 1. Ids are never
/// reused, even across restarts — the high-water mark is persisted and the
/// allocator resumes from it.
#[derive(Debug)]
pub struct AtomicEntryAllocator {
    next: AtomicU64,
}

impl AtomicEntryAllocator {
    /// Create a new allocator that starts from id 1.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Create an allocator that resumes from a given id.
    pub fn starting_from(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start.max(1)),
        }
    }

    /// Allocate the next entry id.
    pub fn next_id(&self) -> Result<EntryId, StoreError> {
        let raw = self.next.fetch_add(1, Ordering::Relaxed);
        EntryId::new(raw).ok_or(StoreError::IdsExhausted)
    }

    /// Return the next id that *would* be allocated, without consuming it.
    pub fn peek_next(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

impl Default for AtomicEntryAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Collapse a tag list into the canonical deduplicated set,
/// dropping empty tags and trimming whitespace.
pub fn normalize_tags(tags: &[String]) -> BTreeSet<String> {
    tags.iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}
