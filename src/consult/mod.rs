//! Consultation pipeline: classify → retrieve → compose → score → persist.
//!
//! A consultation moves through a fixed state machine
//! (`received → classified → retrieved → composed → completed`, with
//! `failed` reachable from any non-terminal state) and always leaves
//! exactly one record in the append-only [`log::ConsultationLog`].

pub mod compose;
pub mod log;
pub mod orchestrator;

use std::num::NonZeroU64;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::category::LegalCategory;
use crate::entry::EntryId;
use crate::error::StoreError;

/// Unique identifier for a consultation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct ConsultationId(NonZeroU64);

impl ConsultationId {
    /// Create a `ConsultationId` from a raw `u64`. Returns `None` if zero.
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(ConsultationId)
    }

    /// Get the underlying `u64` value.
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl std::fmt::Display for ConsultationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "consult:{}", self.0)
    }
}

/// Terminal-state discipline: `Pending` may move to `Completed` or
/// `Failed`, never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsultationStatus {
    Pending,
    Completed,
    Failed,
}

/// Why a consultation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Input rejected during the `received` stage.
    InvalidQuestion,
    /// The end-to-end deadline was exceeded.
    Timeout,
    /// Answer composition failed after all retries.
    Compose,
    /// The caller cancelled before composition began.
    Cancelled,
}

/// The classifier's advisory output, recorded for observability even when
/// an explicit category override wins.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClassifiedAs {
    pub category: LegalCategory,
    pub confidence: f32,
}

/// One immutable consultation record.
///
/// Invariants: `confidence` is present iff `status == Completed`;
/// `failure` is present iff `status == Failed`; `sources` preserves
/// citation order. Entry ids are weak references — deactivating an entry
/// later never rewrites history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsultationRecord {
    pub id: ConsultationId,
    /// Requesting user id (free text; auth is out of scope).
    pub user: String,
    pub question: String,
    pub context: Option<String>,
    /// The resolved category (override or classifier output).
    pub category: LegalCategory,
    /// What the classifier said, when classification ran.
    pub classified: Option<ClassifiedAs>,
    /// Composed answer text. Empty only for failed records.
    pub answer: String,
    /// Final confidence in [0, 1]; present only when completed.
    pub confidence: Option<f32>,
    /// Cited knowledge entries in rank order.
    pub sources: Vec<EntryId>,
    pub status: ConsultationStatus,
    pub failure: Option<FailureReason>,
    /// Creation time (seconds since UNIX epoch).
    pub created_at: u64,
}

/// A consultation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsultRequest {
    pub question: String,
    #[serde(default)]
    pub context: Option<String>,
    /// Explicit category override. Wins over the classifier when present.
    #[serde(default)]
    pub category: Option<LegalCategory>,
    #[serde(default = "default_user")]
    pub user: String,
    /// Per-request deadline override in milliseconds.
    #[serde(default)]
    pub deadline_ms: Option<u64>,
}

fn default_user() -> String {
    "anonymous".into()
}

impl ConsultRequest {
    /// A plain question with defaults for everything else.
    pub fn question(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            context: None,
            category: None,
            user: default_user(),
            deadline_ms: None,
        }
    }
}

/// Cooperative cancellation token.
///
/// Honored between pipeline stages up to the start of composition; once
/// composition begins the consultation runs to its single terminal state.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Thread-safe consultation id allocator.
#[derive(Debug)]
pub struct ConsultIdAllocator {
    next: AtomicU64,
}

impl ConsultIdAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn starting_from(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start.max(1)),
        }
    }

    pub fn next_id(&self) -> Result<ConsultationId, StoreError> {
        let raw = self.next.fetch_add(1, Ordering::Relaxed);
        ConsultationId::new(raw).ok_or(StoreError::IdsExhausted)
    }

    pub fn peek_next(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

impl Default for ConsultIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
