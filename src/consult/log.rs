//! Append-only consultation log.
//!
//! Every consultation — completed or failed — leaves exactly one record
//! here. Records are never mutated or deleted; queries are by recency.

use std::sync::{Arc, RwLock};

use dashmap::DashMap;

use crate::error::ConsultError;
use crate::store::DurableStore;

use super::{ConsultIdAllocator, ConsultationId, ConsultationRecord};

/// Durable counter name for the consultation id allocator.
const CONSULT_COUNTER: &str = "next_consultation_id";

/// The append-only consultation log.
pub struct ConsultationLog {
    records: DashMap<ConsultationId, Arc<ConsultationRecord>>,
    /// Append order; recency queries walk it backwards.
    order: RwLock<Vec<ConsultationId>>,
    allocator: ConsultIdAllocator,
    durable: Option<Arc<DurableStore>>,
}

impl ConsultationLog {
    /// Create a memory-only log.
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            order: RwLock::new(Vec::new()),
            allocator: ConsultIdAllocator::new(),
            durable: None,
        }
    }

    /// Create a log backed by the durable layer, loading persisted records.
    pub fn with_persistence(durable: Arc<DurableStore>) -> Result<Self, ConsultError> {
        let records = DashMap::new();
        let mut loaded = durable.load_consultations()?;
        // redb iterates by key, which is the id — already chronological.
        loaded.sort_by_key(|r| r.id);

        let mut max_id = 0u64;
        let mut order = Vec::with_capacity(loaded.len());
        for record in loaded {
            max_id = max_id.max(record.id.get());
            order.push(record.id);
            records.insert(record.id, Arc::new(record));
        }
        let next = durable.get_counter(CONSULT_COUNTER)?.unwrap_or(max_id + 1);
        tracing::info!(records = records.len(), "consultation log loaded");

        Ok(Self {
            records,
            order: RwLock::new(order),
            allocator: ConsultIdAllocator::starting_from(next.max(max_id + 1)),
            durable: Some(durable),
        })
    }

    /// Allocate the next consultation id.
    pub fn next_id(&self) -> Result<ConsultationId, ConsultError> {
        Ok(self.allocator.next_id()?)
    }

    /// Append a record. Ids must be fresh; appending a duplicate is a bug.
    pub fn append(&self, record: ConsultationRecord) -> Result<Arc<ConsultationRecord>, ConsultError> {
        if self.records.contains_key(&record.id) {
            return Err(ConsultError::DuplicateRecord {
                id: record.id.get(),
            });
        }
        if let Some(durable) = &self.durable {
            durable.put_consultation(&record)?;
            durable.put_counter(CONSULT_COUNTER, self.allocator.peek_next())?;
        }
        let record = Arc::new(record);
        self.records.insert(record.id, Arc::clone(&record));
        self.order
            .write()
            .expect("log order lock poisoned")
            .push(record.id);
        Ok(record)
    }

    /// Fetch a record by id.
    pub fn get(&self, id: ConsultationId) -> Option<Arc<ConsultationRecord>> {
        self.records.get(&id).map(|r| Arc::clone(r.value()))
    }

    /// Records newest-first, optionally restricted to one user, paginated.
    pub fn recent(
        &self,
        user: Option<&str>,
        skip: usize,
        limit: usize,
    ) -> Vec<Arc<ConsultationRecord>> {
        let order = self.order.read().expect("log order lock poisoned");
        order
            .iter()
            .rev()
            .filter_map(|id| self.records.get(id).map(|r| Arc::clone(r.value())))
            .filter(|r| user.is_none_or(|u| r.user == u))
            .skip(skip)
            .take(limit)
            .collect()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for ConsultationLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConsultationLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsultationLog")
            .field("records", &self.records.len())
            .field("persistent", &self.durable.is_some())
            .finish()
    }
}
