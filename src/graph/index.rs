//! In-memory relation graph with dual-indexing.
//!
//! Uses `petgraph` for the graph structure and `DashMap` for fast lookups
//! by entry id. Edges whose far endpoint has been deactivated are retained
//! (audit history) but excluded from traversal.

use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

use crate::entry::EntryId;
use crate::error::GraphError;

use super::{Relation, RelationEdge, RelationType};

/// Result type for graph operations.
pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// Traversal direction for neighbor queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationDirection {
    /// Follow edges out of the entry (what it cites / contains / causes).
    Outgoing,
    /// Follow edges into the entry (what cites / contains / causes it).
    Incoming,
}

impl From<RelationDirection> for Direction {
    fn from(d: RelationDirection) -> Self {
        match d {
            RelationDirection::Outgoing => Direction::Outgoing,
            RelationDirection::Incoming => Direction::Incoming,
        }
    }
}

/// A one-hop neighbor of an entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub entry_id: EntryId,
    pub relation_type: RelationType,
    pub confidence: f32,
}

/// In-memory relation graph backed by petgraph with dual-indexing.
///
/// Endpoint existence is validated by the engine against the knowledge
/// store before insertion; the graph itself enforces the structural
/// invariants (no self-loops, no duplicate (source, target, type) triples,
/// confidence in range).
pub struct RelationGraph {
    /// The directed graph: nodes are EntryIds, edges carry RelationEdge.
    graph: RwLock<DiGraph<EntryId, RelationEdge>>,
    /// EntryId → NodeIndex mapping for O(1) node lookups.
    node_index: DashMap<EntryId, NodeIndex>,
    /// Duplicate guard over (source, target, type) triples.
    dedup: DashMap<(u64, u64, RelationType), ()>,
    /// Entries that have been soft-deleted; their edges are kept but
    /// skipped during traversal.
    inactive: DashMap<EntryId, ()>,
    /// Relation count.
    relation_count: AtomicUsize,
}

impl RelationGraph {
    /// Create a new empty relation graph.
    pub fn new() -> Self {
        Self {
            graph: RwLock::new(DiGraph::new()),
            node_index: DashMap::new(),
            dedup: DashMap::new(),
            inactive: DashMap::new(),
            relation_count: AtomicUsize::new(0),
        }
    }

    /// Ensure a node exists for the given entry, returning its NodeIndex.
    fn ensure_node(&self, entry: EntryId) -> NodeIndex {
        if let Some(idx) = self.node_index.get(&entry) {
            return *idx.value();
        }
        let mut graph = self.graph.write().expect("graph lock poisoned");
        // Double-check after acquiring the write lock.
        if let Some(idx) = self.node_index.get(&entry) {
            return *idx.value();
        }
        let idx = graph.add_node(entry);
        self.node_index.insert(entry, idx);
        idx
    }

    /// Insert a relation into the graph.
    pub fn add_relation(&self, relation: &Relation) -> GraphResult<()> {
        if relation.source == relation.target {
            return Err(GraphError::SelfLoop {
                id: relation.source.get(),
            });
        }
        if !(0.0..=1.0).contains(&relation.confidence) {
            return Err(GraphError::InvalidConfidence {
                confidence: relation.confidence,
            });
        }

        let key = (
            relation.source.get(),
            relation.target.get(),
            relation.relation_type,
        );
        if self.dedup.contains_key(&key) {
            return Err(GraphError::DuplicateRelation {
                source_id: relation.source.get(),
                target: relation.target.get(),
                relation_type: relation.relation_type.to_string(),
            });
        }

        let src_idx = self.ensure_node(relation.source);
        let tgt_idx = self.ensure_node(relation.target);

        {
            let mut graph = self.graph.write().expect("graph lock poisoned");
            graph.add_edge(src_idx, tgt_idx, RelationEdge::from(relation));
        }

        self.dedup.insert(key, ());
        self.relation_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Mark an entry as deactivated. Its edges stay in the graph but are
    /// excluded from traversal from now on.
    pub fn mark_inactive(&self, entry: EntryId) {
        self.inactive.insert(entry, ());
    }

    /// Whether an entry has been marked inactive.
    pub fn is_inactive(&self, entry: EntryId) -> bool {
        self.inactive.contains_key(&entry)
    }

    /// Entries reachable in one hop, ordered by descending confidence then
    /// ascending entry id (deterministic tie-break). Edges whose far
    /// endpoint is inactive are skipped.
    pub fn neighbors(
        &self,
        entry: EntryId,
        direction: RelationDirection,
        type_filter: Option<RelationType>,
    ) -> Vec<Neighbor> {
        let graph = self.graph.read().expect("graph lock poisoned");
        let idx = match self.node_index.get(&entry) {
            Some(idx) => *idx.value(),
            None => return vec![],
        };

        let mut neighbors: Vec<Neighbor> = graph
            .edges_directed(idx, direction.into())
            .filter(|e| {
                type_filter.is_none_or(|t| e.weight().relation_type == t)
            })
            .filter_map(|e| {
                let far = match direction {
                    RelationDirection::Outgoing => e.target(),
                    RelationDirection::Incoming => e.source(),
                };
                let far_id = *graph.node_weight(far)?;
                if self.is_inactive(far_id) {
                    return None;
                }
                Some(Neighbor {
                    entry_id: far_id,
                    relation_type: e.weight().relation_type,
                    confidence: e.weight().confidence,
                })
            })
            .collect();

        neighbors.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.entry_id.cmp(&b.entry_id))
        });
        neighbors
    }

    /// Number of relations in the graph (including edges to inactive entries).
    pub fn relation_count(&self) -> usize {
        self.relation_count.load(Ordering::Relaxed)
    }

    /// Number of distinct entries that participate in at least one relation.
    pub fn node_count(&self) -> usize {
        self.node_index.len()
    }
}

impl Default for RelationGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RelationGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationGraph")
            .field("nodes", &self.node_count())
            .field("relations", &self.relation_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eid(raw: u64) -> EntryId {
        EntryId::new(raw).unwrap()
    }

    fn rel(s: u64, t: u64, ty: RelationType, c: f32) -> Relation {
        Relation::new(eid(s), eid(t), ty, c)
    }

    #[test]
    fn self_loop_rejected() {
        let g = RelationGraph::new();
        let err = g
            .add_relation(&rel(1, 1, RelationType::Citation, 0.5))
            .unwrap_err();
        assert!(matches!(err, GraphError::SelfLoop { id: 1 }));
    }

    #[test]
    fn duplicate_triple_rejected_but_other_types_allowed() {
        let g = RelationGraph::new();
        g.add_relation(&rel(1, 2, RelationType::Citation, 0.5)).unwrap();
        let err = g
            .add_relation(&rel(1, 2, RelationType::Citation, 0.9))
            .unwrap_err();
        assert!(matches!(err, GraphError::DuplicateRelation { .. }));

        // Same pair, different type — allowed.
        g.add_relation(&rel(1, 2, RelationType::Hierarchical, 0.8))
            .unwrap();
        assert_eq!(g.relation_count(), 2);
    }

    #[test]
    fn neighbors_ordered_by_confidence_then_id() {
        let g = RelationGraph::new();
        g.add_relation(&rel(1, 4, RelationType::Citation, 0.5)).unwrap();
        g.add_relation(&rel(1, 2, RelationType::Citation, 0.9)).unwrap();
        g.add_relation(&rel(1, 3, RelationType::Citation, 0.5)).unwrap();

        let ns = g.neighbors(eid(1), RelationDirection::Outgoing, None);
        let ids: Vec<u64> = ns.iter().map(|n| n.entry_id.get()).collect();
        assert_eq!(ids, vec![2, 3, 4]); // 0.9 first, then 0.5 ties by id
    }

    #[test]
    fn neighbors_skip_inactive_targets() {
        let g = RelationGraph::new();
        g.add_relation(&rel(1, 2, RelationType::Citation, 0.9)).unwrap();
        g.add_relation(&rel(1, 3, RelationType::Citation, 0.8)).unwrap();
        g.mark_inactive(eid(2));

        let ns = g.neighbors(eid(1), RelationDirection::Outgoing, None);
        assert_eq!(ns.len(), 1);
        assert_eq!(ns[0].entry_id, eid(3));
        // The edge itself is retained.
        assert_eq!(g.relation_count(), 2);
    }

    #[test]
    fn incoming_direction_and_type_filter() {
        let g = RelationGraph::new();
        g.add_relation(&rel(1, 3, RelationType::Citation, 0.9)).unwrap();
        g.add_relation(&rel(2, 3, RelationType::Hierarchical, 0.8)).unwrap();

        let all = g.neighbors(eid(3), RelationDirection::Incoming, None);
        assert_eq!(all.len(), 2);

        let cites = g.neighbors(
            eid(3),
            RelationDirection::Incoming,
            Some(RelationType::Citation),
        );
        assert_eq!(cites.len(), 1);
        assert_eq!(cites[0].entry_id, eid(1));
    }

    #[test]
    fn unknown_entry_has_no_neighbors() {
        let g = RelationGraph::new();
        assert!(g.neighbors(eid(99), RelationDirection::Outgoing, None).is_empty());
    }

    #[test]
    fn out_of_range_confidence_rejected() {
        let g = RelationGraph::new();
        // Relation::new clamps, so build the struct directly.
        let bad = Relation {
            source: eid(1),
            target: eid(2),
            relation_type: RelationType::Causal,
            confidence: 1.5,
            created_at: 0,
        };
        assert!(matches!(
            g.add_relation(&bad),
            Err(GraphError::InvalidConfidence { .. })
        ));
    }
}
