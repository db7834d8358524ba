//! Bounded multi-hop traversal over the relation graph.
//!
//! Legal citation chains are cyclic in practice (statutes cite each other,
//! cases cite cases that cite back into statutes), so traversal is BFS with
//! a visited set — cycles are normal topology, never an error.

use std::collections::{HashSet, VecDeque};

use crate::entry::EntryId;

use super::RelationType;
use super::index::{Neighbor, RelationDirection, RelationGraph};

/// Configuration for a transitive-closure traversal.
#[derive(Debug, Clone)]
pub struct ClosureConfig {
    /// Maximum hop depth from the seed entry.
    pub max_depth: usize,
    /// Only follow edges of this type (None = follow all).
    pub type_filter: Option<RelationType>,
    /// Maximum number of entries to collect.
    pub max_results: usize,
}

impl Default for ClosureConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            type_filter: None,
            max_results: 1_000,
        }
    }
}

/// An entry discovered during traversal, with the hop depth it was first
/// reached at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosureNode {
    pub entry_id: EntryId,
    pub depth: usize,
}

/// Result of a transitive-closure traversal.
#[derive(Debug, Clone)]
pub struct ClosureResult {
    /// Entries in BFS discovery order (seed excluded). Each entry appears
    /// at most once, at its minimum depth.
    pub nodes: Vec<ClosureNode>,
    /// Number of edges followed.
    pub edges_followed: usize,
    /// Maximum depth actually reached.
    pub depth_reached: usize,
}

/// Compute the bounded transitive closure of an entry over outgoing edges.
///
/// BFS with a visited set: each entry is visited at most once, so the
/// traversal terminates on cyclic graphs. Per level, neighbors are expanded
/// in the deterministic order produced by [`RelationGraph::neighbors`]
/// (confidence descending, id ascending).
pub fn transitive_closure(
    graph: &RelationGraph,
    seed: EntryId,
    config: &ClosureConfig,
) -> ClosureResult {
    let mut visited: HashSet<EntryId> = HashSet::new();
    let mut nodes: Vec<ClosureNode> = Vec::new();
    let mut edges_followed = 0usize;
    let mut depth_reached = 0usize;

    let mut queue: VecDeque<(EntryId, usize)> = VecDeque::new();
    visited.insert(seed);
    queue.push_back((seed, 0));

    while let Some((node, depth)) = queue.pop_front() {
        if depth >= config.max_depth {
            continue;
        }
        if nodes.len() >= config.max_results {
            break;
        }

        for neighbor in graph.neighbors(node, RelationDirection::Outgoing, config.type_filter) {
            edges_followed += 1;
            if visited.insert(neighbor.entry_id) {
                depth_reached = depth_reached.max(depth + 1);
                nodes.push(ClosureNode {
                    entry_id: neighbor.entry_id,
                    depth: depth + 1,
                });
                queue.push_back((neighbor.entry_id, depth + 1));
            }
        }
    }

    ClosureResult {
        nodes,
        edges_followed,
        depth_reached,
    }
}

/// One-hop related entries in both directions, merged and ordered by
/// descending confidence then ascending id, truncated to `limit`.
///
/// Used for "related knowledge" listings next to an entry.
pub fn related_entries(graph: &RelationGraph, entry: EntryId, limit: usize) -> Vec<Neighbor> {
    let mut related = graph.neighbors(entry, RelationDirection::Outgoing, None);
    for incoming in graph.neighbors(entry, RelationDirection::Incoming, None) {
        if !related.iter().any(|n| n.entry_id == incoming.entry_id) {
            related.push(incoming);
        }
    }
    related.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.entry_id.cmp(&b.entry_id))
    });
    related.truncate(limit);
    related
}
