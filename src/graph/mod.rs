//! Relation graph: typed, weighted edges between knowledge entries.
//!
//! Legal knowledge is heavily cross-referenced — statutes cite statutes,
//! cases cite both, and practice notes hang off either. The graph stores
//! directed [`Relation`] edges with a type and a confidence weight.
//!
//! - **In-memory layer** ([`index::RelationGraph`]): petgraph with a DashMap
//!   node index for O(1) lookups
//! - **Traversal** ([`traverse`]): cycle-tolerant bounded BFS

pub mod index;
pub mod traverse;

use serde::{Deserialize, Serialize};

use crate::entry::EntryId;

/// The kind of relationship between two knowledge entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum RelationType {
    /// Source cites target (statute reference, case citation).
    Citation = 0,
    /// Source is a parent/umbrella of target (law → article → clause).
    Hierarchical = 1,
    /// Source establishes or triggers target (amendment, supersession).
    Causal = 2,
}

impl RelationType {
    /// All relation types, in discriminant order.
    pub const ALL: [RelationType; 3] = [
        RelationType::Citation,
        RelationType::Hierarchical,
        RelationType::Causal,
    ];

    /// Stable wire identifier.
    pub fn id(&self) -> &'static str {
        match self {
            RelationType::Citation => "citation",
            RelationType::Hierarchical => "hierarchical",
            RelationType::Causal => "causal",
        }
    }

    /// Parse a wire identifier.
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.id() == id)
    }
}

impl std::fmt::Display for RelationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// A directed, typed edge between two knowledge entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    /// The citing / parent / causing entry.
    pub source: EntryId,
    /// The cited / child / caused entry.
    pub target: EntryId,
    /// The kind of relationship.
    pub relation_type: RelationType,
    /// Confidence in [0.0, 1.0].
    pub confidence: f32,
    /// Timestamp (seconds since UNIX epoch).
    pub created_at: u64,
}

impl Relation {
    /// Create a new relation with the current timestamp.
    /// The confidence is clamped to [0.0, 1.0].
    pub fn new(
        source: EntryId,
        target: EntryId,
        relation_type: RelationType,
        confidence: f32,
    ) -> Self {
        Self {
            source,
            target,
            relation_type,
            confidence: confidence.clamp(0.0, 1.0),
            created_at: crate::entry::now_epoch_secs(),
        }
    }
}

/// Edge data stored on petgraph edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationEdge {
    pub relation_type: RelationType,
    pub confidence: f32,
    pub created_at: u64,
}

impl From<&Relation> for RelationEdge {
    fn from(r: &Relation) -> Self {
        Self {
            relation_type: r.relation_type,
            confidence: r.confidence,
            created_at: r.created_at,
        }
    }
}
