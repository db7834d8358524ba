//! Semantic index: entry → fixed-dimension embedding vector.
//!
//! Embeddings are deterministic: each token maps to a seeded-RNG bipolar
//! vector (the seed is the token's hash), and a text's embedding is the
//! L2-normalized sum of its token vectors. The same text always produces
//! the same vector, regardless of when or where it is computed.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::entry::EntryId;

use super::lexical::tokenize;

/// Configurable embedding dimensionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct EmbeddingDim(pub usize);

impl EmbeddingDim {
    /// Standard dimension.
    pub const DEFAULT: Self = Self(256);

    /// Smaller dimension for fast testing.
    pub const TEST: Self = Self(64);
}

impl Default for EmbeddingDim {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Deterministic seed for a token's base vector.
fn token_seed(token: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    token.hash(&mut hasher);
    hasher.finish()
}

/// Generate the bipolar base vector for a token.
fn token_vector(token: &str, dim: EmbeddingDim) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(token_seed(token));
    (0..dim.0)
        .map(|_| if rng.r#gen::<bool>() { 1.0 } else { -1.0 })
        .collect()
}

/// Embed a text: sum of token vectors, L2-normalized.
///
/// Texts with no indexable tokens produce the zero vector, which has zero
/// cosine similarity against everything.
pub fn embed(text: &str, dim: EmbeddingDim) -> Vec<f32> {
    let tokens = tokenize(text);
    let mut sum = vec![0.0f32; dim.0];
    for token in &tokens {
        let v = token_vector(token, dim);
        for (s, x) in sum.iter_mut().zip(v.iter()) {
            *s += x;
        }
    }
    let norm: f32 = sum.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for s in sum.iter_mut() {
            *s /= norm;
        }
    }
    sum
}

/// Cosine similarity between two vectors of equal dimension.
///
/// Inputs are expected to be L2-normalized, so this is a dot product.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// The semantic index: committed embedding per entry.
pub struct SemanticIndex {
    dim: EmbeddingDim,
    vectors: DashMap<EntryId, Arc<Vec<f32>>>,
}

impl SemanticIndex {
    pub fn new(dim: EmbeddingDim) -> Self {
        Self {
            dim,
            vectors: DashMap::new(),
        }
    }

    /// The configured embedding dimension.
    pub fn dim(&self) -> EmbeddingDim {
        self.dim
    }

    /// Embed arbitrary text with this index's dimension.
    pub fn embed(&self, text: &str) -> Vec<f32> {
        embed(text, self.dim)
    }

    /// Index (or re-index) an entry's embedding.
    pub fn upsert(&self, id: EntryId, text: &str) {
        let vector = Arc::new(self.embed(text));
        self.vectors.insert(id, vector);
    }

    /// Drop an entry's embedding.
    pub fn remove(&self, id: EntryId) {
        self.vectors.remove(&id);
    }

    /// The committed embedding for an entry, if indexed.
    pub fn get(&self, id: EntryId) -> Option<Arc<Vec<f32>>> {
        self.vectors.get(&id).map(|v| Arc::clone(v.value()))
    }

    /// Number of indexed entries.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

impl std::fmt::Debug for SemanticIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticIndex")
            .field("dim", &self.dim.0)
            .field("entries", &self.vectors.len())
            .finish()
    }
}
