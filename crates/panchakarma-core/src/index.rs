//! Flat Euclidean nearest-neighbour index.
//!
//! Stores every vector and answers queries by brute force, which is exact and
//! plenty fast for a corpus of a few hundred passages.
//!
//! # Ordering
//!
//! Results are sorted by squared L2 distance (ascending), then by position
//! (ascending), so ties always resolve to corpus order. `k` is clamped to
//! the number of stored vectors.

use serde::Serialize;

use crate::embedding::l2_distance_squared;
use crate::error::EmbeddingError;

/// One search hit: the position of a stored vector and its squared distance
/// to the query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Neighbor {
    pub position: usize,
    pub distance: f32,
}

/// Brute-force L2 index over fixed-dimension vectors.
#[derive(Debug, Clone)]
pub struct FlatL2Index {
    dims: usize,
    vectors: Vec<Vec<f32>>,
}

impl FlatL2Index {
    /// An index with no vectors.
    pub fn empty(dims: usize) -> Self {
        Self {
            dims,
            vectors: Vec::new(),
        }
    }

    /// Build an index, rejecting any vector whose length differs from `dims`.
    pub fn build(dims: usize, vectors: Vec<Vec<f32>>) -> Result<Self, EmbeddingError> {
        if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
            return Err(EmbeddingError::DimensionMismatch {
                expected: dims,
                actual: bad.len(),
            });
        }
        Ok(Self { dims, vectors })
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Return up to `k` nearest stored vectors to `query`.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, EmbeddingError> {
        if query.len() != self.dims {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dims,
                actual: query.len(),
            });
        }

        let mut hits: Vec<Neighbor> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(position, v)| Neighbor {
                position,
                distance: l2_distance_squared(query, v),
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.position.cmp(&b.position))
        });
        hits.truncate(k.min(self.vectors.len()));
        Ok(hits)
    }
}
