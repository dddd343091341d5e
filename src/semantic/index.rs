//! Exact cosine-distance nearest-neighbour index.
//!
//! Reference corpora are small (hundreds to a few thousand titles), so every
//! query scans all entries. Vectors are stored with their norm precomputed.

use std::cmp::Ordering;

use super::SemanticError;

struct IndexEntry {
    id: Option<String>,
    title: String,
    vector: Vec<f32>,
    norm: f32,
}

/// A neighbour returned by [`VectorIndex::nearest`].
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbour {
    pub id: Option<String>,
    pub title: String,
    /// Cosine distance `1 - cos(query, entry)`, in `[0, 2]`.
    pub distance: f32,
}

/// In-memory vector index, read-only once built.
#[derive(Default)]
pub struct VectorIndex {
    dimension: Option<usize>,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of indexed entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Adds an entry. The first vector fixes the index dimension.
    ///
    /// # Errors
    ///
    /// Returns [`SemanticError::InvalidVector`] for an empty or zero-norm
    /// vector, or one whose dimension differs from the index.
    pub fn add(
        &mut self,
        id: Option<String>,
        title: impl Into<String>,
        vector: Vec<f32>,
    ) -> Result<(), SemanticError> {
        let norm = self.checked_norm(&vector)?;
        self.dimension.get_or_insert(vector.len());
        self.entries.push(IndexEntry {
            id,
            title: title.into(),
            vector,
            norm,
        });
        Ok(())
    }

    /// Returns up to `k` entries closest to `query`, closest first.
    ///
    /// # Errors
    ///
    /// Returns [`SemanticError::EmptyIndex`] when nothing is indexed and
    /// [`SemanticError::InvalidVector`] for an unusable query vector.
    pub fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<Neighbour>, SemanticError> {
        if self.entries.is_empty() {
            return Err(SemanticError::EmptyIndex);
        }
        let query_norm = self.checked_norm(query)?;

        let mut scored: Vec<(f32, &IndexEntry)> = self
            .entries
            .iter()
            .map(|entry| (cosine_distance(query, query_norm, entry), entry))
            .collect();
        scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(distance, entry)| Neighbour {
                id: entry.id.clone(),
                title: entry.title.clone(),
                distance,
            })
            .collect())
    }

    fn checked_norm(&self, vector: &[f32]) -> Result<f32, SemanticError> {
        if vector.is_empty() {
            return Err(SemanticError::invalid_vector("vector is empty"));
        }
        if let Some(dimension) = self.dimension
            && dimension != vector.len()
        {
            return Err(SemanticError::invalid_vector(format!(
                "expected dimension {dimension}, got {}",
                vector.len()
            )));
        }
        let norm = vector_norm(vector);
        if norm <= 0.0 || !norm.is_finite() {
            return Err(SemanticError::invalid_vector("vector has zero norm"));
        }
        Ok(norm)
    }
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("dimension", &self.dimension)
            .field("entries", &self.entries.len())
            .finish()
    }
}

fn vector_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|v| v * v).sum::<f32>().sqrt()
}

fn cosine_distance(query: &[f32], query_norm: f32, entry: &IndexEntry) -> f32 {
    let dot = query
        .iter()
        .zip(entry.vector.iter())
        .map(|(a, b)| a * b)
        .sum::<f32>();
    (1.0 - dot / (query_norm * entry.norm)).clamp(0.0, 2.0)
}
