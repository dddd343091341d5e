//! Semantic relevance scoring against a reference title corpus.
//!
//! [`SemanticScorer::build`] embeds every reference title once and keeps the
//! vectors in an exact cosine-distance [`VectorIndex`]. [`SemanticScorer::score`]
//! embeds a candidate title, looks up its two nearest reference titles and
//! returns the distance of the closest one unchanged: 0 for an identical
//! title, up to 2 for an opposite one. Lower is more relevant.

mod corpus;
mod embedder;
mod error;
mod index;

pub use corpus::{ReferenceTitle, fetch_corpus, load_corpus_file, parse_corpus};
pub use embedder::{Embedder, OpenAiEmbedder};
pub use error::SemanticError;
pub use index::{Neighbour, VectorIndex};

use async_trait::async_trait;
use tracing::{debug, info, instrument};

/// Neighbours looked up per scored title.
pub const SCORE_NEIGHBOURS: usize = 2;

/// Scores titles by similarity to a reference corpus.
#[async_trait]
pub trait TitleScorer: Send + Sync {
    /// Distance from `title` to the closest reference title.
    async fn score(&self, title: &str) -> Result<f64, SemanticError>;
}

/// Title scorer over an in-memory embedding index.
pub struct SemanticScorer<E> {
    embedder: E,
    index: VectorIndex,
}

impl<E: Embedder> SemanticScorer<E> {
    /// Embeds the corpus and builds the index.
    ///
    /// # Errors
    ///
    /// Returns [`SemanticError`] if embedding fails or a returned vector
    /// cannot be indexed.
    #[instrument(skip(embedder, corpus), fields(corpus = corpus.len()))]
    pub async fn build(embedder: E, corpus: &[ReferenceTitle]) -> Result<Self, SemanticError> {
        let titles: Vec<String> = corpus.iter().map(|entry| entry.title.clone()).collect();
        let vectors = embedder.embed(&titles).await?;
        if vectors.len() != corpus.len() {
            return Err(SemanticError::invalid_response(format!(
                "expected {} embeddings, got {}",
                corpus.len(),
                vectors.len()
            )));
        }

        let mut index = VectorIndex::new();
        for (entry, vector) in corpus.iter().zip(vectors) {
            index.add(entry.id.clone(), entry.title.clone(), vector)?;
        }

        info!(indexed = index.len(), "semantic index built");
        Ok(Self { embedder, index })
    }

    /// Number of indexed reference titles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Closest reference titles to `title`, closest first.
    ///
    /// # Errors
    ///
    /// Returns [`SemanticError::EmptyIndex`] for an empty index, or an
    /// embedding error.
    pub async fn neighbours(&self, title: &str) -> Result<Vec<Neighbour>, SemanticError> {
        if self.index.is_empty() {
            return Err(SemanticError::EmptyIndex);
        }
        let mut vectors = self.embedder.embed(&[title.to_string()]).await?;
        let query = vectors
            .pop()
            .ok_or_else(|| SemanticError::invalid_response("no embedding returned"))?;
        self.index.nearest(&query, SCORE_NEIGHBOURS)
    }
}

#[async_trait]
impl<E: Embedder> TitleScorer for SemanticScorer<E> {
    #[instrument(skip(self))]
    async fn score(&self, title: &str) -> Result<f64, SemanticError> {
        let neighbours = self.neighbours(title).await?;
        let closest = neighbours.first().ok_or(SemanticError::EmptyIndex)?;
        debug!(
            closest = %closest.title,
            distance = closest.distance,
            "nearest reference title"
        );
        Ok(f64::from(closest.distance))
    }
}

impl<E> std::fmt::Debug for SemanticScorer<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticScorer")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}
