//! Retrieval engines: sparse (BM25), dense (cosine), hybrid (RRF fusion of
//! the two), and iterative (judged query reformulation over a dense
//! engine).

pub mod dense;
pub mod hybrid;
pub mod iterative;
pub mod sparse;

pub use dense::DenseEngine;
pub use hybrid::HybridEngine;
pub use iterative::IterativeEngine;
pub use sparse::SparseEngine;

use crate::core::Chunk;
use crate::error::EmbedError;

/// A chunk paired with its retrieval score. Higher is more relevant;
/// engines are not required to use comparable score scales with each
/// other (BM25 scores and cosine similarities are not on the same axis),
/// which is exactly why [`HybridEngine`] fuses by rank rather than score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// The engine's relevance score for this chunk, given the query.
    pub score: f32,
}

/// Common shape for every retrieval engine: build an index over a corpus
/// of chunks, then answer ranked queries against it.
pub trait RetrievalEngine: Send + Sync {
    /// Replaces this engine's index with one built from `chunks`.
    ///
    /// # Errors
    ///
    /// Returns [`EmbedError`] if embedding the chunks failed (dense and
    /// hybrid engines only; sparse indexing never fails).
    fn index(&mut self, chunks: Vec<Chunk>) -> Result<(), EmbedError>;

    /// Returns the `top_k` most relevant chunks for `query`, ordered
    /// descending by score. Returns fewer than `top_k` if the index has
    /// fewer eligible chunks; returns an empty vec on an empty index.
    ///
    /// # Errors
    ///
    /// Returns [`EmbedError`] if embedding the query failed (dense and
    /// hybrid engines only; sparse search never fails).
    fn search(&self, query: &str, top_k: usize) -> Result<Vec<ScoredChunk>, EmbedError>;

    /// Number of chunks currently indexed.
    fn len(&self) -> usize;

    /// `true` if no chunks are indexed.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
