//! Dense (embedding + cosine similarity) retrieval.
//!
//! Grounded in the donor Python's `DenseRAG`: embed every chunk once at
//! index time, embed the query at search time, rank by cosine similarity.
//! The donor used OpenAI's embeddings API and `sklearn`'s pairwise cosine;
//! here the embedding call goes through [`crate::embedding::Embedder`] so
//! the same engine works with either the local `fastembed` model or the
//! hash-based fallback.

use std::sync::Arc;

use crate::core::Chunk;
use crate::embedding::{Embedder, cosine_similarity};
use crate::error::EmbedError;

use super::{RetrievalEngine, ScoredChunk};

/// In-memory brute-force cosine-similarity index.
pub struct DenseEngine {
    embedder: Arc<dyn Embedder>,
    chunks: Vec<Chunk>,
    vectors: Vec<Vec<f32>>,
}

impl DenseEngine {
    /// Creates an empty engine backed by `embedder`.
    #[must_use]
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            chunks: Vec::new(),
            vectors: Vec::new(),
        }
    }

    /// The embedder backing this engine, for sidecar-format bookkeeping
    /// (storage layer records its name so reloads can detect a mismatch).
    #[must_use]
    pub fn embedder_name(&self) -> &'static str {
        self.embedder.name()
    }
}

impl RetrievalEngine for DenseEngine {
    fn index(&mut self, chunks: Vec<Chunk>) -> Result<(), EmbedError> {
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        self.vectors = self.embedder.embed_batch(&texts)?;
        self.chunks = chunks;
        Ok(())
    }

    fn search(&self, query: &str, top_k: usize) -> Result<Vec<ScoredChunk>, EmbedError> {
        if self.chunks.is_empty() {
            return Ok(Vec::new());
        }
        let query_vec = self.embedder.embed(query)?;

        let mut scored: Vec<ScoredChunk> = self
            .chunks
            .iter()
            .zip(self.vectors.iter())
            .map(|(chunk, vector)| ScoredChunk {
                chunk: chunk.clone(),
                score: cosine_similarity(&query_vec, vector),
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(top_k);
        Ok(scored)
    }

    fn len(&self) -> usize {
        self.chunks.len()
    }
}
