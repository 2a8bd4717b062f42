//! Hybrid retrieval: fuses [`super::SparseEngine`] and [`super::DenseEngine`]
//! results by Reciprocal Rank Fusion (RRF).
//!
//! Grounded in the donor Python's `HybridRAG._reciprocal_rank_fusion`: each
//! child engine is queried for `child_top_k` results, then every chunk is
//! scored by `sum(1 / (rrf_k + rank))` over the lists it appears in (`rank`
//! is 1-based), and the fused list is truncated to `top_k`. The two child
//! searches run concurrently via `rayon::join` — both are CPU-bound
//! (tokenize+score, embed+cosine-scan), so a thread-pool fork/join is the
//! right tool rather than an async runtime hop.

use std::collections::HashMap;

use crate::core::Chunk;
use crate::error::EmbedError;

use super::{DenseEngine, RetrievalEngine, ScoredChunk, SparseEngine};

/// Reciprocal Rank Fusion constant. Higher values flatten the influence of
/// rank differences near the top of each list.
const DEFAULT_RRF_K: f32 = 60.0;

/// Composes a [`SparseEngine`] and a [`DenseEngine`], fusing their ranked
/// results by RRF rather than by raw score (BM25 and cosine scores are not
/// on comparable scales).
pub struct HybridEngine {
    sparse: SparseEngine,
    dense: DenseEngine,
    rrf_k: f32,
}

impl HybridEngine {
    /// Creates a hybrid engine from already-constructed child engines, using
    /// the default RRF constant (60).
    #[must_use]
    pub fn new(sparse: SparseEngine, dense: DenseEngine) -> Self {
        Self::with_rrf_k(sparse, dense, DEFAULT_RRF_K)
    }

    /// Creates a hybrid engine with an explicit RRF constant.
    #[must_use]
    pub const fn with_rrf_k(sparse: SparseEngine, dense: DenseEngine, rrf_k: f32) -> Self {
        Self { sparse, dense, rrf_k }
    }

    fn fuse(&self, sparse_hits: &[ScoredChunk], dense_hits: &[ScoredChunk], top_k: usize) -> Vec<ScoredChunk> {
        // Preserves first-appearance order across the two lists (sparse
        // first) so ties break by that order, matching the spec's tie rule.
        //
        // Keyed on (buffer_id, index) rather than `Chunk::id`: chunks reach
        // this engine before persistence ever assigns an id, so every hit
        // would otherwise share the same `None` key and collapse into one
        // fused entry.
        let mut order: Vec<Chunk> = Vec::new();
        let mut seen: HashMap<(i64, usize), usize> = HashMap::new();
        let mut scores: Vec<f32> = Vec::new();

        for (rank, hit) in sparse_hits.iter().enumerate() {
            let key = (hit.chunk.buffer_id, hit.chunk.index);
            let contribution = 1.0 / (self.rrf_k + (rank + 1) as f32);
            match seen.get(&key) {
                Some(&idx) => scores[idx] += contribution,
                None => {
                    seen.insert(key, order.len());
                    order.push(hit.chunk.clone());
                    scores.push(contribution);
                }
            }
        }
        for (rank, hit) in dense_hits.iter().enumerate() {
            let key = (hit.chunk.buffer_id, hit.chunk.index);
            let contribution = 1.0 / (self.rrf_k + (rank + 1) as f32);
            match seen.get(&key) {
                Some(&idx) => scores[idx] += contribution,
                None => {
                    seen.insert(key, order.len());
                    order.push(hit.chunk.clone());
                    scores.push(contribution);
                }
            }
        }

        let mut fused: Vec<ScoredChunk> = order
            .into_iter()
            .zip(scores)
            .map(|(chunk, score)| ScoredChunk { chunk, score })
            .collect();

        // Stable sort: ties keep the first-appearance order built above.
        fused.sort_by(|a, b| b.score.total_cmp(&a.score));
        fused.truncate(top_k);
        fused
    }
}

impl RetrievalEngine for HybridEngine {
    fn index(&mut self, chunks: Vec<Chunk>) -> Result<(), EmbedError> {
        self.sparse.index(chunks.clone())?;
        self.dense.index(chunks)?;
        Ok(())
    }

    fn search(&self, query: &str, top_k: usize) -> Result<Vec<ScoredChunk>, EmbedError> {
        if self.sparse.is_empty() && self.dense.is_empty() {
            return Ok(Vec::new());
        }
        let child_top_k = top_k.max(top_k * 2);
        let (sparse_hits, dense_hits) = rayon::join(
            || self.sparse.search(query, child_top_k),
            || self.dense.search(query, child_top_k),
        );
        let sparse_hits = sparse_hits?;
        let dense_hits = dense_hits?;
        Ok(self.fuse(&sparse_hits, &dense_hits, top_k))
    }

    fn len(&self) -> usize {
        self.sparse.len().max(self.dense.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::hash::HashEmbedder;
    use std::sync::Arc;

    fn chunk(id: i64, text: &str) -> Chunk {
        Chunk::new(id, 0, (0, text.len()), text)
    }

    fn engine() -> HybridEngine {
        HybridEngine::new(SparseEngine::new(), DenseEngine::new(Arc::new(HashEmbedder::new())))
    }

    #[test]
    fn test_empty_children_produce_no_panic() {
        let engine = engine();
        assert!(engine.search("anything", 5).unwrap_or_else(|e| panic!("{e}")).is_empty());
    }

    #[test]
    fn test_fused_score_beats_single_list_contribution() {
        let mut engine = engine();
        engine
            .index(vec![chunk(1, "apple banana"), chunk(2, "banana cherry")])
            .unwrap_or_else(|e| panic!("{e}"));
        let results = engine.search("banana", 2).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(results.len(), 2);
        // A chunk appearing in both child lists scores strictly higher than
        // either list's lone contribution (1 / (60 + rank)).
        let solo_contribution = 1.0 / (DEFAULT_RRF_K + 1.0);
        assert!(results[0].score > solo_contribution);
    }

    #[test]
    fn test_top_k_truncates_fused_results() {
        let mut engine = engine();
        engine
            .index(vec![
                chunk(1, "rust programming"),
                chunk(2, "rust tutorial"),
                chunk(3, "rust guide"),
            ])
            .unwrap_or_else(|e| panic!("{e}"));
        let results = engine.search("rust", 2).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_one_empty_child_still_returns_other_childs_hits() {
        // Sparse has no match for a query of pure stopwords/unknown tokens,
        // dense (hash embedder) still returns something for any nonempty
        // corpus — fusion must not panic when one list is empty.
        let mut engine = engine();
        engine
            .index(vec![chunk(1, "xyzzy plugh"), chunk(2, "foo bar baz")])
            .unwrap_or_else(|e| panic!("{e}"));
        let results = engine.search("the", 5).unwrap_or_else(|e| panic!("{e}"));
        // sparse returns nothing (stopword-only query); dense still ranks.
        assert!(!results.is_empty());
    }

    #[test]
    fn test_distinct_chunks_are_not_collapsed_by_fusion() {
        // Regression test: before the (buffer_id, index) dedup key, every
        // chunk's unset `id` field collapsed all hits into one fused entry.
        let mut engine = engine();
        engine
            .index(vec![
                chunk(1, "rust programming language"),
                chunk(2, "python programming language"),
                chunk(3, "go programming language"),
            ])
            .unwrap_or_else(|e| panic!("{e}"));
        let results = engine.search("programming language", 5).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(results.len(), 3);
        let distinct_ids: std::collections::HashSet<i64> =
            results.iter().map(|r| r.chunk.buffer_id).collect();
        assert_eq!(distinct_ids.len(), 3);
    }
}
