//! BM25 sparse retrieval.
//!
//! Classic Robertson/Sparck-Jones BM25 with the conventional `k1 = 1.2`,
//! `b = 0.75` defaults (the donor Python used `k1 = 0.8`, `b = 0.5`, tuned
//! for short code identifiers; this engine defaults to the textbook values
//! since the corpus here is prose documents, not source code).

use std::collections::HashMap;

use crate::core::Chunk;
use crate::error::EmbedError;

use super::{RetrievalEngine, ScoredChunk};

/// Term-frequency saturation parameter. Higher values let repeated terms
/// keep contributing score for longer before saturating.
const DEFAULT_K1: f32 = 1.2;
/// Length-normalization parameter. `0.0` disables length normalization,
/// `1.0` fully normalizes by document length.
const DEFAULT_B: f32 = 0.75;

/// A small fixed English stopword list, used instead of pulling in a
/// corpus-backed tokenizer dependency for something this mechanical.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "have", "he", "in",
    "is", "it", "its", "of", "on", "or", "that", "the", "their", "this", "to", "was", "were",
    "will", "with",
];

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// In-memory BM25 index over a fixed chunk corpus.
#[derive(Debug, Default)]
pub struct SparseEngine {
    k1: f32,
    b: f32,
    chunks: Vec<Chunk>,
    doc_tokens: Vec<Vec<String>>,
    doc_freq: HashMap<String, usize>,
    avg_doc_len: f32,
}

impl SparseEngine {
    /// Creates an empty engine with the classic BM25 defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::with_params(DEFAULT_K1, DEFAULT_B)
    }

    /// Creates an empty engine with explicit `k1`/`b` parameters.
    #[must_use]
    pub const fn with_params(k1: f32, b: f32) -> Self {
        Self {
            k1,
            b,
            chunks: Vec::new(),
            doc_tokens: Vec::new(),
            doc_freq: HashMap::new(),
            avg_doc_len: 0.0,
        }
    }

    fn idf(&self, term: &str) -> f32 {
        let n = self.chunks.len() as f32;
        let n_q = self.doc_freq.get(term).copied().unwrap_or(0) as f32;
        ((n - n_q + 0.5) / (n_q + 0.5) + 1.0).ln()
    }

    fn score_doc(&self, doc_index: usize, query_terms: &[String]) -> f32 {
        let tokens = &self.doc_tokens[doc_index];
        let doc_len = tokens.len() as f32;
        let mut term_freq: HashMap<&str, usize> = HashMap::new();
        for t in tokens {
            *term_freq.entry(t.as_str()).or_insert(0) += 1;
        }

        query_terms
            .iter()
            .map(|term| {
                let f = term_freq.get(term.as_str()).copied().unwrap_or(0) as f32;
                if f == 0.0 {
                    return 0.0;
                }
                let idf = self.idf(term);
                let numerator = f * (self.k1 + 1.0);
                let denominator =
                    f + self.k1 * (1.0 - self.b + self.b * doc_len / self.avg_doc_len.max(1.0));
                idf * numerator / denominator
            })
            .sum()
    }
}

impl RetrievalEngine for SparseEngine {
    fn index(&mut self, chunks: Vec<Chunk>) -> Result<(), EmbedError> {
        self.doc_tokens = chunks.iter().map(|c| tokenize(&c.content)).collect();
        self.doc_freq.clear();
        for tokens in &self.doc_tokens {
            let unique: std::collections::HashSet<&String> = tokens.iter().collect();
            for term in unique {
                *self.doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
        }
        self.avg_doc_len = if self.doc_tokens.is_empty() {
            0.0
        } else {
            self.doc_tokens.iter().map(|t| t.len() as f32).sum::<f32>() / self.doc_tokens.len() as f32
        };
        self.chunks = chunks;
        Ok(())
    }

    fn search(&self, query: &str, top_k: usize) -> Result<Vec<ScoredChunk>, EmbedError> {
        if self.chunks.is_empty() {
            return Ok(Vec::new());
        }
        let query_terms = tokenize(query);
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<ScoredChunk> = self
            .chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| ScoredChunk {
                chunk: chunk.clone(),
                score: self.score_doc(i, &query_terms),
            })
            .filter(|sc| sc.score > 0.0)
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(top_k);
        Ok(scored)
    }

    fn len(&self) -> usize {
        self.chunks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: i64, text: &str) -> Chunk {
        Chunk::new(id, 0, (0, text.len()), text)
    }

    #[test]
    fn test_empty_index_returns_no_results() {
        let engine = SparseEngine::new();
        assert!(engine.search("anything", 5).unwrap_or_else(|e| panic!("{e}")).is_empty());
    }

    #[test]
    fn test_exact_term_match_ranks_above_unrelated() {
        let mut engine = SparseEngine::new();
        engine
            .index(vec![
                chunk(1, "the quick brown fox jumps over the lazy dog"),
                chunk(2, "completely unrelated text about finance and taxes"),
            ])
            .unwrap_or_else(|e| panic!("{e}"));
        let results = engine.search("fox jumps", 5).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(results[0].chunk.buffer_id, 1);
    }

    #[test]
    fn test_empty_query_returns_no_results() {
        let mut engine = SparseEngine::new();
        engine.index(vec![chunk(1, "some content here")]).unwrap_or_else(|e| panic!("{e}"));
        assert!(engine.search("", 5).unwrap_or_else(|e| panic!("{e}")).is_empty());
    }

    #[test]
    fn test_top_k_truncates_results() {
        let mut engine = SparseEngine::new();
        engine
            .index(vec![
                chunk(1, "rust programming language"),
                chunk(2, "rust programming tutorial"),
                chunk(3, "rust programming guide"),
            ])
            .unwrap_or_else(|e| panic!("{e}"));
        let results = engine.search("rust programming", 2).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_stopwords_do_not_dominate_scoring() {
        let mut engine = SparseEngine::new();
        engine.index(vec![chunk(1, "the the the the")]).unwrap_or_else(|e| panic!("{e}"));
        assert!(engine.search("the", 5).unwrap_or_else(|e| panic!("{e}")).is_empty());
    }
}
