//! Deterministic, dependency-free fallback embedder.
//!
//! Hashes overlapping word shingles into a fixed-width vector and
//! normalizes it, giving a bag-of-words-ish embedding with no model
//! download. It will never compete with a real model on recall, but it
//! keeps the dense and hybrid engines usable (and testable, with no
//! network access) when `fastembed-embeddings` is unavailable.

use std::hash::{Hash, Hasher};

use super::{EMBEDDING_DIM, Embedder};
use crate::error::EmbedError;

/// Hash-bucket embedder: each lowercased token votes, with sign, into a
/// bucket of the output vector determined by its hash.
#[derive(Debug, Default, Clone, Copy)]
pub struct HashEmbedder;

impl HashEmbedder {
    /// Creates a new hash embedder. Stateless; safe to share.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vector = vec![0.0f32; EMBEDDING_DIM];
        let tokens: Vec<&str> = text.split_whitespace().collect();
        if tokens.is_empty() {
            return Ok(vector);
        }

        for token in &tokens {
            let lower = token.to_lowercase();
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            lower.hash(&mut hasher);
            let h = hasher.finish();
            let bucket = (h % EMBEDDING_DIM as u64) as usize;
            let sign = if (h >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }

    fn name(&self) -> &'static str {
        "hash-v1"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embed_is_deterministic() {
        let e = HashEmbedder::new();
        assert_eq!(
            e.embed("hello world").unwrap_or_else(|err| panic!("{err}")),
            e.embed("hello world").unwrap_or_else(|err| panic!("{err}"))
        );
    }

    #[test]
    fn test_embed_empty_text_is_zero_vector() {
        let e = HashEmbedder::new();
        let v = e.embed("").unwrap_or_else(|err| panic!("{err}"));
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_embed_is_unit_normalized() {
        let e = HashEmbedder::new();
        let v = e
            .embed("the quick brown fox jumps over the lazy dog")
            .unwrap_or_else(|err| panic!("{err}"));
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_different_text_usually_differs() {
        let e = HashEmbedder::new();
        assert_ne!(
            e.embed("alpha beta gamma").unwrap_or_else(|err| panic!("{err}")),
            e.embed("delta epsilon zeta").unwrap_or_else(|err| panic!("{err}"))
        );
    }
}
