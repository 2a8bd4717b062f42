//! Text-to-vector embedding for the dense and hybrid retrieval engines.
//!
//! [`Embedder`] is the seam: [`fastembed_backend::FastEmbedder`] (feature
//! `fastembed-embeddings`, on by default) runs a local ONNX BGE-M3 model;
//! [`hash::HashEmbedder`] is a dependency-free deterministic fallback used
//! when the feature is disabled or the model fails to load, so the dense
//! engine always has *something* to embed with.

#[cfg(feature = "fastembed-embeddings")]
pub mod fastembed_backend;
pub mod hash;

use crate::error::EmbedError;

/// Dimensionality every embedder in this crate must produce, so dense
/// indexes built under one embedder stay comparable across a crate build
/// without a fastembed/no-fastembed mismatch silently corrupting scores.
pub const EMBEDDING_DIM: usize = 1024;

/// Produces a fixed-length vector embedding for a piece of text.
///
/// Implementations must be deterministic: embedding the same text twice
/// returns the same vector, since index persistence and cache invalidation
/// both depend on that.
pub trait Embedder: Send + Sync {
    /// Embeds a single piece of text.
    ///
    /// # Errors
    ///
    /// Returns [`EmbedError`] if the underlying provider fails. Callers
    /// must surface this rather than substitute an empty or zero vector —
    /// a silently-empty embedding would corrupt every cosine score
    /// computed against it.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    /// Embeds a batch of texts. The default implementation calls
    /// [`Embedder::embed`] per item; batching embedders override this for
    /// throughput.
    ///
    /// # Errors
    ///
    /// Returns [`EmbedError`] under the same conditions as
    /// [`Embedder::embed`].
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Short identifier persisted alongside a dense index's `.json`
    /// sidecar, so a later load can detect an embedder mismatch.
    fn name(&self) -> &'static str;
}

/// Cosine similarity between two equal-length vectors. Returns `0.0` for a
/// zero-magnitude vector rather than dividing by zero.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Builds the default embedder for the running binary: `FastEmbedder` when
/// the feature is enabled and the model loads, otherwise `HashEmbedder`.
#[must_use]
pub fn default_embedder() -> Box<dyn Embedder> {
    #[cfg(feature = "fastembed-embeddings")]
    {
        match fastembed_backend::FastEmbedder::try_new() {
            Ok(e) => return Box::new(e),
            Err(err) => {
                tracing::warn!(error = %err, "fastembed model unavailable, falling back to hash embedder");
            }
        }
    }
    Box::new(hash::HashEmbedder::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical_vectors() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal_vectors() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let a = vec![0.0, 0.0];
        let b = vec![1.0, 1.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }
}
