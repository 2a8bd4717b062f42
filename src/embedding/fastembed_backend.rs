//! Local ONNX embedding via `fastembed` (`BGE-M3`, 1024 dimensions).
//!
//! Gated behind the `fastembed-embeddings` feature (on by default). Model
//! weights are downloaded once to the `fastembed` cache directory on first
//! use and reused afterward.

use std::sync::Mutex;

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use super::Embedder;
use crate::error::EmbedError;

/// Wraps a loaded `fastembed` `TextEmbedding` model.
///
/// `TextEmbedding::embed` takes `&mut self`, so access is serialized behind
/// a `Mutex`; batches should be embedded together rather than one call per
/// chunk to amortize that lock.
pub struct FastEmbedder {
    model: Mutex<TextEmbedding>,
}

impl FastEmbedder {
    /// Loads the `BGE-M3` model, downloading it on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot be downloaded or initialized
    /// (e.g. no network access and no cached weights).
    pub fn try_new() -> Result<Self, fastembed::Error> {
        let model = TextEmbedding::try_new(
            InitOptions::new(EmbeddingModel::BGEM3).with_show_download_progress(false),
        )?;
        Ok(Self { model: Mutex::new(model) })
    }
}

impl Embedder for FastEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.embed_batch(std::slice::from_ref(&text.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::Provider { message: "fastembed returned no vectors for one input".to_string() })
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut model = match self.model.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let batch: Vec<&str> = texts.iter().map(String::as_str).collect();
        let vectors = model
            .embed(batch, None)
            .map_err(|err| EmbedError::Provider { message: err.to_string() })?;

        if let Some(first) = vectors.first() {
            let expected = first.len();
            for (index, vector) in vectors.iter().enumerate() {
                if vector.len() != expected {
                    return Err(EmbedError::DimensionMismatch { expected, got: vector.len(), index });
                }
            }
        }

        Ok(vectors)
    }

    fn name(&self) -> &'static str {
        "fastembed-bge-m3"
    }
}
