//! Retrieval method identity and the static Variant Table Registry eagerly
//! instantiates one [`super::Pipeline`] per entry of.

use serde::{Deserialize, Serialize};

/// One of the five retrieval strategies a [`super::Pipeline`] can wrap.
///
/// `Reranking` is a supplemental fifth method (see crate-level docs): it
/// runs `Hybrid` retrieval, then asks the LLM adapter to re-score the
/// candidates before synthesis, rather than introducing a new engine type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// BM25 lexical retrieval.
    Sparse,
    /// Embedding + cosine retrieval.
    Dense,
    /// Sparse + Dense fused by Reciprocal Rank Fusion.
    Hybrid,
    /// Dense retrieval wrapped in a judged reformulation loop.
    Iterative,
    /// Hybrid retrieval followed by an LLM re-scoring pass.
    Reranking,
}

impl Method {
    /// Lowercase name used in index file naming and DB records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sparse => "sparse",
            Self::Dense => "dense",
            Self::Hybrid => "hybrid",
            Self::Iterative => "iterative",
            Self::Reranking => "reranking",
        }
    }

    /// `true` if this method needs an embedder to build its index (every
    /// method but `Sparse`).
    #[must_use]
    pub const fn needs_embeddings(self) -> bool {
        !matches!(self, Self::Sparse)
    }

    /// `true` if query optimization is worthwhile for this method (default
    /// on for everything but `Sparse`, where keyword rewriting adds little
    /// over BM25's own tokenization).
    #[must_use]
    pub const fn default_optimize_query(self) -> bool {
        !matches!(self, Self::Sparse)
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Models covered by the Variant Table, one entry per LLM-provider family
/// routed by [`crate::agent::client::create_provider`].
pub const VARIANT_MODELS: &[&str] = &["gpt-4o-mini", "gemini-2.5-flash", "claude-3.5-sonnet"];

const VARIANT_METHODS: &[Method] =
    &[Method::Sparse, Method::Dense, Method::Hybrid, Method::Iterative, Method::Reranking];

/// The full (method, model) cross product the Registry eagerly constructs
/// a Pipeline for. 5 methods x 3 models = 15 variants.
#[must_use]
pub fn variant_table() -> Vec<(Method, &'static str)> {
    let mut variants = Vec::with_capacity(VARIANT_METHODS.len() * VARIANT_MODELS.len());
    for &method in VARIANT_METHODS {
        for &model in VARIANT_MODELS {
            variants.push((method, model));
        }
    }
    variants
}

/// The `method/model` string used as a variant's external identity (error
/// messages, DB keys, CLI output).
#[must_use]
pub fn variant_key(method: Method, model: &str) -> String {
    format!("{method}/{model}")
}
