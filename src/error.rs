//! Error taxonomy for rag-rs.
//!
//! Three layers, thiserror-derived throughout: [`AgentError`] (LLM provider
//! and prompt-parsing failures), [`StorageError`] (corpus and index
//! persistence failures), and the top-level [`Error`] that every public
//! operation returns, matching the error kinds documented for callers.

use std::path::PathBuf;

/// Errors from the LLM provider layer and structured-output parsing.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// No API key was configured.
    #[error("API key missing: set RAG_API_KEY or OPENAI_API_KEY")]
    ApiKeyMissing,

    /// The configured provider name does not match any known adapter.
    #[error("unsupported provider: {name}")]
    UnsupportedProvider {
        /// The unrecognized provider name.
        name: String,
    },

    /// The provider returned a model name this crate cannot route.
    #[error("unrecognized model prefix: {model}")]
    UnrecognizedModel {
        /// The model string that did not match any known provider prefix.
        model: String,
    },

    /// A request to the provider failed. `status` carries the HTTP status
    /// when the transport exposed one.
    #[error("provider request failed: {message}")]
    ApiRequest {
        /// Human-readable failure description.
        message: String,
        /// HTTP status code, when available.
        status: Option<u16>,
    },

    /// A streaming response failed mid-stream.
    #[error("stream error: {message}")]
    Stream {
        /// Human-readable failure description.
        message: String,
    },

    /// The model's response could not be coerced into the expected JSON
    /// contract after the one permitted retry.
    #[error("failed to parse model response: {message} (content preview: {content})")]
    ResponseParse {
        /// Human-readable failure description.
        message: String,
        /// Truncated preview of the raw content that failed to parse.
        content: String,
    },
}

impl AgentError {
    /// Returns `true` if this error is recoverable by retrying the request
    /// (maps to the `ProviderTransient` taxonomy entry).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::ApiRequest { status, .. } => matches!(status, Some(429) | Some(500..=599) | None),
            Self::Stream { .. } => true,
            _ => false,
        }
    }
}

/// Errors from the corpus and index-persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Underlying `SQLite` failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A persisted index's `.idx` binary and `.json` sidecar disagree, or
    /// either is unreadable / has an unsupported format version.
    #[error("corrupt index state at {path}: {reason}")]
    StateCorrupt {
        /// Path to the offending file.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// No persisted state exists for the requested (user, variant) pair.
    #[error("no index state for user {username:?}, variant {variant}")]
    NotFound {
        /// The username that was looked up.
        username: String,
        /// The variant key (method/model) that was looked up.
        variant: String,
    },
}

/// Errors from the embedding layer (the `Embedder` trait and its
/// implementations).
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// The embedding provider (model runtime, remote call, etc.) failed.
    #[error("embedding provider failed: {message}")]
    Provider {
        /// Human-readable failure description.
        message: String,
    },

    /// The provider returned vectors of inconsistent dimensionality within
    /// a single batch.
    #[error("inconsistent embedding dimensionality: expected {expected}, got {got} at position {index}")]
    DimensionMismatch {
        /// Dimensionality of the first vector in the batch.
        expected: usize,
        /// Dimensionality of the vector that diverged.
        got: usize,
        /// Index of the diverging vector within the batch.
        index: usize,
    },
}

/// Errors from [`crate::search::iterative::IterativeEngine::retrieve`],
/// which can fail either because the judge/rewrite LLM round-trip failed or
/// because re-embedding the rewritten query failed.
#[derive(Debug, thiserror::Error)]
pub enum IterativeError {
    /// The LLM adapter (sufficiency judge or query rewrite) failed.
    #[error(transparent)]
    Agent(#[from] AgentError),

    /// Re-embedding the (rewritten) query failed.
    #[error(transparent)]
    Embed(#[from] EmbedError),
}

impl From<IterativeError> for Error {
    fn from(e: IterativeError) -> Self {
        match e {
            IterativeError::Agent(e) => Self::ProviderFatal(e),
            IterativeError::Embed(e) => Self::Embedding(e),
        }
    }
}

/// Top-level error type returned by every public rag-rs operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The caller's request was malformed (empty query, invalid username).
    #[error("invalid input: {0}")]
    InputError(String),

    /// The requested (method, model) variant, document, or job does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The pipeline for this user/variant has not been initialized yet.
    #[error("pipeline not initialized for user {username:?}, variant {variant}")]
    NotReady {
        /// The username that was looked up.
        username: String,
        /// The variant key (method/model) that was looked up.
        variant: String,
    },

    /// A retrieval engine had no chunks available to search.
    #[error("corpus empty: {0}")]
    CorpusEmpty(String),

    /// A background job exceeded its deadline.
    #[error("job {job_id} timed out after {elapsed_secs}s")]
    JobTimeout {
        /// The job identifier.
        job_id: String,
        /// How long the job ran before being marked timed out.
        elapsed_secs: u64,
    },

    /// An unrecoverable provider failure (bad key, non-retryable 4xx).
    #[error(transparent)]
    ProviderFatal(#[from] AgentError),

    /// A storage-layer failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// An embedding-layer failure (provider failed, or returned
    /// inconsistent dimensionality).
    #[error(transparent)]
    Embedding(#[from] EmbedError),
}

impl Error {
    /// Short machine-readable kind string for the external error envelope
    /// (`{"error": {"kind": ..., "message": ...}}`).
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InputError(_) => "input_error",
            Self::NotFound(_) => "not_found",
            Self::NotReady { .. } => "not_ready",
            Self::CorpusEmpty(_) => "corpus_empty",
            Self::JobTimeout { .. } => "job_timeout",
            Self::ProviderFatal(e) if e.is_transient() => "provider_transient",
            Self::ProviderFatal(_) => "provider_fatal",
            Self::Storage(StorageError::StateCorrupt { .. }) => "state_corrupt",
            Self::Storage(_) => "storage_error",
            Self::Embedding(_) => "embedding_error",
        }
    }
}

/// Errors surfaced at the CLI boundary, wrapping the richer internal
/// taxonomy behind `anyhow`-friendly context.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// A command failed to execute; message carries user-facing context.
    #[error("{0}")]
    ExecutionFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let timeout = AgentError::ApiRequest {
            message: "timed out".to_string(),
            status: None,
        };
        assert!(timeout.is_transient());

        let rate_limited = AgentError::ApiRequest {
            message: "rate limited".to_string(),
            status: Some(429),
        };
        assert!(rate_limited.is_transient());

        let bad_key = AgentError::ApiRequest {
            message: "unauthorized".to_string(),
            status: Some(401),
        };
        assert!(!bad_key.is_transient());

        assert!(!AgentError::ApiKeyMissing.is_transient());
    }

    #[test]
    fn test_error_kind_strings() {
        assert_eq!(Error::InputError("x".to_string()).kind(), "input_error");
        assert_eq!(Error::NotFound("x".to_string()).kind(), "not_found");
        assert_eq!(Error::CorpusEmpty("x".to_string()).kind(), "corpus_empty");
        assert_eq!(
            Error::NotReady {
                username: "alice".to_string(),
                variant: "hybrid/gpt-4o-mini".to_string()
            }
            .kind(),
            "not_ready"
        );
    }
}
