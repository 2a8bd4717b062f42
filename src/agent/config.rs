//! Runtime configuration with builder pattern and environment variable support.
//!
//! Configuration is resolved in order: explicit values → environment variables → defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::AgentError;

/// Default maximum concurrent API requests (and concurrent Pipeline variants
/// in flight during a batch query).
const DEFAULT_MAX_CONCURRENCY: usize = 16;
/// Default maximum chunks retrieved from the search layer before generation.
const DEFAULT_SEARCH_TOP_K: usize = 8;
/// Default maximum response tokens.
const DEFAULT_MAX_TOKENS: u32 = 2048;
/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 60;
/// Default max retries for `ProviderTransient` errors.
const DEFAULT_MAX_RETRIES: u32 = 2;
/// Default maximum reformulation rounds for `IterativeEngine`.
const DEFAULT_MAX_ITERATIONS: usize = 3;
/// Default subdirectory under the current directory for persisted indexes.
const DEFAULT_INDEX_ROOT: &str = "rag-index";

/// Configuration for the retrieval/generation runtime.
#[derive(Debug, Clone)]
pub struct RagConfig {
    /// LLM provider name: `"openai"`, `"gemini"`, or `"claude"`.
    pub provider: String,
    /// API key for the provider.
    pub api_key: String,
    /// Optional base URL override (for proxies or OpenAI-compatible gateways).
    pub base_url: Option<String>,
    /// Default model used when a Variant Table entry does not specify one.
    pub default_model: String,
    /// Maximum concurrent API requests / in-flight pipeline variants.
    pub max_concurrency: usize,
    /// Maximum chunks retrieved from the search layer per query.
    pub search_top_k: usize,
    /// Maximum response tokens per LLM call.
    pub max_tokens: u32,
    /// Request timeout.
    pub timeout: Duration,
    /// Maximum retry attempts for `ProviderTransient` failures.
    pub max_retries: u32,
    /// Maximum `IterativeEngine` reformulation rounds.
    pub max_iterations: usize,
    /// Root directory for persisted per-variant indexes.
    pub index_root: PathBuf,
    /// Minimum delay between API requests per task.
    ///
    /// Applied after acquiring the concurrency semaphore permit. Set to
    /// `Duration::ZERO` (default) to disable rate limiting beyond what the
    /// concurrency semaphore provides.
    pub request_delay: Duration,
}

impl RagConfig {
    /// Creates a new builder for `RagConfig`.
    #[must_use]
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key is found.
    pub fn from_env() -> Result<Self, AgentError> {
        Self::builder().from_env().build()
    }
}

/// Builder for [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    provider: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    default_model: Option<String>,
    max_concurrency: Option<usize>,
    search_top_k: Option<usize>,
    max_tokens: Option<u32>,
    timeout: Option<Duration>,
    max_retries: Option<u32>,
    max_iterations: Option<usize>,
    index_root: Option<PathBuf>,
    request_delay: Option<Duration>,
}

impl RagConfigBuilder {
    /// Populates unset fields from environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.provider.is_none() {
            self.provider = std::env::var("RAG_PROVIDER").ok();
        }
        if self.api_key.is_none() {
            self.api_key = std::env::var("RAG_API_KEY")
                .or_else(|_| std::env::var("OPENAI_API_KEY"))
                .ok();
        }
        if self.base_url.is_none() {
            self.base_url = std::env::var("RAG_BASE_URL").ok();
        }
        if self.default_model.is_none() {
            self.default_model = std::env::var("RAG_DEFAULT_MODEL").ok();
        }
        if self.max_concurrency.is_none() {
            self.max_concurrency = std::env::var("RAG_MAX_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok());
        }
        if self.search_top_k.is_none() {
            self.search_top_k = std::env::var("RAG_SEARCH_TOP_K")
                .ok()
                .and_then(|v| v.parse().ok());
        }
        if self.index_root.is_none() {
            self.index_root = std::env::var("RAG_INDEX_ROOT").ok().map(PathBuf::from);
        }
        self
    }

    /// Sets the LLM provider name.
    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the base URL override.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the default model.
    #[must_use]
    pub fn default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    /// Sets the maximum concurrency.
    #[must_use]
    pub const fn max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = Some(n);
        self
    }

    /// Sets the search top-k.
    #[must_use]
    pub const fn search_top_k(mut self, n: usize) -> Self {
        self.search_top_k = Some(n);
        self
    }

    /// Sets the max response tokens.
    #[must_use]
    pub const fn max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = Some(n);
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Sets the max retries.
    #[must_use]
    pub const fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    /// Sets the maximum `IterativeEngine` reformulation rounds.
    #[must_use]
    pub const fn max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = Some(n);
        self
    }

    /// Sets the index root directory.
    #[must_use]
    pub fn index_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.index_root = Some(dir.into());
        self
    }

    /// Sets the minimum delay between API requests per task.
    #[must_use]
    pub const fn request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = Some(delay);
        self
    }

    /// Builds the [`RagConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key was set.
    pub fn build(self) -> Result<RagConfig, AgentError> {
        let api_key = self.api_key.ok_or(AgentError::ApiKeyMissing)?;

        Ok(RagConfig {
            provider: self.provider.unwrap_or_else(|| "openai".to_string()),
            api_key,
            base_url: self.base_url,
            default_model: self
                .default_model
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            max_concurrency: self.max_concurrency.unwrap_or(DEFAULT_MAX_CONCURRENCY),
            search_top_k: self.search_top_k.unwrap_or(DEFAULT_SEARCH_TOP_K),
            max_tokens: self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            timeout: self
                .timeout
                .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            max_iterations: self.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS),
            index_root: self
                .index_root
                .unwrap_or_else(|| PathBuf::from(DEFAULT_INDEX_ROOT)),
            request_delay: self.request_delay.unwrap_or(Duration::ZERO),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = RagConfig::builder()
            .api_key("test-key")
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.provider, "openai");
        assert_eq!(config.api_key, "test-key");
        assert_eq!(config.max_concurrency, DEFAULT_MAX_CONCURRENCY);
        assert_eq!(config.search_top_k, DEFAULT_SEARCH_TOP_K);
        assert_eq!(config.default_model, "gpt-4o-mini");
    }

    #[test]
    fn test_builder_missing_api_key() {
        let result = RagConfig::builder().build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_custom_values() {
        let config = RagConfig::builder()
            .api_key("key")
            .provider("gemini")
            .default_model("gemini-2.0-flash")
            .max_concurrency(4)
            .search_top_k(20)
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.provider, "gemini");
        assert_eq!(config.default_model, "gemini-2.0-flash");
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.search_top_k, 20);
        assert_eq!(config.timeout, Duration::from_secs(15));
    }
}
