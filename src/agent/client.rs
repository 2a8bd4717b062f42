//! Model-name-prefix routing to a concrete [`LlmProvider`].
//!
//! Mirrors the donor Python's `BasePipeline._initialize_llm`: a model
//! string's prefix picks the provider, not an explicit provider field.
//! `gpt-`/`text-` models go straight to OpenAI; `gemini-` and `claude-`
//! models are routed to the same OpenAI-compatible-gateway transport with a
//! different base URL and API key, since this crate has no first-party
//! Gemini/Claude SDK dependency (an OpenRouter-style gateway speaks the
//! OpenAI chat-completion wire format for both).

use crate::agent::config::RagConfig;
use crate::agent::provider::LlmProvider;
use crate::agent::providers::OpenAiProvider;
use crate::error::AgentError;

/// Default base URL for the Gemini/Claude OpenAI-compatible gateway.
/// Overridden by `config.base_url` when the caller points at a self-hosted
/// or regional gateway instead.
const DEFAULT_GATEWAY_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Creates an [`LlmProvider`] for `model`, selected by its prefix.
///
/// # Errors
///
/// Returns [`AgentError::UnrecognizedModel`] if `model` matches none of the
/// known prefixes (`gpt-`, `text-`, `gemini-`, `claude-`).
pub fn create_provider(config: &RagConfig, model: &str) -> Result<Box<dyn LlmProvider>, AgentError> {
    if model.starts_with("gpt-") || model.starts_with("text-") {
        return Ok(Box::new(OpenAiProvider::new(config)));
    }
    if model.starts_with("gemini-") {
        return Ok(Box::new(OpenAiProvider::gateway(
            &config.api_key,
            config.base_url.as_deref().unwrap_or(DEFAULT_GATEWAY_BASE_URL),
            config.timeout,
            "gemini",
        )));
    }
    if model.starts_with("claude-") {
        return Ok(Box::new(OpenAiProvider::gateway(
            &config.api_key,
            config.base_url.as_deref().unwrap_or(DEFAULT_GATEWAY_BASE_URL),
            config.timeout,
            "claude",
        )));
    }
    Err(AgentError::UnrecognizedModel {
        model: model.to_string(),
    })
}
