//! [`LlmAdapter`]: the uniform text-in/text-out contract every retrieval
//! pipeline talks to, regardless of which provider `model` routes to.
//!
//! Three prompt modes from spec: `rag_generate`, `prompt_generate`,
//! `vote_generate`. Two more are specific to [`crate::search::IterativeEngine`]'s
//! judged reformulation loop: `judge_sufficient` and `rewrite_query`. All
//! five share one retry policy (`ProviderTransient` errors retried up to
//! `max_retries` times with exponential backoff) and, for the JSON-shaped
//! modes, one parse-coercion policy (one retry with a corrective system
//! reminder, then a typed parse error — never a silently fabricated
//! result).

use std::time::Duration;

use serde::Deserialize;

use crate::agent::message::{ChatRequest, system_message, user_message};
use crate::agent::prompt::{
    PromptSet, build_judge_prompt, build_query_optimize_prompt, build_rag_prompt,
    build_rewrite_prompt, build_vote_prompt,
};
use crate::agent::provider::LlmProvider;
use crate::error::AgentError;

/// A judged grounding decision: does a retrieved chunk support a candidate
/// response's claims?
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct VoteDecision {
    /// `"yes"` or `"no"`.
    pub decision: VoteVerdict,
    /// One-sentence rationale.
    pub justification: String,
}

impl VoteDecision {
    /// `true` when the vote is `"yes"`.
    #[must_use]
    pub const fn is_yes(&self) -> bool {
        matches!(self.decision, VoteVerdict::Yes)
    }
}

/// The two possible outcomes of a [`VoteDecision`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteVerdict {
    /// The chunk supports the response.
    Yes,
    /// The chunk does not support the response.
    No,
}

#[derive(Debug, Deserialize)]
struct Sufficiency {
    sufficient: bool,
}

/// Uniform LLM call surface used by every [`crate::pipeline::Pipeline`].
///
/// Wraps one concrete [`LlmProvider`] (selected by model-name prefix in
/// [`crate::agent::client::create_provider`]) with the prompt templates and
/// retry policy every call shares.
pub struct LlmAdapter {
    provider: Box<dyn LlmProvider>,
    model: String,
    prompts: PromptSet,
    max_tokens: u32,
    max_retries: u32,
}

impl LlmAdapter {
    /// Creates a new adapter for `model`, using `provider` as the
    /// underlying transport.
    #[must_use]
    pub fn new(provider: Box<dyn LlmProvider>, model: impl Into<String>, prompts: PromptSet, max_tokens: u32, max_retries: u32) -> Self {
        Self {
            provider,
            model: model.into(),
            prompts,
            max_tokens,
            max_retries,
        }
    }

    /// The model identifier this adapter was constructed for.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// The provider name backing this adapter (`"openai"`, `"gemini"`,
    /// `"claude"`).
    #[must_use]
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Answers `query` strictly from `context`, formatted as Markdown and
    /// wrapped in `<answer>` tags by the model; the tags are stripped
    /// before returning.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] if every retry attempt fails.
    pub async fn rag_generate(&self, query: &str, context: &str) -> Result<String, AgentError> {
        let request = self.build_request(&self.prompts.rag, &build_rag_prompt(query, context), false);
        let response = self.chat_with_retry(request).await?;
        Ok(strip_answer_tags(&response.content))
    }

    /// Rewrites `query` into a single-line, search-optimized form.
    ///
    /// Returns the raw model reply; sanitization (quote stripping, leading
    /// phrase stripping, the length-based fallback to the original query)
    /// is [`crate::pipeline::Pipeline`]'s job per the query-optimization
    /// contract, not the adapter's.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] if every retry attempt fails.
    pub async fn prompt_generate(&self, query: &str) -> Result<String, AgentError> {
        let request = self.build_request(
            &self.prompts.query_optimize,
            &build_query_optimize_prompt(query),
            false,
        );
        let response = self.chat_with_retry(request).await?;
        Ok(response.content)
    }

    /// Judges whether `chunk` grounds `response`'s claims for `query`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ResponseParse`] if the model's reply cannot be
    /// coerced into the `{"decision": ..., "justification": ...}` shape
    /// after one corrective retry, or [`AgentError`] if every transport
    /// retry attempt fails.
    pub async fn vote_generate(&self, query: &str, chunk: &str, response: &str) -> Result<VoteDecision, AgentError> {
        let user_msg = build_vote_prompt(query, chunk, response);
        self.request_json(&self.prompts.vote, &user_msg).await
    }

    /// Asks whether `context` suffices to answer `query`
    /// (`IterativeEngine`'s JUDGING state).
    ///
    /// A parse failure is treated by the caller as "not sufficient" per
    /// spec — this method itself still surfaces the error so the caller
    /// can decide (the redesigned `IterativeEngine` treats it as an
    /// immediate `DONE` rather than an infinite retry).
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] if the JSON reply cannot be parsed after one
    /// retry, or if every transport retry attempt fails.
    pub async fn judge_sufficient(&self, query: &str, context: &str) -> Result<bool, AgentError> {
        let user_msg = build_judge_prompt(query, context);
        let parsed: Sufficiency = self.request_json(&self.prompts.judge, &user_msg).await?;
        Ok(parsed.sufficient)
    }

    /// Generates a short keyword-style follow-up query targeting what is
    /// missing from `context` (`IterativeEngine`'s REWRITING state).
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] if every retry attempt fails.
    pub async fn rewrite_query(&self, query: &str, context: &str) -> Result<String, AgentError> {
        let request = self.build_request(&self.prompts.rewrite, &build_rewrite_prompt(query, context), false);
        let response = self.chat_with_retry(request).await?;
        Ok(response.content)
    }

    fn build_request(&self, system_prompt: &str, user_msg: &str, json_mode: bool) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![system_message(system_prompt), user_message(user_msg)],
            temperature: Some(0.0),
            max_tokens: Some(self.max_tokens),
            json_mode,
        }
    }

    /// Calls the provider, retrying `ProviderTransient`-classified failures
    /// up to `self.max_retries` times with exponential backoff
    /// (`100ms * 2^attempt`). `ProviderFatal` failures surface immediately.
    async fn chat_with_retry(&self, request: ChatRequest) -> Result<crate::agent::message::ChatResponse, AgentError> {
        let mut attempt = 0u32;
        loop {
            match self.provider.chat(&request).await {
                Ok(response) => return Ok(response),
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    tokio::time::sleep(Duration::from_millis(100 * 2u64.pow(attempt))).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Requests a JSON-mode completion and deserializes it into `T`. On a
    /// parse failure, retries once with a corrective system message before
    /// giving up with [`AgentError::ResponseParse`].
    async fn request_json<T: for<'de> Deserialize<'de>>(
        &self,
        system_prompt: &str,
        user_msg: &str,
    ) -> Result<T, AgentError> {
        let request = self.build_request(system_prompt, user_msg, true);
        let response = self.chat_with_retry(request.clone()).await?;

        if let Some(parsed) = try_parse_json(&response.content) {
            return Ok(parsed);
        }

        let corrective_system = format!(
            "{system_prompt}\n\nYour previous reply was not valid JSON matching the required shape. Return ONLY the JSON object, nothing else."
        );
        let retry_request = self.build_request(&corrective_system, user_msg, true);
        let retry_response = self.chat_with_retry(retry_request).await?;

        try_parse_json(&retry_response.content).ok_or_else(|| AgentError::ResponseParse {
            message: "model reply did not match the expected JSON shape after one retry".to_string(),
            content: preview(&retry_response.content),
        })
    }
}

/// Parses `content` as JSON into `T`, tolerating a response wrapped in a
/// ```json fenced code block (a common model habit even in JSON mode).
fn try_parse_json<T: for<'de> Deserialize<'de>>(content: &str) -> Option<T> {
    let trimmed = content.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|s| s.strip_suffix("```").unwrap_or(s))
        .unwrap_or(trimmed);
    serde_json::from_str(unfenced.trim()).ok()
}

/// Strips a leading/trailing `<answer>`/`</answer>` wrapper, tolerating
/// models that omit it despite being asked for it.
fn strip_answer_tags(content: &str) -> String {
    let trimmed = content.trim();
    trimmed
        .strip_prefix("<answer>")
        .map(str::trim_start)
        .and_then(|s| s.strip_suffix("</answer>"))
        .map_or_else(|| trimmed.to_string(), |s| s.trim_end().to_string())
}

/// Truncated preview of model content for error messages, so a bad reply
/// never floods logs/CLI output with arbitrarily long text.
fn preview(content: &str) -> String {
    const MAX: usize = 200;
    if content.chars().count() <= MAX {
        content.to_string()
    } else {
        let truncated: String = content.chars().take(MAX).collect();
        format!("{truncated}…")
    }
}
