//! `OpenAI`-compatible provider implementation using the `async-openai` crate.
//!
//! Used directly for `gpt-`/`text-` models, and reused (with a different
//! base URL) as the transport for the Gemini and Claude adapters, which are
//! reached through an `OpenAI`-compatible gateway rather than their native
//! SDKs — see [`crate::agent::client::create_adapter`].

use std::pin::Pin;
use std::time::Duration;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestUserMessage, CreateChatCompletionRequest, ResponseFormat,
};
use async_trait::async_trait;

use crate::agent::config::RagConfig;
use crate::agent::message::{ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage};
use crate::agent::provider::LlmProvider;
use crate::error::AgentError;

/// `OpenAI`-compatible LLM provider.
///
/// Wraps the `async-openai` client for chat completions. Compatible with
/// any API that follows the `OpenAI` chat completion spec (OpenAI itself,
/// or an OpenRouter-style gateway for other model families).
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
    name: &'static str,
    timeout: Duration,
}

impl OpenAiProvider {
    /// Creates a provider talking directly to OpenAI (or `config.base_url`
    /// if set), identified as `"openai"`.
    #[must_use]
    pub fn new(config: &RagConfig) -> Self {
        Self::with_name(config, "openai")
    }

    /// Creates a provider identified as `name`, pointed at `base_url` — the
    /// shape used for the Gemini/Claude gateway adapters.
    #[must_use]
    pub fn gateway(api_key: &str, base_url: &str, timeout: Duration, name: &'static str) -> Self {
        let openai_config = OpenAIConfig::new().with_api_key(api_key).with_api_base(base_url);
        Self {
            client: Client::with_config(openai_config),
            name,
            timeout,
        }
    }

    fn with_name(config: &RagConfig, name: &'static str) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_key(&config.api_key);
        if let Some(ref base_url) = config.base_url {
            openai_config = openai_config.with_api_base(base_url);
        }
        Self {
            client: Client::with_config(openai_config),
            name,
            timeout: config.timeout,
        }
    }

    fn convert_message(msg: &ChatMessage) -> ChatCompletionRequestMessage {
        match msg.role {
            Role::System => {
                ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                    content: async_openai::types::ChatCompletionRequestSystemMessageContent::Text(
                        msg.content.clone(),
                    ),
                    name: None,
                })
            }
            Role::User => ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: async_openai::types::ChatCompletionRequestUserMessageContent::Text(
                    msg.content.clone(),
                ),
                name: None,
            }),
            Role::Assistant => {
                #[allow(deprecated)]
                ChatCompletionRequestMessage::Assistant(
                    async_openai::types::ChatCompletionRequestAssistantMessage {
                        content: Some(
                            async_openai::types::ChatCompletionRequestAssistantMessageContent::Text(
                                msg.content.clone(),
                            ),
                        ),
                        name: None,
                        tool_calls: None,
                        refusal: None,
                        audio: None,
                        function_call: None,
                    },
                )
            }
        }
    }

    fn build_request(request: &ChatRequest) -> CreateChatCompletionRequest {
        let messages: Vec<_> = request.messages.iter().map(Self::convert_message).collect();
        let response_format = request.json_mode.then_some(ResponseFormat::JsonObject);

        CreateChatCompletionRequest {
            model: request.model.clone(),
            messages,
            temperature: request.temperature.filter(|&t| t != 0.0),
            max_completion_tokens: request.max_tokens,
            response_format,
            ..Default::default()
        }
    }
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        let openai_request = Self::build_request(request);

        let call = self.client.chat().create(openai_request);
        let response = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| AgentError::ApiRequest {
                message: format!("request timed out after {:?}", self.timeout),
                status: None,
            })?
            .map_err(|e| AgentError::ApiRequest {
                message: e.to_string(),
                status: status_from_openai_error(&e),
            })?;

        let choice = response.choices.first();
        let content = choice
            .and_then(|c| c.message.content.as_ref())
            .cloned()
            .unwrap_or_default();
        let finish_reason = choice.and_then(|c| {
            c.finish_reason
                .as_ref()
                .map(|fr| format!("{fr:?}").to_lowercase())
        });
        let usage = response
            .usage
            .map_or_else(TokenUsage::default, |u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            });

        Ok(ChatResponse {
            content,
            usage,
            finish_reason,
        })
    }
}

/// `async-openai` does not expose the raw HTTP status on its error type
/// uniformly; a future transport upgrade can thread it through more
/// precisely. For now non-timeout failures are treated as status-less,
/// which [`AgentError::is_transient`] maps to "retry" (matching a sensible
/// default for unknown transport failures).
fn status_from_openai_error(_e: &async_openai::error::OpenAIError) -> Option<u16> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::message;

    #[test]
    fn test_convert_system_message() {
        let msg = message::system_message("test");
        let converted = OpenAiProvider::convert_message(&msg);
        assert!(matches!(converted, ChatCompletionRequestMessage::System(_)));
    }

    #[test]
    fn test_convert_user_message() {
        let msg = message::user_message("hello");
        let converted = OpenAiProvider::convert_message(&msg);
        assert!(matches!(converted, ChatCompletionRequestMessage::User(_)));
    }

    #[test]
    fn test_build_request_json_mode() {
        let request = ChatRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![message::user_message("test")],
            temperature: Some(0.0),
            max_tokens: Some(100),
            json_mode: true,
        };
        let built = OpenAiProvider::build_request(&request);
        assert!(built.response_format.is_some());
    }

    #[test]
    fn test_build_request_without_json_mode() {
        let request = ChatRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![message::user_message("test")],
            temperature: None,
            max_tokens: None,
            json_mode: false,
        };
        let built = OpenAiProvider::build_request(&request);
        assert!(built.response_format.is_none());
    }
}
