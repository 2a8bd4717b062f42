//! Iterative retrieval: wraps a [`super::DenseEngine`] in a judged
//! reformulation loop driven by an [`crate::agent::LlmAdapter`].
//!
//! Grounded in the donor Python's `IterativeRAG`, redesigned per spec's
//! explicit Open Question decision: a judge-parse failure ends the loop
//! immediately (`Done`) with whatever context has been gathered, rather
//! than retried silently forever. State machine:
//!
//! ```text
//! Searching(query) -> retrieve, merge into deduped context -> Judging
//! Judging -> ask "sufficient?"
//!   sufficient          -> Done
//!   iteration == max    -> MaxIters
//!   judge parse failure -> Done (redesigned: no silent infinite retry)
//!   else                -> Rewriting
//! Rewriting -> ask for a short follow-up query -> Searching(new query)
//! ```
//!
//! Unlike [`super::SparseEngine`]/[`super::DenseEngine`]/[`super::HybridEngine`],
//! this engine's retrieval needs an LLM round trip per round, so it does
//! not implement the synchronous [`super::RetrievalEngine`] trait; callers
//! (in practice, [`crate::pipeline::Pipeline::run`]) drive it directly
//! through [`IterativeEngine::retrieve`].

use crate::agent::LlmAdapter;
use crate::core::Chunk;
use crate::error::{AgentError, EmbedError, IterativeError};

use super::{DenseEngine, RetrievalEngine, ScoredChunk};

/// Default bound on total `Searching` rounds.
const DEFAULT_MAX_RETRIES: usize = 3;

/// Why an iterative retrieval round stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The judge reported the accumulated context sufficient.
    Sufficient,
    /// `max_retries` searching rounds were exhausted without a sufficient
    /// verdict.
    MaxRetries,
    /// The judge's reply could not be parsed; treated as `Done` rather
    /// than retried (redesign, see module docs).
    JudgeUnparseable,
}

/// Result of running the judged reformulation loop to completion.
#[derive(Debug, Clone)]
pub struct IterativeResult {
    /// Deduplicated, first-appearance-ordered accumulated context.
    pub context: Vec<Chunk>,
    /// Number of `Searching` rounds actually executed.
    pub rounds: usize,
    /// Why the loop stopped.
    pub stop_reason: StopReason,
}

/// Wraps a [`DenseEngine`] in a judged multi-round reformulation loop.
pub struct IterativeEngine {
    inner: DenseEngine,
    max_retries: usize,
}

impl IterativeEngine {
    /// Creates an iterative engine over `inner`, using the default
    /// `max_retries` (3).
    #[must_use]
    pub fn new(inner: DenseEngine) -> Self {
        Self::with_max_retries(inner, DEFAULT_MAX_RETRIES)
    }

    /// Creates an iterative engine with an explicit round bound.
    #[must_use]
    pub const fn with_max_retries(inner: DenseEngine, max_retries: usize) -> Self {
        Self { inner, max_retries }
    }

    /// Indexes the underlying dense engine. Mirrors [`RetrievalEngine::index`]
    /// without implementing the trait (see module docs for why).
    ///
    /// # Errors
    ///
    /// Returns [`EmbedError`] if embedding the chunks failed.
    pub fn index(&mut self, chunks: Vec<Chunk>) -> Result<(), EmbedError> {
        self.inner.index(chunks)
    }

    /// `true` if the underlying dense engine has no chunks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Runs the judged reformulation loop for `query`, returning the
    /// accumulated deduplicated context.
    ///
    /// `max_retries = 0` performs no searching rounds at all and returns an
    /// empty context with [`StopReason::MaxRetries`] — the caller (Pipeline)
    /// is expected to treat an empty result as `CorpusEmpty`.
    ///
    /// # Errors
    ///
    /// Returns [`IterativeError::Agent`] if the rewrite-query LLM call
    /// fails (the judge call's own parse failure is *not* an error here —
    /// it is the documented `JudgeUnparseable` stop condition), or
    /// [`IterativeError::Embed`] if re-embedding the (possibly rewritten)
    /// query failed.
    pub async fn retrieve(
        &self,
        adapter: &LlmAdapter,
        query: &str,
        top_k: usize,
    ) -> Result<IterativeResult, IterativeError> {
        let mut context: Vec<Chunk> = Vec::new();
        let mut current_query = query.to_string();
        let mut rounds = 0usize;

        if self.max_retries == 0 {
            return Ok(IterativeResult {
                context,
                rounds: 0,
                stop_reason: StopReason::MaxRetries,
            });
        }

        loop {
            rounds += 1;
            let hits = self.inner.search(&current_query, top_k)?;
            merge_dedup(&mut context, hits);

            let context_text = join_chunks(&context);
            let judge_result = adapter.judge_sufficient(query, &context_text).await;

            match judge_result {
                Ok(true) => {
                    return Ok(IterativeResult {
                        context,
                        rounds,
                        stop_reason: StopReason::Sufficient,
                    });
                }
                Err(AgentError::ResponseParse { .. }) => {
                    return Ok(IterativeResult {
                        context,
                        rounds,
                        stop_reason: StopReason::JudgeUnparseable,
                    });
                }
                Err(e) => return Err(e.into()),
                Ok(false) => {}
            }

            if rounds >= self.max_retries {
                return Ok(IterativeResult {
                    context,
                    rounds,
                    stop_reason: StopReason::MaxRetries,
                });
            }

            let rewritten = adapter.rewrite_query(query, &context_text).await?;
            let stripped = rewritten.trim().lines().next().unwrap_or("").trim();
            current_query = if stripped.is_empty() {
                query.to_string()
            } else {
                stripped.to_string()
            };
        }
    }
}

/// Merges newly retrieved chunks into `context`, preserving first-appearance
/// order and deduplicating by exact text equality.
fn merge_dedup(context: &mut Vec<Chunk>, hits: Vec<ScoredChunk>) {
    for hit in hits {
        if !context.iter().any(|c| c.content == hit.chunk.content) {
            context.push(hit.chunk);
        }
    }
}

fn join_chunks(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .map(|c| c.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::message::{ChatRequest, ChatResponse, TokenUsage};
    use crate::agent::{LlmAdapter, LlmProvider, PromptSet};
    use crate::embedding::hash::HashEmbedder;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn chunk(index: usize, text: &str) -> Chunk {
        Chunk::new(1, index, (0, text.len()), text)
    }

    fn engine_with(chunks: Vec<Chunk>) -> IterativeEngine {
        let mut engine = IterativeEngine::new(DenseEngine::new(Arc::new(HashEmbedder::new())));
        engine.index(chunks).unwrap_or_else(|e| panic!("{e}"));
        engine
    }

    /// Judge says insufficient on round 1, sufficient on round 2.
    struct TwoRoundJudge {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmProvider for TwoRoundJudge {
        fn name(&self) -> &'static str {
            "stub"
        }

        async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
            let is_judge = request
                .messages
                .first()
                .is_some_and(|m| m.content.contains("sufficient"));
            let content = if is_judge {
                let n = self.calls.fetch_add(1, Ordering::SeqCst);
                if n == 0 { r#"{"sufficient": false}"# } else { r#"{"sufficient": true}"# }
            } else {
                "more keywords"
            };
            Ok(ChatResponse {
                content: content.to_string(),
                usage: TokenUsage::default(),
                finish_reason: Some("stop".to_string()),
            })
        }
    }

    #[tokio::test]
    async fn test_stops_when_sufficient_after_two_rounds() {
        let engine = engine_with(vec![chunk(1, "cats are mammals"), chunk(2, "dogs are mammals")]);
        let provider = TwoRoundJudge { calls: AtomicUsize::new(0) };
        let adapter = LlmAdapter::new(Box::new(provider), "gpt-4o-mini", PromptSet::defaults(), 256, 0);

        let result = engine.retrieve(&adapter, "mammals", 5).await.unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(result.rounds, 2);
        assert_eq!(result.stop_reason, StopReason::Sufficient);
    }

    struct AlwaysInsufficient;

    #[async_trait]
    impl LlmProvider for AlwaysInsufficient {
        fn name(&self) -> &'static str {
            "stub"
        }

        async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
            let is_judge = request
                .messages
                .first()
                .is_some_and(|m| m.content.contains("sufficient"));
            let content = if is_judge { r#"{"sufficient": false}"# } else { "more keywords" };
            Ok(ChatResponse {
                content: content.to_string(),
                usage: TokenUsage::default(),
                finish_reason: Some("stop".to_string()),
            })
        }
    }

    #[tokio::test]
    async fn test_stops_at_max_retries() {
        let engine = engine_with(vec![chunk(1, "some content")]);
        let adapter = LlmAdapter::new(Box::new(AlwaysInsufficient), "gpt-4o-mini", PromptSet::defaults(), 256, 0);
        let result = engine.retrieve(&adapter, "q", 5).await.unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(result.rounds, 3);
        assert_eq!(result.stop_reason, StopReason::MaxRetries);
    }

    #[tokio::test]
    async fn test_zero_max_retries_does_no_rounds() {
        let engine = {
            let mut e = IterativeEngine::with_max_retries(DenseEngine::new(Arc::new(HashEmbedder::new())), 0);
            e.index(vec![chunk(1, "content")]).unwrap_or_else(|e| panic!("{e}"));
            e
        };
        let adapter = LlmAdapter::new(Box::new(AlwaysInsufficient), "gpt-4o-mini", PromptSet::defaults(), 256, 0);
        let result = engine.retrieve(&adapter, "q", 5).await.unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(result.rounds, 0);
        assert!(result.context.is_empty());
    }

    struct UnparseableJudge;

    #[async_trait]
    impl LlmProvider for UnparseableJudge {
        fn name(&self) -> &'static str {
            "stub"
        }

        async fn chat(&self, _request: &ChatRequest) -> Result<ChatResponse, AgentError> {
            Ok(ChatResponse {
                content: "not json".to_string(),
                usage: TokenUsage::default(),
                finish_reason: Some("stop".to_string()),
            })
        }
    }

    #[tokio::test]
    async fn test_judge_parse_failure_ends_loop_immediately() {
        let engine = engine_with(vec![chunk(1, "content")]);
        let adapter = LlmAdapter::new(Box::new(UnparseableJudge), "gpt-4o-mini", PromptSet::defaults(), 256, 0);
        let result = engine.retrieve(&adapter, "q", 5).await.unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(result.rounds, 1);
        assert_eq!(result.stop_reason, StopReason::JudgeUnparseable);
    }

    #[tokio::test]
    async fn test_context_is_deduplicated_and_ordered() {
        let engine = engine_with(vec![chunk(1, "alpha"), chunk(2, "beta")]);
        let provider = TwoRoundJudge { calls: AtomicUsize::new(0) };
        let adapter = LlmAdapter::new(Box::new(provider), "gpt-4o-mini", PromptSet::defaults(), 256, 0);
        let result = engine.retrieve(&adapter, "alpha beta", 5).await.unwrap_or_else(|e| panic!("{e}"));
        let texts: Vec<&str> = result.context.iter().map(|c| c.content.as_str()).collect();
        let mut dedup = texts.clone();
        dedup.dedup();
        assert_eq!(texts.len(), dedup.len());
    }
}
