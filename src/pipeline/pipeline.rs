//! One (method, model) retrieval variant: owns a chunker, a retrieval
//! engine, and an [`LlmAdapter`], and implements the ingest/query
//! operations spec.md calls for.
//!
//! Grounded in `original_source/backend/pipeline/base_pipeline.py`'s
//! `BasePipeline` ABC, generalized from the donor's `agent::traits::Agent`
//! + `agent::orchestrator::Orchestrator` composition pattern: one struct
//! per variant owning its engine, adapter, and chunker, with `init`/`run`
//! as the two operations callers need.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::RwLock as AsyncRwLock;
use tokio::sync::Mutex as AsyncMutex;

use crate::agent::LlmAdapter;
use crate::core::{Chunk, ChunkStrategy, Document, chunk_text};
use crate::embedding::Embedder;
use crate::error::{EmbedError, Error};
use crate::search::{DenseEngine, HybridEngine, IterativeEngine, RetrievalEngine, ScoredChunk, SparseEngine};
use crate::storage::{Corpus, IndexRecordState, IndexStore, gen_disambiguator};

use super::method::{Method, variant_key};
use super::query_opt::validate_optimized_query;

/// In-memory retrieval state for one user's loaded index, shaped per
/// [`Method`].
enum EngineState {
    Sparse(SparseEngine),
    Dense(DenseEngine),
    Hybrid(HybridEngine),
    Iterative(IterativeEngine),
    Reranking(HybridEngine),
}

impl EngineState {
    fn build(method: Method, embedder: Arc<dyn Embedder>) -> Self {
        match method {
            Method::Sparse => Self::Sparse(SparseEngine::new()),
            Method::Dense => Self::Dense(DenseEngine::new(embedder)),
            Method::Hybrid => Self::Hybrid(HybridEngine::new(SparseEngine::new(), DenseEngine::new(embedder))),
            Method::Iterative => Self::Iterative(IterativeEngine::new(DenseEngine::new(embedder))),
            Method::Reranking => Self::Reranking(HybridEngine::new(SparseEngine::new(), DenseEngine::new(embedder))),
        }
    }

    fn index(&mut self, chunks: Vec<Chunk>) -> Result<(), EmbedError> {
        match self {
            Self::Sparse(e) => e.index(chunks),
            Self::Dense(e) => e.index(chunks),
            Self::Hybrid(e) | Self::Reranking(e) => e.index(chunks),
            Self::Iterative(e) => e.index(chunks),
        }
    }

    fn chunk_count(&self) -> usize {
        match self {
            Self::Sparse(e) => e.len(),
            Self::Dense(e) => e.len(),
            Self::Hybrid(e) | Self::Reranking(e) => e.len(),
            Self::Iterative(e) => {
                if e.is_empty() { 0 } else { 1 }
            }
        }
    }
}

/// One loaded user's retrieval state, cached in memory after `init`.
struct LoadedVariant {
    engine: AsyncRwLock<EngineState>,
    document_ids: Vec<i64>,
}

/// Outcome of running a query through one pipeline variant.
#[derive(Debug, Clone)]
pub struct QueryResult {
    /// `method/model` identity of the variant that produced this result.
    pub variant: String,
    /// The synthesized answer.
    pub answer: String,
    /// Chunks used as context for synthesis.
    pub retrieved_chunks: Vec<Chunk>,
}

/// One (method, model) retrieval variant.
pub struct Pipeline {
    method: Method,
    model: String,
    chunk_strategy: ChunkStrategy,
    optimize_query: bool,
    search_top_k: usize,
    index_root: std::path::PathBuf,
    corpus: Arc<Corpus>,
    index_store: IndexStore,
    embedder: Arc<dyn Embedder>,
    adapter: LlmAdapter,
    cache: AsyncRwLock<HashMap<String, Arc<LoadedVariant>>>,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl Pipeline {
    /// Constructs a pipeline for one (method, model) variant.
    #[must_use]
    pub fn new(
        method: Method,
        model: impl Into<String>,
        chunk_strategy: ChunkStrategy,
        index_root: impl Into<std::path::PathBuf>,
        corpus: Arc<Corpus>,
        embedder: Arc<dyn Embedder>,
        adapter: LlmAdapter,
        search_top_k: usize,
    ) -> Self {
        let index_root = index_root.into();
        Self {
            method,
            model: model.into(),
            chunk_strategy,
            optimize_query: method.default_optimize_query(),
            search_top_k,
            index_store: IndexStore::new(index_root.clone()),
            index_root,
            corpus,
            embedder,
            adapter,
            cache: AsyncRwLock::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// This variant's method.
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// This variant's model string.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// `method/model` identity string.
    #[must_use]
    pub fn variant(&self) -> String {
        variant_key(self.method, &self.model)
    }

    fn user_lock(&self, username: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        locks.entry(username.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    /// Loads persisted state for `username` into the cache if present.
    /// Returns `true` if a ready index was found and loaded (either just
    /// now or already cached).
    ///
    /// # Errors
    ///
    /// Returns [`Error`] on a corpus or index-store failure. A missing
    /// index is not an error: it is reported as `Ok(false)`.
    pub async fn init(&self, username: &str) -> Result<bool, Error> {
        if self.cache.read().await.contains_key(username) {
            return Ok(true);
        }

        let Some(document) = self.corpus.latest_document_for(username)? else {
            return Ok(false);
        };
        let Some(document_id) = document.id else {
            return Ok(false);
        };

        let Some(record) = self.corpus.latest_ready_index_record(document_id, self.method.as_str(), &self.model)?
        else {
            return Ok(false);
        };

        let (_, state) = self.index_store.read(std::path::Path::new(&record.location))?;
        let mut engine = EngineState::build(self.method, self.embedder.clone());
        engine.index(state.chunks)?;

        let mut cache = self.cache.write().await;
        cache.insert(
            username.to_string(),
            Arc::new(LoadedVariant { engine: AsyncRwLock::new(engine), document_ids: vec![document_id] }),
        );
        Ok(true)
    }

    /// Cheap readiness check: is a ready index known for `username`,
    /// without loading it into memory?
    ///
    /// # Errors
    ///
    /// Returns [`Error`] on a corpus failure.
    pub async fn is_initialized(&self, username: &str) -> Result<bool, Error> {
        if self.cache.read().await.contains_key(username) {
            return Ok(true);
        }
        let Some(document) = self.corpus.latest_document_for(username)? else {
            return Ok(false);
        };
        let Some(document_id) = document.id else {
            return Ok(false);
        };
        Ok(self.corpus.has_ready_index(document_id, self.method.as_str(), &self.model)?)
    }

    /// Builds (or rebuilds) this variant's index for `username` over
    /// `documents`, persisting it and updating the in-memory cache.
    ///
    /// # Errors
    ///
    /// Returns [`Error`] if chunking, embedding, or persistence fails.
    pub async fn build_index(&self, username: &str, documents: &[Document]) -> Result<(), Error> {
        let lock = self.user_lock(username);
        let _guard = lock.lock().await;

        let mut all_chunks = Vec::new();
        let mut document_ids = Vec::new();
        for document in documents {
            let Some(document_id) = document.id else {
                continue;
            };
            document_ids.push(document_id);
            let chunks = chunk_text(document_id, &document.content, self.chunk_strategy, self.embedder.as_ref())
                .map_err(|e| Error::InputError(e.to_string()))?;
            all_chunks.extend(chunks);
        }

        let Some(&primary_document_id) = document_ids.first() else {
            return Err(Error::CorpusEmpty(format!("no documents to index for user {username:?}")));
        };

        let record_id = self.corpus.create_index_record(
            primary_document_id,
            self.method.as_str(),
            &self.model,
            "", // location filled in after the disambiguated path is chosen
        )?;

        let build_result = self.persist_index(username, primary_document_id, &document_ids, all_chunks).await;

        match build_result {
            Ok((engine, location)) => {
                self.corpus.set_index_location(record_id, &location.to_string_lossy())?;
                self.corpus.mark_index_ready(record_id)?;
                let mut cache = self.cache.write().await;
                cache.insert(username.to_string(), Arc::new(LoadedVariant { engine: AsyncRwLock::new(engine), document_ids }));
                Ok(())
            }
            Err(err) => {
                let _ = self.corpus.mark_index_failed(record_id, &err.to_string());
                Err(err)
            }
        }
    }

    async fn persist_index(
        &self,
        username: &str,
        primary_document_id: i64,
        document_ids: &[i64],
        chunks: Vec<Chunk>,
    ) -> Result<(EngineState, std::path::PathBuf), Error> {
        let vectors = if self.method.needs_embeddings() {
            self.embedder.embed_batch(&chunks.iter().map(|c| c.content.clone()).collect::<Vec<_>>())?
        } else {
            Vec::new()
        };

        let mut attempt = 0u32;
        let idx_path = loop {
            let disambiguator = gen_disambiguator(attempt);
            let base = self.index_store.base_path(username, primary_document_id, self.method.as_str(), &disambiguator);
            if !base.with_extension("idx").exists() {
                let state = IndexRecordState { chunks: chunks.clone(), vectors: vectors.clone() };
                break self.index_store.write(&base, self.method.as_str(), &self.model, document_ids, &state)?;
            }
            attempt += 1;
            if attempt > 16 {
                return Err(Error::Storage(crate::error::StorageError::StateCorrupt {
                    path: base,
                    reason: "exhausted disambiguator attempts".to_string(),
                }));
            }
        };

        let mut engine = EngineState::build(self.method, self.embedder.clone());
        engine.index(chunks)?;
        Ok((engine, idx_path))
    }

    /// Runs the query -> retrieve -> generate flow for `username`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotReady`] if this variant has no index for
    /// `username`, [`Error::CorpusEmpty`] if retrieval yields nothing, or
    /// any underlying provider/storage failure.
    pub async fn run(&self, username: &str, query: &str) -> Result<QueryResult, Error> {
        if query.trim().is_empty() {
            return Err(Error::InputError("query must not be empty".to_string()));
        }

        if !self.init(username).await? {
            return Err(Error::NotReady { username: username.to_string(), variant: self.variant() });
        }

        let effective_query = if self.optimize_query {
            match self.adapter.prompt_generate(query).await {
                Ok(candidate) => validate_optimized_query(query, &candidate).to_string(),
                Err(_) => query.to_string(),
            }
        } else {
            query.to_string()
        };

        let cache = self.cache.read().await;
        let loaded = cache.get(username).ok_or_else(|| Error::NotReady {
            username: username.to_string(),
            variant: self.variant(),
        })?;

        let chunks = self.retrieve(loaded, &effective_query).await?;
        drop(cache);

        if chunks.is_empty() {
            return Err(Error::CorpusEmpty(format!("no chunks retrieved for user {username:?}")));
        }

        let context = join_chunks(&chunks);
        let answer = self.adapter.rag_generate(query, &context).await?;

        Ok(QueryResult { variant: self.variant(), answer, retrieved_chunks: chunks })
    }

    async fn retrieve(&self, loaded: &LoadedVariant, query: &str) -> Result<Vec<Chunk>, Error> {
        let top_k = self.search_top_k;
        let engine = loaded.engine.read().await;

        match &*engine {
            EngineState::Sparse(e) => Ok(scored_to_chunks(e.search(query, top_k)?)),
            EngineState::Dense(e) => Ok(scored_to_chunks(e.search(query, top_k)?)),
            EngineState::Hybrid(e) => Ok(scored_to_chunks(e.search(query, top_k)?)),
            EngineState::Iterative(e) => {
                let result = e.retrieve(&self.adapter, query, top_k).await?;
                Ok(result.context)
            }
            EngineState::Reranking(e) => {
                let candidates = e.search(query, top_k.saturating_mul(3).max(top_k))?;
                self.rerank(query, candidates, top_k).await
            }
        }
    }

    /// Re-scores `candidates` by asking the adapter's judge prompt whether
    /// each chunk alone is sufficient context for `query`, stable-sorting
    /// judged-relevant chunks ahead of the rest, then truncating to
    /// `top_k`.
    async fn rerank(&self, query: &str, candidates: Vec<ScoredChunk>, top_k: usize) -> Result<Vec<Chunk>, Error> {
        let mut judged = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let relevant = self.adapter.judge_sufficient(query, &candidate.chunk.content).await.unwrap_or(false);
            judged.push((relevant, candidate.chunk));
        }
        judged.sort_by_key(|(relevant, _)| !relevant);
        Ok(judged.into_iter().take(top_k).map(|(_, chunk)| chunk).collect())
    }
}

fn scored_to_chunks(hits: Vec<ScoredChunk>) -> Vec<Chunk> {
    hits.into_iter().map(|h| h.chunk).collect()
}

fn join_chunks(chunks: &[Chunk]) -> String {
    chunks.iter().map(|c| c.content.as_str()).collect::<Vec<_>>().join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::message::{ChatRequest, ChatResponse, TokenUsage};
    use crate::agent::{LlmProvider, PromptSet};
    use crate::embedding::hash::HashEmbedder;
    use crate::error::AgentError;
    use async_trait::async_trait;

    struct EchoProvider;

    #[async_trait]
    impl LlmProvider for EchoProvider {
        fn name(&self) -> &'static str {
            "stub"
        }

        async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
            let system = request.messages.first().map(|m| m.content.as_str()).unwrap_or_default();
            let content = if system.contains("sufficient") {
                r#"{"sufficient": true}"#.to_string()
            } else if system.contains("search-optimized") {
                "optimized query".to_string()
            } else if system.contains("follow-up") {
                "more keywords".to_string()
            } else if system.contains("grounded") {
                r#"{"decision": "yes", "justification": "ok"}"#.to_string()
            } else {
                "<answer>the answer</answer>".to_string()
            };
            Ok(ChatResponse { content, usage: TokenUsage::default(), finish_reason: Some("stop".to_string()) })
        }
    }

    fn pipeline(method: Method, root: &std::path::Path, corpus: Arc<Corpus>) -> Pipeline {
        let adapter = LlmAdapter::new(Box::new(EchoProvider), "gpt-4o-mini", PromptSet::defaults(), 256, 0);
        Pipeline::new(
            method,
            "gpt-4o-mini",
            ChunkStrategy::Fixed { size: 64, overlap: 8 },
            root,
            corpus,
            Arc::new(HashEmbedder::new()),
            adapter,
            5,
        )
    }

    async fn seeded_corpus(username: &str) -> (Arc<Corpus>, Document) {
        let corpus = Arc::new(Corpus::open_in_memory().unwrap_or_else(|e| panic!("{e}")));
        let mut doc = Document::new(username, "notes.md", "Rust is a systems programming language. It is fast and memory safe.");
        let id = corpus.insert_document(&doc).unwrap_or_else(|e| panic!("{e}"));
        doc.id = Some(id);
        (corpus, doc)
    }

    #[tokio::test]
    async fn test_run_before_build_index_is_not_ready() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let (corpus, _doc) = seeded_corpus("alice").await;
        let pipeline = pipeline(Method::Sparse, dir.path(), corpus);
        let err = pipeline.run("alice", "what is rust").await.expect_err("should not be ready");
        assert!(matches!(err, Error::NotReady { .. }));
    }

    #[tokio::test]
    async fn test_sparse_ingest_then_query_happy_path() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let (corpus, doc) = seeded_corpus("alice").await;
        let pipeline = pipeline(Method::Sparse, dir.path(), corpus);
        pipeline.build_index("alice", std::slice::from_ref(&doc)).await.unwrap_or_else(|e| panic!("{e}"));

        let result = pipeline.run("alice", "what is rust").await.unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(result.variant, "sparse/gpt-4o-mini");
        assert!(!result.retrieved_chunks.is_empty());
        assert!(result.answer.contains("the answer"));
    }

    #[tokio::test]
    async fn test_dense_ingest_then_query_happy_path() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let (corpus, doc) = seeded_corpus("bob").await;
        let pipeline = pipeline(Method::Dense, dir.path(), corpus);
        pipeline.build_index("bob", std::slice::from_ref(&doc)).await.unwrap_or_else(|e| panic!("{e}"));
        let result = pipeline.run("bob", "what is rust").await.unwrap_or_else(|e| panic!("{e}"));
        assert!(!result.retrieved_chunks.is_empty());
    }

    #[tokio::test]
    async fn test_hybrid_ingest_then_query_happy_path() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let (corpus, doc) = seeded_corpus("carol").await;
        let pipeline = pipeline(Method::Hybrid, dir.path(), corpus);
        pipeline.build_index("carol", std::slice::from_ref(&doc)).await.unwrap_or_else(|e| panic!("{e}"));
        let result = pipeline.run("carol", "what is rust").await.unwrap_or_else(|e| panic!("{e}"));
        assert!(!result.retrieved_chunks.is_empty());
    }

    #[tokio::test]
    async fn test_iterative_ingest_then_query_happy_path() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let (corpus, doc) = seeded_corpus("dave").await;
        let pipeline = pipeline(Method::Iterative, dir.path(), corpus);
        pipeline.build_index("dave", std::slice::from_ref(&doc)).await.unwrap_or_else(|e| panic!("{e}"));
        let result = pipeline.run("dave", "what is rust").await.unwrap_or_else(|e| panic!("{e}"));
        assert!(!result.retrieved_chunks.is_empty());
    }

    #[tokio::test]
    async fn test_reranking_ingest_then_query_happy_path() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let (corpus, doc) = seeded_corpus("erin").await;
        let pipeline = pipeline(Method::Reranking, dir.path(), corpus);
        pipeline.build_index("erin", std::slice::from_ref(&doc)).await.unwrap_or_else(|e| panic!("{e}"));
        let result = pipeline.run("erin", "what is rust").await.unwrap_or_else(|e| panic!("{e}"));
        assert!(!result.retrieved_chunks.is_empty());
    }

    #[tokio::test]
    async fn test_empty_query_is_input_error() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let (corpus, _doc) = seeded_corpus("alice").await;
        let pipeline = pipeline(Method::Sparse, dir.path(), corpus);
        let err = pipeline.run("alice", "   ").await.expect_err("empty query should error");
        assert!(matches!(err, Error::InputError(_)));
    }

    #[tokio::test]
    async fn test_reload_after_process_restart_uses_persisted_index() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let (corpus, doc) = seeded_corpus("frank").await;
        let first = pipeline(Method::Sparse, dir.path(), corpus.clone());
        first.build_index("frank", std::slice::from_ref(&doc)).await.unwrap_or_else(|e| panic!("{e}"));

        let second = pipeline(Method::Sparse, dir.path(), corpus);
        assert!(second.is_initialized("frank").await.unwrap_or_else(|e| panic!("{e}")));
        let result = second.run("frank", "what is rust").await.unwrap_or_else(|e| panic!("{e}"));
        assert!(!result.retrieved_chunks.is_empty());
    }
}
