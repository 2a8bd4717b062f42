//! CLI command implementations.
//!
//! Each command builds just enough of the library's runtime (a [`Corpus`],
//! a [`Registry`], a [`JobManager`] or [`BatchOrchestrator`]) to perform
//! one spec.md external-interface operation (§6), then renders the result
//! through [`super::output`]. Commands that need an LLM provider
//! (`ingest`, `query`, `analyze`) resolve [`RagConfig`] from the
//! environment; commands that only touch the corpus (`job-status`,
//! `analysis-status`, `status`) do not require an API key.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::agent::{LlmAdapter, PromptSet, RagConfig, create_provider};
use crate::batch::{BatchEvent, BatchOrchestrator};
use crate::core::{ChunkStrategy, Document};
use crate::embedding::{Embedder, default_embedder};
use crate::error::{CommandError, Error};
use crate::jobs::JobManager;
use crate::pipeline::{Method, Pipeline, variant_table};
use crate::registry::Registry;
use crate::storage::{AnalysisResult, Corpus, Job, JobStatus};

use super::output::{OutputFormat, render};
use super::parser::{Cli, Commands, IngestCommands};

/// Chunking strategy CLI-driven ingestion builds every index with. Mirrors
/// the Registry's default (spec.md §4.8): one shared strategy keeps
/// variants directly comparable.
const DEFAULT_CHUNK_STRATEGY: ChunkStrategy = ChunkStrategy::Fixed { size: 500, overlap: 50 };

/// Result alias for CLI command bodies.
pub type Result<T> = std::result::Result<T, CommandError>;

impl From<Error> for CommandError {
    fn from(err: Error) -> Self {
        Self::ExecutionFailed(err.to_string())
    }
}

impl From<crate::error::StorageError> for CommandError {
    fn from(err: crate::error::StorageError) -> Self {
        Self::ExecutionFailed(err.to_string())
    }
}

impl From<crate::error::AgentError> for CommandError {
    fn from(err: crate::error::AgentError) -> Self {
        Self::ExecutionFailed(err.to_string())
    }
}

impl From<std::io::Error> for CommandError {
    fn from(err: std::io::Error) -> Self {
        Self::ExecutionFailed(err.to_string())
    }
}

/// Executes the CLI command and returns the rendered output string.
///
/// # Errors
///
/// Returns [`CommandError`] if the corpus cannot be opened, a required API
/// key is missing, or the underlying library operation fails.
pub async fn execute(cli: &Cli) -> Result<String> {
    let format = cli.output_format();
    match &cli.command {
        Commands::Init { force } => cmd_init(&cli.db_path, &cli.index_root, *force, format),
        Commands::Status { user } => cmd_status(&cli.db_path, &cli.index_root, user, format).await,
        Commands::Variants => cmd_variants(format),
        Commands::Ingest(sub) => cmd_ingest(&cli.db_path, &cli.index_root, sub, format).await,
        Commands::Query { user, query, method, model } => {
            cmd_query(&cli.db_path, &cli.index_root, user, query, Method::from(*method), model, format).await
        }
        Commands::JobStatus { job_id } => cmd_job_status(&cli.db_path, job_id, format),
        Commands::Analyze { user, query } => cmd_analyze(&cli.db_path, &cli.index_root, user, query, format).await,
        Commands::AnalysisStatus { batch_id } => cmd_analysis_status(&cli.db_path, batch_id, format),
    }
}

/// Renders a [`CommandError`] for display on stderr.
#[must_use]
pub fn render_error(err: &CommandError) -> String {
    format!("error: {err}")
}

fn open_corpus(db_path: &Path) -> Result<Corpus> {
    Ok(Corpus::open(db_path)?)
}

fn config_from_env() -> Result<RagConfig> {
    RagConfig::from_env().map_err(|e| CommandError::ExecutionFailed(format!("{e} (set RAG_API_KEY or OPENAI_API_KEY)")))
}

/// Builds a full 15-variant [`Registry`] sharing one corpus handle and one
/// embedder instance, mirroring [`Registry::new`] but kept local to the
/// CLI so library callers are not forced through environment-variable
/// configuration.
fn build_registry(config: &RagConfig, index_root: &Path, corpus: Arc<Corpus>) -> Result<Registry> {
    let embedder: Arc<dyn Embedder> = Arc::from(default_embedder());
    let prompts = PromptSet::load(None);

    let mut pipelines = std::collections::HashMap::new();
    for (method, model) in variant_table() {
        let provider = create_provider(config, model)?;
        let adapter = LlmAdapter::new(provider, model, prompts.clone(), config.max_tokens, config.max_retries);
        let pipeline = Pipeline::new(
            method,
            model,
            DEFAULT_CHUNK_STRATEGY,
            index_root,
            corpus.clone(),
            embedder.clone(),
            adapter,
            config.search_top_k,
        );
        pipelines.insert(crate::pipeline::variant_key(method, model), Arc::new(pipeline));
    }
    Ok(Registry::from_pipelines(pipelines))
}

// ==================== init ====================

#[derive(Serialize)]
struct InitView {
    db_path: String,
    index_root: String,
    status: &'static str,
}

fn cmd_init(db_path: &Path, index_root: &Path, force: bool, format: OutputFormat) -> Result<String> {
    if force && db_path.exists() {
        std::fs::remove_file(db_path)?;
    }
    // Opening creates the schema if it does not exist yet; drop the handle
    // immediately, `init` only needs the side effect.
    drop(open_corpus(db_path)?);
    std::fs::create_dir_all(index_root)?;

    let view = InitView {
        db_path: db_path.display().to_string(),
        index_root: index_root.display().to_string(),
        status: "ready",
    };
    Ok(render(format, &view, || format!("initialized corpus at {} and index root at {}", view.db_path, view.index_root)))
}

// ==================== status ====================

#[derive(Serialize)]
struct VariantReadiness {
    variant: String,
    ready: bool,
}

#[derive(Serialize)]
struct StatusView {
    user: String,
    documents: usize,
    variants: Vec<VariantReadiness>,
}

async fn cmd_status(db_path: &Path, index_root: &Path, user: &str, format: OutputFormat) -> Result<String> {
    let corpus = Arc::new(open_corpus(db_path)?);
    let documents = corpus.documents_for(user)?;

    let config = config_from_env();
    let mut variants = Vec::new();
    if let Ok(config) = config {
        let registry = build_registry(&config, index_root, corpus.clone())?;
        for pipeline in registry.all() {
            let ready = pipeline.is_initialized(user).await?;
            variants.push(VariantReadiness { variant: pipeline.variant(), ready });
        }
    }

    let view = StatusView { user: user.to_string(), documents: documents.len(), variants };
    Ok(render(format, &view, || {
        let mut out = format!("user {}: {} document(s)\n", view.user, view.documents);
        if view.variants.is_empty() {
            out.push_str("(set RAG_API_KEY or OPENAI_API_KEY to see per-variant readiness)\n");
        }
        for v in &view.variants {
            out.push_str(&format!("  {:<28} {}\n", v.variant, if v.ready { "ready" } else { "not ready" }));
        }
        out
    }))
}

// ==================== variants ====================

fn cmd_variants(format: OutputFormat) -> Result<String> {
    let mut variants: Vec<String> = variant_table().into_iter().map(|(method, model)| crate::pipeline::variant_key(method, model)).collect();
    variants.sort();
    Ok(render(format, &variants, || variants.join("\n")))
}

// ==================== ingest ====================

#[derive(Serialize)]
struct JobView {
    job_id: String,
    status: String,
    progress: u8,
    error: Option<String>,
    updated_at: i64,
}

impl From<&Job> for JobView {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            status: job_status_str(job.status).to_string(),
            progress: job.progress,
            error: job.error_message.clone(),
            updated_at: job.updated_at,
        }
    }
}

const fn job_status_str(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Pending => "pending",
        JobStatus::Processing => "processing",
        JobStatus::Ready => "ready",
        JobStatus::Failed => "failed",
    }
}

fn read_text_arg(provided: Option<&str>) -> Result<String> {
    if let Some(text) = provided {
        return Ok(text.to_string());
    }
    let mut buf = String::new();
    std::io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

async fn cmd_ingest(db_path: &Path, index_root: &Path, sub: &IngestCommands, format: OutputFormat) -> Result<String> {
    let (user, document) = match sub {
        IngestCommands::Text { user, text, name } => {
            let content = read_text_arg(text.as_deref())?;
            (user.clone(), Document::new(user.as_str(), name.clone(), content))
        }
        IngestCommands::File { user, path, name } => {
            let content = std::fs::read_to_string(path)?;
            let name = name.clone().unwrap_or_else(|| path.display().to_string());
            (user.clone(), Document::new(user.as_str(), name, content))
        }
        IngestCommands::Url { user, url, text } => {
            let content = read_text_arg(text.as_deref())?;
            (user.clone(), Document::new(user.as_str(), url.clone(), content))
        }
    };

    if document.content.trim().is_empty() {
        return Err(CommandError::ExecutionFailed("ingested document has no text content".to_string()));
    }

    let corpus = Arc::new(open_corpus(db_path)?);
    let config = config_from_env()?;
    let registry = Arc::new(build_registry(&config, index_root, corpus.clone())?);
    let manager = JobManager::new(corpus.clone(), config.max_concurrency);

    let job_id = manager.submit_ingest(user, vec![document], registry);

    // The CLI runs one process per invocation (no resident worker pool
    // across invocations), so the ingest command blocks on the job it just
    // submitted rather than returning immediately the way the HTTP
    // `open-chat` endpoint would - the background task would otherwise be
    // dropped when this process exits before the runtime's tasks finish.
    let job = wait_for_terminal(&manager, &job_id).await?;

    let view = JobView::from(&job);
    Ok(render(format, &view, || {
        format!("job {} {} (progress {}%)", view.job_id, view.status, view.progress)
            + &view.error.as_deref().map(|e| format!("\nerror: {e}")).unwrap_or_default()
    }))
}

async fn wait_for_terminal(manager: &JobManager, job_id: &str) -> Result<Job> {
    loop {
        if let Some(job) = manager.poll(job_id)? {
            if matches!(job.status, JobStatus::Ready | JobStatus::Failed) {
                return Ok(job);
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

// ==================== job-status ====================

fn cmd_job_status(db_path: &Path, job_id: &str, format: OutputFormat) -> Result<String> {
    let corpus = open_corpus(db_path)?;
    let job = corpus.get_job(job_id)?.ok_or_else(|| CommandError::ExecutionFailed(format!("no job {job_id}")))?;
    let view = JobView::from(&job);
    Ok(render(format, &view, || format!("job {} {} (progress {}%)", view.job_id, view.status, view.progress)))
}

// ==================== query ====================

#[derive(Serialize)]
struct QueryView {
    variant: String,
    answer: String,
    retrieved_chunks: usize,
}

#[allow(clippy::too_many_arguments)]
async fn cmd_query(
    db_path: &Path,
    index_root: &Path,
    user: &str,
    query: &str,
    method: Method,
    model: &str,
    format: OutputFormat,
) -> Result<String> {
    let corpus = Arc::new(open_corpus(db_path)?);
    let config = config_from_env()?;
    let registry = build_registry(&config, index_root, corpus)?;
    let pipeline = registry.get(method, model)?;
    let result = pipeline.run(user, query).await?;

    let view = QueryView { variant: result.variant, answer: result.answer, retrieved_chunks: result.retrieved_chunks.len() };
    Ok(render(format, &view, || format!("[{}] ({} chunks)\n{}", view.variant, view.retrieved_chunks, view.answer)))
}

// ==================== analyze ====================

#[derive(Serialize)]
struct VariantResultView {
    method: String,
    model: String,
    answer: Option<String>,
    error: Option<String>,
}

#[derive(Serialize)]
struct AnalyzeView {
    batch_id: String,
    progress: u8,
    is_complete: bool,
    data: Vec<VariantResultView>,
}

async fn cmd_analyze(db_path: &Path, index_root: &Path, user: &str, query: &str, format: OutputFormat) -> Result<String> {
    let corpus = Arc::new(open_corpus(db_path)?);
    let config = config_from_env()?;
    let registry = Arc::new(build_registry(&config, index_root, corpus.clone())?);
    let orchestrator = BatchOrchestrator::new(registry, config.max_concurrency);

    let (mut rx, handle) = orchestrator.run_all(corpus, user, query);
    while let Some(event) = rx.recv().await {
        if let BatchEvent::VariantResult { outcome } = event {
            tracing::debug!(variant = %outcome.variant, success = outcome.error.is_none(), "variant finished");
        }
    }

    let batch = handle.await.map_err(|e| CommandError::ExecutionFailed(format!("batch task panicked: {e}")))??;
    let data = batch
        .results
        .into_iter()
        .map(|r| VariantResultView { method: r.method, model: r.model, answer: r.answer, error: r.error })
        .collect::<Vec<_>>();

    let view = AnalyzeView { batch_id: batch.batch_id, progress: 100, is_complete: true, data };
    Ok(render(format, &view, || render_analyze_text(&view)))
}

fn render_analyze_text(view: &AnalyzeView) -> String {
    let mut out = format!("batch {} ({} variant(s), progress {}%)\n", view.batch_id, view.data.len(), view.progress);
    for r in &view.data {
        match &r.answer {
            Some(answer) => out.push_str(&format!("  [{}/{}] {}\n", r.method, r.model, answer)),
            None => out.push_str(&format!("  [{}/{}] FAILED: {}\n", r.method, r.model, r.error.as_deref().unwrap_or("unknown error"))),
        }
    }
    out
}

// ==================== analysis-status ====================

fn cmd_analysis_status(db_path: &Path, batch_id: &str, format: OutputFormat) -> Result<String> {
    let corpus = open_corpus(db_path)?;
    let batch = corpus.get_analysis_batch(batch_id)?.ok_or_else(|| CommandError::ExecutionFailed(format!("no batch {batch_id}")))?;
    let results = corpus.analysis_results_for(batch_id)?;

    let is_complete = results.len() >= batch.total_variants;
    #[allow(clippy::cast_possible_truncation)]
    let progress = if batch.total_variants == 0 {
        100
    } else {
        ((results.len() as f64 / batch.total_variants as f64) * 100.0).floor() as u8
    };

    let data = results
        .into_iter()
        .map(|r: AnalysisResult| VariantResultView { method: r.method, model: r.model, answer: r.answer, error: r.error_message })
        .collect::<Vec<_>>();

    let view = AnalyzeView { batch_id: batch.batch_id, progress, is_complete, data };
    Ok(render(format, &view, || render_analyze_text(&view)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::parser::Cli;
    use clap::Parser;

    fn cli_with_paths(db_path: &std::path::Path, index_root: &std::path::Path, args: &[&str]) -> Cli {
        let mut full = vec!["rag-rs", "--db-path", db_path.to_str().unwrap_or_default(), "--index-root", index_root.to_str().unwrap_or_default()];
        full.extend_from_slice(args);
        Cli::parse_from(full)
    }

    #[tokio::test]
    async fn test_init_creates_db_and_index_root() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let db_path = dir.path().join("rag.db");
        let index_root = dir.path().join("idx");
        let cli = cli_with_paths(&db_path, &index_root, &["init"]);

        let out = execute(&cli).await.unwrap_or_else(|e| panic!("{e}"));
        assert!(out.contains("initialized"));
        assert!(db_path.exists());
        assert!(index_root.exists());
    }

    #[tokio::test]
    async fn test_job_status_unknown_job_errors() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let db_path = dir.path().join("rag.db");
        let index_root = dir.path().join("idx");
        let init_cli = cli_with_paths(&db_path, &index_root, &["init"]);
        execute(&init_cli).await.unwrap_or_else(|e| panic!("{e}"));

        let cli = cli_with_paths(&db_path, &index_root, &["job-status", "nope"]);
        let result = execute(&cli).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_status_with_no_documents_reports_zero() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let db_path = dir.path().join("rag.db");
        let index_root = dir.path().join("idx");
        let init_cli = cli_with_paths(&db_path, &index_root, &["init"]);
        execute(&init_cli).await.unwrap_or_else(|e| panic!("{e}"));

        let cli = cli_with_paths(&db_path, &index_root, &["--format", "json", "status", "alice"]);
        let out = execute(&cli).await.unwrap_or_else(|e| panic!("{e}"));
        assert!(out.contains("\"documents\": 0"));
    }

    #[test]
    fn test_render_error_prefixes_message() {
        let err = CommandError::ExecutionFailed("boom".to_string());
        assert_eq!(render_error(&err), "error: boom");
    }
}
