//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros. One subcommand per
//! external interface spec.md names (§6): ingesting documents, querying a
//! single variant, fanning a query out across every variant, and polling
//! jobs/batches the transport layer would otherwise expose over HTTP/WS.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::pipeline::Method;

/// `rag-rs`: a multi-variant retrieval-augmented generation engine.
///
/// Runs sparse/dense/hybrid/iterative retrieval crossed with an LLM
/// provider matrix over a user's ingested documents, either one variant
/// at a time (`query`) or all of them at once (`analyze`).
#[derive(Parser, Debug)]
#[command(name = "rag-rs")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the corpus database file (documents, jobs, analysis batches).
    #[arg(long, env = "RAG_DB_PATH", default_value = "rag.db", global = true)]
    pub db_path: PathBuf,

    /// Root directory for persisted per-variant retrieval indexes.
    #[arg(long, env = "RAG_INDEX_ROOT", default_value = "rag-index", global = true)]
    pub index_root: PathBuf,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Retrieval method selector for the `query` subcommand, mirroring
/// [`Method`] with clap's derive machinery layered on at the CLI boundary
/// rather than the core crate depending on clap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MethodArg {
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

impl From<MethodArg> for Method {
    fn from(value: MethodArg) -> Self {
        match value {
            MethodArg::Sparse => Self::Sparse,
            MethodArg::Dense => Self::Dense,
            MethodArg::Hybrid => Self::Hybrid,
            MethodArg::Iterative => Self::Iterative,
            MethodArg::Reranking => Self::Reranking,
        }
    }
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize the corpus database and index root directory.
    #[command(after_help = r#"Examples:
  rag-rs init                         # Initialize in the current directory
  rag-rs init --force                 # Re-initialize (destroys existing data)
  rag-rs --db-path ./my.db init       # Initialize with a custom path
"#)]
    Init {
        /// Force re-initialization (destroys the existing database file).
        #[arg(short, long)]
        force: bool,
    },

    /// Show a user's ingested documents and per-variant index readiness.
    Status {
        /// Username to inspect.
        user: String,
    },

    /// List every `(method, model)` variant in the Variant Table.
    Variants,

    /// Document ingestion (insert-data / insert-url / insert-text).
    #[command(subcommand)]
    Ingest(IngestCommands),

    /// Run a single `(method, model)` pipeline against a ready index.
    #[command(after_help = r#"Examples:
  rag-rs query alice "what is rust" --method hybrid --model gpt-4o-mini
  rag-rs --format json query alice "summarize this" -m dense -M claude-3.5-sonnet
"#)]
    Query {
        /// Username whose index to query.
        user: String,

        /// The question to answer.
        query: String,

        /// Retrieval method.
        #[arg(short, long, value_enum, default_value = "hybrid")]
        method: MethodArg,

        /// LLM model (selects the provider by prefix: `gpt-`/`text-`,
        /// `gemini-`, or `claude-`).
        #[arg(short = 'M', long, default_value = "gpt-4o-mini")]
        model: String,
    },

    /// Poll a background ingestion job's status.
    #[command(name = "job-status")]
    JobStatus {
        /// Job id returned by an `ingest` command.
        job_id: String,
    },

    /// Run a query against every registered variant at once, printing
    /// progress as each variant finishes (start-analysis + the WS event
    /// stream, collapsed into one blocking call).
    #[command(after_help = r#"Examples:
  rag-rs analyze alice "what is rust"
  rag-rs --format json analyze alice "what is rust" | jq '.data[].answer'
"#)]
    Analyze {
        /// Username whose index to query.
        user: String,

        /// The question every variant answers independently.
        query: String,
    },

    /// Fetch a persisted analysis batch's current snapshot
    /// (analysis-status): progress, completion, and every variant's
    /// result recorded so far.
    #[command(name = "analysis-status")]
    AnalysisStatus {
        /// Batch id returned by `analyze`.
        batch_id: String,
    },
}

/// Ingestion subcommands, one per spec.md source type.
#[derive(Subcommand, Debug)]
pub enum IngestCommands {
    /// Ingest raw text (insert-text). Reads from stdin if `text` is
    /// omitted.
    #[command(after_help = r#"Examples:
  rag-rs ingest text alice "Cats are mammals. Dogs are mammals."
  cat notes.txt | rag-rs ingest text alice --name notes.txt
"#)]
    Text {
        /// Owning user.
        user: String,

        /// Raw text content (reads stdin if omitted).
        text: Option<String>,

        /// Logical document name.
        #[arg(short, long, default_value = "text")]
        name: String,
    },

    /// Ingest a local file's contents (insert-data). The extractor that
    /// turns a PDF into text is an external collaborator (spec.md §1);
    /// this reads the file as UTF-8 text directly, so pre-extract PDFs
    /// before ingesting them.
    #[command(after_help = r#"Examples:
  rag-rs ingest file alice ./notes.md
  rag-rs ingest file alice ./report.txt --name "Q3 report"
"#)]
    File {
        /// Owning user.
        user: String,

        /// Path to the already-extracted text file.
        path: PathBuf,

        /// Logical document name (defaults to the file name).
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Ingest a URL (insert-url). Fetching and HTML-to-text extraction are
    /// an external collaborator (spec.md §1); supply the already-fetched
    /// page text via `--text` or stdin.
    #[command(after_help = r#"Examples:
  rag-rs ingest url alice https://example.com/article --text "$(cat article.txt)"
  cat article.txt | rag-rs ingest url alice https://example.com/article
"#)]
    Url {
        /// Owning user.
        user: String,

        /// Source URL, recorded as the document's logical name.
        url: String,

        /// Already-fetched page text (reads stdin if omitted).
        #[arg(short, long)]
        text: Option<String>,
    },
}

impl Cli {
    /// Parses the global `--format` flag into an [`super::OutputFormat`].
    #[must_use]
    pub fn output_format(&self) -> super::OutputFormat {
        super::OutputFormat::parse(&self.format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parse_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_method_arg_maps_to_method() {
        assert_eq!(Method::from(MethodArg::Sparse), Method::Sparse);
        assert_eq!(Method::from(MethodArg::Hybrid), Method::Hybrid);
        assert_eq!(Method::from(MethodArg::Reranking), Method::Reranking);
    }

    #[test]
    fn test_parses_query_subcommand() {
        let cli = Cli::parse_from([
            "rag-rs",
            "query",
            "alice",
            "what is rust",
            "--method",
            "dense",
            "--model",
            "gpt-4o-mini",
        ]);
        match cli.command {
            Commands::Query { user, query, method, model } => {
                assert_eq!(user, "alice");
                assert_eq!(query, "what is rust");
                assert_eq!(method, MethodArg::Dense);
                assert_eq!(model, "gpt-4o-mini");
            }
            other => panic!("expected Query, got {other:?}"),
        }
    }

    #[test]
    fn test_default_format_is_text() {
        let cli = Cli::parse_from(["rag-rs", "variants"]);
        assert_eq!(cli.output_format(), super::super::OutputFormat::Text);
    }
}
