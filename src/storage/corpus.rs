//! SQLite-backed corpus: documents, index readiness records, jobs, and
//! batch/result rows.
//!
//! Grounded in the donor's `SqliteStorage` (referenced from
//! `agent::orchestrator::Orchestrator::load_chunks`, whose doc comment notes
//! `rusqlite::Connection` is `!Send` and calls into it must run on a sync
//! thread). This module keeps that constraint explicit: every method here is
//! synchronous; async callers (JobManager, Pipeline) are expected to run
//! them inside `tokio::task::spawn_blocking`, exactly as the donor's comment
//! describes rather than hiding the thread-hop behind an async façade.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension, params};

use crate::core::Document;
use crate::error::StorageError;

/// Readiness state of a persisted [`IndexRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStatus {
    /// A build has started but not finished.
    Pending,
    /// A build is actively running.
    Processing,
    /// The index file is complete and safe to load.
    Ready,
    /// The build failed; `error_message` on the row carries why.
    Failed,
}

impl IndexStatus {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "processing" => Self::Processing,
            "ready" => Self::Ready,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

/// What kind of unit of work a [`Job`] tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// A chunk-and-index build for one (user, method, model) variant.
    Ingest,
    /// A query run, single-variant or fanned out across the Variant Table.
    Query,
}

impl JobKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::Query => "query",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "query" => Self::Query,
            _ => Self::Ingest,
        }
    }
}

/// Lifecycle state of a [`Job`], matching spec.md's `Pending -> Processing
/// -> Ready | Failed` state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// Submitted, not yet picked up by a worker.
    Pending,
    /// A worker is actively running it.
    Processing,
    /// Completed successfully; `result` on the row carries the payload.
    Ready,
    /// Failed; `error_message` on the row carries why.
    Failed,
}

impl JobStatus {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "processing" => Self::Processing,
            "ready" => Self::Ready,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

/// A background unit of work (ingestion or query) tracked end to end so a
/// caller can submit it and poll for completion rather than block.
#[derive(Debug, Clone)]
pub struct Job {
    /// UUID-v4 job identifier.
    pub id: String,
    /// Owning user.
    pub username: String,
    /// What this job does.
    pub kind: JobKind,
    /// Current lifecycle state.
    pub status: JobStatus,
    /// Progress in `[0, 100]`. Checkpoints are monotonically non-decreasing.
    pub progress: u8,
    /// Failure reason, set only when `status == Failed`.
    pub error_message: Option<String>,
    /// Serialized JSON result payload, set only when `status == Ready`.
    pub result: Option<String>,
    /// Unix timestamp the job was submitted.
    pub created_at: i64,
    /// Unix timestamp the job was last updated.
    pub updated_at: i64,
}

/// One query's fan-out across every registered Pipeline variant.
#[derive(Debug, Clone)]
pub struct AnalysisBatch {
    /// UUID-v4 batch identifier.
    pub batch_id: String,
    /// Owning user.
    pub username: String,
    /// The query text every variant was asked.
    pub query: String,
    /// Number of variants the batch was fanned out across.
    pub total_variants: usize,
    /// Unix timestamp the batch was created.
    pub created_at: i64,
}

/// One variant's outcome within an [`AnalysisBatch`].
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    /// Row id.
    pub id: i64,
    /// The batch this result belongs to.
    pub batch_id: String,
    /// Retrieval method, lowercase (e.g. `"hybrid"`).
    pub method: String,
    /// Model string.
    pub model: String,
    /// The synthesized answer, `None` if this variant failed.
    pub answer: Option<String>,
    /// Retrieved chunk contents, serialized as a JSON string array.
    pub retrieved_chunks: Option<String>,
    /// Failure reason, set only when this variant failed.
    pub error_message: Option<String>,
    /// Unix timestamp this result row was written.
    pub created_at: i64,
}

/// A weak reference from `(document, method, model)` to an on-disk index
/// file. The DB never holds engine state itself (see module docs).
#[derive(Debug, Clone)]
pub struct IndexRecord {
    /// Row id.
    pub id: i64,
    /// The document this index was built over.
    pub document_id: i64,
    /// Retrieval method this record covers (lowercase, e.g. `"dense"`).
    pub method: String,
    /// Model string this record was built against.
    pub model: String,
    /// Path to the `.idx` file (the `.json` sidecar sits alongside it).
    pub location: String,
    /// Readiness state.
    pub status: IndexStatus,
    /// Failure reason, set only when `status == Failed`.
    pub error_message: Option<String>,
    /// Unix timestamp the record was created.
    pub created_at: i64,
    /// Unix timestamp the record was last updated.
    pub updated_at: i64,
}

/// SQLite-backed store for documents and index readiness records.
///
/// Wraps a single `Connection` behind a `Mutex` so the handle is `Send +
/// Sync` and cloneable via `Arc` across pipelines that share one corpus
/// database, while every individual call remains synchronous (see module
/// docs on why).
pub struct Corpus {
    conn: Mutex<Connection>,
}

impl Corpus {
    /// Opens (creating if necessary) a corpus database at `path`,
    /// running schema migrations idempotently.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Opens an in-memory corpus database, for tests.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn init_schema(conn: &Connection) -> Result<(), StorageError> {
        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL,
                path TEXT NOT NULL,
                content_type TEXT,
                content TEXT NOT NULL,
                ingested_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_documents_username ON documents(username);

            CREATE TABLE IF NOT EXISTS index_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                document_id INTEGER NOT NULL,
                method TEXT NOT NULL,
                model TEXT NOT NULL,
                location TEXT NOT NULL,
                status TEXT NOT NULL,
                error_message TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_index_records_lookup
                ON index_records(document_id, method, model, status);

            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL,
                kind TEXT NOT NULL,
                status TEXT NOT NULL,
                progress INTEGER NOT NULL,
                error_message TEXT,
                result TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_username ON jobs(username);

            CREATE TABLE IF NOT EXISTS analysis_batches (
                batch_id TEXT PRIMARY KEY,
                username TEXT NOT NULL,
                query TEXT NOT NULL,
                total_variants INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS analysis_results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                batch_id TEXT NOT NULL,
                method TEXT NOT NULL,
                model TEXT NOT NULL,
                answer TEXT,
                retrieved_chunks TEXT,
                error_message TEXT,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_analysis_results_batch ON analysis_results(batch_id);
            ",
        )?;
        Ok(())
    }

    /// Inserts a document, assigning its id.
    pub fn insert_document(&self, document: &Document) -> Result<i64, StorageError> {
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        conn.execute(
            "INSERT INTO documents (username, path, content_type, content, ingested_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![document.username, document.path, document.content_type, document.content, document.ingested_at],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Fetches a document by id.
    pub fn get_document(&self, document_id: i64) -> Result<Option<Document>, StorageError> {
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        conn.query_row(
            "SELECT id, username, path, content_type, content, ingested_at FROM documents WHERE id = ?1",
            params![document_id],
            |row| {
                Ok(Document {
                    id: Some(row.get(0)?),
                    username: row.get(1)?,
                    path: row.get(2)?,
                    content_type: row.get(3)?,
                    content: row.get(4)?,
                    ingested_at: row.get(5)?,
                })
            },
        )
        .optional()
        .map_err(StorageError::from)
    }

    /// Lists every document ingested by `username`, newest first.
    pub fn documents_for(&self, username: &str) -> Result<Vec<Document>, StorageError> {
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut stmt = conn.prepare(
            "SELECT id, username, path, content_type, content, ingested_at
             FROM documents WHERE username = ?1 ORDER BY ingested_at DESC",
        )?;
        let rows = stmt.query_map(params![username], |row| {
            Ok(Document {
                id: Some(row.get(0)?),
                username: row.get(1)?,
                path: row.get(2)?,
                content_type: row.get(3)?,
                content: row.get(4)?,
                ingested_at: row.get(5)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StorageError::from)
    }

    /// Returns the most recently ingested document for `username`, if any.
    pub fn latest_document_for(&self, username: &str) -> Result<Option<Document>, StorageError> {
        Ok(self.documents_for(username)?.into_iter().next())
    }

    /// Creates a `pending` index record for `(document_id, method, model)`.
    pub fn create_index_record(
        &self,
        document_id: i64,
        method: &str,
        model: &str,
        location: &str,
    ) -> Result<i64, StorageError> {
        let now = now_unix();
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        conn.execute(
            "INSERT INTO index_records
                (document_id, method, model, location, status, error_message, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?6)",
            params![document_id, method, model, location, IndexStatus::Pending.as_str(), now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Updates the on-disk location of an index record once its
    /// disambiguated path has been chosen (the record itself is created
    /// before the file path is known, so readiness can still be tracked if
    /// the build fails before a path is ever picked).
    pub fn set_index_location(&self, record_id: i64, location: &str) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        conn.execute(
            "UPDATE index_records SET location = ?1, updated_at = ?2 WHERE id = ?3",
            params![location, now_unix(), record_id],
        )?;
        Ok(())
    }

    /// Transitions an index record to `Ready`.
    pub fn mark_index_ready(&self, record_id: i64) -> Result<(), StorageError> {
        self.update_index_status(record_id, IndexStatus::Ready, None)
    }

    /// Transitions an index record to `Failed`, recording why.
    pub fn mark_index_failed(&self, record_id: i64, error_message: &str) -> Result<(), StorageError> {
        self.update_index_status(record_id, IndexStatus::Failed, Some(error_message))
    }

    fn update_index_status(
        &self,
        record_id: i64,
        status: IndexStatus,
        error_message: Option<&str>,
    ) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        conn.execute(
            "UPDATE index_records SET status = ?1, error_message = ?2, updated_at = ?3 WHERE id = ?4",
            params![status.as_str(), error_message, now_unix(), record_id],
        )?;
        Ok(())
    }

    /// Looks up the latest `ready` index record for `(document_id, method,
    /// model)`. "Last wins" per the superseding-record invariant: an older
    /// `ready` row for the same key is ignored once a newer one exists.
    pub fn latest_ready_index_record(
        &self,
        document_id: i64,
        method: &str,
        model: &str,
    ) -> Result<Option<IndexRecord>, StorageError> {
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        conn.query_row(
            "SELECT id, document_id, method, model, location, status, error_message, created_at, updated_at
             FROM index_records
             WHERE document_id = ?1 AND method = ?2 AND model = ?3 AND status = 'ready'
             ORDER BY created_at DESC LIMIT 1",
            params![document_id, method, model],
            row_to_index_record,
        )
        .optional()
        .map_err(StorageError::from)
    }

    /// `true` if any `ready` index record exists for `(document_id, method,
    /// model)`, without loading it.
    pub fn has_ready_index(&self, document_id: i64, method: &str, model: &str) -> Result<bool, StorageError> {
        Ok(self.latest_ready_index_record(document_id, method, model)?.is_some())
    }

    /// Inserts a new `pending` job with id `job_id`, owned by `username`.
    pub fn create_job(&self, job_id: &str, username: &str, kind: JobKind) -> Result<(), StorageError> {
        let now = now_unix();
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        conn.execute(
            "INSERT INTO jobs (id, username, kind, status, progress, error_message, result, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 0, NULL, NULL, ?5, ?5)",
            params![job_id, username, kind.as_str(), JobStatus::Pending.as_str(), now],
        )?;
        Ok(())
    }

    /// Updates a job's progress and transitions it to `Processing` if it is
    /// still `Pending`. `progress` is clamped to `[0, 100]`.
    pub fn update_job_progress(&self, job_id: &str, progress: u8) -> Result<(), StorageError> {
        let progress = progress.min(100);
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        conn.execute(
            "UPDATE jobs SET progress = ?1, status = CASE WHEN status = 'pending' THEN 'processing' ELSE status END, updated_at = ?2
             WHERE id = ?3",
            params![i64::from(progress), now_unix(), job_id],
        )?;
        Ok(())
    }

    /// Transitions a job to `Ready` with progress `100` and the given
    /// serialized result payload.
    pub fn mark_job_ready(&self, job_id: &str, result: &str) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        conn.execute(
            "UPDATE jobs SET status = ?1, progress = 100, result = ?2, updated_at = ?3 WHERE id = ?4",
            params![JobStatus::Ready.as_str(), result, now_unix(), job_id],
        )?;
        Ok(())
    }

    /// Transitions a job to `Failed`, recording why.
    pub fn mark_job_failed(&self, job_id: &str, error_message: &str) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        conn.execute(
            "UPDATE jobs SET status = ?1, error_message = ?2, updated_at = ?3 WHERE id = ?4",
            params![JobStatus::Failed.as_str(), error_message, now_unix(), job_id],
        )?;
        Ok(())
    }

    /// Fetches a job by id.
    pub fn get_job(&self, job_id: &str) -> Result<Option<Job>, StorageError> {
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        conn.query_row(
            "SELECT id, username, kind, status, progress, error_message, result, created_at, updated_at
             FROM jobs WHERE id = ?1",
            params![job_id],
            row_to_job,
        )
        .optional()
        .map_err(StorageError::from)
    }

    /// Creates a new analysis batch row.
    pub fn create_analysis_batch(
        &self,
        batch_id: &str,
        username: &str,
        query: &str,
        total_variants: usize,
    ) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        conn.execute(
            "INSERT INTO analysis_batches (batch_id, username, query, total_variants, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![batch_id, username, query, i64::try_from(total_variants).unwrap_or(i64::MAX), now_unix()],
        )?;
        Ok(())
    }

    /// Fetches an analysis batch by id.
    pub fn get_analysis_batch(&self, batch_id: &str) -> Result<Option<AnalysisBatch>, StorageError> {
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        conn.query_row(
            "SELECT batch_id, username, query, total_variants, created_at FROM analysis_batches WHERE batch_id = ?1",
            params![batch_id],
            |row| {
                let total_variants: i64 = row.get(3)?;
                Ok(AnalysisBatch {
                    batch_id: row.get(0)?,
                    username: row.get(1)?,
                    query: row.get(2)?,
                    total_variants: usize::try_from(total_variants).unwrap_or(0),
                    created_at: row.get(4)?,
                })
            },
        )
        .optional()
        .map_err(StorageError::from)
    }

    /// Records one variant's outcome within a batch. `answer` /
    /// `retrieved_chunks` are `None` on failure; `error_message` is `None`
    /// on success.
    pub fn insert_analysis_result(
        &self,
        batch_id: &str,
        method: &str,
        model: &str,
        answer: Option<&str>,
        retrieved_chunks: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<i64, StorageError> {
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        conn.execute(
            "INSERT INTO analysis_results (batch_id, method, model, answer, retrieved_chunks, error_message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![batch_id, method, model, answer, retrieved_chunks, error_message, now_unix()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Lists every result recorded for `batch_id`, insertion order (the
    /// order variants completed in, not a fixed variant ordering).
    pub fn analysis_results_for(&self, batch_id: &str) -> Result<Vec<AnalysisResult>, StorageError> {
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut stmt = conn.prepare(
            "SELECT id, batch_id, method, model, answer, retrieved_chunks, error_message, created_at
             FROM analysis_results WHERE batch_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![batch_id], |row| {
            Ok(AnalysisResult {
                id: row.get(0)?,
                batch_id: row.get(1)?,
                method: row.get(2)?,
                model: row.get(3)?,
                answer: row.get(4)?,
                retrieved_chunks: row.get(5)?,
                error_message: row.get(6)?,
                created_at: row.get(7)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StorageError::from)
    }
}

fn row_to_index_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<IndexRecord> {
    let status_str: String = row.get(5)?;
    Ok(IndexRecord {
        id: row.get(0)?,
        document_id: row.get(1)?,
        method: row.get(2)?,
        model: row.get(3)?,
        location: row.get(4)?,
        status: IndexStatus::parse(&status_str),
        error_message: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<Job> {
    let kind_str: String = row.get(2)?;
    let status_str: String = row.get(3)?;
    let progress: i64 = row.get(4)?;
    Ok(Job {
        id: row.get(0)?,
        username: row.get(1)?,
        kind: JobKind::parse(&kind_str),
        status: JobStatus::parse(&status_str),
        progress: u8::try_from(progress.clamp(0, 100)).unwrap_or(100),
        error_message: row.get(5)?,
        result: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Corpus {
        Corpus::open_in_memory().unwrap_or_else(|e| panic!("{e}"))
    }

    #[test]
    fn test_insert_and_get_document() {
        let corpus = corpus();
        let doc = Document::new("alice", "notes.md", "hello world");
        let id = corpus.insert_document(&doc).unwrap_or_else(|e| panic!("{e}"));
        let loaded = corpus.get_document(id).unwrap_or_else(|e| panic!("{e}")).unwrap_or_else(|| panic!("missing"));
        assert_eq!(loaded.username, "alice");
        assert_eq!(loaded.content, "hello world");
    }

    #[test]
    fn test_documents_for_orders_newest_first() {
        let corpus = corpus();
        let first = Document::with_ingested_at("alice", "a.md", "a", 100);
        let second = Document::with_ingested_at("alice", "b.md", "b", 200);
        corpus.insert_document(&first).unwrap_or_else(|e| panic!("{e}"));
        corpus.insert_document(&second).unwrap_or_else(|e| panic!("{e}"));

        let docs = corpus.documents_for("alice").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].path, "b.md");
    }

    #[test]
    fn test_index_record_lifecycle_and_last_wins() {
        let corpus = corpus();
        let doc = Document::new("alice", "notes.md", "content");
        let doc_id = corpus.insert_document(&doc).unwrap_or_else(|e| panic!("{e}"));

        let first = corpus
            .create_index_record(doc_id, "dense", "gpt-4o-mini", "/root/alice/alice_1_dense_aaaaaa.idx")
            .unwrap_or_else(|e| panic!("{e}"));
        assert!(!corpus.has_ready_index(doc_id, "dense", "gpt-4o-mini").unwrap_or_else(|e| panic!("{e}")));

        corpus.mark_index_ready(first).unwrap_or_else(|e| panic!("{e}"));
        assert!(corpus.has_ready_index(doc_id, "dense", "gpt-4o-mini").unwrap_or_else(|e| panic!("{e}")));

        std::thread::sleep(std::time::Duration::from_millis(10));
        let second = corpus
            .create_index_record(doc_id, "dense", "gpt-4o-mini", "/root/alice/alice_1_dense_bbbbbb.idx")
            .unwrap_or_else(|e| panic!("{e}"));
        corpus.mark_index_ready(second).unwrap_or_else(|e| panic!("{e}"));

        let latest = corpus
            .latest_ready_index_record(doc_id, "dense", "gpt-4o-mini")
            .unwrap_or_else(|e| panic!("{e}"))
            .unwrap_or_else(|| panic!("missing"));
        assert_eq!(latest.id, second);
    }

    #[test]
    fn test_failed_record_is_not_ready() {
        let corpus = corpus();
        let doc = Document::new("alice", "notes.md", "content");
        let doc_id = corpus.insert_document(&doc).unwrap_or_else(|e| panic!("{e}"));
        let record = corpus
            .create_index_record(doc_id, "sparse", "gpt-4o-mini", "/root/alice/alice_1_sparse_cccccc.idx")
            .unwrap_or_else(|e| panic!("{e}"));
        corpus.mark_index_failed(record, "disk full").unwrap_or_else(|e| panic!("{e}"));
        assert!(!corpus.has_ready_index(doc_id, "sparse", "gpt-4o-mini").unwrap_or_else(|e| panic!("{e}")));
    }

    #[test]
    fn test_job_lifecycle_progress_then_ready() {
        let corpus = corpus();
        corpus.create_job("job-1", "alice", JobKind::Ingest).unwrap_or_else(|e| panic!("{e}"));
        let job = corpus.get_job("job-1").unwrap_or_else(|e| panic!("{e}")).unwrap_or_else(|| panic!("missing"));
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0);

        corpus.update_job_progress("job-1", 40).unwrap_or_else(|e| panic!("{e}"));
        let job = corpus.get_job("job-1").unwrap_or_else(|e| panic!("{e}")).unwrap_or_else(|| panic!("missing"));
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.progress, 40);

        corpus.mark_job_ready("job-1", r#"{"ok":true}"#).unwrap_or_else(|e| panic!("{e}"));
        let job = corpus.get_job("job-1").unwrap_or_else(|e| panic!("{e}")).unwrap_or_else(|| panic!("missing"));
        assert_eq!(job.status, JobStatus::Ready);
        assert_eq!(job.progress, 100);
        assert_eq!(job.result.as_deref(), Some(r#"{"ok":true}"#));
    }

    #[test]
    fn test_job_failure_records_error_message() {
        let corpus = corpus();
        corpus.create_job("job-2", "bob", JobKind::Query).unwrap_or_else(|e| panic!("{e}"));
        corpus.mark_job_failed("job-2", "provider unavailable").unwrap_or_else(|e| panic!("{e}"));
        let job = corpus.get_job("job-2").unwrap_or_else(|e| panic!("{e}")).unwrap_or_else(|| panic!("missing"));
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some("provider unavailable"));
    }

    #[test]
    fn test_missing_job_is_none() {
        let corpus = corpus();
        assert!(corpus.get_job("nope").unwrap_or_else(|e| panic!("{e}")).is_none());
    }

    #[test]
    fn test_analysis_batch_and_results_round_trip() {
        let corpus = corpus();
        corpus.create_analysis_batch("batch-1", "alice", "what is rust", 2).unwrap_or_else(|e| panic!("{e}"));
        let batch = corpus.get_analysis_batch("batch-1").unwrap_or_else(|e| panic!("{e}")).unwrap_or_else(|| panic!("missing"));
        assert_eq!(batch.username, "alice");
        assert_eq!(batch.total_variants, 2);

        corpus
            .insert_analysis_result("batch-1", "sparse", "gpt-4o-mini", Some("answer one"), Some(r#"["a"]"#), None)
            .unwrap_or_else(|e| panic!("{e}"));
        corpus
            .insert_analysis_result("batch-1", "dense", "gpt-4o-mini", None, None, Some("timed out"))
            .unwrap_or_else(|e| panic!("{e}"));

        let results = corpus.analysis_results_for("batch-1").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].method, "sparse");
        assert_eq!(results[0].answer.as_deref(), Some("answer one"));
        assert_eq!(results[1].method, "dense");
        assert_eq!(results[1].error_message.as_deref(), Some("timed out"));
    }
}
