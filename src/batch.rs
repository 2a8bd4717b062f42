//! The Batch Analysis Orchestrator: fans one query out across every
//! registered [`Pipeline`] variant concurrently and streams progress.
//!
//! Generalizes the donor's `agent::orchestrator::Orchestrator::fan_out`
//! (`Semaphore`-gated `tokio::spawn` fan-out over a `tokio::sync::mpsc`
//! progress channel) from "fan out over chunk batches" to "fan out over
//! every registered Pipeline variant for one query", per SPEC_FULL.md
//! §3.11. One variant's `ProviderFatal` failure never cancels its
//! siblings — every variant's outcome, success or failure, is reported in
//! the final [`BatchEvent::Complete`].

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::error::Error;
use crate::pipeline::Pipeline;
use crate::registry::Registry;
use crate::storage::Corpus;

/// One variant's terminal outcome within a batch.
#[derive(Debug, Clone)]
pub struct VariantOutcome {
    /// `method/model` identity of the variant.
    pub variant: String,
    /// Retrieval method, lowercase.
    pub method: String,
    /// Model string.
    pub model: String,
    /// Synthesized answer, `None` on failure.
    pub answer: Option<String>,
    /// Retrieved chunk texts, empty on failure.
    pub retrieved_chunks: Vec<String>,
    /// Failure message, `None` on success.
    pub error: Option<String>,
}

impl VariantOutcome {
    const fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// A progress or terminal event emitted while a batch runs, replacing the
/// donor's imperative per-event WebSocket `.send()` with values drained
/// from an `mpsc` channel (per SPEC_FULL.md §8 redesign notes).
#[derive(Debug, Clone)]
pub enum BatchEvent {
    /// The batch has been accepted and `total_variants` pipelines will run.
    Initializing {
        /// Number of variants fanned out across.
        total_variants: usize,
    },
    /// One variant has started running.
    VariantStarted {
        /// The variant's `method/model` identity.
        variant: String,
    },
    /// One variant has finished, successfully or not.
    VariantResult {
        /// The variant's terminal outcome.
        outcome: VariantOutcome,
    },
    /// Every variant has finished.
    Complete {
        /// The batch's persisted identifier.
        batch_id: String,
        /// Every variant's terminal outcome, in completion order.
        results: Vec<VariantOutcome>,
    },
}

/// The result of a fully-completed batch query.
#[derive(Debug, Clone)]
pub struct BatchResult {
    /// The persisted batch identifier.
    pub batch_id: String,
    /// Every variant's terminal outcome.
    pub results: Vec<VariantOutcome>,
}

impl BatchResult {
    /// Number of variants that succeeded.
    #[must_use]
    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }
}

/// Fans a query out across every [`Registry`]-registered variant.
pub struct BatchOrchestrator {
    registry: Arc<Registry>,
    semaphore: Arc<Semaphore>,
}

impl BatchOrchestrator {
    /// Builds an orchestrator over `registry`, capping in-flight variant
    /// queries at `max_concurrency` (the same knob that bounds
    /// `JobManager`'s worker pool, so batch queries cannot starve
    /// concurrent single-variant queries — see SPEC_FULL.md §4).
    #[must_use]
    pub fn new(registry: Arc<Registry>, max_concurrency: usize) -> Self {
        Self { registry, semaphore: Arc::new(Semaphore::new(max_concurrency.max(1))) }
    }

    /// Runs `query` against every registered variant for `username`,
    /// returning an event receiver callers can drain for incremental
    /// progress and a join handle resolving to the final [`BatchResult`]
    /// once every variant (and the batch's persistence) has completed.
    ///
    /// Every individual variant failure is captured as a
    /// [`VariantOutcome`] rather than aborting the batch; only a corpus
    /// failure while creating or persisting the batch record itself
    /// surfaces as `Err` on the join handle.
    pub fn run_all(
        &self,
        corpus: Arc<Corpus>,
        username: impl Into<String>,
        query: impl Into<String>,
    ) -> (mpsc::Receiver<BatchEvent>, JoinHandle<Result<BatchResult, Error>>) {
        let username = username.into();
        let query = query.into();
        let pipelines = self.registry.all();
        let semaphore = self.semaphore.clone();
        let (tx, rx) = mpsc::channel(pipelines.len().max(1) + 1);

        let handle = tokio::spawn(run_batch(corpus, username, query, pipelines, semaphore, tx));
        (rx, handle)
    }
}

async fn run_batch(
    corpus: Arc<Corpus>,
    username: String,
    query: String,
    pipelines: Vec<Arc<Pipeline>>,
    semaphore: Arc<Semaphore>,
    tx: mpsc::Sender<BatchEvent>,
) -> Result<BatchResult, Error> {
    let batch_id = crate::new_id();
    corpus.create_analysis_batch(&batch_id, &username, &query, pipelines.len())?;

    let _ = tx.send(BatchEvent::Initializing { total_variants: pipelines.len() }).await;

    let mut handles = Vec::with_capacity(pipelines.len());
    for pipeline in pipelines {
        let semaphore = semaphore.clone();
        let username = username.clone();
        let query = query.clone();
        let tx = tx.clone();
        handles.push(tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire().await else {
                return VariantOutcome {
                    variant: pipeline.variant(),
                    method: pipeline.method().as_str().to_string(),
                    model: pipeline.model().to_string(),
                    answer: None,
                    retrieved_chunks: Vec::new(),
                    error: Some("semaphore closed".to_string()),
                };
            };
            let variant = pipeline.variant();
            let _ = tx.send(BatchEvent::VariantStarted { variant: variant.clone() }).await;

            let outcome = match pipeline.run(&username, &query).await {
                Ok(result) => VariantOutcome {
                    variant: variant.clone(),
                    method: pipeline.method().as_str().to_string(),
                    model: pipeline.model().to_string(),
                    answer: Some(result.answer),
                    retrieved_chunks: result.retrieved_chunks.into_iter().map(|c| c.content).collect(),
                    error: None,
                },
                Err(err) => VariantOutcome {
                    variant: variant.clone(),
                    method: pipeline.method().as_str().to_string(),
                    model: pipeline.model().to_string(),
                    answer: None,
                    retrieved_chunks: Vec::new(),
                    error: Some(err.to_string()),
                },
            };
            let _ = tx.send(BatchEvent::VariantResult { outcome: outcome.clone() }).await;
            outcome
        }));
    }
    drop(tx);

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        let outcome = handle.await.unwrap_or_else(|join_err| VariantOutcome {
            variant: "unknown".to_string(),
            method: "unknown".to_string(),
            model: "unknown".to_string(),
            answer: None,
            retrieved_chunks: Vec::new(),
            error: Some(format!("task join failed: {join_err}")),
        });
        results.push(outcome);
    }

    for outcome in &results {
        let chunks_json = serde_json::to_string(&outcome.retrieved_chunks).ok();
        corpus.insert_analysis_result(
            &batch_id,
            &outcome.method,
            &outcome.model,
            outcome.answer.as_deref(),
            chunks_json.as_deref(),
            outcome.error.as_deref(),
        )?;
    }

    Ok(BatchResult { batch_id, results })
}
