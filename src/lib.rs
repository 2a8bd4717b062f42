//! rag-rs: a multi-variant retrieval-augmented generation engine.
//!
//! Sparse (BM25), dense (embedding + cosine), hybrid (Reciprocal Rank
//! Fusion), iterative (judged query reformulation), and reranking
//! retrieval, each crossed with a small set of models into a Variant
//! Table. A [`registry::Registry`] eagerly builds one [`pipeline::Pipeline`]
//! per variant; [`jobs::JobManager`] drives ingestion in the background;
//! [`batch::BatchOrchestrator`] fans one query out across every variant at
//! once.

pub mod agent;
pub mod batch;
pub mod cli;
pub mod core;
pub mod embedding;
pub mod error;
pub mod jobs;
pub mod pipeline;
pub mod registry;
pub mod search;
pub mod storage;

/// Generates a UUID-v4 identifier, used for job and batch ids.
///
/// Centralized here (rather than calling `uuid::Uuid::new_v4()` at each
/// call site) so every id-bearing module shares one obvious source of
/// randomness to audit.
#[must_use]
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
