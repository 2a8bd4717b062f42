//! Persistence layer: a SQLite-backed [`corpus::Corpus`] for documents and
//! index-readiness bookkeeping, and a two-file [`index_store::IndexStore`]
//! for the actual retrieval index payloads.

pub mod corpus;
pub mod index_store;

pub use corpus::{AnalysisBatch, AnalysisResult, Corpus, IndexRecord, IndexStatus, Job, JobKind, JobStatus};
pub use index_store::{IndexRecordState, IndexSidecar, IndexStore, gen_disambiguator};
