//! The per-variant query pipeline: [`Method`] identity, the Variant Table,
//! query-rewrite validation, and [`Pipeline`] itself — the capability set
//! (`init`/`run`/`build_index`/`is_initialized`) a [`crate::registry::Registry`]
//! constructs one of per (method, model) entry.

mod method;
mod pipeline;
mod query_opt;

pub use method::{Method, VARIANT_MODELS, variant_key, variant_table};
pub use pipeline::{Pipeline, QueryResult};
pub use query_opt::validate_optimized_query;
