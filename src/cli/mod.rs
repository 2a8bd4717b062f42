//! CLI layer for rag-rs.
//!
//! Provides the command-line interface using clap: one subcommand per
//! external interface spec.md names (§6) - ingest, query, analyze, and the
//! job/batch polling endpoints a real HTTP transport would otherwise
//! expose.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::{execute, render_error};
pub use output::OutputFormat;
pub use parser::{Cli, Commands, IngestCommands, MethodArg};
