//! Core data model: documents, chunks, and the chunking strategies that
//! turn one into the other.

mod chunk;
mod chunker;
mod document;

pub use chunk::Chunk;
pub use chunker::{ChunkError, ChunkStrategy, chunk_text};
pub use document::Document;
