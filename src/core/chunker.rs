//! Splits document text into [`Chunk`]s using a configurable strategy.
//!
//! Three strategies are supported, selected by [`ChunkStrategy`]:
//! - `Fixed` — byte-window chunking with overlap, grapheme-boundary safe.
//! - `Paragraph` — packs blank-line-delimited paragraphs up to a target size.
//! - `Semantic` — splits on sentence boundaries, embeds every sentence, and
//!   walks adjacent pairs merging them into the same chunk while their
//!   cosine similarity exceeds a threshold.
//!
//! Invariant: every byte of the source document is covered by exactly one
//! chunk (modulo the configured `Fixed` overlap); an empty document yields
//! zero chunks; a document smaller than the target size yields one chunk.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use unicode_segmentation::UnicodeSegmentation;

use super::chunk::Chunk;
use crate::embedding::{Embedder, cosine_similarity};

/// Errors produced while chunking.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChunkError {
    /// `Fixed` strategy's `overlap` was >= `size`, which would never advance.
    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({size})")]
    OverlapTooLarge {
        /// Configured overlap.
        overlap: usize,
        /// Configured chunk size.
        size: usize,
    },
    /// A configured size of zero can never produce a chunk.
    #[error("chunk target size must be greater than zero")]
    ZeroSize,
}

/// Chunking strategy, selected per (method) Variant Table entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChunkStrategy {
    /// Byte-window chunking with overlap. `size` and `overlap` are in bytes.
    Fixed {
        /// Target chunk size in bytes.
        size: usize,
        /// Overlap between consecutive chunks in bytes.
        overlap: usize,
    },
    /// Packs blank-line-delimited paragraphs up to `target_size` bytes.
    Paragraph {
        /// Target chunk size in bytes.
        target_size: usize,
    },
    /// Splits on sentence boundaries, embeds each sentence, and merges
    /// adjacent sentences into the same chunk while the cosine similarity
    /// between them exceeds `threshold` (0.0-1.0; higher means stricter,
    /// producing more/smaller chunks). If embedding the sentences fails,
    /// falls back to one sentence per chunk.
    Semantic {
        /// Cosine-similarity boundary threshold.
        threshold: f32,
    },
}

impl ChunkStrategy {
    /// Short lowercase name used in index file naming
    /// (`<user>_<docId>_<method_lower>_<hex>.<ext>`).
    #[must_use]
    pub const fn method_name(&self) -> &'static str {
        match self {
            Self::Fixed { .. } => "fixed",
            Self::Paragraph { .. } => "paragraph",
            Self::Semantic { .. } => "semantic",
        }
    }
}

/// Splits `content` into chunks for `buffer_id` using `strategy`.
///
/// `embedder` is only consulted by [`ChunkStrategy::Semantic`]; the other
/// strategies ignore it.
///
/// # Errors
///
/// Returns [`ChunkError`] if the strategy's configuration is invalid
/// (zero-sized target, or overlap >= size for `Fixed`).
pub fn chunk_text(
    buffer_id: i64,
    content: &str,
    strategy: ChunkStrategy,
    embedder: &dyn Embedder,
) -> Result<Vec<Chunk>, ChunkError> {
    if content.is_empty() {
        return Ok(Vec::new());
    }

    match strategy {
        ChunkStrategy::Fixed { size, overlap } => chunk_fixed(buffer_id, content, size, overlap),
        ChunkStrategy::Paragraph { target_size } => chunk_paragraph(buffer_id, content, target_size),
        ChunkStrategy::Semantic { threshold } => chunk_semantic(buffer_id, content, threshold, embedder),
    }
}

fn chunk_fixed(buffer_id: i64, content: &str, size: usize, overlap: usize) -> Result<Vec<Chunk>, ChunkError> {
    if size == 0 {
        return Err(ChunkError::ZeroSize);
    }
    if overlap >= size {
        return Err(ChunkError::OverlapTooLarge { overlap, size });
    }

    // Grapheme boundaries so a chunk split never lands inside a multi-byte
    // cluster; `content.len()` stays the byte length used for the offsets.
    let boundaries: Vec<usize> = content
        .grapheme_indices(true)
        .map(|(i, _)| i)
        .chain(std::iter::once(content.len()))
        .collect();

    let mut chunks = Vec::new();
    let mut index = 0usize;
    let mut start_pos = 0usize;

    while start_pos < boundaries.len() - 1 {
        let start = boundaries[start_pos];
        // Walk forward from start_pos until adding the next grapheme would
        // exceed `size` bytes, or we run out of graphemes.
        let mut end_pos = start_pos;
        while end_pos < boundaries.len() - 1 && boundaries[end_pos + 1] - start <= size {
            end_pos += 1;
        }
        if end_pos == start_pos {
            // A single grapheme already exceeds `size`; take it anyway so
            // we always make progress.
            end_pos = start_pos + 1;
        }
        let end = boundaries[end_pos];

        chunks.push(Chunk::new(buffer_id, index, (start, end), &content[start..end]));
        index += 1;

        if end_pos >= boundaries.len() - 1 {
            break;
        }

        // Advance start_pos by (chunk length - overlap), measured in bytes,
        // by walking backward from end_pos.
        let advance_to_byte = end.saturating_sub(overlap).max(start + 1);
        start_pos = boundaries
            .iter()
            .position(|&b| b >= advance_to_byte)
            .unwrap_or(end_pos);
    }

    Ok(chunks)
}

fn chunk_paragraph(buffer_id: i64, content: &str, target_size: usize) -> Result<Vec<Chunk>, ChunkError> {
    if target_size == 0 {
        return Err(ChunkError::ZeroSize);
    }

    let paragraph_re = paragraph_splitter();
    let mut paragraphs: Vec<(usize, usize)> = Vec::new();
    let mut cursor = 0usize;
    for m in paragraph_re.find_iter(content) {
        if m.start() > cursor {
            paragraphs.push((cursor, m.start()));
        }
        cursor = m.end();
    }
    if cursor < content.len() {
        paragraphs.push((cursor, content.len()));
    }
    if paragraphs.is_empty() {
        paragraphs.push((0, content.len()));
    }

    pack_spans(buffer_id, content, &paragraphs, target_size)
}

fn chunk_semantic(
    buffer_id: i64,
    content: &str,
    threshold: f32,
    embedder: &dyn Embedder,
) -> Result<Vec<Chunk>, ChunkError> {
    let sentence_re = sentence_splitter();
    let mut spans: Vec<(usize, usize)> = Vec::new();
    let mut cursor = 0usize;
    for m in sentence_re.find_iter(content) {
        spans.push((cursor, m.end()));
        cursor = m.end();
    }
    if cursor < content.len() {
        spans.push((cursor, content.len()));
    }
    if spans.is_empty() {
        spans.push((0, content.len()));
    }

    if spans.len() == 1 {
        let (start, end) = spans[0];
        return Ok(vec![Chunk::new(buffer_id, 0, (start, end), &content[start..end])]);
    }

    let sentences: Vec<String> = spans.iter().map(|&(s, e)| content[s..e].to_string()).collect();

    // A boundary is cut *before* sentence i+1 when the cosine similarity
    // between sentences i and i+1 is at or below `threshold`. If embedding
    // fails (or returns the wrong count), every pair is treated as a
    // boundary: one sentence per chunk.
    let cut_after: Vec<bool> = match embedder.embed_batch(&sentences) {
        Ok(vectors) if vectors.len() == sentences.len() => (0..spans.len() - 1)
            .map(|i| cosine_similarity(&vectors[i], &vectors[i + 1]) <= threshold)
            .collect(),
        Ok(_) | Err(_) => {
            tracing::warn!("semantic chunking: embedding sentences failed, falling back to one sentence per chunk");
            vec![true; spans.len() - 1]
        }
    };

    let mut chunks = Vec::new();
    let mut index = 0usize;
    let (mut current_start, mut current_end) = spans[0];
    for (i, &is_boundary) in cut_after.iter().enumerate() {
        let (next_start, next_end) = spans[i + 1];
        if is_boundary {
            chunks.push(Chunk::new(buffer_id, index, (current_start, current_end), &content[current_start..current_end]));
            index += 1;
            current_start = next_start;
            current_end = next_end;
        } else {
            current_end = next_end;
        }
    }
    chunks.push(Chunk::new(buffer_id, index, (current_start, current_end), &content[current_start..current_end]));

    Ok(chunks)
}

/// Packs a sequence of non-overlapping byte spans into chunks of at most
/// `target_size` bytes each, never splitting a span unless it alone exceeds
/// `target_size` (in which case it falls back to `Fixed` chunking for that
/// span only).
fn pack_spans(
    buffer_id: i64,
    content: &str,
    spans: &[(usize, usize)],
    target_size: usize,
) -> Result<Vec<Chunk>, ChunkError> {
    let mut chunks = Vec::new();
    let mut index = 0usize;
    let mut current_start: Option<usize> = None;
    let mut current_end = 0usize;

    for &(start, end) in spans {
        if end - start > target_size {
            // Oversized single span: flush what we have, then fall back to
            // Fixed chunking (no overlap) for this span alone.
            if let Some(cs) = current_start.take() {
                chunks.push(Chunk::new(buffer_id, index, (cs, current_end), &content[cs..current_end]));
                index += 1;
            }
            for sub in chunk_fixed(buffer_id, &content[start..end], target_size, 0)? {
                chunks.push(Chunk::new(
                    buffer_id,
                    index,
                    (start + sub.byte_range.0, start + sub.byte_range.1),
                    sub.content,
                ));
                index += 1;
            }
            continue;
        }

        match current_start {
            None => {
                current_start = Some(start);
                current_end = end;
            }
            Some(cs) => {
                if end - cs <= target_size {
                    current_end = end;
                } else {
                    chunks.push(Chunk::new(buffer_id, index, (cs, current_end), &content[cs..current_end]));
                    index += 1;
                    current_start = Some(start);
                    current_end = end;
                }
            }
        }
    }

    if let Some(cs) = current_start {
        chunks.push(Chunk::new(buffer_id, index, (cs, current_end), &content[cs..current_end]));
    }

    Ok(chunks)
}

fn paragraph_splitter() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\n\s*\n+").unwrap_or_else(|e| unreachable!("static regex is valid: {e}"))
    })
}

fn sentence_splitter() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[.!?]+[\s]+").unwrap_or_else(|e| unreachable!("static regex is valid: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::hash::HashEmbedder;
    use test_case::test_case;

    fn embedder() -> HashEmbedder {
        HashEmbedder::new()
    }

    #[test]
    fn test_empty_document_yields_no_chunks() {
        let chunks = chunk_text(1, "", ChunkStrategy::Fixed { size: 10, overlap: 0 }, &embedder())
            .unwrap_or_else(|e| panic!("chunk_text failed: {e}"));
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_small_document_yields_single_chunk() {
        let chunks = chunk_text(1, "hello", ChunkStrategy::Fixed { size: 100, overlap: 0 }, &embedder())
            .unwrap_or_else(|e| panic!("chunk_text failed: {e}"));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "hello");
    }

    #[test]
    fn test_overlap_too_large_is_rejected() {
        let err = chunk_text(1, "hello world", ChunkStrategy::Fixed { size: 5, overlap: 5 }, &embedder())
            .unwrap_err();
        assert_eq!(err, ChunkError::OverlapTooLarge { overlap: 5, size: 5 });
    }

    #[test]
    fn test_fixed_chunking_covers_every_byte() {
        let content = "a".repeat(97);
        let chunks = chunk_text(1, &content, ChunkStrategy::Fixed { size: 10, overlap: 2 }, &embedder())
            .unwrap_or_else(|e| panic!("chunk_text failed: {e}"));
        assert_eq!(chunks[0].byte_range.0, 0);
        assert_eq!(chunks.last().unwrap_or_else(|| unreachable!()).byte_range.1, 97);
        // Indices are sequential starting at 0.
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i);
        }
    }

    #[test_case(10, 0; "no overlap")]
    #[test_case(10, 3; "with overlap")]
    #[test_case(1, 0; "byte at a time")]
    fn test_fixed_chunking_makes_progress(size: usize, overlap: usize) {
        let content = "x".repeat(250);
        let chunks = chunk_text(1, &content, ChunkStrategy::Fixed { size, overlap }, &embedder())
            .unwrap_or_else(|e| panic!("chunk_text failed: {e}"));
        assert!(!chunks.is_empty());
        assert!(chunks.len() < 1000, "chunking did not converge: {} chunks", chunks.len());
    }

    #[test]
    fn test_paragraph_chunking_respects_target_size() {
        let content = "Para one.\n\nPara two is a bit longer than para one.\n\nPara three.";
        let chunks = chunk_text(1, content, ChunkStrategy::Paragraph { target_size: 30 }, &embedder())
            .unwrap_or_else(|e| panic!("chunk_text failed: {e}"));
        assert!(chunks.len() >= 2);
        for c in &chunks {
            assert!(!c.content.trim().is_empty());
        }
    }

    #[test]
    fn test_paragraph_chunking_oversized_paragraph_falls_back_to_fixed() {
        let content = format!("{}\n\nshort", "word ".repeat(50));
        let chunks = chunk_text(1, &content, ChunkStrategy::Paragraph { target_size: 20 }, &embedder())
            .unwrap_or_else(|e| panic!("chunk_text failed: {e}"));
        assert!(chunks.len() > 2);
    }

    #[test]
    fn test_semantic_chunking_splits_on_sentences() {
        let content = "First sentence. Second sentence! Third sentence? Fourth one.";
        // A strict threshold: distinct, mostly non-overlapping sentences
        // should rarely clear it, so every sentence becomes its own chunk.
        let chunks = chunk_text(1, content, ChunkStrategy::Semantic { threshold: 0.9 }, &embedder())
            .unwrap_or_else(|e| panic!("chunk_text failed: {e}"));
        assert!(chunks.len() >= 2);
    }

    #[test]
    fn test_semantic_chunking_merges_similar_adjacent_sentences() {
        // A permissive threshold of -1.0 (below any possible cosine
        // similarity) merges every sentence into a single chunk.
        let content = "First sentence. Second sentence! Third sentence? Fourth one.";
        let chunks = chunk_text(1, content, ChunkStrategy::Semantic { threshold: -1.0 }, &embedder())
            .unwrap_or_else(|e| panic!("chunk_text failed: {e}"));
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_semantic_chunking_single_sentence_is_one_chunk() {
        let content = "Just one sentence here.";
        let chunks = chunk_text(1, content, ChunkStrategy::Semantic { threshold: 0.5 }, &embedder())
            .unwrap_or_else(|e| panic!("chunk_text failed: {e}"));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, content);
    }

    #[test]
    fn test_zero_size_is_rejected() {
        assert_eq!(
            chunk_text(1, "abc", ChunkStrategy::Fixed { size: 0, overlap: 0 }, &embedder()).unwrap_err(),
            ChunkError::ZeroSize
        );
        assert_eq!(
            chunk_text(1, "abc", ChunkStrategy::Paragraph { target_size: 0 }, &embedder()).unwrap_err(),
            ChunkError::ZeroSize
        );
    }

    #[test]
    fn test_deterministic_for_same_input() {
        let content = "The quick brown fox.\n\nJumps over the lazy dog. Again and again!";
        let a = chunk_text(1, content, ChunkStrategy::Semantic { threshold: 0.5 }, &embedder())
            .unwrap_or_else(|e| panic!("chunk_text failed: {e}"));
        let b = chunk_text(1, content, ChunkStrategy::Semantic { threshold: 0.5 }, &embedder())
            .unwrap_or_else(|e| panic!("chunk_text failed: {e}"));
        assert_eq!(a, b);
    }

    proptest::proptest! {
        #[test]
        fn prop_fixed_chunks_cover_content_without_gaps(
            content in "[a-zA-Z0-9 .!?\n]{0,300}",
            size in 1usize..50,
            overlap in 0usize..49,
        ) {
            if overlap < size {
                let chunks = chunk_text(1, &content, ChunkStrategy::Fixed { size, overlap }, &embedder())
                    .unwrap_or_else(|e| panic!("chunk_text failed: {e}"));
                if !content.is_empty() {
                    assert_eq!(chunks[0].byte_range.0, 0);
                    assert_eq!(chunks.last().unwrap_or_else(|| unreachable!()).byte_range.1, content.len());
                }
            }
        }
    }
}
