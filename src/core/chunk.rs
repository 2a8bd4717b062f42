//! A chunk of document text produced by the [`crate::core::chunker`].

use serde::{Deserialize, Serialize};

/// One chunk of a document's content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// Database-assigned id, `None` until persisted.
    pub id: Option<i64>,
    /// The document this chunk belongs to.
    pub buffer_id: i64,
    /// 0-based sequential position within the document, used for temporal
    /// reasoning during synthesis.
    pub index: usize,
    /// Byte offset range within the source document.
    pub byte_range: (usize, usize),
    /// The chunk's text content.
    pub content: String,
}

impl Chunk {
    /// Creates a new, not-yet-persisted chunk.
    #[must_use]
    pub fn new(buffer_id: i64, index: usize, byte_range: (usize, usize), content: impl Into<String>) -> Self {
        Self {
            id: None,
            buffer_id,
            index,
            byte_range,
            content: content.into(),
        }
    }

    /// Rough token count estimate (4 bytes/token, the common heuristic for
    /// English prose and code alike).
    #[must_use]
    pub fn token_estimate(&self) -> usize {
        self.content.len().div_ceil(4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_estimate() {
        let chunk = Chunk::new(1, 0, (0, 8), "abcdefgh");
        assert_eq!(chunk.token_estimate(), 2);
    }

    #[test]
    fn test_token_estimate_rounds_up() {
        let chunk = Chunk::new(1, 0, (0, 5), "abcde");
        assert_eq!(chunk.token_estimate(), 2);
    }
}
