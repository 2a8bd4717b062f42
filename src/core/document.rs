//! Ingested document metadata.

use serde::{Deserialize, Serialize};

/// A document ingested for a user, prior to chunking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Database-assigned id, `None` until persisted.
    pub id: Option<i64>,
    /// Owning user.
    pub username: String,
    /// Source path or logical name the content was ingested from.
    pub path: String,
    /// Free-form content type hint (`"text/plain"`, `"text/markdown"`, …).
    pub content_type: Option<String>,
    /// Raw document text.
    pub content: String,
    /// Unix timestamp (seconds) the document was ingested at.
    pub ingested_at: i64,
}

impl Document {
    /// Creates a new, not-yet-persisted document, stamped with the current
    /// time.
    #[must_use]
    pub fn new(username: impl Into<String>, path: impl Into<String>, content: impl Into<String>) -> Self {
        Self::with_ingested_at(username, path, content, now_unix())
    }

    /// Creates a new, not-yet-persisted document with an explicit ingest
    /// timestamp (for tests and replays).
    #[must_use]
    pub fn with_ingested_at(
        username: impl Into<String>,
        path: impl Into<String>,
        content: impl Into<String>,
        ingested_at: i64,
    ) -> Self {
        Self {
            id: None,
            username: username.into(),
            path: path.into(),
            content_type: None,
            content: content.into(),
            ingested_at,
        }
    }

    /// Sets the content type hint.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Byte length of the document content.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.content.len()
    }
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}
