//! Query-optimization validation: takes the LLM's rewritten query and
//! decides whether it is safe to use, falling back to the original query
//! on any validation failure.
//!
//! Grounded in `original_source/.../base_pipeline.py::optimize_query`'s
//! validation chain (strip quotes, reject multi-line, reject oversized
//! responses), ported as a pure function so it is independently testable
//! from the LLM call that produces the candidate string.

const MAX_OPTIMIZED_QUERY_LEN: usize = 200;

const LEADING_PHRASES: &[&str] =
    &["here is", "here's", "optimized query:", "search query:", "query:", "rewritten query:"];

/// Validates and cleans up a candidate query rewrite. Returns `original`
/// unchanged if `candidate` fails any validation step.
#[must_use]
pub fn validate_optimized_query<'a>(original: &'a str, candidate: &'a str) -> &'a str {
    let trimmed = candidate.trim();

    if trimmed.is_empty() {
        return original;
    }
    if trimmed.lines().count() > 1 {
        return original;
    }
    if trimmed.len() > MAX_OPTIMIZED_QUERY_LEN {
        return original;
    }

    let stripped = strip_quotes(trimmed);
    let stripped = strip_leading_phrase(stripped);

    if stripped.is_empty() { original } else { stripped }
}

fn strip_quotes(s: &str) -> &str {
    let s = s.strip_prefix('"').unwrap_or(s);
    let s = s.strip_suffix('"').unwrap_or(s);
    let s = s.strip_prefix('\'').unwrap_or(s);
    s.strip_suffix('\'').unwrap_or(s)
}

fn strip_leading_phrase(s: &str) -> &str {
    let lower = s.to_lowercase();
    for phrase in LEADING_PHRASES {
        if lower.starts_with(phrase) {
            return s[phrase.len()..].trim_start();
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_clean_rewrite() {
        assert_eq!(validate_optimized_query("what is rust", "rust programming language features"), "rust programming language features");
    }

    #[test]
    fn test_strips_surrounding_quotes() {
        assert_eq!(validate_optimized_query("q", "\"rust features\""), "rust features");
    }

    #[test]
    fn test_strips_leading_phrase() {
        assert_eq!(validate_optimized_query("q", "Here is the optimized query: rust features"), "the optimized query: rust features");
    }

    #[test]
    fn test_strips_exact_known_phrase() {
        assert_eq!(validate_optimized_query("q", "Search query: rust features"), "rust features");
    }

    #[test]
    fn test_rejects_multiline() {
        assert_eq!(validate_optimized_query("original", "line one\nline two"), "original");
    }

    #[test]
    fn test_rejects_oversized() {
        let huge = "a".repeat(300);
        assert_eq!(validate_optimized_query("original", &huge), "original");
    }

    #[test]
    fn test_rejects_empty() {
        assert_eq!(validate_optimized_query("original", "   "), "original");
    }
}
