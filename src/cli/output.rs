//! Output formatting: human-readable text or machine-readable JSON,
//! selected by the global `--format` flag.

use serde::Serialize;

/// Selects how command results are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text, tailored per command.
    Text,
    /// Pretty-printed JSON, stable across commands for scripting
    /// (`rag-rs --format json query ... | jq '.answer'`).
    Json,
}

impl OutputFormat {
    /// Parses the `--format` flag value. Anything other than `"json"`
    /// (case-insensitively) falls back to `Text`, matching the teacher's
    /// permissive CLI flag handling.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("json") { Self::Json } else { Self::Text }
    }
}

/// Renders `value` as pretty JSON under `Json`, or calls `text` to build
/// the human-readable rendering under `Text`. JSON serialization failure
/// falls back to the text rendering rather than erroring the whole
/// command over a display-only concern.
pub fn render<T: Serialize>(format: OutputFormat, value: &T, text: impl FnOnce() -> String) -> String {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(value).unwrap_or_else(|_| text()),
        OutputFormat::Text => text(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(OutputFormat::parse("JSON"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("json"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("text"), OutputFormat::Text);
        assert_eq!(OutputFormat::parse("anything-else"), OutputFormat::Text);
    }

    #[test]
    fn test_render_text_ignores_value() {
        let out = render(OutputFormat::Text, &42, || "forty-two".to_string());
        assert_eq!(out, "forty-two");
    }

    #[test]
    fn test_render_json_serializes_value() {
        let out = render(OutputFormat::Json, &42, || "forty-two".to_string());
        assert_eq!(out, "42");
    }
}
