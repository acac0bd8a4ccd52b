use regex::Regex;
use std::sync::OnceLock;

/// Splits on runs of whitespace or ASCII punctuation
fn separator_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\s[:punct:]]+").expect("valid separator regex"))
}

/// Invisible formatting characters (RLM, LRM, zero-width joiners, ...)
fn format_char_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\p{Cf}").expect("valid format-char regex"))
}

/// Split text into raw tokens, preserving order.
/// Pieces may be empty; [`normalize`] decides what survives.
pub fn tokenize(text: &str) -> Vec<&str> {
    separator_regex().split(text).collect()
}

/// Normalize a raw token into an index term.
/// An empty result means the token must be dropped.
pub fn normalize(token: &str) -> String {
    let stripped = format_char_regex().replace_all(token, "");
    let lowered = stripped.to_lowercase();
    lowered
        .trim_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace())
        .to_string()
}

/// Tokenize and normalize, dropping empty terms.
/// Build and query paths both go through here so positions line up.
pub fn analyze(text: &str) -> Vec<String> {
    tokenize(text)
        .into_iter()
        .map(normalize)
        .filter(|t| !t.is_empty())
        .collect()
}

/// Text used for the name index: the file name without its last extension
pub fn name_stem(file_name: &str) -> &str {
    match file_name.rfind('.') {
        Some(idx) => &file_name[..idx],
        None => file_name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_splits_on_punctuation_and_space() {
        let tokens: Vec<_> = tokenize("hello, world! foo-bar")
            .into_iter()
            .filter(|t| !t.is_empty())
            .collect();
        assert_eq!(tokens, vec!["hello", "world", "foo", "bar"]);
    }

    #[test]
    fn test_normalize_lowercases_and_strips() {
        assert_eq!(normalize("Hello"), "hello");
        assert_eq!(normalize("\u{200F}שלום"), "שלום");
        assert_eq!(normalize("  "), "");
    }

    #[test]
    fn test_analyze_preserves_order_and_drops_empty() {
        assert_eq!(
            analyze("  The cat, sat on THE mat."),
            vec!["the", "cat", "sat", "on", "the", "mat"]
        );
        assert!(analyze("...").is_empty());
    }

    #[test]
    fn test_analyze_keeps_non_ascii_words() {
        assert_eq!(analyze("כלב גדול"), vec!["כלב", "גדול"]);
    }

    #[test]
    fn test_name_stem() {
        assert_eq!(name_stem("report.txt"), "report");
        assert_eq!(name_stem("archive.tar.gz"), "archive.tar");
        assert_eq!(name_stem("Makefile"), "Makefile");
    }
}
