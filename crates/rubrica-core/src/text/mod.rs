//! Text handling shared by every stage: essay normalization, student-facing
//! tone softening and output escaping.

mod escape;
mod soften;

pub use escape::escape_html;
pub use soften::{soften_student_facing, SoftenerRule, SOFTENER_RULES};

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref LINE_ENDINGS: Regex = Regex::new(r"\r\n?").unwrap();
    /// `(12)` enumeration marker at the start of a line, as produced by OCR.
    static ref LINE_MARKER: Regex = Regex::new(r"(?m)^[ \t]*\(\d{1,3}\)[ \t]*").unwrap();
    /// `comuni-\ncação` style hyphenated line break.
    static ref HYPHEN_BREAK: Regex = Regex::new(r"-[ \t]*\n[ \t]*").unwrap();
    /// Any whitespace, line breaks included, before punctuation.
    static ref SPACE_BEFORE_PUNCT: Regex = Regex::new(r"\s+([,.;:!?])").unwrap();
    static ref DOUBLE_QUOTES: Regex = Regex::new("[\u{201C}\u{201D}]").unwrap();
    static ref SINGLE_QUOTES: Regex = Regex::new("[\u{2018}\u{2019}]").unwrap();
    static ref HORIZONTAL_RUNS: Regex = Regex::new(r"[ \t]{2,}").unwrap();
}

/// Clean raw typed or transcribed essay text.
///
/// Steps run in a fixed order: line endings, line markers, hyphenated breaks,
/// space before punctuation, curly quotes, horizontal whitespace runs, trim.
pub fn normalize(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let t = LINE_ENDINGS.replace_all(raw, "\n");
    let t = LINE_MARKER.replace_all(&t, "");
    let t = HYPHEN_BREAK.replace_all(&t, "");
    let t = SPACE_BEFORE_PUNCT.replace_all(&t, "$1");
    let t = DOUBLE_QUOTES.replace_all(&t, "\"");
    let t = SINGLE_QUOTES.replace_all(&t, "'");
    let t = HORIZONTAL_RUNS.replace_all(&t, " ");
    t.trim().to_string()
}

/// Number of lines containing anything other than whitespace.
pub fn count_non_empty_lines(text: &str) -> usize {
    text.lines().filter(|l| !l.trim().is_empty()).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_cleans_ocr_artifacts() {
        let raw = "(1) A comuni-\r\n(2)  cação , hoje ;  é “vital” e ‘rara’ .\r\n(10)Fim";
        assert_eq!(
            normalize(raw),
            "A comunicação, hoje; é \"vital\" e 'rara'.\nFim"
        );
    }

    #[test]
    fn normalize_pulls_punctuation_back_onto_its_line() {
        let raw = "(3) e a escola\n(4) , por fim\n\n.";
        assert_eq!(normalize(raw), "e a escola, por fim.");
    }

    #[test]
    fn normalize_keeps_inline_parentheses() {
        assert_eq!(normalize("texto (12) meio"), "texto (12) meio");
        assert_eq!(normalize("(1234) não é marcador"), "(1234) não é marcador");
    }

    #[test]
    fn normalize_empty_and_blank() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize(" \t\r\n "), "");
    }

    #[test]
    fn counts_only_non_blank_lines() {
        assert_eq!(count_non_empty_lines("a\n\n  \nb\r\nc"), 3);
        assert_eq!(count_non_empty_lines(""), 0);
    }
}
