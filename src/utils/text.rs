//! Text validity helpers shared by the document processors.

use std::sync::LazyLock;

use regex::Regex;

/// Minimum non-whitespace characters for meaningful content.
pub const MIN_CONTENT_LENGTH: usize = 10;

/// Share of invalid characters above which extracted text is rejected.
pub const MAX_INVALID_RATIO: f64 = 0.1;

static EXCESS_NEWLINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Control characters (other than line breaks and tabs) and U+FFFD.
pub fn is_invalid_char(c: char) -> bool {
    c == '\u{FFFD}' || (c.is_control() && !matches!(c, '\n' | '\r' | '\t'))
}

pub fn invalid_char_count(text: &str) -> usize {
    text.chars().filter(|&c| is_invalid_char(c)).count()
}

/// True when invalid characters make up more than `MAX_INVALID_RATIO` of `text`.
pub fn is_too_noisy(text: &str) -> bool {
    let total = text.chars().count();
    total > 0 && invalid_char_count(text) as f64 / total as f64 > MAX_INVALID_RATIO
}

pub fn non_whitespace_count(content: &str) -> usize {
    content.chars().filter(|c| !c.is_whitespace()).count()
}

/// Check if content has meaningful text (not just whitespace).
pub fn has_meaningful_content(content: &str) -> bool {
    non_whitespace_count(content) >= MIN_CONTENT_LENGTH
}

/// Collapse runs of three or more newlines to a single blank line.
pub fn collapse_blank_lines(text: &str) -> String {
    EXCESS_NEWLINES.replace_all(text, "\n\n").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_meaningful_content() {
        assert!(!has_meaningful_content(""));
        assert!(!has_meaningful_content("   \n\n   "));
        assert!(!has_meaningful_content("short"));
        assert!(!has_meaningful_content("123456789"));
        assert!(has_meaningful_content("1234567890"));
        assert!(has_meaningful_content("ETF는 상장지수펀드입니다."));
    }

    #[test]
    fn test_invalid_chars() {
        assert!(is_invalid_char('\u{0}'));
        assert!(is_invalid_char('\u{FFFD}'));
        assert!(!is_invalid_char('\n'));
        assert!(!is_invalid_char('\t'));
        assert!(!is_invalid_char('가'));
        assert_eq!(invalid_char_count("ab\u{1}\u{2}"), 2);
    }

    #[test]
    fn test_noise_ratio_boundary() {
        // 1 of 10 is exactly 10%, which is allowed.
        assert!(!is_too_noisy("abcdefghi\u{1}"));
        assert!(is_too_noisy("abcdefgh\u{1}\u{2}"));
        assert!(!is_too_noisy(""));
    }

    #[test]
    fn test_collapse_blank_lines() {
        assert_eq!(collapse_blank_lines("a\n\n\n\nb\n\nc"), "a\n\nb\n\nc");
    }
}
