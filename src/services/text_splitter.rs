//! Character-budget splitter for plain-text ingestion.
//!
//! Separators are tried in priority order. Pieces that still exceed the
//! budget are re-split on the next separator; small neighbouring pieces are
//! merged back together with `chunk_overlap` characters of carry-over.

use std::collections::VecDeque;

pub const DEFAULT_SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", "? ", "! "];

#[derive(Debug, Clone)]
pub struct RecursiveCharacterSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl Default for RecursiveCharacterSplitter {
    fn default() -> Self {
        Self::new(1000, 200)
    }
}

impl RecursiveCharacterSplitter {
    /// Overlap is clamped below `chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[must_use]
    pub fn with_separators<I, S>(mut self, separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.separators = separators.into_iter().map(Into::into).collect();
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let position = separators
            .iter()
            .position(|sep| !sep.is_empty() && text.contains(sep.as_str()));

        let Some(position) = position else {
            return self.merge_splits(&[text]);
        };
        let separator = separators[position].as_str();
        let remaining = &separators[position + 1..];

        let mut chunks = Vec::new();
        let mut small: Vec<&str> = Vec::new();

        for piece in text.split_inclusive(separator).filter(|p| !p.is_empty()) {
            if char_len(piece) <= self.chunk_size {
                small.push(piece);
                continue;
            }

            if !small.is_empty() {
                chunks.extend(self.merge_splits(&small));
                small.clear();
            }
            if remaining.is_empty() {
                chunks.extend(trimmed(piece));
            } else {
                chunks.extend(self.split_recursive(piece, remaining));
            }
        }

        if !small.is_empty() {
            chunks.extend(self.merge_splits(&small));
        }

        chunks
    }

    /// Greedily pack pieces up to `chunk_size`, starting each new chunk with
    /// the trailing pieces of the previous one that fit in `chunk_overlap`.
    fn merge_splits(&self, pieces: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);

            if total + len > self.chunk_size && !window.is_empty() {
                chunks.extend(trimmed(&window.iter().copied().collect::<String>()));

                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match window.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }

            window.push_back(piece);
            total += len;
        }

        if !window.is_empty() {
            chunks.extend(trimmed(&window.iter().copied().collect::<String>()));
        }

        chunks
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn trimmed(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_single_chunk() {
        let splitter = RecursiveCharacterSplitter::default();
        assert_eq!(
            splitter.split_text("ETF basics.\n\nLow fees."),
            vec!["ETF basics.\n\nLow fees."]
        );
        assert!(splitter.split_text("").is_empty());
        assert!(splitter.split_text("   \n\n  ").is_empty());
    }

    #[test]
    fn test_paragraphs_split_at_budget() {
        let splitter = RecursiveCharacterSplitter::new(30, 0);
        let text = format!("{}\n\n{}\n\n{}", "a".repeat(20), "b".repeat(20), "c".repeat(5));
        let chunks = splitter.split_text(&text);
        assert_eq!(
            chunks,
            vec!["a".repeat(20), format!("{}\n\n{}", "b".repeat(20), "c".repeat(5))]
        );
    }

    #[test]
    fn test_overlap_carries_trailing_pieces() {
        let splitter = RecursiveCharacterSplitter::new(12, 4);
        let chunks = splitter.split_text("aaa\nbbb\nccc\nddd\neee");
        // Each piece is 4 chars ("aaa\n"); three fit in 12, and one piece of
        // overlap carries into the next chunk.
        assert_eq!(chunks, vec!["aaa\nbbb\nccc", "ccc\nddd\neee"]);
    }

    #[test]
    fn test_oversized_piece_uses_next_separator() {
        let splitter = RecursiveCharacterSplitter::new(25, 0);
        let long_line = "First sentence here. Second sentence here. Third one.";
        let text = format!("short\n\n{long_line}");
        let chunks = splitter.split_text(&text);

        assert_eq!(chunks[0], "short");
        assert_eq!(
            &chunks[1..],
            &["First sentence here.", "Second sentence here.", "Third one."]
        );
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 25);
        }
    }

    #[test]
    fn test_piece_without_separators_is_kept_whole() {
        let splitter = RecursiveCharacterSplitter::new(10, 2);
        let word = "x".repeat(25);
        assert_eq!(splitter.split_text(&word), vec![word.clone()]);
    }

    #[test]
    fn test_overlap_clamped_below_chunk_size() {
        let splitter = RecursiveCharacterSplitter::new(10, 50);
        assert_eq!(splitter.chunk_overlap(), 9);
    }

    #[test]
    fn test_custom_separators() {
        let splitter = RecursiveCharacterSplitter::new(5, 0).with_separators(["|"]);
        assert_eq!(splitter.split_text("ab|cd|ef"), vec!["ab|", "cd|ef"]);
    }
}
