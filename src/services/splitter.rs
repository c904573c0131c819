//! Token-budget splitting shared by every document processor.
//!
//! Text is split on blank lines into paragraphs and paragraphs are packed
//! greedily into chunks. A paragraph that alone exceeds the budget is broken
//! into sentences, and a sentence that alone exceeds it is cut into raw
//! windows of `max_tokens` token ids.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use super::tokens::TokenCounter;
use crate::error::TokenizerError;

static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{2,}").expect("valid regex"));

const PARAGRAPH_JOINER: &str = "\n\n";
const SENTENCE_JOINER: &str = " ";

/// Paragraph, sentence, raw-token cascade bound to one budget.
#[derive(Debug, Clone)]
pub struct ChunkSplitter {
    counter: TokenCounter,
    max_tokens: usize,
}

impl ChunkSplitter {
    pub fn new(counter: TokenCounter, max_tokens: usize) -> Self {
        Self {
            counter,
            max_tokens: max_tokens.max(1),
        }
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    pub fn counter(&self) -> &TokenCounter {
        &self.counter
    }

    /// Split, returning the whole text as one chunk if the encoder fails.
    pub fn split_fail_soft(&self, text: &str) -> Vec<String> {
        match self.split(text) {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!(error = %e, "Chunk splitting failed, keeping text as a single chunk");
                vec![text.to_string()]
            }
        }
    }

    /// Split, propagating encoder failures.
    pub fn split(&self, text: &str) -> Result<Vec<String>, TokenizerError> {
        let mut out = Vec::new();
        let mut current = String::new();

        for paragraph in PARAGRAPH_BREAK.split(text) {
            let paragraph_tokens = self.count(paragraph)?;

            if paragraph_tokens > self.max_tokens {
                flush(&mut out, &mut current);
                self.split_paragraph(paragraph, &mut out)?;
                continue;
            }

            if current.is_empty() {
                current.push_str(paragraph);
                continue;
            }

            let combined = format!("{current}{PARAGRAPH_JOINER}{paragraph}");
            if self.count(&combined)? <= self.max_tokens {
                current = combined;
            } else {
                flush(&mut out, &mut current);
                current.push_str(paragraph);
            }
        }
        flush(&mut out, &mut current);

        let chunks: Vec<String> = out
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();

        debug!(
            chunks = chunks.len(),
            max_tokens = self.max_tokens,
            "Split text"
        );
        Ok(chunks)
    }

    fn split_paragraph(&self, paragraph: &str, out: &mut Vec<String>) -> Result<(), TokenizerError> {
        let mut buffer = String::new();

        for sentence in split_sentences(paragraph) {
            let sentence_tokens = self.count(sentence)?;

            if sentence_tokens > self.max_tokens {
                flush(out, &mut buffer);
                self.split_raw(sentence, out)?;
                continue;
            }

            if buffer.is_empty() {
                buffer.push_str(sentence);
                continue;
            }

            let combined = format!("{buffer}{SENTENCE_JOINER}{sentence}");
            if self.count(&combined)? <= self.max_tokens {
                buffer = combined;
            } else {
                flush(out, &mut buffer);
                buffer.push_str(sentence);
            }
        }
        flush(out, &mut buffer);
        Ok(())
    }

    fn split_raw(&self, sentence: &str, out: &mut Vec<String>) -> Result<(), TokenizerError> {
        let ids = self.counter.encode(sentence)?;
        for window in ids.chunks(self.max_tokens) {
            out.push(self.counter.decode(window)?);
        }
        Ok(())
    }

    fn count(&self, text: &str) -> Result<usize, TokenizerError> {
        self.counter.encode(text).map(|ids| ids.len())
    }
}

fn flush(out: &mut Vec<String>, buffer: &mut String) {
    if !buffer.is_empty() {
        out.push(std::mem::take(buffer));
    }
}

/// Split after `.`, `!` or `?` when followed by whitespace. The whitespace
/// run between sentences is dropped; the punctuation stays with its sentence.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let Some(&(next_i, next_c)) = chars.peek() else {
            continue;
        };
        if !next_c.is_whitespace() {
            continue;
        }

        let end = i + c.len_utf8();
        sentences.push(&text[start..end]);

        let mut resume = next_i;
        while let Some(&(j, w)) = chars.peek() {
            if !w.is_whitespace() {
                break;
            }
            resume = j + w.len_utf8();
            chars.next();
        }
        start = resume;
    }

    if start < text.len() {
        sentences.push(&text[start..]);
    }

    sentences.into_iter().filter(|s| !s.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splitter(max_tokens: usize) -> ChunkSplitter {
        ChunkSplitter::new(TokenCounter::char_level(), max_tokens)
    }

    fn non_whitespace(text: &str) -> String {
        text.chars().filter(|c| !c.is_whitespace()).collect()
    }

    #[test]
    fn test_split_sentences() {
        assert_eq!(
            split_sentences("One. Two!  Three?\nFour"),
            vec!["One.", "Two!", "Three?", "Four"]
        );
        assert_eq!(split_sentences("3.14 is pi."), vec!["3.14 is pi."]);
        assert_eq!(split_sentences("끝났다. 다음 문장"), vec!["끝났다.", "다음 문장"]);
        assert!(split_sentences("").is_empty());
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let chunks = splitter(100).split("Hello world.\n\nSecond paragraph.").unwrap();
        assert_eq!(chunks, vec!["Hello world.\n\nSecond paragraph."]);
    }

    #[test]
    fn test_paragraphs_are_packed_until_budget() {
        let text = format!("{}\n\n{}\n\n{}", "a".repeat(40), "b".repeat(40), "c".repeat(40));
        let chunks = splitter(90).split(&text).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], format!("{}\n\n{}", "a".repeat(40), "b".repeat(40)));
        assert_eq!(chunks[1], "c".repeat(40));
    }

    #[test]
    fn test_oversized_paragraph_falls_back_to_sentences() {
        let sentence = format!("{}.", "x".repeat(29));
        let paragraph = vec![sentence.clone(); 10].join(" ");
        let text = format!("intro\n\n{paragraph}\n\noutro");

        let chunks = splitter(100).split(&text).unwrap();
        assert_eq!(chunks[0], "intro");
        assert_eq!(chunks.last().unwrap(), "outro");
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 100, "chunk too long: {}", chunk.len());
        }
        // Three 30-char sentences plus two joining spaces fit in 100.
        assert_eq!(chunks[1], vec![sentence.clone(); 3].join(" "));
    }

    #[test]
    fn test_oversized_sentence_is_cut_into_token_windows() {
        let text = "y".repeat(250);
        let chunks = splitter(100).split(&text).unwrap();
        let lengths: Vec<usize> = chunks.iter().map(|c| c.chars().count()).collect();
        assert_eq!(lengths, vec![100, 100, 50]);
    }

    #[test]
    fn test_budget_invariant_and_content_preserved() {
        let text = "ETF는 상장지수펀드입니다. 주식처럼 거래됩니다! 수수료가 낮나요? 네.\n\n\
                    분산 투자가 쉽습니다.\n\n\n"
            .repeat(20);
        let chunks = splitter(64).split(&text).unwrap();

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 64);
            assert_eq!(chunk.trim(), chunk);
            assert!(!chunk.is_empty());
        }
        assert_eq!(non_whitespace(&chunks.concat()), non_whitespace(&text));
    }

    #[test]
    fn test_empty_and_blank_input() {
        assert!(splitter(10).split("").unwrap().is_empty());
        assert!(splitter(10).split("\n\n\n   \n\n").unwrap().is_empty());
    }

    #[test]
    fn test_counter_split_into_safe_chunks_uses_cascade() {
        let counter = TokenCounter::char_level();
        let text = "z".repeat(15_000);
        let chunks = counter.split_into_safe_chunks(&text, crate::services::SAFE_CHUNK_SIZE);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 7000);
        assert_eq!(chunks[2].len(), 1000);
    }
}
