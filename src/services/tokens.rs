//! Token counting against the embedding model's vocabulary.

use std::ops::Deref;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use tokenizers::Tokenizer;
use tracing::{debug, warn};

use super::splitter::ChunkSplitter;
use crate::error::TokenizerError;
use crate::models::TokenizerConfig;

/// Hard input ceiling of the embedding model.
pub const MAX_TOKENS: usize = 8192;
/// Working budget per chunk, leaving headroom under `MAX_TOKENS`.
pub const SAFE_CHUNK_SIZE: usize = 7000;
pub const CHUNK_OVERLAP: usize = 200;

/// Maps text to token ids and back.
pub trait TokenEncoder: Send + Sync {
    fn encode(&self, text: &str) -> Result<Vec<u32>, TokenizerError>;

    fn decode(&self, ids: &[u32]) -> Result<String, TokenizerError>;
}

impl TokenEncoder for Tokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>, TokenizerError> {
        self.deref()
            .encode(text, false)
            .map(|encoding| encoding.get_ids().to_vec())
            .map_err(|e| TokenizerError::EncodeError(e.to_string()))
    }

    fn decode(&self, ids: &[u32]) -> Result<String, TokenizerError> {
        self.deref()
            .decode(ids, false)
            .map_err(|e| TokenizerError::DecodeError(e.to_string()))
    }
}

/// One token per Unicode scalar value.
///
/// Used when no vocabulary file is configured. BPE never produces more
/// tokens than characters for ordinary text, so budgets measured here hold
/// against the real model too.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharEncoder;

impl TokenEncoder for CharEncoder {
    fn encode(&self, text: &str) -> Result<Vec<u32>, TokenizerError> {
        Ok(text.chars().map(u32::from).collect())
    }

    fn decode(&self, ids: &[u32]) -> Result<String, TokenizerError> {
        ids.iter()
            .map(|&id| {
                char::from_u32(id)
                    .ok_or_else(|| TokenizerError::DecodeError(format!("invalid char id {id}")))
            })
            .collect()
    }
}

static SHARED: OnceLock<TokenCounter> = OnceLock::new();

/// Cheaply clonable handle to a loaded encoder.
#[derive(Clone)]
pub struct TokenCounter {
    encoder: Arc<dyn TokenEncoder>,
}

impl std::fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCounter").finish_non_exhaustive()
    }
}

impl TokenCounter {
    pub fn new(encoder: Arc<dyn TokenEncoder>) -> Self {
        Self { encoder }
    }

    pub fn char_level() -> Self {
        Self::new(Arc::new(CharEncoder))
    }

    pub fn from_file(path: &Path) -> Result<Self, TokenizerError> {
        let tokenizer = Tokenizer::from_file(path)
            .map_err(|e| TokenizerError::LoadError(format!("{}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "Loaded BPE vocabulary");
        Ok(Self::new(Arc::new(tokenizer)))
    }

    pub fn from_config(config: &TokenizerConfig) -> Result<Self, TokenizerError> {
        match config.path {
            Some(ref path) => Self::from_file(path),
            None => Ok(Self::char_level()),
        }
    }

    /// Install the process-wide counter. The first installation wins; later
    /// calls return the already installed one.
    pub fn install(counter: TokenCounter) -> TokenCounter {
        SHARED.get_or_init(|| counter).clone()
    }

    /// The process-wide counter, lazily falling back to the char-level encoder.
    pub fn shared() -> TokenCounter {
        SHARED.get_or_init(Self::char_level).clone()
    }

    pub fn encode(&self, text: &str) -> Result<Vec<u32>, TokenizerError> {
        if text.is_empty() {
            return Ok(Vec::new());
        }
        self.encoder.encode(text)
    }

    pub fn decode(&self, ids: &[u32]) -> Result<String, TokenizerError> {
        if ids.is_empty() {
            return Ok(String::new());
        }
        self.encoder.decode(ids)
    }

    /// Token count; never fails. Encoder errors fall back to the char count.
    pub fn count_tokens(&self, text: &str) -> usize {
        match self.encode(text) {
            Ok(ids) => ids.len(),
            Err(e) => {
                warn!(error = %e, "Token encoding failed, using character count");
                text.chars().count()
            }
        }
    }

    pub fn exceeds_token_limit(&self, text: &str, limit: usize) -> bool {
        self.count_tokens(text) > limit
    }

    /// Cut `text` to at most `max_tokens` leading tokens. May split a word.
    pub fn truncate_to_token_limit(&self, text: &str, max_tokens: usize) -> String {
        let ids = match self.encode(text) {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "Token encoding failed, truncating by characters");
                return text.chars().take(max_tokens).collect();
            }
        };

        if ids.len() <= max_tokens {
            return text.to_string();
        }

        self.decode(&ids[..max_tokens]).unwrap_or_else(|e| {
            warn!(error = %e, "Token decoding failed, truncating by characters");
            text.chars().take(max_tokens).collect()
        })
    }

    /// Split into chunks of at most `max_tokens` tokens using the
    /// paragraph, sentence, raw-token cascade. Never fails: on an internal
    /// error the whole text comes back as a single chunk.
    pub fn split_into_safe_chunks(&self, text: &str, max_tokens: usize) -> Vec<String> {
        ChunkSplitter::new(self.clone(), max_tokens).split_fail_soft(text)
    }
}

/// Chunk size that leaves room for `overlap` inside the safe budget.
pub fn calculate_safe_chunk_size(chunk_size: usize, overlap: usize) -> usize {
    chunk_size.min(SAFE_CHUNK_SIZE.saturating_sub(overlap))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingEncoder;

    impl TokenEncoder for FailingEncoder {
        fn encode(&self, _text: &str) -> Result<Vec<u32>, TokenizerError> {
            Err(TokenizerError::EncodeError("boom".to_string()))
        }

        fn decode(&self, _ids: &[u32]) -> Result<String, TokenizerError> {
            Err(TokenizerError::DecodeError("boom".to_string()))
        }
    }

    #[test]
    fn test_count_tokens() {
        let counter = TokenCounter::char_level();
        assert_eq!(counter.count_tokens(""), 0);
        assert_eq!(counter.count_tokens("abc"), 3);
        assert_eq!(counter.count_tokens("상장지수펀드"), 6);
    }

    #[test]
    fn test_exceeds_token_limit() {
        let counter = TokenCounter::char_level();
        assert!(!counter.exceeds_token_limit("abcd", 4));
        assert!(counter.exceeds_token_limit("abcde", 4));
        assert!(!counter.exceeds_token_limit("", 0));
    }

    #[test]
    fn test_truncate_within_budget_is_unchanged() {
        let counter = TokenCounter::char_level();
        assert_eq!(counter.truncate_to_token_limit("hello", 10), "hello");
        assert_eq!(counter.truncate_to_token_limit("", 10), "");
    }

    #[test]
    fn test_truncate_cuts_to_budget_and_is_idempotent() {
        let counter = TokenCounter::char_level();
        let text = "ETF는 상장지수펀드입니다. 분산 투자에 유리합니다.";
        let once = counter.truncate_to_token_limit(text, 10);
        assert_eq!(counter.count_tokens(&once), 10);
        assert!(text.starts_with(&once));

        let twice = counter.truncate_to_token_limit(&once, 10);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_calculate_safe_chunk_size() {
        assert_eq!(calculate_safe_chunk_size(1000, CHUNK_OVERLAP), 1000);
        assert_eq!(calculate_safe_chunk_size(9000, CHUNK_OVERLAP), 6800);
        assert_eq!(calculate_safe_chunk_size(9000, 8000), 0);
    }

    #[test]
    fn test_failing_encoder_never_panics() {
        let counter = TokenCounter::new(Arc::new(FailingEncoder));
        assert_eq!(counter.count_tokens("abc"), 3);
        assert_eq!(counter.truncate_to_token_limit("abcdef", 2), "ab");

        let text = "first paragraph\n\nsecond paragraph";
        assert_eq!(counter.split_into_safe_chunks(text, 5), vec![text.to_string()]);
    }

    #[test]
    fn test_shared_counter_is_stable() {
        let a = TokenCounter::shared();
        let b = TokenCounter::shared();
        assert_eq!(a.count_tokens("abc"), b.count_tokens("abc"));
    }

    const WORD_LEVEL_VOCABULARY: &str = r#"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": null,
        "pre_tokenizer": { "type": "Whitespace" },
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": { "[UNK]": 0, "alpha": 1, "beta": 2, "gamma": 3, "delta": 4 },
            "unk_token": "[UNK]"
        }
    }"#;

    fn word_level_counter() -> TokenCounter {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokenizer.json");
        std::fs::write(&path, WORD_LEVEL_VOCABULARY).unwrap();
        TokenCounter::from_file(&path).unwrap()
    }

    #[test]
    fn test_vocabulary_file_counts_words() {
        let counter = word_level_counter();
        assert_eq!(counter.count_tokens("alpha beta gamma"), 3);
        assert_eq!(counter.count_tokens("alpha   delta"), 2);
        assert_eq!(counter.encode("beta delta").unwrap(), vec![2, 4]);
        assert_eq!(counter.decode(&[1, 3]).unwrap(), "alpha gamma");
        assert!(counter.exceeds_token_limit("alpha beta gamma", 2));
    }

    #[test]
    fn test_vocabulary_file_raw_windows_stay_within_budget() {
        let counter = word_level_counter();
        let text = "alpha beta gamma delta alpha beta gamma delta alpha beta";
        assert_eq!(counter.count_tokens(text), 10);

        let chunks = counter.split_into_safe_chunks(text, 4);
        assert_eq!(
            chunks,
            vec!["alpha beta gamma delta", "alpha beta gamma delta", "alpha beta"]
        );
        assert!(chunks.iter().all(|c| counter.count_tokens(c) <= 4));
        assert_eq!(counter.truncate_to_token_limit(text, 3), "alpha beta gamma");
    }

    #[test]
    fn test_missing_vocabulary_file() {
        let result = TokenCounter::from_file(Path::new("/nonexistent/tokenizer.json"));
        assert!(matches!(result, Err(TokenizerError::LoadError(_))));
    }
}
