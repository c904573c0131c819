use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_EMBEDDING_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 1536;
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";
pub const DEFAULT_INDEX: &str = "etf-assistant";
pub const DEFAULT_NAMESPACE: &str = "etf-docs";
pub const DEFAULT_TEXT_KEY: &str = "text";
pub const DEFAULT_LANGUAGE: &str = "ko";

pub const ENV_EMBEDDING_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_INDEX_NAME: &str = "VECTOR_INDEX_NAME";
pub const ENV_VECTOR_STORE_URL: &str = "VECTOR_STORE_URL";
pub const ENV_VECTOR_STORE_API_KEY: &str = "VECTOR_STORE_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    #[serde(default)]
    pub tokenizer: TokenizerConfig,

    #[serde(default)]
    pub chunking: ChunkingConfig,
}

impl Config {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("etfdocs").join("config.toml"))
    }

    /// Load the user config (or defaults), then apply `.env` / environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let mut config = match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path)?,
            _ => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::config_path().ok_or_else(|| {
            ConfigError::PathError("could not determine config directory".to_string())
        })?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(ENV_VECTOR_STORE_URL) {
            self.vector_store.url = url;
        }
        if let Ok(key) = std::env::var(ENV_VECTOR_STORE_API_KEY) {
            self.vector_store.api_key = Some(key);
        }
        if let Ok(index) = std::env::var(ENV_INDEX_NAME) {
            self.vector_store.index = index;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let chunking = &self.chunking;
        if chunking.chunk_size == 0 {
            return Err(ConfigError::ValidationError(
                "chunking.chunk_size must be greater than zero".to_string(),
            ));
        }
        if chunking.chunk_overlap >= chunking.chunk_size {
            return Err(ConfigError::ValidationError(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                chunking.chunk_overlap, chunking.chunk_size
            )));
        }
        if self.embedding.dimension == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.dimension must be greater than zero".to_string(),
            ));
        }
        if self.embedding.concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Secrets and identifiers that must be present before talking to the
/// external services.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub embedding_api_key: String,
    pub index_name: String,
}

impl Credentials {
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve credentials through an arbitrary lookup (used by tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ConfigError::MissingEnv(name.to_string()))
        };

        Ok(Self {
            embedding_api_key: required(ENV_EMBEDDING_API_KEY)?,
            index_name: required(ENV_INDEX_NAME)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_url")]
    pub url: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_dimension")]
    pub dimension: u32,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Maximum number of embedding requests in flight at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_embedding_url() -> String {
    DEFAULT_EMBEDDING_URL.to_string()
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_dimension() -> u32 {
    DEFAULT_EMBEDDING_DIMENSION
}

fn default_timeout() -> u64 {
    60
}

fn default_concurrency() -> usize {
    8
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            url: default_embedding_url(),
            model: default_embedding_model(),
            dimension: default_dimension(),
            timeout_secs: default_timeout(),
            concurrency: default_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorDriver {
    #[default]
    Qdrant,
    #[serde(alias = "postgres", alias = "pgvector")]
    PostgreSQL,
    Memory,
}

impl std::fmt::Display for VectorDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VectorDriver::Qdrant => write!(f, "qdrant"),
            VectorDriver::PostgreSQL => write!(f, "postgresql"),
            VectorDriver::Memory => write!(f, "memory"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    #[serde(default)]
    pub driver: VectorDriver,

    #[serde(default = "default_qdrant_url")]
    pub url: String,

    /// Collection (Qdrant) or table (PostgreSQL) name.
    #[serde(default = "default_index")]
    pub index: String,

    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default = "default_text_key")]
    pub text_key: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_pool_max")]
    pub pool_max: u32,
}

fn default_qdrant_url() -> String {
    DEFAULT_QDRANT_URL.to_string()
}

fn default_index() -> String {
    DEFAULT_INDEX.to_string()
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_text_key() -> String {
    DEFAULT_TEXT_KEY.to_string()
}

fn default_pool_max() -> u32 {
    5
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            driver: VectorDriver::default(),
            url: default_qdrant_url(),
            index: default_index(),
            namespace: default_namespace(),
            text_key: default_text_key(),
            api_key: None,
            pool_max: default_pool_max(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenizerConfig {
    /// Path to a `tokenizer.json` with the embedding model's BPE vocabulary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Character budget for the plain-text splitter.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    #[serde(default = "default_min_length")]
    pub min_length: usize,

    #[serde(default = "default_max_length")]
    pub max_length: usize,

    #[serde(default = "default_chunk_overlap")]
    pub overlap: usize,

    #[serde(default = "default_language")]
    pub language: String,
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_min_length() -> usize {
    100
}

fn default_max_length() -> usize {
    1000
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            min_length: default_min_length(),
            max_length: default_max_length(),
            overlap: default_chunk_overlap(),
            language: default_language(),
        }
    }
}
