mod embedding;
pub mod pipeline;
mod splitter;
mod text_splitter;
mod tokens;
pub mod vector_store;

pub use embedding::{EmbeddingClient, EmbeddingService};
pub use pipeline::{IngestPipeline, SimilarityStore, check_dimension, get_embedding};
pub use splitter::{ChunkSplitter, split_sentences};
pub use text_splitter::{DEFAULT_SEPARATORS, RecursiveCharacterSplitter};
pub use tokens::{
    CHUNK_OVERLAP, CharEncoder, MAX_TOKENS, SAFE_CHUNK_SIZE, TokenCounter, TokenEncoder,
    calculate_safe_chunk_size,
};
pub use vector_store::{MemoryBackend, QueryRequest, VectorIndex, create_index};
