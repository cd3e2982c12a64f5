mod config;
mod document;
mod ingest;
mod search;

pub use config::{
    AnswerConfig, CONFIG_ENV_VAR, Config, DEFAULT_EMBEDDING_DIMENSION, DEFAULT_EMBEDDING_URL,
    EmbeddingConfig, EmbeddingProviderKind, HnswParams, IndexConfig, IndexingConfig, IvfParams,
    IvfPqParams, LshParams, RetrievalConfig,
};
pub use document::{Chunk, ChunkType, Document, IndexEntry, Metadata, MetadataValue};
pub use ingest::{DocumentStatus, FailedChunk, IngestReport, IngestStats};
pub use search::{ContextChunk, OutputFormat, Retrieval, RetrievalStatus, RetrievedChunk};
