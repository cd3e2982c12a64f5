mod answer;
mod chunker;
mod embedding;
mod extract;
pub mod index;
mod retriever;

pub use answer::{AnswerSynthesizer, HttpAnswerSynthesizer};
pub use chunker::{BOUNDARY_LOOK_BACK, ChunkSpan, ChunkSpans, TextChunker};
pub use embedding::{
    EmbeddingProvider, HealthResponse, HttpEmbeddingClient, InstructionType, MockEmbedding,
    RetryingProvider, check_inputs, create_provider, embed_checked, validate_batch,
};
pub use extract::{
    ContentKind, Extracted, Extractor, ExtractorRegistry, HtmlExtractor, MarkdownExtractor,
    PlainTextExtractor,
};
pub use index::{AnyIndex, IndexInfo, IndexKind, Neighbor, VectorIndex};
pub use retriever::{ENTRIES_FILE, Retriever, RetrieverOptions, RetrieverStats, STORE_FILE};
