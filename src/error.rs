//! Error types for the retrieval core.

use thiserror::Error;

use crate::utils::retry::Retryable;

/// Fatal configuration errors. These are never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    #[error("path error: {0}")]
    PathError(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("chunk_overlap ({overlap}) must be smaller than chunk_size ({size}), and chunk_size must be positive")]
    InvalidChunking { size: usize, overlap: usize },

    #[error("embedding dimension mismatch: index expects {expected}, provider declares {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid index parameter: {0}")]
    InvalidParameter(String),
}

/// A single document failed to yield usable text.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("document {0} has no usable text")]
    NoUsableText(String),

    #[error("unsupported content kind: {0}")]
    Unsupported(String),

    #[error("no extractor registered for {0} content")]
    NoExtractor(String),

    #[error("invalid text encoding: {0}")]
    InvalidEncoding(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors related to embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("failed to connect to embedding server: {0}")]
    ConnectionError(String),

    #[error("embedding server error: {0}")]
    ServerError(String),

    #[error("embedding request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding timeout")]
    Timeout,

    #[error("cannot embed empty text (item {0})")]
    EmptyInput(usize),

    #[error("embedding batch returned {actual} vectors for {expected} inputs")]
    BatchMismatch { expected: usize, actual: usize },

    #[error("embedding for item {index} is invalid: {reason}")]
    InvalidVector { index: usize, reason: String },
}

impl Retryable for EmbeddingError {
    fn is_retryable(&self) -> bool {
        match self {
            EmbeddingError::ConnectionError(_) | EmbeddingError::Timeout => true,
            EmbeddingError::ServerError(msg) => {
                msg.contains("503")
                    || msg.contains("502")
                    || msg.contains("504")
                    || msg.contains("429")
                    || msg.to_lowercase().contains("unavailable")
                    || msg.to_lowercase().contains("too many requests")
            }
            EmbeddingError::RequestError(e) => e.is_timeout() || e.is_connect(),
            EmbeddingError::InvalidResponse(_)
            | EmbeddingError::EmptyInput(_)
            | EmbeddingError::BatchMismatch { .. }
            | EmbeddingError::InvalidVector { .. } => false,
        }
    }
}

/// Errors raised by vector index construction, search, and persistence.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid vector: {0}")]
    InvalidVector(String),

    #[error("{0} index must be built before vectors can be added")]
    NotTrained(String),

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("index encoding error: {0}")]
    Encode(#[from] bincode::Error),

    #[error("index metadata error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupt index: {0}")]
    Corrupt(String),

    #[error("index task failed: {0}")]
    Task(String),
}

/// Errors surfaced while ingesting a document.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("document already ingested: {0}")]
    DuplicateDocument(String),

    #[error("unknown document: {0}")]
    UnknownDocument(String),

    #[error("ingestion deadline of {0}ms exceeded")]
    Timeout(u64),

    #[error("index build task failed: {0}")]
    Task(String),
}

/// Generic retrieval failure on a live index.
///
/// Distinct from "no relevant results", which is reported through
/// [`RetrievalStatus`](crate::models::RetrievalStatus).
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("retrieval deadline of {0}ms exceeded")]
    Timeout(u64),

    #[error("search task failed: {0}")]
    Task(String),
}

/// Errors from the answer synthesis collaborator.
#[derive(Debug, Error)]
pub enum AnswerError {
    #[error("no answer service configured")]
    NotConfigured,

    #[error("answer request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("answer service error: {0}")]
    ServerError(String),
}

/// Application-level errors that wrap domain errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("answer error: {0}")]
    Answer(#[from] AnswerError),

    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_error_retryable() {
        assert!(EmbeddingError::Timeout.is_retryable());
        assert!(EmbeddingError::ConnectionError("refused".into()).is_retryable());
        assert!(EmbeddingError::ServerError("status 503: busy".into()).is_retryable());
        assert!(!EmbeddingError::ServerError("status 400: bad".into()).is_retryable());
        assert!(!EmbeddingError::EmptyInput(0).is_retryable());
        assert!(
            !EmbeddingError::BatchMismatch {
                expected: 2,
                actual: 1
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_chunking_error_message() {
        let err = ConfigError::InvalidChunking {
            size: 10,
            overlap: 10,
        };
        assert!(err.to_string().contains("chunk_overlap (10)"));
    }

    #[test]
    fn test_app_error_wraps_domain_errors() {
        fn fails() -> Result<(), AppError> {
            Err(IngestError::UnknownDocument("d".into()))?
        }
        let err = fails().unwrap_err();
        assert!(matches!(err, AppError::Ingest(IngestError::UnknownDocument(_))));
        assert_eq!(err.to_string(), "ingest error: unknown document: d");
    }
}
