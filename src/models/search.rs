//! Retrieval models for queries and results.

use serde::{Deserialize, Serialize};

use super::document::{Chunk, Metadata};

/// Output format for CLI results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// Machine-parseable JSON format
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("unknown output format: {}", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Outcome of a retrieval, separate from its hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStatus {
    /// At least one relevant chunk was found.
    Matched,
    /// Content exists, but nothing relevant matched the query.
    NoMatch,
    /// Nothing has been ingested yet.
    NotIngested,
}

/// A hydrated search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    /// Squared L2 distance to the query; lower is more similar.
    pub distance: f32,
}

/// Chunk text and metadata handed to an answer synthesizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextChunk {
    pub text: String,
    pub metadata: Metadata,
}

/// Result of [`Retriever::retrieve`](crate::services::Retriever::retrieve).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Retrieval {
    pub query: String,
    pub status: RetrievalStatus,
    /// Hits ordered by ascending distance.
    pub hits: Vec<RetrievedChunk>,
    pub duration_ms: u64,
}

impl Retrieval {
    pub fn not_ingested(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            status: RetrievalStatus::NotIngested,
            hits: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn from_hits(query: impl Into<String>, hits: Vec<RetrievedChunk>, duration_ms: u64) -> Self {
        let status = if hits.is_empty() {
            RetrievalStatus::NoMatch
        } else {
            RetrievalStatus::Matched
        };
        Self {
            query: query.into(),
            status,
            hits,
            duration_ms,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn context_chunks(&self) -> Vec<ContextChunk> {
        self.hits
            .iter()
            .map(|hit| ContextChunk {
                text: hit.chunk.text.clone(),
                metadata: hit.chunk.metadata.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, text: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            document_id: "doc".to_string(),
            text: text.to_string(),
            sequence_index: 0,
            total_chunks_in_document: 1,
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("yaml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_status_distinguishes_empty_states() {
        let not_ingested = Retrieval::not_ingested("q");
        let no_match = Retrieval::from_hits("q", vec![], 3);
        assert!(not_ingested.is_empty() && no_match.is_empty());
        assert_ne!(not_ingested.status, no_match.status);
        assert_eq!(no_match.status, RetrievalStatus::NoMatch);
    }

    #[test]
    fn test_context_chunks_preserve_order() {
        let retrieval = Retrieval::from_hits(
            "q",
            vec![
                RetrievedChunk {
                    chunk: chunk("a", "first"),
                    distance: 0.1,
                },
                RetrievedChunk {
                    chunk: chunk("b", "second"),
                    distance: 0.4,
                },
            ],
            1,
        );
        assert_eq!(retrieval.status, RetrievalStatus::Matched);
        let context = retrieval.context_chunks();
        assert_eq!(context.len(), 2);
        assert_eq!(context[0].text, "first");
        assert_eq!(context[1].text, "second");
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&RetrievalStatus::NotIngested).unwrap();
        assert_eq!(json, "\"not_ingested\"");
    }
}
