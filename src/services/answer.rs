//! Answer generation from retrieved context.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::AnswerError;
use crate::models::{AnswerConfig, ContextChunk};

/// Produces a natural-language answer from a query and its retrieved context.
#[async_trait]
pub trait AnswerSynthesizer: Send + Sync {
    async fn generate(&self, query: &str, context: &[ContextChunk]) -> Result<String, AnswerError>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    query: &'a str,
    context: &'a [ContextChunk],
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    answer: String,
}

/// Client for a remote `/generate` endpoint.
#[derive(Debug, Clone)]
pub struct HttpAnswerSynthesizer {
    client: Client,
    base_url: String,
}

impl HttpAnswerSynthesizer {
    pub fn new(config: &AnswerConfig) -> Result<Self, AnswerError> {
        let url = config.url.as_deref().ok_or(AnswerError::NotConfigured)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl AnswerSynthesizer for HttpAnswerSynthesizer {
    async fn generate(&self, query: &str, context: &[ContextChunk]) -> Result<String, AnswerError> {
        let url = format!("{}/generate", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&GenerateRequest { query, context })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AnswerError::ServerError(format!("status {}: {}", status, body)));
        }

        let GenerateResponse { answer } = response
            .json()
            .await
            .map_err(|e| AnswerError::ServerError(format!("invalid response: {e}")))?;
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Metadata, MetadataValue};

    #[test]
    fn test_requires_url() {
        assert!(matches!(
            HttpAnswerSynthesizer::new(&AnswerConfig::default()),
            Err(AnswerError::NotConfigured)
        ));
    }

    #[test]
    fn test_url_trimming() {
        let config = AnswerConfig {
            url: Some("http://localhost:9000/".to_string()),
            ..Default::default()
        };
        let synthesizer = HttpAnswerSynthesizer::new(&config).unwrap();
        assert_eq!(synthesizer.base_url(), "http://localhost:9000");
    }

    #[test]
    fn test_request_body_shape() {
        let mut metadata = Metadata::new();
        metadata.insert("source".into(), MetadataValue::from("a.pdf"));
        let context = vec![ContextChunk {
            text: "chunk text".to_string(),
            metadata,
        }];
        let json = serde_json::to_value(GenerateRequest {
            query: "what?",
            context: &context,
        })
        .unwrap();
        assert_eq!(json["query"], "what?");
        assert_eq!(json["context"][0]["text"], "chunk text");
        assert_eq!(json["context"][0]["metadata"]["source"], "a.pdf");
    }
}
