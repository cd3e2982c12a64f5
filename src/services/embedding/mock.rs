//! Deterministic pseudo-random embeddings for tests and offline demos.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::warn;

use super::EmbeddingProvider;
use crate::error::EmbeddingError;
use crate::utils::random::{gaussian_vector, seeded_rng};

/// Maps each text to a unit vector seeded from its hash.
///
/// Vectors carry no semantics: similar texts are not close. Identical text
/// always yields an identical vector for the same seed.
#[derive(Debug, Clone)]
pub struct MockEmbedding {
    dimension: usize,
    seed: u64,
}

impl MockEmbedding {
    pub fn new(dimension: usize, seed: u64) -> Self {
        warn!(
            dimension,
            seed, "mock embeddings enabled; retrieval results will not be meaningful"
        );
        Self { dimension, seed }
    }

    fn text_seed(&self, text: &str) -> u64 {
        let digest = Sha256::digest(text.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        u64::from_le_bytes(bytes) ^ self.seed
    }

    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut rng = seeded_rng(self.text_seed(text));
        let mut vector = gaussian_vector(&mut rng, self.dimension);

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbedding {
    fn name(&self) -> &str {
        "mock"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }
}
