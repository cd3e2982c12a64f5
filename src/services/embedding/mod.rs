//! Embedding providers: the remote HTTP client, a seeded mock, and a retry decorator.

mod http;
mod mock;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::EmbeddingError;
use crate::models::{EmbeddingConfig, EmbeddingProviderKind};
use crate::utils::retry::{RetryConfig, with_retry};

pub use http::{HealthResponse, HttpEmbeddingClient, InstructionType};
pub use mock::MockEmbedding;

/// Converts text into fixed-dimension vectors.
///
/// Implementations only produce vectors; callers go through [`embed_checked`]
/// so that every batch is validated the same way regardless of the backend.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Length of every vector this provider returns.
    fn dimension(&self) -> usize;

    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = embed_checked(self, &[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingError::InvalidResponse("empty embedding response".to_string()))
    }

    /// Embed a search query. Providers with query-specific instructions override this.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed(text).await
    }
}

/// Reject empty or whitespace-only inputs before any backend call.
pub fn check_inputs(texts: &[String]) -> Result<(), EmbeddingError> {
    match texts.iter().position(|t| t.trim().is_empty()) {
        Some(index) => Err(EmbeddingError::EmptyInput(index)),
        None => Ok(()),
    }
}

/// Validate a provider's output against its inputs: same count, right length, finite values.
pub fn validate_batch(
    expected: usize,
    dimension: usize,
    vectors: &[Vec<f32>],
) -> Result<(), EmbeddingError> {
    if vectors.len() != expected {
        return Err(EmbeddingError::BatchMismatch {
            expected,
            actual: vectors.len(),
        });
    }

    for (index, vector) in vectors.iter().enumerate() {
        if vector.len() != dimension {
            return Err(EmbeddingError::InvalidVector {
                index,
                reason: format!("expected {dimension} dimensions, got {}", vector.len()),
            });
        }
        if let Some(pos) = vector.iter().position(|v| !v.is_finite()) {
            return Err(EmbeddingError::InvalidVector {
                index,
                reason: format!("non-finite value at component {pos}"),
            });
        }
    }

    Ok(())
}

/// Embed `texts` through `provider`, validating inputs and output.
pub async fn embed_checked<P>(
    provider: &P,
    texts: &[String],
) -> Result<Vec<Vec<f32>>, EmbeddingError>
where
    P: EmbeddingProvider + ?Sized,
{
    if texts.is_empty() {
        return Ok(Vec::new());
    }
    check_inputs(texts)?;

    let vectors = provider.embed_batch(texts).await?;
    validate_batch(texts.len(), provider.dimension(), &vectors)?;
    debug!(provider = provider.name(), count = vectors.len(), "embedded batch");
    Ok(vectors)
}

/// Retries transient failures of the wrapped provider with exponential backoff.
pub struct RetryingProvider {
    inner: Arc<dyn EmbeddingProvider>,
    retry: RetryConfig,
}

impl RetryingProvider {
    pub fn new(inner: Arc<dyn EmbeddingProvider>, retry: RetryConfig) -> Self {
        Self { inner, retry }
    }
}

#[async_trait]
impl EmbeddingProvider for RetryingProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let inner = &self.inner;
        with_retry(&self.retry, || inner.embed_batch(texts))
            .await
            .into_result()
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let inner = &self.inner;
        with_retry(&self.retry, || inner.embed_query(text))
            .await
            .into_result()
    }
}

/// Wrap `inner` so it gets `max_retries` attempts beyond the first one.
fn with_retries(inner: Arc<dyn EmbeddingProvider>, max_retries: u32) -> Arc<dyn EmbeddingProvider> {
    if max_retries == 0 {
        return inner;
    }
    Arc::new(RetryingProvider::new(
        inner,
        RetryConfig::new(max_retries.saturating_add(1)),
    ))
}

/// Build the provider selected by `config.provider`.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    match config.provider {
        EmbeddingProviderKind::Http => {
            let client: Arc<dyn EmbeddingProvider> = Arc::new(HttpEmbeddingClient::new(config)?);
            Ok(with_retries(client, config.max_retries))
        }
        EmbeddingProviderKind::Mock => Ok(Arc::new(MockEmbedding::new(
            config.dimension as usize,
            config.mock_seed,
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Returns whatever vectors it was given, regardless of input.
    struct FixedProvider {
        dimension: usize,
        vectors: Vec<Vec<f32>>,
    }

    #[async_trait]
    impl EmbeddingProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(self.vectors.clone())
        }
    }

    struct FlakyProvider {
        calls: AtomicU32,
        failures: u32,
    }

    #[async_trait]
    impl EmbeddingProvider for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        fn dimension(&self) -> usize {
            2
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(EmbeddingError::ConnectionError("refused".into()));
            }
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_rejects_empty_input() {
        let provider = MockEmbedding::new(4, 1);
        let err = embed_checked(&provider, &texts(&["ok", "  "])).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::EmptyInput(1)));
    }

    #[tokio::test]
    async fn test_rejects_count_mismatch() {
        let provider = FixedProvider {
            dimension: 2,
            vectors: vec![vec![0.0, 1.0]],
        };
        let err = embed_checked(&provider, &texts(&["a", "b"])).await.unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::BatchMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[tokio::test]
    async fn test_rejects_wrong_dimension_and_nan() {
        let provider = FixedProvider {
            dimension: 2,
            vectors: vec![vec![0.0, 1.0], vec![0.0]],
        };
        let err = embed_checked(&provider, &texts(&["a", "b"])).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::InvalidVector { index: 1, .. }));

        let provider = FixedProvider {
            dimension: 2,
            vectors: vec![vec![f32::NAN, 1.0]],
        };
        let err = embed_checked(&provider, &texts(&["a"])).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::InvalidVector { index: 0, .. }));
    }

    #[tokio::test]
    async fn test_empty_batch_skips_provider() {
        let provider = FixedProvider {
            dimension: 2,
            vectors: vec![vec![0.0, 1.0]],
        };
        assert!(embed_checked(&provider, &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retrying_provider_recovers() {
        let flaky: Arc<dyn EmbeddingProvider> = Arc::new(FlakyProvider {
            calls: AtomicU32::new(0),
            failures: 2,
        });
        let provider = RetryingProvider::new(
            flaky,
            RetryConfig::new(3).with_initial_delay(Duration::from_millis(1)),
        );
        let vectors = embed_checked(&provider, &texts(&["a", "b"])).await.unwrap();
        assert_eq!(vectors.len(), 2);
    }

    #[tokio::test]
    async fn test_retrying_provider_gives_up() {
        let flaky: Arc<dyn EmbeddingProvider> = Arc::new(FlakyProvider {
            calls: AtomicU32::new(0),
            failures: 10,
        });
        let provider = RetryingProvider::new(
            flaky,
            RetryConfig::new(2).with_initial_delay(Duration::from_millis(1)),
        );
        let err = provider.embed_batch(&texts(&["a"])).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::ConnectionError(_)));
    }

    #[tokio::test]
    async fn test_max_retries_counts_attempts_after_the_first() {
        let cases = [(0, 1, false, 1), (1, 1, true, 2), (2, 5, false, 3)];
        for (max_retries, failures, succeeds, calls) in cases {
            let flaky = Arc::new(FlakyProvider {
                calls: AtomicU32::new(0),
                failures,
            });
            let provider = with_retries(flaky.clone(), max_retries);
            let result = provider.embed_batch(&texts(&["a"])).await;
            assert_eq!(result.is_ok(), succeeds, "max_retries={max_retries}");
            assert_eq!(flaky.calls.load(Ordering::SeqCst), calls, "max_retries={max_retries}");
        }
    }

    #[test]
    fn test_create_provider_mock() {
        let config = EmbeddingConfig {
            provider: EmbeddingProviderKind::Mock,
            dimension: 16,
            ..Default::default()
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.dimension(), 16);
        assert_eq!(provider.name(), "mock");
    }

    #[test]
    fn test_create_provider_http() {
        let provider = create_provider(&EmbeddingConfig::default()).unwrap();
        assert_eq!(provider.name(), "http");
        assert_eq!(provider.dimension(), 384);
    }
}
