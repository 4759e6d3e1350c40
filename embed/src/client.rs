//! Embedding provider trait and OpenAI-backed implementation.

use async_trait::async_trait;
use model::retry::{RetryConfig, RetryExecutor};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::warn;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding provider request failed: {0}")]
    Request(String),
    #[error("embedding provider returned an unexpected response: {0}")]
    Response(String),
    #[error("embedding provider rate limited the request")]
    RateLimited,
}

impl EmbeddingError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Request(_) | Self::RateLimited)
    }
}

/// A provider of text embeddings, abstracted so the engine never depends
/// directly on a specific vendor API.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Embed a single text, returning an L2-normalizable vector.
    ///
    /// # Errors
    /// Returns an error if the provider call fails after retries.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed a batch of texts in one provider request where supported.
    /// The default implementation embeds one at a time.
    ///
    /// # Errors
    /// Returns an error if any underlying call fails.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

#[derive(Debug, Serialize)]
struct OpenAiEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbedResponse {
    data: Vec<OpenAiEmbedDatum>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbedDatum {
    embedding: Vec<f32>,
    index: usize,
}

/// Embedding client backed by the OpenAI embeddings endpoint.
pub struct OpenAiEmbeddingClient {
    client: Client,
    api_key: String,
    model: String,
    retry: RetryExecutor,
}

impl OpenAiEmbeddingClient {
    /// # Errors
    /// Returns an error if `OPENAI_API_KEY` is not set.
    pub fn new() -> anyhow::Result<Self> {
        let api_key = env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let model = env::var("EMBEDDING_MODEL_NAME").unwrap_or_else(|_| "text-embedding-3-large".to_string());
        let retry_config = RetryConfig::from_env("EMBED_RETRY");
        Ok(Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .map_err(|e| anyhow::anyhow!("failed to build HTTP client: {e}"))?,
            api_key,
            model,
            retry: RetryExecutor::new(retry_config),
        })
    }

    async fn call(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let request = OpenAiEmbedRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post("https://api.openai.com/v1/embeddings")
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| EmbeddingError::Request(e.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(EmbeddingError::RateLimited);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Response(format!("{status}: {body}")));
        }

        let mut parsed: OpenAiEmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Response(e.to_string()))?;

        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| normalize(d.embedding)).collect())
    }
}

/// L2-normalize an embedding vector so downstream cosine-via-inner-product
/// math (`engine::ann`, `engine::lsh`) can assume unit length. A zero
/// vector is returned unchanged rather than divided by zero.
fn normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let texts = vec![text.to_string()];
        let mut results = self.embed_batch(&texts).await?;
        results.pop().ok_or_else(|| EmbeddingError::Response("empty embedding response".into()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.retry
            .execute(|| self.call(texts), EmbeddingError::is_retryable)
            .await
    }
}

/// Embedding client wrapping another client with a concurrency cap,
/// typically 1-2 permits to respect a provider's own concurrency limits,
/// distinct from the merge client's wider semaphore.
pub struct SemaphoreBoundedEmbeddingClient<C> {
    inner: C,
    permits: Arc<Semaphore>,
}

impl<C: EmbeddingClient> SemaphoreBoundedEmbeddingClient<C> {
    #[must_use]
    pub fn new(inner: C, permits: Arc<Semaphore>) -> Self {
        Self { inner, permits }
    }
}

#[async_trait]
impl<C: EmbeddingClient> EmbeddingClient for SemaphoreBoundedEmbeddingClient<C> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .expect("embedding semaphore is never closed");
        self.inner.embed(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .expect("embedding semaphore is never closed");
        self.inner.embed_batch(texts).await
    }
}

/// Lets an `Arc<dyn EmbeddingClient>` be used anywhere a concrete
/// `EmbeddingClient` is expected, so the job manager can wrap one shared
/// trait object in the semaphore/cache decorators below without an extra
/// adapter type.
#[async_trait]
impl EmbeddingClient for Arc<dyn EmbeddingClient> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        (**self).embed(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        (**self).embed_batch(texts).await
    }
}

/// Deterministic in-memory embedding client for tests: hashes each text
/// into a small fixed-dimension vector so cosine similarity is stable
/// across runs without any network dependency.
pub struct MockEmbeddingClient {
    dims: usize,
}

impl MockEmbeddingClient {
    #[must_use]
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

impl Default for MockEmbeddingClient {
    fn default() -> Self {
        Self::new(16)
    }
}

#[async_trait]
impl EmbeddingClient for MockEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vec = vec![0f32; self.dims];
        for (i, byte) in text.bytes().enumerate() {
            vec[i % self.dims] += f32::from(byte);
        }
        let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vec {
                *v /= norm;
            }
        }
        Ok(vec)
    }
}

/// Embedding client that always fails, for exercising fallback/error paths.
pub struct FailingEmbeddingClient;

#[async_trait]
impl EmbeddingClient for FailingEmbeddingClient {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        warn!("FailingEmbeddingClient invoked");
        Err(EmbeddingError::Request("simulated failure".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_client_is_deterministic() {
        let client = MockEmbeddingClient::new(8);
        let a = client.embed("hello world").await.unwrap();
        let b = client.embed("hello world").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn mock_client_produces_unit_vectors() {
        let client = MockEmbeddingClient::new(8);
        let v = client.embed("some text").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn semaphore_bounded_client_still_embeds_under_contention() {
        let client = SemaphoreBoundedEmbeddingClient::new(MockEmbeddingClient::new(8), Arc::new(Semaphore::new(1)));
        let (a, b) = tokio::join!(client.embed("x"), client.embed("y"));
        assert!(a.is_ok() && b.is_ok());
    }

    #[tokio::test]
    async fn failing_client_always_errors() {
        let client = FailingEmbeddingClient;
        assert!(client.embed("x").await.is_err());
    }

    #[tokio::test]
    async fn default_batch_embeds_each_text() {
        let client = MockEmbeddingClient::new(4);
        let texts = vec!["a".to_string(), "b".to_string()];
        let out = client.embed_batch(&texts).await.unwrap();
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn normalize_scales_to_unit_length() {
        let v = normalize(vec![3.0, 4.0]);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn normalize_leaves_zero_vector_unchanged() {
        let v = normalize(vec![0.0, 0.0]);
        assert_eq!(v, vec![0.0, 0.0]);
    }
}
