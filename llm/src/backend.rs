//! Merge backend trait and Anthropic-backed implementation.
//!
//! The trait seam and mock/failing test doubles follow the pattern used
//! for clustering LLM calls elsewhere in this corpus: production code
//! depends only on `LlmBackend`, so tests exercise the merge pipeline
//! without a live network call.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("merge request failed: {0}")]
    Request(String),
    #[error("merge response was unusable: {0}")]
    Response(String),
    #[error("merge provider rate limited the request")]
    RateLimited,
}

impl MergeError {
    pub(crate) fn is_retryable(&self) -> bool {
        matches!(self, Self::Request(_) | Self::RateLimited)
    }
}

/// A provider of free-text completions used to merge IdeaBlock clusters.
///
/// `complete` takes an already-assembled prompt (system preamble plus the
/// serialized `<ideablock>` fragments for one subcluster) and returns the
/// raw completion text, which the caller parses with the XML codec.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// # Errors
    /// Returns an error if the provider call fails.
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, MergeError>;
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    text: String,
}

/// Merge backend calling the Anthropic Messages API.
pub struct AnthropicMergeClient {
    client: Client,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicMergeClient {
    /// # Errors
    /// Returns an error if `ANTHROPIC_API_KEY` is not set.
    pub fn new() -> anyhow::Result<Self> {
        let api_key = env::var("ANTHROPIC_API_KEY")
            .map_err(|_| anyhow::anyhow!("ANTHROPIC_API_KEY environment variable not set"))?;
        let model = env::var("MERGE_MODEL_NAME").unwrap_or_else(|_| "claude-3-5-sonnet-20241022".to_string());
        Ok(Self {
            client: Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .map_err(|e| anyhow::anyhow!("failed to build HTTP client: {e}"))?,
            api_key,
            model,
            max_tokens: 4096,
        })
    }
}

#[async_trait]
impl LlmBackend for AnthropicMergeClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, MergeError> {
        let request = AnthropicRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| MergeError::Request(e.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(MergeError::RateLimited);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MergeError::Response(format!("{status}: {body}")));
        }

        let parsed: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| MergeError::Response(e.to_string()))?;

        parsed
            .content
            .into_iter()
            .next()
            .map(|c| c.text)
            .ok_or_else(|| MergeError::Response("empty completion".into()))
    }
}

/// Merge backend wrapping another backend with the shared retry executor,
/// so the engine gets the same exponential-backoff behavior the embedding
/// client uses.
pub struct RetryingMergeBackend<B> {
    inner: B,
    retry: model::RetryExecutor,
}

impl<B: LlmBackend> RetryingMergeBackend<B> {
    #[must_use]
    pub fn new(inner: B, retry_config: model::RetryConfig) -> Self {
        Self {
            inner,
            retry: model::RetryExecutor::new(retry_config),
        }
    }
}

#[async_trait]
impl<B: LlmBackend> LlmBackend for RetryingMergeBackend<B> {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, MergeError> {
        self.retry
            .execute(|| self.inner.complete(system, prompt), MergeError::is_retryable)
            .await
    }
}

/// Merge backend wrapping another backend with a process-global
/// concurrency cap: the job manager constructs one `Arc<Semaphore>`
/// (default 5 permits) and shares it across every job's merge calls, so
/// one large job can dominate merge slots but cannot starve the process
/// entirely.
pub struct SemaphoreBoundedBackend<B> {
    inner: B,
    permits: Arc<Semaphore>,
}

impl<B: LlmBackend> SemaphoreBoundedBackend<B> {
    #[must_use]
    pub fn new(inner: B, permits: Arc<Semaphore>) -> Self {
        Self { inner, permits }
    }
}

#[async_trait]
impl<B: LlmBackend> LlmBackend for SemaphoreBoundedBackend<B> {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, MergeError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .expect("merge semaphore is never closed");
        self.inner.complete(system, prompt).await
    }
}

/// Lets an `Arc<dyn LlmBackend>` be used anywhere a concrete `LlmBackend`
/// is expected, so the job manager can wrap one shared trait object in
/// the retry/semaphore decorators above without an extra adapter type.
#[async_trait]
impl LlmBackend for Arc<dyn LlmBackend> {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, MergeError> {
        (**self).complete(system, prompt).await
    }
}

/// Fixed-response backend for tests: returns `response` verbatim and
/// counts how many times it was called.
pub struct MockLlmBackend {
    response: String,
    calls: AtomicUsize,
}

impl MockLlmBackend {
    #[must_use]
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            calls: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmBackend for MockLlmBackend {
    async fn complete(&self, _system: &str, _prompt: &str) -> Result<String, MergeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }
}

/// Backend that always fails, for exercising `merge_failed` recovery
/// paths.
pub struct FailingLlmBackend;

#[async_trait]
impl LlmBackend for FailingLlmBackend {
    async fn complete(&self, _system: &str, _prompt: &str) -> Result<String, MergeError> {
        Err(MergeError::Request("simulated failure".into()))
    }
}
