//! Embedding provider client and batching for IdeaBlock distillation.

pub mod batch;
pub mod client;

pub use batch::embed_missing;
pub use client::{
    EmbeddingClient, EmbeddingError, FailingEmbeddingClient, MockEmbeddingClient,
    OpenAiEmbeddingClient, SemaphoreBoundedEmbeddingClient,
};
