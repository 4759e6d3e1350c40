//! Job orchestration, checkpointing, embedding cache, metrics, and
//! configuration for IdeaBlock distillation (C9, C11, C12).

pub mod cache;
pub mod checkpoint;
pub mod config;
pub mod manager;
pub mod metrics;

pub use cache::{build_embedding_cache, CachingEmbeddingClient, EmbeddingCache, InMemoryEmbeddingCache, PostgresEmbeddingCache};
pub use checkpoint::{read_checkpoint, write_checkpoint, JobCheckpoint};
pub use config::{DistillConfig, PoolConfig};
pub use manager::{JobManager, JobStatsOut, JobSubmission, JobView, ResultBlock, SubmissionBlock};
pub use metrics::{metrics, DistillMetrics};
