//! Environment-sourced configuration surface.
//!
//! One struct per subsystem, following the `PoolConfig`/`RetryConfig`
//! convention: defaults baked in, overridden field-by-field by `{NAME}`
//! environment variables, never a bare `std::env::var` call scattered
//! through engine code.

use engine::IterationConfig;
use model::RetryConfig;
use std::path::PathBuf;
use std::time::Duration;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_or_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Connection pool tunables for the Postgres-backed embedding cache.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub min_connections: u32,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: 1,
            max_connections: 10,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            min_connections: env_or("POOL_MIN_CONNECTIONS", default.min_connections),
            max_connections: env_or("POOL_MAX_CONNECTIONS", default.max_connections),
            acquire_timeout: Duration::from_secs(env_or("POOL_ACQUIRE_TIMEOUT", default.acquire_timeout.as_secs())),
        }
    }
}

/// Top-level service configuration, covering every environment variable
/// the distillation service reads plus its ambient-stack additions
/// (logging, metrics, checkpointing).
#[derive(Debug, Clone)]
pub struct DistillConfig {
    pub host: String,
    pub port: u16,

    pub embedding_provider_url: Option<String>,
    pub embedding_model_name: String,
    pub merge_provider_url: Option<String>,
    pub merge_model_name: String,

    pub initial_threshold: f32,
    pub threshold_increment: f32,
    pub max_threshold: f32,
    pub iteration_budget: u32,
    pub max_cluster_size_for_llm: usize,
    pub louvain_node_threshold: usize,
    pub use_lsh: bool,
    pub lsh_activation: usize,
    pub max_similarity_neighbors: usize,

    pub llm_parallel_threads: usize,
    pub merge_retry_max_attempts: usize,

    pub job_timeout_seconds: i64,
    pub job_max_concurrent: usize,
    pub job_checkpoint_dir: PathBuf,

    pub database_url: Option<String>,
    pub pool: PoolConfig,
    pub embed_retry: RetryConfig,

    pub healthz_model_name: String,
    pub healthz_embedding_model_name: String,
}

impl Default for DistillConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,

            embedding_provider_url: None,
            embedding_model_name: "text-embedding-3-large".into(),
            merge_provider_url: None,
            merge_model_name: "claude-3-5-sonnet-20241022".into(),

            initial_threshold: 0.55,
            threshold_increment: 0.01,
            max_threshold: 0.98,
            iteration_budget: 4,
            max_cluster_size_for_llm: 20,
            louvain_node_threshold: 1000,
            use_lsh: true,
            lsh_activation: 50,
            max_similarity_neighbors: 10,

            llm_parallel_threads: 5,
            merge_retry_max_attempts: 3,

            job_timeout_seconds: 1200,
            job_max_concurrent: 4,
            job_checkpoint_dir: PathBuf::from("./checkpoints"),

            database_url: None,
            pool: PoolConfig::default(),
            embed_retry: RetryConfig::default(),

            healthz_model_name: "claude-3-5-sonnet-20241022".into(),
            healthz_embedding_model_name: "text-embedding-3-large".into(),
        }
    }
}

impl DistillConfig {
    /// Load configuration from environment variables, falling back to
    /// documented defaults for anything unset or unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            host: env_or_string("HOST", &default.host),
            port: env_or("PORT", default.port),

            embedding_provider_url: std::env::var("EMBEDDING_PROVIDER_URL").ok(),
            embedding_model_name: env_or_string("EMBEDDING_MODEL_NAME", &default.embedding_model_name),
            merge_provider_url: std::env::var("MERGE_PROVIDER_URL").ok(),
            merge_model_name: env_or_string("MERGE_MODEL_NAME", &default.merge_model_name),

            initial_threshold: env_or("INITIAL_SIMILARITY_THRESHOLD", default.initial_threshold),
            threshold_increment: env_or("SIMILARITY_INCREASE_PER_ITERATION", default.threshold_increment),
            max_threshold: env_or("MAX_SIMILARITY_THRESHOLD", default.max_threshold),
            iteration_budget: env_or("ITERATION_BUDGET", default.iteration_budget),
            max_cluster_size_for_llm: env_or("MAX_CLUSTER_SIZE_FOR_LLM", default.max_cluster_size_for_llm),
            louvain_node_threshold: env_or("LOUVAIN_NODE_THRESHOLD", default.louvain_node_threshold),
            use_lsh: env_or("USE_LSH", default.use_lsh),
            lsh_activation: env_or("LSH_ACTIVATION_THRESHOLD", default.lsh_activation),
            max_similarity_neighbors: env_or("MAX_SIMILARITY_NEIGHBORS", default.max_similarity_neighbors),

            llm_parallel_threads: env_or("LLM_PARALLEL_THREADS", default.llm_parallel_threads),
            merge_retry_max_attempts: env_or("MERGE_RETRY_MAX_ATTEMPTS", default.merge_retry_max_attempts),

            job_timeout_seconds: env_or("JOB_TIMEOUT_SECONDS", default.job_timeout_seconds),
            job_max_concurrent: env_or(
                "JOB_MAX_CONCURRENT",
                env_or("MAX_WORKERS", default.job_max_concurrent),
            ),
            job_checkpoint_dir: PathBuf::from(env_or_string(
                "JOB_CHECKPOINT_DIR",
                default.job_checkpoint_dir.to_str().unwrap_or("./checkpoints"),
            )),

            database_url: std::env::var("DATABASE_URL").ok(),
            pool: PoolConfig::from_env(),
            embed_retry: RetryConfig::from_env("EMBED_RETRY"),

            healthz_model_name: env_or_string("HEALTHZ_MODEL_NAME", &default.healthz_model_name),
            healthz_embedding_model_name: env_or_string(
                "HEALTHZ_EMBEDDING_MODEL_NAME",
                &default.healthz_embedding_model_name,
            ),
        }
    }

    /// Build the iteration controller's tunables, optionally overridden
    /// per-request by `similarity`/`iterations` in the submission body.
    #[must_use]
    pub fn iteration_config(&self, similarity_override: Option<f32>, iterations_override: Option<u32>) -> IterationConfig {
        IterationConfig {
            initial_threshold: similarity_override.unwrap_or(self.initial_threshold),
            threshold_increment: self.threshold_increment,
            max_threshold: self.max_threshold,
            iteration_budget: iterations_override.unwrap_or(self.iteration_budget),
            lsh_activation: if self.use_lsh { self.lsh_activation } else { usize::MAX },
            louvain_threshold: self.louvain_node_threshold,
            merge_ceiling: self.max_cluster_size_for_llm,
            merge_parse_attempts: self.merge_retry_max_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_values() {
        let config = DistillConfig::default();
        assert!((config.initial_threshold - 0.55).abs() < f32::EPSILON);
        assert_eq!(config.iteration_budget, 4);
        assert_eq!(config.max_cluster_size_for_llm, 20);
        assert_eq!(config.job_timeout_seconds, 1200);
    }

    #[test]
    fn iteration_config_honors_per_request_overrides() {
        let config = DistillConfig::default();
        let iter_config = config.iteration_config(Some(0.7), Some(2));
        assert!((iter_config.initial_threshold - 0.7).abs() < f32::EPSILON);
        assert_eq!(iter_config.iteration_budget, 2);
    }

    #[test]
    fn disabling_lsh_pushes_activation_threshold_out_of_reach() {
        let mut config = DistillConfig::default();
        config.use_lsh = false;
        assert_eq!(config.iteration_config(None, None).lsh_activation, usize::MAX);
    }
}
