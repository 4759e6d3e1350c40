//! LLM-backed merge client for IdeaBlock distillation.

pub mod backend;
pub mod merge;
pub mod prompt;

pub use backend::{
    AnthropicMergeClient, FailingLlmBackend, LlmBackend, MergeError, MockLlmBackend,
    RetryingMergeBackend, SemaphoreBoundedBackend,
};
pub use merge::merge;
