//! The `merge(blocks) -> blocks` operation: owns the parse-retry
//! loop on top of a raw `LlmBackend` completion.

use crate::backend::{LlmBackend, MergeError};
use crate::prompt::{build_merge_prompt, system_prompt};
use model::IdeaBlock;
use tracing::warn;

/// Merge `blocks` (2..=M) through `backend`, retrying up to
/// `max_parse_attempts` times on an empty or unparseable response.
///
/// # Errors
/// Returns `MergeError::Response` if every attempt yields zero parsed
/// blocks, or propagates the backend's own (already-retried) error.
pub async fn merge(
    backend: &dyn LlmBackend,
    blocks: &[IdeaBlock],
    max_parse_attempts: usize,
) -> Result<Vec<IdeaBlock>, MergeError> {
    let prompt = build_merge_prompt(blocks);

    for attempt in 0..max_parse_attempts.max(1) {
        let completion = backend.complete(system_prompt(), &prompt).await?;
        let parsed = model::xml::parse_blocks(&completion);
        if !parsed.is_empty() {
            return Ok(parsed);
        }
        warn!(attempt, "merge completion yielded no parseable ideablocks");
    }

    Err(MergeError::Response(
        "no parseable ideablocks after all attempts".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{FailingLlmBackend, MockLlmBackend};

    fn sample_blocks() -> Vec<IdeaBlock> {
        vec![
            IdeaBlock::new("A", "qa", "aa", vec![], vec![], vec![]).unwrap(),
            IdeaBlock::new("B", "qb", "ab", vec![], vec![], vec![]).unwrap(),
        ]
    }

    #[tokio::test]
    async fn merges_into_parsed_blocks() {
        let merged_xml = model::xml::emit_block(
            &IdeaBlock::new("AB", "qa or qb", "aa and ab", vec![], vec![], vec![]).unwrap(),
        );
        let backend = MockLlmBackend::new(merged_xml);
        let result = merge(&backend, &sample_blocks(), 3).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].name, "AB");
    }

    #[tokio::test]
    async fn empty_completion_is_retried_then_fails() {
        let backend = MockLlmBackend::new("no xml here");
        let result = merge(&backend, &sample_blocks(), 2).await;
        assert!(result.is_err());
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn backend_failure_propagates_without_local_retry() {
        let backend = FailingLlmBackend;
        let result = merge(&backend, &sample_blocks(), 3).await;
        assert!(result.is_err());
    }
}
