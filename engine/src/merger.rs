//! Hierarchical merger: recursively splits an oversized cluster into
//! LLM-sized subclusters, merges each in parallel, and consolidates.

use llm::LlmBackend;
use model::{IdeaBlock, MergeResult, WorkingBlock};
use std::collections::BTreeSet;
use tracing::warn;

const DEFAULT_CEILING: usize = 20;
const MIN_SUBCLUSTER: usize = 5;

/// Target subcluster size `t = min(M, max(5, floor(2*sqrt(n))))`.
#[must_use]
pub fn target_subcluster_size(n: usize, ceiling: usize) -> usize {
    let estimate = (2.0 * (n as f64).sqrt()).floor() as usize;
    estimate.max(MIN_SUBCLUSTER).min(ceiling)
}

/// Merge one cluster's working blocks through `backend`, recursing as
/// needed to respect `ceiling`.
///
/// `max_parse_attempts` is the merge backend's retry budget. On
/// `merge_failed` exhaustion at any step, the cluster's original inputs
/// are returned unchanged rather than propagating an error, so no data
/// is lost to a single cluster's failure.
pub async fn merge_cluster(
    backend: &dyn LlmBackend,
    blocks: Vec<WorkingBlock>,
    ceiling: Option<usize>,
    max_parse_attempts: usize,
) -> Vec<MergeResult> {
    let ceiling = ceiling.unwrap_or(DEFAULT_CEILING);
    match merge_cluster_inner(backend, blocks.clone(), ceiling, max_parse_attempts).await {
        Some(results) => results,
        None => {
            warn!(
                size = blocks.len(),
                "merge_failed: leaving cluster inputs unmerged"
            );
            Vec::new()
        }
    }
}

async fn merge_cluster_inner(
    backend: &dyn LlmBackend,
    blocks: Vec<WorkingBlock>,
    ceiling: usize,
    max_parse_attempts: usize,
) -> Option<Vec<MergeResult>> {
    let n = blocks.len();
    if n == 0 {
        return Some(Vec::new());
    }

    if n <= ceiling {
        return merge_one_chunk(backend, blocks, max_parse_attempts).await;
    }

    let mut sorted = blocks;
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    let t = target_subcluster_size(n, ceiling);
    let chunks: Vec<Vec<WorkingBlock>> = sorted
        .chunks(t)
        .map(<[WorkingBlock]>::to_vec)
        .collect();

    let merge_futures = chunks
        .into_iter()
        .map(|chunk| merge_one_chunk(backend, chunk, max_parse_attempts));
    let chunk_results: Vec<Option<Vec<MergeResult>>> = futures::future::join_all(merge_futures).await;

    let mut outputs = Vec::new();
    for result in chunk_results {
        match result {
            Some(r) => outputs.extend(r),
            None => return None,
        }
    }

    if outputs.len() > ceiling {
        let total_absorbed: BTreeSet<String> = outputs.iter().flat_map(|r| r.absorbed.iter().cloned()).collect();
        let as_blocks: Vec<WorkingBlock> = outputs.iter().map(|r| r.merged.clone()).collect();
        let mut recursed = Box::pin(merge_cluster_inner(backend, as_blocks, ceiling, max_parse_attempts))
            .await?;
        // Every recursive output's absorbed set must still cover this
        // level's original chunk outputs, since recursion operated on
        // already-merged placeholders.
        for r in &mut recursed {
            r.absorbed.extend(total_absorbed.iter().cloned());
        }
        Some(recursed)
    } else if outputs.len() >= 2 {
        let total_absorbed: BTreeSet<String> = outputs.iter().flat_map(|r| r.absorbed.iter().cloned()).collect();
        let final_blocks: Vec<WorkingBlock> = outputs.iter().map(|r| r.merged.clone()).collect();
        let consolidated = merge_one_chunk(backend, final_blocks, max_parse_attempts).await?;
        Some(
            consolidated
                .into_iter()
                .map(|mut r| {
                    r.absorbed.extend(total_absorbed.iter().cloned());
                    r
                })
                .collect(),
        )
    } else {
        Some(outputs)
    }
}

/// Merges one LLM-sized chunk, returning one `MergeResult` per block the
/// model returned. A chunk of exactly one block passes through unchanged.
async fn merge_one_chunk(
    backend: &dyn LlmBackend,
    chunk: Vec<WorkingBlock>,
    max_parse_attempts: usize,
) -> Option<Vec<MergeResult>> {
    if chunk.len() == 1 {
        let only = chunk.into_iter().next().unwrap();
        let mut absorbed = BTreeSet::new();
        absorbed.insert(only.id.clone());
        return Some(vec![MergeResult {
            merged: only,
            absorbed,
        }]);
    }

    let ideablocks: Vec<IdeaBlock> = chunk.iter().map(|wb| wb.block.clone()).collect();
    let merged_blocks = llm::merge(backend, &ideablocks, max_parse_attempts).await.ok()?;

    let mut parents = BTreeSet::new();
    for wb in &chunk {
        parents.insert(wb.id.clone());
        parents.extend(wb.parents.iter().cloned());
    }

    // The model may return more than one block when the chunk's inputs
    // covered materially different questions (prompt.rs). Per the merge
    // result contract, every returned block records the union of this
    // chunk's parent ids, so a multi-block response loses none of its
    // content: each becomes its own tracked `WorkingBlock`.
    Some(
        merged_blocks
            .into_iter()
            .map(|block| MergeResult {
                merged: WorkingBlock::from_merge(block.deduplicated(), parents.clone()),
                absorbed: parents.clone(),
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm::MockLlmBackend;

    fn wb(name: &str) -> WorkingBlock {
        WorkingBlock::from_source(IdeaBlock::new(name, "q", format!("answer-{name}"), vec![], vec![], vec![]).unwrap())
    }

    #[test]
    fn subcluster_size_respects_ceiling_and_floor() {
        assert_eq!(target_subcluster_size(4, 20), 5);
        assert_eq!(target_subcluster_size(100, 20), 20);
        assert_eq!(target_subcluster_size(25, 20), 10);
    }

    #[tokio::test]
    async fn small_cluster_merges_in_one_call() {
        let merged_xml = model::xml::emit_block(
            &IdeaBlock::new("Merged", "q", "a", vec![], vec![], vec![]).unwrap(),
        );
        let backend = MockLlmBackend::new(merged_xml);
        let blocks = vec![wb("A"), wb("B")];
        let results = merge_cluster(&backend, blocks, Some(20), 3).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].absorbed.len(), 2);
    }

    #[tokio::test]
    async fn multi_block_response_keeps_every_output() {
        let response = format!(
            "{}{}",
            model::xml::emit_block(&IdeaBlock::new("First", "q1", "a1", vec![], vec![], vec![]).unwrap()),
            model::xml::emit_block(&IdeaBlock::new("Second", "q2", "a2", vec![], vec![], vec![]).unwrap()),
        );
        let backend = MockLlmBackend::new(response);
        let blocks = vec![wb("A"), wb("B"), wb("C")];
        let results = merge_cluster(&backend, blocks, Some(20), 3).await;
        assert_eq!(results.len(), 2);
        assert_ne!(results[0].merged.id, results[1].merged.id);
        // Both outputs carry the full parent set, so no input is lost.
        assert_eq!(results[0].absorbed.len(), 3);
        assert_eq!(results[1].absorbed.len(), 3);
    }

    #[tokio::test]
    async fn merge_failure_leaves_cluster_unmerged() {
        let backend = llm::FailingLlmBackend;
        let blocks = vec![wb("A"), wb("B")];
        let results = merge_cluster(&backend, blocks, Some(20), 1).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn oversized_cluster_splits_and_consolidates() {
        let merged_xml = model::xml::emit_block(
            &IdeaBlock::new("Merged", "q", "a", vec![], vec![], vec![]).unwrap(),
        );
        let backend = MockLlmBackend::new(merged_xml);
        let blocks: Vec<WorkingBlock> = (0..50).map(|i| wb(&format!("B{i:02}"))).collect();
        let results = merge_cluster(&backend, blocks, Some(20), 3).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].absorbed.len(), 50);
    }
}
