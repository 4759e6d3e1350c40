//! Iteration controller: the refinement loop that rises the
//! similarity threshold each round, re-clusters the visible set, and
//! folds merge results back in until convergence or the iteration
//! budget is exhausted.

use crate::ann::AnnIndex;
use crate::cluster::build_clusters;
use crate::lsh::LshIndex;
use crate::merger::merge_cluster;
use embed::{EmbeddingClient, EmbeddingError};
use llm::LlmBackend;
use model::{JobProgress, WorkingBlock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// Tunable parameters for one controller run.
#[derive(Debug, Clone)]
pub struct IterationConfig {
    pub initial_threshold: f32,
    pub threshold_increment: f32,
    pub max_threshold: f32,
    pub iteration_budget: u32,
    pub lsh_activation: usize,
    pub louvain_threshold: usize,
    pub merge_ceiling: usize,
    pub merge_parse_attempts: usize,
}

impl Default for IterationConfig {
    fn default() -> Self {
        Self {
            initial_threshold: 0.55,
            threshold_increment: 0.01,
            max_threshold: 0.98,
            iteration_budget: 4,
            lsh_activation: 50,
            louvain_threshold: 1000,
            merge_ceiling: 20,
            merge_parse_attempts: 3,
        }
    }
}

/// Final statistics from a controller run, mirroring `model::JobStats`.
#[derive(Debug, Default)]
pub struct RunStats {
    pub iterations_run: u32,
    pub final_threshold: f32,
    pub merges_performed: u32,
}

/// Runs the refinement loop over `working` (keyed by block id) in place:
/// visible blocks get embedded, clustered, and merged each iteration;
/// absorbed blocks are marked `hidden` and new merged blocks are
/// inserted, until no clusters form, the budget is exhausted, or
/// `cancelled` is observed at an iteration boundary.
///
/// `on_progress` is called with a snapshot reference to `working` at
/// each phase transition so a caller can checkpoint or report the
/// current working set, not just the progress text.
///
/// # Errors
/// Returns the embedding provider's error unchanged if it is exhausted
/// after retries — the caller (job manager) maps this to the job-level
/// `embedding_failure` terminal state. No partial mutation is
/// left dangling: blocks embedded in prior iterations keep their vectors.
pub async fn run(
    job_id: &str,
    working: &mut HashMap<String, WorkingBlock>,
    embedding_client: &dyn EmbeddingClient,
    merge_backend: &dyn LlmBackend,
    config: &IterationConfig,
    cancelled: &AtomicBool,
    mut on_progress: impl FnMut(&HashMap<String, WorkingBlock>, JobProgress),
) -> Result<RunStats, EmbeddingError> {
    let mut stats = RunStats::default();

    for r in 0..config.iteration_budget {
        if cancelled.load(Ordering::SeqCst) {
            info!(job_id, iteration = r, "cancellation observed at iteration boundary");
            break;
        }

        let threshold = (config.initial_threshold + f32::from(u16::try_from(r).unwrap_or(u16::MAX)) * config.threshold_increment)
            .min(config.max_threshold);

        on_progress(working, JobProgress {
            phase: "embedding".into(),
            percent: percent_for(r, config.iteration_budget),
            details: Some(format!("iteration {r}")),
        });

        let mut visible_ids: Vec<String> = working
            .values()
            .filter(|wb| !wb.hidden)
            .map(|wb| wb.id.clone())
            .collect();
        visible_ids.sort();

        embed_missing_visible(embedding_client, working, &visible_ids).await?;

        on_progress(working, JobProgress {
            phase: "candidate_pairs".into(),
            percent: percent_for(r, config.iteration_budget),
            details: Some(format!("iteration {r}, threshold {threshold:.2}")),
        });

        let vectors: Vec<Vec<f32>> = visible_ids
            .iter()
            .map(|id| working[id].embedding.clone().unwrap_or_default())
            .collect();

        let pairs = if vectors.len() >= config.lsh_activation {
            let dim = vectors.first().map(Vec::len).unwrap_or(0);
            LshIndex::build(job_id, dim, None, None).candidate_pairs(&vectors, threshold)
        } else {
            AnnIndex::new(&vectors).dense_candidate_pairs(threshold)
        };

        on_progress(working, JobProgress {
            phase: "clustering".into(),
            percent: percent_for(r, config.iteration_budget),
            details: Some(format!("iteration {r}, {} candidate pairs", pairs.len())),
        });

        let clusters = build_clusters(visible_ids.len(), &pairs, job_id, Some(config.louvain_threshold));
        if clusters.is_empty() {
            stats.iterations_run = r;
            stats.final_threshold = threshold;
            break;
        }

        on_progress(working, JobProgress {
            phase: "merging".into(),
            percent: percent_for(r, config.iteration_budget),
            details: Some(format!("iteration {r}, {} clusters", clusters.len())),
        });

        let mut merges_this_round = 0u32;
        for cluster in clusters {
            if cancelled.load(Ordering::SeqCst) {
                break;
            }

            let blocks: Vec<WorkingBlock> = cluster
                .members
                .iter()
                .map(|&idx| working[&visible_ids[idx]].clone())
                .collect();

            let results = merge_cluster(
                merge_backend,
                blocks,
                Some(config.merge_ceiling),
                config.merge_parse_attempts,
            )
            .await;

            for result in results {
                for parent_id in &result.absorbed {
                    if let Some(parent) = working.get_mut(parent_id) {
                        parent.hidden = true;
                    }
                }
                merges_this_round += 1;
                working.insert(result.merged.id.clone(), result.merged);
            }
        }

        stats.merges_performed += merges_this_round;
        stats.iterations_run = r + 1;
        stats.final_threshold = threshold;

        on_progress(working, JobProgress {
            phase: "iteration".into(),
            percent: percent_for(r, config.iteration_budget),
            details: Some(format!(
                "iteration {r}: {} merges, {} visible blocks",
                merges_this_round,
                working.values().filter(|wb| !wb.hidden).count()
            )),
        });

        if merges_this_round == 0 {
            break;
        }
    }

    on_progress(working, JobProgress {
        phase: "finalizing".into(),
        percent: 99,
        details: None,
    });

    Ok(stats)
}

async fn embed_missing_visible(
    client: &dyn EmbeddingClient,
    working: &mut HashMap<String, WorkingBlock>,
    visible_ids: &[String],
) -> Result<(), EmbeddingError> {
    let mut pending: Vec<WorkingBlock> = visible_ids
        .iter()
        .filter_map(|id| working.get(id))
        .filter(|wb| wb.needs_embedding())
        .cloned()
        .collect();

    if pending.is_empty() {
        return Ok(());
    }

    embed::embed_missing(client, &mut pending).await?;
    for wb in pending {
        if let Some(existing) = working.get_mut(&wb.id) {
            existing.embedding = wb.embedding;
        }
    }
    Ok(())
}

fn percent_for(iteration: u32, budget: u32) -> u8 {
    if budget == 0 {
        return 99;
    }
    let pct = (f64::from(iteration) / f64::from(budget) * 99.0) as u8;
    pct.min(99)
}

#[cfg(test)]
mod tests {
    use super::*;
    use embed::MockEmbeddingClient;
    use llm::MockLlmBackend;
    use model::IdeaBlock;

    fn source(name: &str) -> WorkingBlock {
        WorkingBlock::from_source(IdeaBlock::new(name, "q", format!("a-{name}"), vec![], vec![], vec![]).unwrap())
    }

    #[tokio::test]
    async fn visible_count_never_increases_across_iterations() {
        let merged_xml = model::xml::emit_block(
            &IdeaBlock::new("Merged", "q", "merged answer", vec![], vec![], vec![]).unwrap(),
        );
        let embedding_client = MockEmbeddingClient::new(8);
        let merge_backend = MockLlmBackend::new(merged_xml);
        let config = IterationConfig {
            lsh_activation: 9999,
            ..IterationConfig::default()
        };

        let mut working = HashMap::new();
        for wb in [source("A"), source("B")] {
            working.insert(wb.id.clone(), wb);
        }
        // Force both blocks to identical embeddings so they always cluster.
        let cancelled = AtomicBool::new(false);
        let mut progress_log = Vec::new();

        run(
            "job-invariant",
            &mut working,
            &embedding_client,
            &merge_backend,
            &config,
            &cancelled,
            |_w, p| progress_log.push(p),
        )
        .await
        .unwrap();

        let visible_counts: Vec<usize> = progress_log
            .iter()
            .filter(|p| p.phase == "iteration")
            .filter_map(|p| p.details.as_ref())
            .filter_map(|d| d.split(", ").nth(1))
            .filter_map(|part| part.split(' ').next())
            .filter_map(|n| n.parse::<usize>().ok())
            .collect();

        for window in visible_counts.windows(2) {
            assert!(window[1] <= window[0]);
        }
    }

    #[tokio::test]
    async fn cancellation_stops_at_next_iteration_boundary() {
        let embedding_client = MockEmbeddingClient::new(8);
        let merge_backend = MockLlmBackend::new("<ideablock></ideablock>");
        let config = IterationConfig::default();
        let mut working = HashMap::new();
        working.insert("a".into(), source("A"));

        let cancelled = AtomicBool::new(true);
        let stats = run(
            "job-cancel",
            &mut working,
            &embedding_client,
            &merge_backend,
            &config,
            &cancelled,
            |_, _| {},
        )
        .await
        .unwrap();

        assert_eq!(stats.iterations_run, 0);
    }

    #[tokio::test]
    async fn no_clusters_breaks_loop_early() {
        let embedding_client = MockEmbeddingClient::new(8);
        let merge_backend = MockLlmBackend::new("<ideablock></ideablock>");
        let config = IterationConfig::default();
        let mut working = HashMap::new();
        // Two blocks whose mock embeddings will not be similar enough to
        // cross the 0.55 starting threshold.
        working.insert("a".into(), source("completely different topic alpha"));
        working.insert("b".into(), source("unrelated subject matter zzz"));

        let cancelled = AtomicBool::new(false);
        let stats = run(
            "job-no-cluster",
            &mut working,
            &embedding_client,
            &merge_backend,
            &config,
            &cancelled,
            |_, _| {},
        )
        .await
        .unwrap();

        assert!(stats.iterations_run <= config.iteration_budget);
    }

    #[tokio::test]
    async fn embedding_failure_aborts_the_run() {
        let embedding_client = embed::FailingEmbeddingClient;
        let merge_backend = MockLlmBackend::new("<ideablock></ideablock>");
        let config = IterationConfig::default();
        let mut working = HashMap::new();
        working.insert("a".into(), source("A"));

        let cancelled = AtomicBool::new(false);
        let result = run(
            "job-embed-fail",
            &mut working,
            &embedding_client,
            &merge_backend,
            &config,
            &cancelled,
            |_, _| {},
        )
        .await;

        assert!(result.is_err());
    }
}
