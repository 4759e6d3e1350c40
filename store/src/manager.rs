//! Job Manager: accepts submissions, assigns ids, drives the
//! iteration controller to completion in a background task, persists
//! checkpoints, and answers poll/wait requests.
//!
//! Follows an enqueue/status/heartbeat shape generalized from a single
//! shell-out job type to the iterative distillation run.

use crate::cache::{CachingEmbeddingClient, EmbeddingCache};
use crate::checkpoint::{self, JobCheckpoint};
use crate::config::DistillConfig;
use crate::metrics::metrics;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use embed::{EmbeddingClient, EmbeddingError, SemaphoreBoundedEmbeddingClient};
use engine::IterationConfig;
use llm::{LlmBackend, MergeError, RetryingMergeBackend, SemaphoreBoundedBackend};
use model::{transitive_source_parents, IdeaBlock, Job, JobProgress, JobStats, JobStatus, Origin, WorkingBlock};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{mpsc, Semaphore};
use tracing::{error, info, warn};

/// A single submitted input block.
#[derive(Debug, Clone)]
pub struct SubmissionBlock {
    pub id: String,
    pub block: IdeaBlock,
    pub hidden: bool,
}

/// A full `POST /api/autoDistill` request, already validated and
/// converted from the wire DTO by the HTTP layer.
#[derive(Debug, Clone)]
pub struct JobSubmission {
    pub similarity: Option<f32>,
    pub iterations: Option<u32>,
    pub blocks: Vec<SubmissionBlock>,
}

/// One entry of the `results` array in both the submission response and
/// the job-status response.
#[derive(Debug, Clone)]
pub struct ResultBlock {
    pub merged: bool,
    pub id: String,
    pub payload: Option<IdeaBlock>,
    pub hidden: bool,
    pub used: Option<BTreeSet<String>>,
}

/// The `stats` object.
#[derive(Debug, Clone, Default)]
pub struct JobStatsOut {
    pub starting_block_count: usize,
    pub final_block_count: usize,
    pub blocks_removed: usize,
    pub blocks_added: usize,
    pub block_reduction_percent: f32,
}

/// Everything needed to answer `GET /api/jobs/{jobId}` or the submission
/// response when `wait=true`.
#[derive(Debug, Clone)]
pub struct JobView {
    pub id: String,
    pub status: JobStatus,
    pub progress: JobProgress,
    pub error: Option<String>,
    pub results: Option<Vec<ResultBlock>>,
    pub stats: Option<JobStatsOut>,
}

struct JobState {
    job: Job,
    working: HashMap<String, WorkingBlock>,
    starting_block_count: usize,
}

/// Per-job shared state: a single lock covering status, progress, and
/// the working set, since all three are mutated from the same
/// background task.
struct JobHandle {
    state: StdMutex<JobState>,
    cancelled: Arc<AtomicBool>,
}

/// Orchestrates all active and completed jobs for the process lifetime.
pub struct JobManager {
    jobs: dashmap::DashMap<String, Arc<JobHandle>>,
    config: DistillConfig,
    embedding_client: Arc<dyn EmbeddingClient>,
    merge_backend: Arc<dyn LlmBackend>,
    job_semaphore: Arc<Semaphore>,
    checkpoint_tx: mpsc::UnboundedSender<(String, JobCheckpoint)>,
}

/// Fixed internal concurrency cap on live embedding-provider calls,
/// distinct from the process-global merge semaphore. Not
/// environment-configurable, unlike merge parallelism
/// (`LLM_PARALLEL_THREADS`) and batch size.
const EMBEDDING_SEMAPHORE_PERMITS: usize = 2;

/// Outermost embedding-client decorator: records one `attempted` per call
/// and one `failed` if the call errors out after every inner retry.
struct MetricsEmbeddingClient<C> {
    inner: C,
}

#[async_trait]
impl<C: EmbeddingClient> EmbeddingClient for MetricsEmbeddingClient<C> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        metrics().record_embedding_batch_attempted();
        let result = self.inner.embed(text).await;
        if result.is_err() {
            metrics().record_embedding_batch_failed();
        }
        result
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        metrics().record_embedding_batch_attempted();
        let result = self.inner.embed_batch(texts).await;
        if result.is_err() {
            metrics().record_embedding_batch_failed();
        }
        result
    }
}

/// Outermost merge-backend decorator: records one `attempted` per cluster
/// merge call and one `exhausted` if the call still errors after every
/// inner retry.
struct MetricsMergeBackend<B> {
    inner: B,
}

#[async_trait]
impl<B: LlmBackend> LlmBackend for MetricsMergeBackend<B> {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, MergeError> {
        metrics().record_merge_call_attempted();
        let result = self.inner.complete(system, prompt).await;
        if result.is_err() {
            metrics().record_merge_call_exhausted();
        }
        result
    }
}

impl JobManager {
    /// Builds the manager and spawns its dedicated checkpoint-writer task.
    ///
    /// `base_embedding`/`base_merge` are the raw provider clients (or
    /// test doubles); this constructor wraps them once with the
    /// process-global cache/semaphore/retry decorators so every job
    /// shares the same bounded resources.
    #[must_use]
    pub fn new(
        config: DistillConfig,
        base_embedding: Arc<dyn EmbeddingClient>,
        base_merge: Arc<dyn LlmBackend>,
        embedding_cache: Arc<dyn EmbeddingCache>,
    ) -> Self {
        let merge_semaphore = Arc::new(Semaphore::new(config.llm_parallel_threads.max(1)));
        let embed_semaphore = Arc::new(Semaphore::new(EMBEDDING_SEMAPHORE_PERMITS));
        let job_semaphore = Arc::new(Semaphore::new(config.job_max_concurrent.max(1)));

        let embedding_client: Arc<dyn EmbeddingClient> = Arc::new(MetricsEmbeddingClient {
            inner: CachingEmbeddingClient::new(
                SemaphoreBoundedEmbeddingClient::new(base_embedding, embed_semaphore),
                embedding_cache,
            ),
        });

        let merge_backend: Arc<dyn LlmBackend> = Arc::new(MetricsMergeBackend {
            inner: RetryingMergeBackend::new(
                SemaphoreBoundedBackend::new(base_merge, merge_semaphore),
                model::RetryConfig {
                    max_retries: config.merge_retry_max_attempts,
                    ..model::RetryConfig::default()
                },
            ),
        });

        let (checkpoint_tx, mut checkpoint_rx) = mpsc::unbounded_channel::<(String, JobCheckpoint)>();
        let checkpoint_dir = config.job_checkpoint_dir.clone();
        tokio::spawn(async move {
            while let Some((job_id, snapshot)) = checkpoint_rx.recv().await {
                if let Err(e) = checkpoint::write_checkpoint(&checkpoint_dir, &job_id, &snapshot).await {
                    warn!(%job_id, error = %e, "checkpoint write failed");
                }
            }
        });

        Self {
            jobs: dashmap::DashMap::new(),
            config,
            embedding_client,
            merge_backend,
            job_semaphore,
            checkpoint_tx,
        }
    }

    /// Accepts a submission, creates a `queued` job, and spawns the
    /// background run. Returns the new job id immediately; callers that
    /// want `wait=true` semantics should follow with [`Self::wait_for_terminal`].
    pub fn submit(&self, submission: JobSubmission) -> String {
        let job_id = uuid::Uuid::new_v4().to_string();
        let deadline = Utc::now() + ChronoDuration::seconds(self.config.job_timeout_seconds);
        let job = Job::new(job_id.clone(), Some(deadline));

        let mut working = HashMap::new();
        for entry in submission.blocks {
            let mut wb = WorkingBlock::from_source_with_id(entry.id, entry.block);
            wb.hidden = entry.hidden;
            working.insert(wb.id.clone(), wb);
        }
        let starting_block_count = working.values().filter(|wb| !wb.hidden).count();

        let handle = Arc::new(JobHandle {
            state: StdMutex::new(JobState {
                job,
                working,
                starting_block_count,
            }),
            cancelled: Arc::new(AtomicBool::new(false)),
        });
        self.jobs.insert(job_id.clone(), Arc::clone(&handle));
        metrics().record_job_submitted();

        let iteration_config = self.config.iteration_config(submission.similarity, submission.iterations);
        self.spawn_run(job_id.clone(), handle, iteration_config, Some(deadline));

        job_id
    }

    /// Scans `config.job_checkpoint_dir` for checkpoints left by jobs that
    /// were non-terminal when the process last stopped, and resumes each
    /// one's background run from its last-saved working set — no
    /// re-embedding of blocks whose vectors survived in the checkpoint.
    /// Returns the number of jobs resumed.
    pub async fn resume_from_checkpoints(&self) -> usize {
        let ids = checkpoint::list_resumable(&self.config.job_checkpoint_dir).await;
        let mut resumed = 0;

        for job_id in ids {
            let Ok(Some(snapshot)) = checkpoint::read_checkpoint(&self.config.job_checkpoint_dir, &job_id).await
            else {
                warn!(%job_id, "resumable checkpoint vanished or failed to parse, skipping");
                continue;
            };

            let deadline = snapshot.job.deadline;
            let handle = Arc::new(JobHandle {
                state: StdMutex::new(JobState {
                    job: snapshot.job,
                    working: snapshot.working,
                    starting_block_count: snapshot.starting_block_count,
                }),
                cancelled: Arc::new(AtomicBool::new(false)),
            });
            self.jobs.insert(job_id.clone(), Arc::clone(&handle));

            // Job-level similarity/iteration overrides aren't part of the
            // checkpoint (§4.9's persisted fields are metadata + working
            // set); resuming re-applies the process-wide defaults.
            let iteration_config = self.config.iteration_config(None, None);
            info!(%job_id, "resuming job from checkpoint");
            self.spawn_run(job_id, handle, iteration_config, deadline);
            resumed += 1;
        }

        resumed
    }

    /// Common background-task spawn shared by a fresh submission and a
    /// checkpoint resume: acquires a job slot, arms the deadline watch
    /// against `deadline` (not a fresh duration, so a resumed job doesn't
    /// get its clock reset), and drives the iteration controller.
    fn spawn_run(
        &self,
        job_id: String,
        handle: Arc<JobHandle>,
        iteration_config: IterationConfig,
        deadline: Option<chrono::DateTime<Utc>>,
    ) {
        let embedding_client = Arc::clone(&self.embedding_client);
        let merge_backend = Arc::clone(&self.merge_backend);
        let job_semaphore = Arc::clone(&self.job_semaphore);
        let checkpoint_tx = self.checkpoint_tx.clone();

        tokio::spawn(async move {
            let _permit = job_semaphore
                .acquire()
                .await
                .expect("job semaphore is never closed");

            spawn_deadline_watch(Arc::clone(&handle), deadline);
            run_job(job_id, handle, embedding_client, merge_backend, iteration_config, checkpoint_tx).await;
        });
    }

    /// Returns the current view of a job, or `None` if the id is unknown.
    #[must_use]
    pub fn status(&self, job_id: &str) -> Option<JobView> {
        let handle = self.jobs.get(job_id)?;
        let state = handle.state.lock().expect("job lock poisoned");
        Some(build_job_view(&state))
    }

    /// Polls `status` until the job reaches a terminal state, for
    /// `wait=true` submissions and the blocking variant of the status
    /// endpoint. Not `Notify`-based: a poll loop avoids the missed-
    /// wakeup race a single-shot notifier would need extra bookkeeping to
    /// rule out, at the cost of up to `poll_interval` of added latency.
    pub async fn wait_for_terminal(&self, job_id: &str, poll_interval: std::time::Duration) -> Option<JobView> {
        loop {
            let view = self.status(job_id)?;
            if view.status.is_some_and_terminal() {
                return Some(view);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

/// Extension so `wait_for_terminal` can check terminality on the plain
/// `JobStatus` copied out of the lock without re-borrowing the `Job`.
trait TerminalCheck {
    fn is_some_and_terminal(&self) -> bool;
}

impl TerminalCheck for JobStatus {
    fn is_some_and_terminal(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failure | JobStatus::Timeout)
    }
}

/// Arms cooperative cancellation against an absolute `deadline` rather than
/// a fresh duration, so a job resumed from a checkpoint keeps the clock it
/// was stamped with at original submission instead of getting a full new
/// `T_max` window. A missing or already-past deadline cancels immediately;
/// the iteration controller observes this at the very next iteration
/// boundary.
fn spawn_deadline_watch(handle: Arc<JobHandle>, deadline: Option<chrono::DateTime<Utc>>) {
    tokio::spawn(async move {
        let Some(deadline) = deadline else {
            handle.cancelled.store(true, Ordering::SeqCst);
            return;
        };
        let remaining = deadline - Utc::now();
        let duration = remaining
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);
        tokio::time::sleep(duration).await;
        handle.cancelled.store(true, Ordering::SeqCst);
    });
}

async fn run_job(
    job_id: String,
    handle: Arc<JobHandle>,
    embedding_client: Arc<dyn EmbeddingClient>,
    merge_backend: Arc<dyn LlmBackend>,
    iteration_config: IterationConfig,
    checkpoint_tx: mpsc::UnboundedSender<(String, JobCheckpoint)>,
) {
    {
        let mut state = handle.state.lock().expect("job lock poisoned");
        state.job.status = JobStatus::Running;
    }
    info!(%job_id, "job started");

    let mut working = {
        let state = handle.state.lock().expect("job lock poisoned");
        state.working.clone()
    };

    let cancelled = Arc::clone(&handle.cancelled);
    let progress_job_id = job_id.clone();
    let progress_handle = Arc::clone(&handle);
    let progress_tx = checkpoint_tx.clone();

    let result = engine::iteration::run(
        &job_id,
        &mut working,
        &*embedding_client,
        &*merge_backend,
        &iteration_config,
        &cancelled,
        move |live_working: &HashMap<String, WorkingBlock>, progress: JobProgress| {
            let mut state = progress_handle.state.lock().expect("job lock poisoned");
            state.job.progress = progress.clone();
            state.working.clone_from(live_working);
            let visible = state.working.values().filter(|wb| !wb.hidden).count();
            metrics().set_blocks_visible(&progress_job_id, visible as u64);

            if progress.phase == "iteration" {
                let snapshot = JobCheckpoint {
                    job: state.job.clone(),
                    working: state.working.clone(),
                    starting_block_count: state.starting_block_count,
                };
                let _ = progress_tx.send((progress_job_id.clone(), snapshot));
            }
        },
    )
    .await;

    let mut state = handle.state.lock().expect("job lock poisoned");
    state.working = working;

    match result {
        Ok(run_stats) => {
            let timed_out = handle.cancelled.load(Ordering::SeqCst);
            state.job.status = if timed_out { JobStatus::Timeout } else { JobStatus::Success };
            let final_block_count = state.working.values().filter(|wb| !wb.hidden).count();
            state.job.stats = Some(JobStats {
                input_block_count: state.starting_block_count,
                output_block_count: final_block_count,
                iterations_run: run_stats.iterations_run,
                final_threshold: run_stats.final_threshold,
                merges_performed: run_stats.merges_performed,
            });
            state.job.progress.percent = 100;

            if timed_out {
                metrics().record_job_timed_out();
                warn!(%job_id, "job hit its deadline");
            } else {
                metrics().record_job_succeeded();
                info!(%job_id, "job finished");
            }
        }
        Err(e) => {
            state.job.status = JobStatus::Failure;
            state.job.error = Some(e.to_string());
            metrics().record_job_failed();
            error!(%job_id, error = %e, "job failed: embedding provider exhausted retries");
        }
    }

    let final_snapshot = JobCheckpoint {
        job: state.job.clone(),
        working: state.working.clone(),
        starting_block_count: state.starting_block_count,
    };
    let _ = checkpoint_tx.send((job_id.clone(), final_snapshot));
    metrics().remove_job_gauge(&job_id);
}

fn build_job_view(state: &JobState) -> JobView {
    let results = if state.job.is_terminal() {
        Some(build_results(&state.working))
    } else {
        None
    };
    let stats = state.job.stats.as_ref().map(|s| JobStatsOut {
        starting_block_count: s.input_block_count,
        final_block_count: s.output_block_count,
        blocks_removed: state.working.values().filter(|wb| wb.hidden).count(),
        blocks_added: state
            .working
            .values()
            .filter(|wb| wb.origin == Origin::Merged)
            .count(),
        block_reduction_percent: if s.input_block_count == 0 {
            0.0
        } else {
            100.0 * (s.input_block_count.saturating_sub(s.output_block_count) as f32) / (s.input_block_count as f32)
        },
    });

    JobView {
        id: state.job.id.clone(),
        status: state.job.status,
        progress: state.job.progress.clone(),
        error: state.job.error.clone(),
        results,
        stats,
    }
}

/// Builds the `results[]` array: every source input (hidden or
/// visible) plus every merged block produced along the way, with
/// `blockifyResultsUsed` resolved to the transitive source-id closure.
fn build_results(working: &HashMap<String, WorkingBlock>) -> Vec<ResultBlock> {
    let mut out: Vec<ResultBlock> = working
        .values()
        .map(|wb| match wb.origin {
            Origin::Source => ResultBlock {
                merged: false,
                id: wb.id.clone(),
                payload: if wb.hidden { None } else { Some(wb.block.clone()) },
                hidden: wb.hidden,
                used: None,
            },
            Origin::Merged => ResultBlock {
                merged: true,
                id: wb.id.clone(),
                payload: if wb.hidden { None } else { Some(wb.block.clone()) },
                hidden: wb.hidden,
                used: Some(transitive_source_parents(&wb.id, working)),
            },
        })
        .collect();
    out.sort_by(|a, b| a.id.cmp(&b.id));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryEmbeddingCache;
    use embed::MockEmbeddingClient;
    use llm::MockLlmBackend;
    use std::time::Duration;

    fn block(name: &str) -> IdeaBlock {
        IdeaBlock::new(name, "q", format!("answer-{name}"), vec![], vec![], vec![]).unwrap()
    }

    fn manager_with(iteration_budget: u32) -> JobManager {
        let mut config = DistillConfig::default();
        config.iteration_budget = iteration_budget;
        config.job_timeout_seconds = 5;
        config.lsh_activation = 9999;
        let embedding: Arc<dyn EmbeddingClient> = Arc::new(MockEmbeddingClient::new(8));
        let merge: Arc<dyn LlmBackend> = Arc::new(MockLlmBackend::new(
            model::xml::emit_block(&IdeaBlock::new("Merged", "q", "merged answer", vec![], vec![], vec![]).unwrap()),
        ));
        let cache: Arc<dyn EmbeddingCache> = Arc::new(InMemoryEmbeddingCache::new());
        JobManager::new(config, embedding, merge, cache)
    }

    #[tokio::test]
    async fn submit_then_wait_reaches_a_terminal_state() {
        let manager = manager_with(1);
        let submission = JobSubmission {
            similarity: None,
            iterations: None,
            blocks: vec![
                SubmissionBlock {
                    id: "u1".into(),
                    block: block("A"),
                    hidden: false,
                },
                SubmissionBlock {
                    id: "u2".into(),
                    block: block("B"),
                    hidden: false,
                },
            ],
        };

        let job_id = manager.submit(submission);
        let view = manager
            .wait_for_terminal(&job_id, Duration::from_millis(5))
            .await
            .expect("job id was just inserted");

        assert!(matches!(view.status, JobStatus::Success | JobStatus::Failure));
        assert!(view.results.is_some());
        assert!(view.stats.is_some());
    }

    #[tokio::test]
    async fn every_submitted_id_appears_in_final_results() {
        let manager = manager_with(1);
        let ids = vec!["u1".to_string(), "u2".to_string(), "u3".to_string()];
        let submission = JobSubmission {
            similarity: None,
            iterations: None,
            blocks: ids
                .iter()
                .map(|id| SubmissionBlock {
                    id: id.clone(),
                    block: block(id),
                    hidden: false,
                })
                .collect(),
        };

        let job_id = manager.submit(submission);
        let view = manager
            .wait_for_terminal(&job_id, Duration::from_millis(5))
            .await
            .unwrap();

        let results = view.results.unwrap();
        for id in &ids {
            assert!(
                results.iter().any(|r| &r.id == id || r.used.as_ref().is_some_and(|u| u.contains(id))),
                "id {id} missing from results entirely"
            );
        }
    }

    #[tokio::test]
    async fn unknown_job_id_returns_none() {
        let manager = manager_with(1);
        assert!(manager.status("does-not-exist").is_none());
    }

    #[tokio::test]
    async fn successful_run_records_merge_and_embedding_attempts() {
        let before_embed = metrics().embedding_batches_attempted.load(Ordering::Relaxed);
        let before_merge = metrics().merge_calls_attempted.load(Ordering::Relaxed);

        let manager = manager_with(1);
        let submission = JobSubmission {
            similarity: None,
            iterations: None,
            blocks: vec![
                SubmissionBlock {
                    id: "u1".into(),
                    block: block("A"),
                    hidden: false,
                },
                SubmissionBlock {
                    id: "u2".into(),
                    block: block("B"),
                    hidden: false,
                },
            ],
        };
        let job_id = manager.submit(submission);
        manager.wait_for_terminal(&job_id, Duration::from_millis(5)).await.unwrap();

        assert!(metrics().embedding_batches_attempted.load(Ordering::Relaxed) > before_embed);
        assert!(metrics().merge_calls_attempted.load(Ordering::Relaxed) >= before_merge);
    }

    #[test]
    fn stats_use_gross_hidden_count_not_net_difference() {
        // Three sources, two merge into one: starting=3, final=2,
        // removed=2 (both hidden sources), added=1 (the merged block).
        let a = WorkingBlock::from_source(block("A"));
        let b = WorkingBlock::from_source(block("B"));
        let c = WorkingBlock::from_source(block("C"));
        let mut parents = BTreeSet::new();
        parents.insert(a.id.clone());
        parents.insert(b.id.clone());
        let merged = WorkingBlock::from_merge(
            IdeaBlock::new("Merged", "q", "merged answer", vec![], vec![], vec![]).unwrap(),
            parents,
        );

        let mut working = HashMap::new();
        working.insert(a.id.clone(), WorkingBlock { hidden: true, ..a });
        working.insert(b.id.clone(), WorkingBlock { hidden: true, ..b });
        working.insert(c.id.clone(), c);
        working.insert(merged.id.clone(), merged);

        let mut job = Job::new("job-1".to_string(), None);
        job.stats = Some(JobStats {
            input_block_count: 3,
            output_block_count: 2,
            iterations_run: 1,
            final_threshold: 0.8,
            merges_performed: 1,
        });
        let state = JobState {
            job,
            working,
            starting_block_count: 3,
        };

        let view = build_job_view(&state);
        let stats = view.stats.unwrap();
        assert_eq!(stats.starting_block_count, 3);
        assert_eq!(stats.final_block_count, 2);
        assert_eq!(stats.blocks_removed, 2);
        assert_eq!(stats.blocks_added, 1);
    }

    #[tokio::test]
    async fn resumes_a_running_job_from_its_checkpoint() {
        let checkpoint_dir = std::env::temp_dir().join(format!(
            "store-manager-resume-test-{}-{}",
            std::process::id(),
            uuid::Uuid::new_v4()
        ));

        let mut working = HashMap::new();
        let source = WorkingBlock::from_source_with_id("u1".to_string(), block("A"));
        working.insert(source.id.clone(), source);

        let mut job = Job::new("resumed-job".to_string(), Some(Utc::now() + ChronoDuration::seconds(60)));
        job.status = JobStatus::Running;
        let snapshot = JobCheckpoint {
            job,
            working,
            starting_block_count: 1,
        };
        checkpoint::write_checkpoint(&checkpoint_dir, "resumed-job", &snapshot)
            .await
            .unwrap();

        let mut config = DistillConfig::default();
        config.iteration_budget = 1;
        config.job_timeout_seconds = 5;
        config.lsh_activation = 9999;
        config.job_checkpoint_dir = checkpoint_dir.clone();
        let embedding: Arc<dyn EmbeddingClient> = Arc::new(MockEmbeddingClient::new(8));
        let merge: Arc<dyn LlmBackend> = Arc::new(MockLlmBackend::new(String::new()));
        let cache: Arc<dyn EmbeddingCache> = Arc::new(InMemoryEmbeddingCache::new());
        let manager = JobManager::new(config, embedding, merge, cache);

        let resumed_count = manager.resume_from_checkpoints().await;
        assert_eq!(resumed_count, 1);

        let view = manager
            .wait_for_terminal("resumed-job", Duration::from_millis(5))
            .await
            .expect("resumed job should be tracked under its original id");
        assert!(matches!(view.status, JobStatus::Success | JobStatus::Failure));

        let _ = std::fs::remove_dir_all(&checkpoint_dir);
    }
}
