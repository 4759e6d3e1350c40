//! In-process metrics counters: plain atomics behind a `LazyLock`
//! global, no external metrics crate.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;

/// Global counters for the distillation service.
pub struct DistillMetrics {
    pub jobs_submitted: AtomicU64,
    pub jobs_succeeded: AtomicU64,
    pub jobs_failed: AtomicU64,
    pub jobs_timed_out: AtomicU64,
    pub jobs_cancelled: AtomicU64,

    pub merge_calls_attempted: AtomicU64,
    pub merge_calls_exhausted: AtomicU64,

    pub embedding_batches_attempted: AtomicU64,
    pub embedding_batches_failed: AtomicU64,

    /// Current visible-block count per active job id, for the `/metrics`
    /// gauge line. Entries are removed when a job goes terminal.
    blocks_visible: DashMap<String, u64>,
}

impl DistillMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self {
            jobs_submitted: AtomicU64::new(0),
            jobs_succeeded: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
            jobs_timed_out: AtomicU64::new(0),
            jobs_cancelled: AtomicU64::new(0),
            merge_calls_attempted: AtomicU64::new(0),
            merge_calls_exhausted: AtomicU64::new(0),
            embedding_batches_attempted: AtomicU64::new(0),
            embedding_batches_failed: AtomicU64::new(0),
            blocks_visible: DashMap::new(),
        }
    }

    pub fn record_job_submitted(&self) {
        self.jobs_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_job_succeeded(&self) {
        self.jobs_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_job_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_job_timed_out(&self) {
        self.jobs_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_job_cancelled(&self) {
        self.jobs_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_merge_call_attempted(&self) {
        self.merge_calls_attempted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_merge_call_exhausted(&self) {
        self.merge_calls_exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_embedding_batch_attempted(&self) {
        self.embedding_batches_attempted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_embedding_batch_failed(&self) {
        self.embedding_batches_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_blocks_visible(&self, job_id: &str, count: u64) {
        self.blocks_visible.insert(job_id.to_string(), count);
    }

    pub fn remove_job_gauge(&self, job_id: &str) {
        self.blocks_visible.remove(job_id);
    }

    /// Render counters in Prometheus text exposition format for `GET
    /// /metrics`. A small, hand-rolled writer, following the same "plain
    /// atomics, no dependency" choice as the counters above.
    #[must_use]
    pub fn render_prometheus(&self) -> String {
        let mut out = String::new();
        push_counter(&mut out, "distill_jobs_submitted_total", self.jobs_submitted.load(Ordering::Relaxed));
        push_counter(&mut out, "distill_jobs_succeeded_total", self.jobs_succeeded.load(Ordering::Relaxed));
        push_counter(&mut out, "distill_jobs_failed_total", self.jobs_failed.load(Ordering::Relaxed));
        push_counter(&mut out, "distill_jobs_timed_out_total", self.jobs_timed_out.load(Ordering::Relaxed));
        push_counter(&mut out, "distill_jobs_cancelled_total", self.jobs_cancelled.load(Ordering::Relaxed));
        push_counter(
            &mut out,
            "distill_merge_calls_attempted_total",
            self.merge_calls_attempted.load(Ordering::Relaxed),
        );
        push_counter(
            &mut out,
            "distill_merge_calls_exhausted_total",
            self.merge_calls_exhausted.load(Ordering::Relaxed),
        );
        push_counter(
            &mut out,
            "distill_embedding_batches_attempted_total",
            self.embedding_batches_attempted.load(Ordering::Relaxed),
        );
        push_counter(
            &mut out,
            "distill_embedding_batches_failed_total",
            self.embedding_batches_failed.load(Ordering::Relaxed),
        );

        out.push_str("# HELP distill_job_blocks_visible Current visible block count for an active job.\n");
        out.push_str("# TYPE distill_job_blocks_visible gauge\n");
        for entry in &self.blocks_visible {
            out.push_str(&format!("distill_job_blocks_visible{{job_id=\"{}\"}} {}\n", entry.key(), entry.value()));
        }

        out
    }
}

fn push_counter(out: &mut String, name: &str, value: u64) {
    out.push_str(&format!("# TYPE {name} counter\n{name} {value}\n"));
}

impl Default for DistillMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Global metrics instance.
pub static METRICS: LazyLock<DistillMetrics> = LazyLock::new(DistillMetrics::new);

#[must_use]
pub fn metrics() -> &'static DistillMetrics {
    &METRICS
}
