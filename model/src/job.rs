//! Job, cluster, and similarity-pair types shared across the pipeline.

use crate::working::WorkingBlock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A candidate pair emitted by the LSH/ANN stages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityPair {
    pub a: usize,
    pub b: usize,
    pub score: f32,
}

impl SimilarityPair {
    /// Construct a pair with `a < b`, the canonical ordering used so the
    /// same unordered pair never appears twice in the candidate set.
    #[must_use]
    pub fn new(a: usize, b: usize, score: f32) -> Self {
        if a <= b {
            Self { a, b, score }
        } else {
            Self { a: b, b: a, score }
        }
    }
}

/// A connected group of working-block indices produced by the cluster
/// builder, prior to hierarchical merging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub members: BTreeSet<usize>,
}

impl Cluster {
    #[must_use]
    pub fn new(members: BTreeSet<usize>) -> Self {
        Self { members }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Outcome of merging one subcluster's working blocks through the LLM
/// merge client (C3/C7).
#[derive(Debug, Clone)]
pub struct MergeResult {
    pub merged: WorkingBlock,
    pub absorbed: BTreeSet<String>,
}

/// Lifecycle state of an autoDistill job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Success,
    Failure,
    Timeout,
}

/// Progress reported mid-run for polling clients.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobProgress {
    pub phase: String,
    pub percent: u8,
    pub details: Option<String>,
}

/// Aggregate statistics attached to a completed job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobStats {
    pub input_block_count: usize,
    pub output_block_count: usize,
    pub iterations_run: u32,
    pub final_threshold: f32,
    pub merges_performed: u32,
}

/// A queued or running autoDistill job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub deadline: Option<DateTime<Utc>>,
    pub progress: JobProgress,
    pub stats: Option<JobStats>,
    pub error: Option<String>,
}

impl Job {
    #[must_use]
    pub fn new(id: String, deadline: Option<DateTime<Utc>>) -> Self {
        Self {
            id,
            status: JobStatus::Queued,
            created_at: Utc::now(),
            deadline,
            progress: JobProgress::default(),
            stats: None,
            error: None,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            JobStatus::Success | JobStatus::Failure | JobStatus::Timeout
        )
    }

    #[must_use]
    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        self.deadline.is_some_and(|d| now >= d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn similarity_pair_canonicalizes_ordering() {
        let p = SimilarityPair::new(5, 2, 0.9);
        assert_eq!((p.a, p.b), (2, 5));
    }

    #[test]
    fn job_is_past_deadline_when_now_equals_deadline() {
        let now = Utc::now();
        let job = Job::new("j1".into(), Some(now));
        assert!(job.is_past_deadline(now));
    }

    #[test]
    fn fresh_job_is_not_terminal() {
        let job = Job::new("j1".into(), None);
        assert!(!job.is_terminal());
    }
}
