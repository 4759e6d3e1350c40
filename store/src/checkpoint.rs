//! Job checkpointing: JSON snapshots of job metadata and the
//! working set, written with the tempfile-then-rename pattern so a crash
//! mid-write never leaves a torn checkpoint readable under the canonical
//! name. A checkpoint is a full snapshot, not a log, so this replaces
//! the whole file atomically rather than appending.

use model::{Job, WorkingBlock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Everything needed to resume a job without re-embedding blocks whose
/// vectors were already computed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCheckpoint {
    pub job: Job,
    pub working: HashMap<String, WorkingBlock>,
    /// Visible-block count at submission time, carried alongside `job`
    /// rather than recomputed on resume: hidden flags on resubmitted
    /// residual blocks would otherwise make a post-hoc recount diverge
    /// from what the original submission actually started with.
    pub starting_block_count: usize,
}

fn checkpoint_path(dir: &Path, job_id: &str) -> PathBuf {
    dir.join(format!("{job_id}.json"))
}

fn tmp_path(dir: &Path, job_id: &str) -> PathBuf {
    dir.join(format!("{job_id}.json.tmp"))
}

/// Write `checkpoint` for `job_id` under `dir`, atomically.
///
/// # Errors
/// Returns an error if the directory cannot be created, the temp file
/// cannot be written/synced, or the rename fails.
pub async fn write_checkpoint(dir: &Path, job_id: &str, checkpoint: &JobCheckpoint) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    let tmp = tmp_path(dir, job_id);
    let final_path = checkpoint_path(dir, job_id);

    let json = serde_json::to_vec(checkpoint)?;
    let mut file = tokio::fs::File::create(&tmp).await?;
    use tokio::io::AsyncWriteExt;
    file.write_all(&json).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&tmp, &final_path).await?;
    Ok(())
}

/// Read back a previously written checkpoint, if any.
///
/// # Errors
/// Returns an error if the file exists but cannot be parsed.
pub async fn read_checkpoint(dir: &Path, job_id: &str) -> anyhow::Result<Option<JobCheckpoint>> {
    let path = checkpoint_path(dir, job_id);
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// List job ids with a checkpoint on disk whose last-recorded status was
/// non-terminal, for resume-on-restart.
pub async fn list_resumable(dir: &Path) -> Vec<String> {
    let mut out = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(_) => return out,
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(job_id) = name.strip_suffix(".json") else {
            continue;
        };
        match read_checkpoint(dir, job_id).await {
            Ok(Some(cp)) if !cp.job.is_terminal() => out.push(job_id.to_string()),
            Ok(_) => {}
            Err(e) => warn!(job_id, error = %e, "failed to read checkpoint during resume scan"),
        }
    }

    info!(count = out.len(), "resumable jobs found on startup");
    out
}
