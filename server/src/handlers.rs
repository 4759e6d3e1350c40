//! Handlers for the three HTTP endpoints plus `/metrics`.

use crate::app::AppState;
use crate::dto::{HealthzDto, JobResultDto, JobStatusDto, SubmitAcceptedDto, SubmitRequest};
use crate::error::{bad_request, ApiError};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use std::time::Duration;
use store::{JobSubmission, SubmissionBlock};
use tracing::warn;

/// `?wait=` query parameter shared by the submission endpoint.
#[derive(Debug, Deserialize, Default)]
pub struct WaitParam {
    #[serde(default)]
    pub wait: bool,
}

/// How often `wait=true` polls the job manager for a terminal state.
/// Short enough to keep perceived latency low, long enough not to spin a
/// request thread on a multi-second distillation run.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// `POST /api/autoDistill?wait={true|false}`.
pub async fn submit_handler(
    State(state): State<AppState>,
    Query(wait): Query<WaitParam>,
    Json(req): Json<SubmitRequest>,
) -> Result<axum::response::Response, ApiError> {
    let submission = build_submission(req)?;
    let job_id = state.manager.submit(submission);

    if !wait.wait {
        let body = SubmitAcceptedDto {
            schema_version: 1,
            job_id,
        };
        return Ok((StatusCode::ACCEPTED, Json(body)).into_response());
    }

    let view = state
        .manager
        .wait_for_terminal(&job_id, WAIT_POLL_INTERVAL)
        .await
        .ok_or_else(|| bad_request("job disappeared while waiting"))?;

    Ok((StatusCode::OK, Json(JobResultDto::from(view))).into_response())
}

/// `GET /api/jobs/{jobId}`.
pub async fn status_handler(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<axum::response::Response, ApiError> {
    match state.manager.status(&job_id) {
        Some(view) => Ok((StatusCode::OK, Json(JobStatusDto::from(view))).into_response()),
        None => Err(bad_request(format!("unknown job id: {job_id}"))),
    }
}

/// `GET /healthz`.
pub async fn healthz_handler(State(state): State<AppState>) -> Json<HealthzDto> {
    Json(HealthzDto {
        status: "ok",
        model: state.config.healthz_model_name.clone(),
        embedding_model: state.config.healthz_embedding_model_name.clone(),
        max_cluster_size: state.config.max_cluster_size_for_llm,
    })
}

/// `GET /metrics`, Prometheus text exposition.
pub async fn metrics_handler() -> impl IntoResponse {
    (
        [("content-type", "text/plain; version=0.0.4")],
        store::metrics().render_prometheus(),
    )
}

/// Converts the wire request into a `JobSubmission`, skipping individual
/// blocks that fail validation with a logged warning rather than failing
/// the whole submission.
fn build_submission(req: SubmitRequest) -> Result<JobSubmission, ApiError> {
    if req.results.is_empty() {
        return Ok(JobSubmission {
            similarity: req.similarity,
            iterations: req.iterations,
            blocks: Vec::new(),
        });
    }

    let mut blocks = Vec::with_capacity(req.results.len());
    for entry in req.results {
        let id = entry.blockify_result_uuid.clone();
        match entry.blockified_text_result.into_idea_block() {
            Ok(block) => blocks.push(SubmissionBlock {
                id,
                block,
                hidden: entry.hidden,
            }),
            Err(e) => warn!(block_id = %id, error = %e, "dropping malformed input block"),
        }
    }

    Ok(JobSubmission {
        similarity: req.similarity,
        iterations: req.iterations,
        blocks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::{BlockifiedTextResultDto, InputResultDto};

    fn entry(id: &str, name: &str) -> InputResultDto {
        InputResultDto {
            kind: Some("blockify".to_string()),
            blockify_result_uuid: id.to_string(),
            blockified_text_result: BlockifiedTextResultDto {
                name: name.to_string(),
                critical_question: "q?".to_string(),
                trusted_answer: "a".to_string(),
                tags: "X,Y".to_string(),
                keywords: "k1,k2".to_string(),
                entities: vec![],
            },
            hidden: false,
        }
    }

    #[test]
    fn empty_results_builds_an_empty_submission() {
        let req = SubmitRequest {
            blockify_task_uuid: None,
            similarity: None,
            iterations: None,
            results: vec![],
        };
        let submission = build_submission(req).unwrap();
        assert!(submission.blocks.is_empty());
    }

    #[test]
    fn malformed_block_is_dropped_not_fatal() {
        let mut bad = entry("u1", "");
        bad.blockified_text_result.name = String::new();
        let good = entry("u2", "B");

        let req = SubmitRequest {
            blockify_task_uuid: None,
            similarity: None,
            iterations: None,
            results: vec![bad, good],
        };
        let submission = build_submission(req).unwrap();
        assert_eq!(submission.blocks.len(), 1);
        assert_eq!(submission.blocks[0].id, "u2");
    }

    #[test]
    fn valid_block_round_trips_tags_and_keywords() {
        let req = SubmitRequest {
            blockify_task_uuid: None,
            similarity: Some(0.6),
            iterations: Some(3),
            results: vec![entry("u1", "A")],
        };
        let submission = build_submission(req).unwrap();
        assert_eq!(submission.blocks[0].block.tags, vec!["X", "Y"]);
        assert_eq!(submission.blocks[0].block.keywords, vec!["k1", "k2"]);
        assert_eq!(submission.similarity, Some(0.6));
        assert_eq!(submission.iterations, Some(3));
    }
}
