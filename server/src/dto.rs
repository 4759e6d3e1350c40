//! Wire DTOs for the HTTP surface.
//!
//! Kept separate from `model::IdeaBlock` because the wire shape diverges
//! from the domain model in two ways that don't belong folded into one
//! type: field names are camelCase, and `tags`/`keywords` travel as
//! comma-separated strings rather than arrays.

use model::{Entity, IdeaBlock};
use serde::{Deserialize, Serialize};
use store::{JobStatsOut, JobView, ResultBlock};

/// `POST /api/autoDistill` request body.
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    #[serde(rename = "blockifyTaskUUID", default)]
    pub blockify_task_uuid: Option<String>,
    pub similarity: Option<f32>,
    pub iterations: Option<u32>,
    #[serde(default)]
    pub results: Vec<InputResultDto>,
}

#[derive(Debug, Deserialize)]
pub struct InputResultDto {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(rename = "blockifyResultUUID")]
    pub blockify_result_uuid: String,
    #[serde(rename = "blockifiedTextResult")]
    pub blockified_text_result: BlockifiedTextResultDto,
    #[serde(default)]
    pub hidden: bool,
}

#[derive(Debug, Deserialize)]
pub struct BlockifiedTextResultDto {
    pub name: String,
    #[serde(rename = "criticalQuestion")]
    pub critical_question: String,
    #[serde(rename = "trustedAnswer")]
    pub trusted_answer: String,
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub keywords: String,
    #[serde(default)]
    pub entities: Vec<EntityDto>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EntityDto {
    #[serde(rename = "entityName")]
    pub entity_name: String,
    #[serde(rename = "entityType")]
    pub entity_type: String,
}

impl BlockifiedTextResultDto {
    /// Converts the wire shape into the domain `IdeaBlock`, splitting the
    /// comma-separated `tags`/`keywords` strings into vectors.
    ///
    /// # Errors
    /// Returns an error if any required field is empty — the caller turns
    /// this into a per-block skip-with-warning, never a batch abort.
    pub fn into_idea_block(self) -> anyhow::Result<IdeaBlock> {
        let entities = self
            .entities
            .into_iter()
            .map(|e| Entity {
                entity_name: e.entity_name,
                entity_type: e.entity_type,
            })
            .collect();
        IdeaBlock::new(
            self.name,
            self.critical_question,
            self.trusted_answer,
            model::xml::split_csv(&self.tags),
            model::xml::split_csv(&self.keywords),
            entities,
        )
    }
}

fn idea_block_to_dto(block: &IdeaBlock) -> BlockifiedTextResultDto {
    BlockifiedTextResultDto {
        name: block.name.clone(),
        critical_question: block.critical_question.clone(),
        trusted_answer: block.trusted_answer.clone(),
        tags: block.tags.join(","),
        keywords: block.keywords.join(","),
        entities: block
            .entities
            .iter()
            .map(|e| EntityDto {
                entity_name: e.entity_name.clone(),
                entity_type: e.entity_type.clone(),
            })
            .collect(),
    }
}

impl Serialize for BlockifiedTextResultDto {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("BlockifiedTextResultDto", 6)?;
        s.serialize_field("name", &self.name)?;
        s.serialize_field("criticalQuestion", &self.critical_question)?;
        s.serialize_field("trustedAnswer", &self.trusted_answer)?;
        s.serialize_field("tags", &self.tags)?;
        s.serialize_field("keywords", &self.keywords)?;
        s.serialize_field("entities", &self.entities)?;
        s.end()
    }
}

/// One entry of the `results[]` array in the submission/status responses.
#[derive(Debug, Serialize)]
pub struct OutputResultDto {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(rename = "blockifyResultUUID")]
    pub blockify_result_uuid: String,
    #[serde(rename = "blockifiedTextResult", skip_serializing_if = "Option::is_none")]
    pub blockified_text_result: Option<BlockifiedTextResultDto>,
    pub hidden: bool,
    #[serde(rename = "blockifyResultsUsed", skip_serializing_if = "Option::is_none")]
    pub blockify_results_used: Option<Vec<String>>,
}

impl From<&ResultBlock> for OutputResultDto {
    fn from(r: &ResultBlock) -> Self {
        Self {
            kind: if r.merged { "merged" } else { "blockify" },
            blockify_result_uuid: r.id.clone(),
            blockified_text_result: r.payload.as_ref().map(idea_block_to_dto),
            hidden: r.hidden,
            blockify_results_used: r.used.as_ref().map(|set| set.iter().cloned().collect()),
        }
    }
}

/// The `stats` object.
#[derive(Debug, Serialize, Default)]
pub struct StatsDto {
    #[serde(rename = "startingBlockCount")]
    pub starting_block_count: usize,
    #[serde(rename = "finalBlockCount")]
    pub final_block_count: usize,
    #[serde(rename = "blocksRemoved")]
    pub blocks_removed: usize,
    #[serde(rename = "blocksAdded")]
    pub blocks_added: usize,
    #[serde(rename = "blockReductionPercent")]
    pub block_reduction_percent: f32,
}

impl From<&JobStatsOut> for StatsDto {
    fn from(s: &JobStatsOut) -> Self {
        Self {
            starting_block_count: s.starting_block_count,
            final_block_count: s.final_block_count,
            blocks_removed: s.blocks_removed,
            blocks_added: s.blocks_added,
            block_reduction_percent: s.block_reduction_percent,
        }
    }
}

/// Response when `POST /api/autoDistill?wait=false` accepts a job (HTTP 202).
#[derive(Debug, Serialize)]
pub struct SubmitAcceptedDto {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    #[serde(rename = "jobId")]
    pub job_id: String,
}

/// Response when `wait=true` or the job is already terminal.
#[derive(Debug, Serialize)]
pub struct JobResultDto {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    pub status: model::JobStatus,
    pub stats: Option<StatsDto>,
    pub results: Vec<OutputResultDto>,
}

/// `progress` sub-object of the job-status response.
#[derive(Debug, Serialize)]
pub struct ProgressDto {
    pub percent: u8,
    pub phase: String,
    pub details: Option<String>,
}

/// `GET /api/jobs/{jobId}` response.
#[derive(Debug, Serialize)]
pub struct JobStatusDto {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    pub status: model::JobStatus,
    pub progress: ProgressDto,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<OutputResultDto>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<StatsDto>,
}

impl From<JobView> for JobStatusDto {
    fn from(view: JobView) -> Self {
        Self {
            schema_version: 1,
            status: view.status,
            progress: ProgressDto {
                percent: view.progress.percent,
                phase: view.progress.phase,
                details: view.progress.details,
            },
            error: view.error,
            results: view
                .results
                .as_ref()
                .map(|rs| rs.iter().map(OutputResultDto::from).collect()),
            stats: view.stats.as_ref().map(StatsDto::from),
        }
    }
}

impl From<JobView> for JobResultDto {
    fn from(view: JobView) -> Self {
        Self {
            schema_version: 1,
            status: view.status,
            stats: view.stats.as_ref().map(StatsDto::from),
            results: view
                .results
                .as_ref()
                .map(|rs| rs.iter().map(OutputResultDto::from).collect())
                .unwrap_or_default(),
        }
    }
}

/// `GET /healthz` response.
#[derive(Debug, Serialize)]
pub struct HealthzDto {
    pub status: &'static str,
    pub model: String,
    pub embedding_model: String,
    pub max_cluster_size: usize,
}

/// Error body for any non-2xx response.
#[derive(Debug, Serialize)]
pub struct ErrorDto {
    pub error: String,
    pub code: &'static str,
}
