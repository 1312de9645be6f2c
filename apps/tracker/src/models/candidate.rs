use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::empty_as_none;
use super::generation::JobStatus;

/// A scored analysis of a candidate resume, produced asynchronously.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Critique {
    pub id: Uuid,
    pub status: JobStatus,
    #[serde(default)]
    pub task_id: String,
    #[serde(default)]
    pub overall_score: Option<f64>,
    #[serde(default)]
    pub keyword_score: Option<f64>,
    #[serde(default)]
    pub semantic_score: Option<f64>,
    #[serde(default)]
    pub result_json: Option<Value>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub id: Uuid,
    pub job_posting: Uuid,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub resume_url: Option<String>,
    #[serde(default)]
    pub resume_text: String,
    #[serde(default)]
    pub critique: Option<Critique>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Candidate {
    pub fn critique_status(&self) -> Option<JobStatus> {
        self.critique.as_ref().map(|c| c.status)
    }
}

/// Row of the candidate list endpoint: the critique is flattened to its
/// status and overall score, and the job posting is omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateSummary {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub critique_status: Option<JobStatus>,
    #[serde(default)]
    pub overall_score: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Multipart upload of a candidate resume file against a job posting.
#[derive(Debug, Clone)]
pub struct NewCandidate {
    pub job_posting: Uuid,
    pub name: String,
    pub email: String,
    pub file_name: String,
    pub resume_file: Vec<u8>,
}
