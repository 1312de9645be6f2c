//! Generation job records shared by the API client, the poller and the store.
//!
//! The client never computes status transitions itself. Every `JobStatus` here
//! is either reported by the backend or, for `TimedOut`, assigned locally when
//! tracking is abandoned.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use super::empty_as_none;

// ────────────────────────────────────────────────────────────────────────────
// Status
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
#[error("unknown job status '{0}'")]
pub struct UnknownStatus(pub String);

/// Lifecycle of a generation job as observed by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    /// Client-only: polling gave up before the server reported a terminal status.
    TimedOut,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::TimedOut => "TIMED_OUT",
        }
    }

    /// COMPLETED or FAILED. No further transitions are expected from the server.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Processing)
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, JobStatus::Failed | JobStatus::TimedOut)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = UnknownStatus;

    // The start endpoints answer with lowercase ("processing"), the status
    // endpoints with the uppercase model choices.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(JobStatus::Pending),
            "PROCESSING" => Ok(JobStatus::Processing),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            "TIMED_OUT" => Ok(JobStatus::TimedOut),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

impl TryFrom<String> for JobStatus {
    type Error = UnknownStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl Serialize for JobStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Requests and jobs
// ────────────────────────────────────────────────────────────────────────────

/// Which kind of asynchronous generation an entity is tracked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    Resume,
    Critique,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Resume => f.write_str("resume"),
            EntityKind::Critique => f.write_str("critique"),
        }
    }
}

/// Input of a "start generation" call, forwarded verbatim to the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationRequest {
    Resume {
        title: String,
        job_description: String,
    },
    Critique {
        candidate_id: Uuid,
        job_id: Option<Uuid>,
    },
}

impl GenerationRequest {
    pub fn kind(&self) -> EntityKind {
        match self {
            GenerationRequest::Resume { .. } => EntityKind::Resume,
            GenerationRequest::Critique { .. } => EntityKind::Critique,
        }
    }

    /// The entity the job will update, when it is known before the job starts.
    /// Resumes only get an id once the backend has created the row.
    pub fn target_id(&self) -> Option<String> {
        match self {
            GenerationRequest::Resume { .. } => None,
            GenerationRequest::Critique { candidate_id, .. } => Some(candidate_id.to_string()),
        }
    }
}

/// A job accepted by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedJob {
    pub kind: EntityKind,
    /// Key for the status endpoint (resume id or critique task id).
    pub job_id: String,
    pub target_entity_id: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Status payloads and tracked entities
// ────────────────────────────────────────────────────────────────────────────

/// Body of a status response. Narrower than the list/detail shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub status: JobStatus,
    /// Resume status reports the failure under `error`, critiques under `error_message`.
    #[serde(
        default,
        alias = "error",
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub error_message: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl StatusPayload {
    pub fn new(status: JobStatus) -> Self {
        Self {
            status,
            error_message: None,
            fields: Map::new(),
        }
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// A resume or candidate record whose `status` mirrors its latest generation job.
/// Domain fields stay opaque to the tracking machinery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedEntity {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub error_message: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Critique columns lifted onto the candidate when it is tracked.
const CRITIQUE_FIELDS: &[&str] = &[
    "status",
    "error_message",
    "task_id",
    "overall_score",
    "keyword_score",
    "semantic_score",
    "result_json",
    "completed_at",
];

impl TrackedEntity {
    /// Placeholder for an entity the list endpoint has not returned yet.
    pub fn provisional(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: Some(JobStatus::Pending),
            error_message: None,
            fields: Map::new(),
        }
    }

    /// Builds the tracked view of a candidate. List rows carry the critique
    /// flattened as `critique_status` / `overall_score`; detail records nest
    /// the whole critique under `critique`. Both end up with the critique's
    /// status as the entity status.
    pub fn from_candidate(candidate: Value) -> Result<Self, serde_json::Error> {
        let mut record = match candidate {
            Value::Object(record) => record,
            other => return serde_json::from_value(other),
        };

        if let Some(status) = record.remove("critique_status") {
            record.insert("status".to_string(), status);
        }

        if let Some(Value::Object(critique)) = record.remove("critique") {
            if let Some(id) = critique.get("id") {
                record.insert("critique_id".to_string(), id.clone());
            }
            for (key, value) in critique {
                if CRITIQUE_FIELDS.contains(&key.as_str()) {
                    record.insert(key, value);
                }
            }
        }

        serde_json::from_value(Value::Object(record))
    }

    /// Shallow merge of a status payload over this record. `id` is never overwritten.
    pub fn merge(&mut self, payload: &StatusPayload) {
        self.status = Some(payload.status);
        if payload.error_message.is_some() {
            self.error_message = payload.error_message.clone();
        } else if payload.status == JobStatus::Completed {
            self.error_message = None;
        }
        for (key, value) in &payload.fields {
            if key == "id" {
                continue;
            }
            self.fields.insert(key.clone(), value.clone());
        }
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn f64_field(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(Value::as_f64)
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }
}
