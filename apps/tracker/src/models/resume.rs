use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::empty_as_none;
use super::generation::JobStatus;

/// A generated resume as returned by the list/detail endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resume {
    pub id: Uuid,
    pub title: String,
    pub status: JobStatus,
    #[serde(default)]
    pub match_score: Option<f64>,
    #[serde(default)]
    pub content: Value,
    #[serde(default)]
    pub target_job: Option<Uuid>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub version: i32,
    #[serde(default)]
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Resume {
    /// Only completed resumes carry content worth exporting.
    pub fn is_downloadable(&self) -> bool {
        self.status == JobStatus::Completed
    }
}
