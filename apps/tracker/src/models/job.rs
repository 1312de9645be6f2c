use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPosting {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub company: String,
    pub description: String,
    #[serde(default)]
    pub requirements: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

/// Body for creating or replacing a job posting.
#[derive(Debug, Clone, Serialize)]
pub struct NewJobPosting {
    pub title: String,
    pub company: String,
    pub description: String,
    pub requirements: String,
}
