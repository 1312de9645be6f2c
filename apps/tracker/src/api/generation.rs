//! Start/status/list calls for asynchronous resume and critique generation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{ApiClient, ApiError};
use crate::models::generation::{
    EntityKind, GenerationRequest, StartedJob, StatusPayload, TrackedEntity,
};

/// Backend operations the poller and the generation store depend on.
///
/// `ApiClient` is the production implementation; tests script their own.
#[async_trait]
pub trait GenerationApi: Send + Sync {
    /// Forwards the request verbatim to the matching start endpoint.
    async fn start(&self, request: &GenerationRequest) -> Result<StartedJob, ApiError>;

    /// One status check for a job previously returned by `start`.
    async fn status(&self, kind: EntityKind, job_id: &str) -> Result<StatusPayload, ApiError>;

    /// Full entity list, used to fill in fields the status payload omits.
    async fn list(&self, kind: EntityKind) -> Result<Vec<TrackedEntity>, ApiError>;
}

#[derive(Debug, Serialize)]
struct ResumeBody<'a> {
    title: &'a str,
    job_description: &'a str,
}

#[derive(Debug, Serialize)]
struct CritiqueBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    job_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
struct ResumeStarted {
    resume_id: String,
}

#[derive(Debug, Deserialize)]
struct CritiqueStarted {
    task_id: String,
}

#[async_trait]
impl GenerationApi for ApiClient {
    async fn start(&self, request: &GenerationRequest) -> Result<StartedJob, ApiError> {
        match request {
            GenerationRequest::Resume {
                title,
                job_description,
            } => {
                let body = ResumeBody {
                    title,
                    job_description,
                };
                let started: ResumeStarted = self.post("agents/generate/", &body).await?;
                Ok(StartedJob {
                    kind: EntityKind::Resume,
                    job_id: started.resume_id.clone(),
                    target_entity_id: started.resume_id,
                })
            }
            GenerationRequest::Critique {
                candidate_id,
                job_id,
            } => {
                let body = CritiqueBody { job_id: *job_id };
                let path = format!("candidates/{candidate_id}/generate_critique/");
                let started: CritiqueStarted = self.post(&path, &body).await?;
                Ok(StartedJob {
                    kind: EntityKind::Critique,
                    job_id: started.task_id,
                    target_entity_id: candidate_id.to_string(),
                })
            }
        }
    }

    async fn status(&self, kind: EntityKind, job_id: &str) -> Result<StatusPayload, ApiError> {
        let path = match kind {
            EntityKind::Resume => format!("agents/status/{job_id}/"),
            EntityKind::Critique => format!("critiques/by_task/{job_id}/"),
        };
        self.get(&path).await
    }

    async fn list(&self, kind: EntityKind) -> Result<Vec<TrackedEntity>, ApiError> {
        match kind {
            EntityKind::Resume => self.fetch_list("resumes/").await,
            EntityKind::Critique => {
                let candidates: Vec<Value> = self.fetch_list("candidates/").await?;
                candidates
                    .into_iter()
                    .map(TrackedEntity::from_candidate)
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(ApiError::Parse)
            }
        }
    }
}
