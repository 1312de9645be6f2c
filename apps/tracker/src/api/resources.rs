//! Plain CRUD endpoints for job postings, candidates, critiques and resumes.

use reqwest::multipart::{Form, Part};
use serde::Serialize;
use uuid::Uuid;

use super::{ApiClient, ApiError};
use crate::models::candidate::{Candidate, CandidateSummary, Critique, NewCandidate};
use crate::models::job::{JobPosting, NewJobPosting};
use crate::models::resume::Resume;

#[derive(Debug, Serialize)]
struct CandidateFilter {
    job_id: Uuid,
}

impl ApiClient {
    // ── Job postings ────────────────────────────────────────────────────────

    pub async fn list_jobs(&self) -> Result<Vec<JobPosting>, ApiError> {
        self.fetch_list("jobs/").await
    }

    pub async fn get_job(&self, id: Uuid) -> Result<JobPosting, ApiError> {
        self.get(&format!("jobs/{id}/")).await
    }

    pub async fn create_job(&self, job: &NewJobPosting) -> Result<JobPosting, ApiError> {
        self.post("jobs/", job).await
    }

    pub async fn update_job(&self, id: Uuid, job: &NewJobPosting) -> Result<JobPosting, ApiError> {
        self.put(&format!("jobs/{id}/"), job).await
    }

    pub async fn delete_job(&self, id: Uuid) -> Result<(), ApiError> {
        self.delete(&format!("jobs/{id}/")).await
    }

    // ── Candidates ──────────────────────────────────────────────────────────

    /// Lists candidates, optionally only those applying to `job_id`.
    pub async fn list_candidates(
        &self,
        job_id: Option<Uuid>,
    ) -> Result<Vec<CandidateSummary>, ApiError> {
        match job_id {
            Some(job_id) => {
                self.fetch_list_with_query("candidates/", &CandidateFilter { job_id })
                    .await
            }
            None => self.fetch_list("candidates/").await,
        }
    }

    pub async fn get_candidate(&self, id: Uuid) -> Result<Candidate, ApiError> {
        self.get(&format!("candidates/{id}/")).await
    }

    pub async fn upload_candidate(&self, candidate: NewCandidate) -> Result<Candidate, ApiError> {
        let file = Part::bytes(candidate.resume_file).file_name(candidate.file_name);
        let form = Form::new()
            .text("job_posting", candidate.job_posting.to_string())
            .text("name", candidate.name)
            .text("email", candidate.email)
            .part("resume_file", file);
        self.post_multipart("candidates/", form).await
    }

    pub async fn delete_candidate(&self, id: Uuid) -> Result<(), ApiError> {
        self.delete(&format!("candidates/{id}/")).await
    }

    // ── Critiques ───────────────────────────────────────────────────────────

    pub async fn get_critique(&self, id: Uuid) -> Result<Critique, ApiError> {
        self.get(&format!("critiques/{id}/")).await
    }

    // ── Resumes ─────────────────────────────────────────────────────────────

    pub async fn list_resumes(&self) -> Result<Vec<Resume>, ApiError> {
        self.fetch_list("resumes/").await
    }

    pub async fn get_resume(&self, id: Uuid) -> Result<Resume, ApiError> {
        self.get(&format!("resumes/{id}/")).await
    }

    pub async fn delete_resume(&self, id: Uuid) -> Result<(), ApiError> {
        self.delete(&format!("resumes/{id}/")).await
    }
}
