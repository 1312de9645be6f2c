use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ApiClient, ApiError};
use crate::models::application::{
    ApplicationPatch, ApplicationStats, ApplicationStatus, JobApplication, NewApplication,
};

/// Job-application tracking endpoints consumed by `ApplicationsStore`.
#[async_trait]
pub trait ApplicationApi: Send + Sync {
    async fn list_applications(&self) -> Result<Vec<JobApplication>, ApiError>;

    async fn application_stats(&self) -> Result<ApplicationStats, ApiError>;

    async fn applications_by_status(
        &self,
    ) -> Result<BTreeMap<String, Vec<JobApplication>>, ApiError>;

    async fn create_application(
        &self,
        application: &NewApplication,
    ) -> Result<JobApplication, ApiError>;

    async fn update_application(
        &self,
        id: Uuid,
        patch: &ApplicationPatch,
    ) -> Result<JobApplication, ApiError>;

    async fn update_application_status(
        &self,
        id: Uuid,
        status: ApplicationStatus,
        notes: Option<&str>,
    ) -> Result<JobApplication, ApiError>;

    async fn delete_application(&self, id: Uuid) -> Result<(), ApiError>;

    /// Returns the flag as the server stored it.
    async fn toggle_favorite(&self, id: Uuid) -> Result<bool, ApiError>;
}

#[derive(Debug, Serialize)]
struct StatusUpdate<'a> {
    status: ApplicationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct FavoriteToggled {
    is_favorite: bool,
}

#[async_trait]
impl ApplicationApi for ApiClient {
    async fn list_applications(&self) -> Result<Vec<JobApplication>, ApiError> {
        self.fetch_list("applications/").await
    }

    async fn application_stats(&self) -> Result<ApplicationStats, ApiError> {
        self.get("applications/stats/").await
    }

    async fn applications_by_status(
        &self,
    ) -> Result<BTreeMap<String, Vec<JobApplication>>, ApiError> {
        self.get("applications/by_status/").await
    }

    async fn create_application(
        &self,
        application: &NewApplication,
    ) -> Result<JobApplication, ApiError> {
        self.post("applications/", application).await
    }

    async fn update_application(
        &self,
        id: Uuid,
        patch: &ApplicationPatch,
    ) -> Result<JobApplication, ApiError> {
        self.patch(&format!("applications/{id}/"), patch).await
    }

    async fn update_application_status(
        &self,
        id: Uuid,
        status: ApplicationStatus,
        notes: Option<&str>,
    ) -> Result<JobApplication, ApiError> {
        let body = StatusUpdate { status, notes };
        self.post(&format!("applications/{id}/update_status/"), &body)
            .await
    }

    async fn delete_application(&self, id: Uuid) -> Result<(), ApiError> {
        self.delete(&format!("applications/{id}/")).await
    }

    async fn toggle_favorite(&self, id: Uuid) -> Result<bool, ApiError> {
        let toggled: FavoriteToggled = self
            .post_empty(&format!("applications/{id}/toggle_favorite/"))
            .await?;
        Ok(toggled.is_favorite)
    }
}
