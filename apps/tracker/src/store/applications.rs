//! Job-application tracking state: the list, its stats, the active status
//! filter and the board/list view preference.
//!
//! Every mutation goes to the server first and the store applies the server's
//! answer. Nothing is flipped optimistically.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use super::EventBus;
use crate::api::{ApiError, ApplicationApi};
use crate::errors::TrackerError;
use crate::models::application::{
    ApplicationPatch, ApplicationStats, ApplicationStatus, JobApplication, NewApplication,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Only(ApplicationStatus),
}

impl StatusFilter {
    pub fn matches(&self, status: ApplicationStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Only(wanted) => *wanted == status,
        }
    }
}

impl FromStr for StatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(StatusFilter::All);
        }
        s.parse().map(StatusFilter::Only)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewMode {
    #[default]
    List,
    Kanban,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplicationEvent {
    Loaded { count: usize },
    Changed { id: Uuid },
    Removed { id: Uuid },
    Failed { message: String },
}

#[derive(Default)]
struct State {
    items: Vec<JobApplication>,
    stats: Option<ApplicationStats>,
    by_status: BTreeMap<String, Vec<JobApplication>>,
    status_filter: StatusFilter,
    view_mode: ViewMode,
    loading: bool,
    last_error: Option<String>,
}

pub struct ApplicationsStore {
    api: Arc<dyn ApplicationApi>,
    state: Mutex<State>,
    events: EventBus<ApplicationEvent>,
}

impl ApplicationsStore {
    pub fn new(api: Arc<dyn ApplicationApi>) -> Self {
        Self {
            api,
            state: Mutex::new(State::default()),
            events: EventBus::new(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ApplicationEvent> {
        self.events.subscribe()
    }

    // ── Commands ────────────────────────────────────────────────────────────

    pub async fn fetch_all(&self) -> Result<usize, TrackerError> {
        self.state.lock().loading = true;
        let result = self.api.list_applications().await;
        self.state.lock().loading = false;

        let items = self.record(result, "fetch applications")?;
        let count = items.len();
        self.state.lock().items = items;

        info!(count, "Applications loaded");
        self.events.publish(ApplicationEvent::Loaded { count });
        Ok(count)
    }

    pub async fn fetch_stats(&self) -> Result<ApplicationStats, TrackerError> {
        let result = self.api.application_stats().await;
        let stats = self.record(result, "fetch application stats")?;
        self.state.lock().stats = Some(stats.clone());
        Ok(stats)
    }

    pub async fn fetch_by_status(&self) -> Result<(), TrackerError> {
        let result = self.api.applications_by_status().await;
        let grouped = self.record(result, "fetch applications by status")?;
        self.state.lock().by_status = grouped;
        Ok(())
    }

    /// Creates an application and puts it at the top of the list.
    pub async fn create(&self, application: &NewApplication) -> Result<JobApplication, TrackerError> {
        let result = self.api.create_application(application).await;
        let created = self.record(result, "create application")?;
        self.state.lock().items.insert(0, created.clone());
        self.events.publish(ApplicationEvent::Changed { id: created.id });
        Ok(created)
    }

    pub async fn update(
        &self,
        id: Uuid,
        patch: &ApplicationPatch,
    ) -> Result<JobApplication, TrackerError> {
        let result = self.api.update_application(id, patch).await;
        let updated = self.record(result, "update application")?;
        self.replace(updated.clone());
        Ok(updated)
    }

    pub async fn update_status(
        &self,
        id: Uuid,
        status: ApplicationStatus,
        notes: Option<&str>,
    ) -> Result<JobApplication, TrackerError> {
        let result = self.api.update_application_status(id, status, notes).await;
        let updated = self.record(result, "update application status")?;
        self.replace(updated.clone());
        Ok(updated)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), TrackerError> {
        let result = self.api.delete_application(id).await;
        self.record(result, "delete application")?;
        self.state.lock().items.retain(|app| app.id != id);
        self.events.publish(ApplicationEvent::Removed { id });
        Ok(())
    }

    /// Flips the favorite flag on the server and stores whatever it answered.
    pub async fn toggle_favorite(&self, id: Uuid) -> Result<bool, TrackerError> {
        let result = self.api.toggle_favorite(id).await;
        let is_favorite = self.record(result, "toggle favorite")?;

        let changed = {
            let mut state = self.state.lock();
            match state.items.iter_mut().find(|app| app.id == id) {
                Some(app) => {
                    app.is_favorite = is_favorite;
                    true
                }
                None => false,
            }
        };
        if changed {
            self.events.publish(ApplicationEvent::Changed { id });
        }
        Ok(is_favorite)
    }

    pub fn set_status_filter(&self, filter: StatusFilter) {
        self.state.lock().status_filter = filter;
    }

    pub fn set_view_mode(&self, mode: ViewMode) {
        self.state.lock().view_mode = mode;
    }

    pub fn clear_error(&self) {
        self.state.lock().last_error = None;
    }

    // ── Queries ─────────────────────────────────────────────────────────────

    pub fn items(&self) -> Vec<JobApplication> {
        self.state.lock().items.clone()
    }

    pub fn item(&self, id: Uuid) -> Option<JobApplication> {
        self.state
            .lock()
            .items
            .iter()
            .find(|app| app.id == id)
            .cloned()
    }

    /// Items matching the active status filter.
    pub fn filtered(&self) -> Vec<JobApplication> {
        let state = self.state.lock();
        state
            .items
            .iter()
            .filter(|app| state.status_filter.matches(app.status))
            .cloned()
            .collect()
    }

    /// Kanban columns in pipeline order. Closed-out stages are left off the board.
    pub fn board(&self) -> Vec<(ApplicationStatus, Vec<JobApplication>)> {
        let state = self.state.lock();
        ApplicationStatus::PIPELINE
            .iter()
            .map(|status| {
                let column = state
                    .items
                    .iter()
                    .filter(|app| app.status == *status)
                    .cloned()
                    .collect();
                (*status, column)
            })
            .collect()
    }

    pub fn status_filter(&self) -> StatusFilter {
        self.state.lock().status_filter
    }

    pub fn view_mode(&self) -> ViewMode {
        self.state.lock().view_mode
    }

    pub fn stats(&self) -> Option<ApplicationStats> {
        self.state.lock().stats.clone()
    }

    pub fn by_status(&self) -> BTreeMap<String, Vec<JobApplication>> {
        self.state.lock().by_status.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.lock().loading
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.lock().last_error.clone()
    }

    // ── Internals ───────────────────────────────────────────────────────────

    fn replace(&self, updated: JobApplication) {
        let id = updated.id;
        {
            let mut state = self.state.lock();
            if let Some(slot) = state.items.iter_mut().find(|app| app.id == id) {
                *slot = updated;
            }
        }
        self.events.publish(ApplicationEvent::Changed { id });
    }

    /// Stores the failure message for the error banner and converts the error.
    fn record<T>(&self, result: Result<T, ApiError>, action: &str) -> Result<T, TrackerError> {
        result.map_err(|e| {
            warn!(error = %e, "Failed to {action}");
            let message = e.user_message();
            self.state.lock().last_error = Some(message.clone());
            self.events.publish(ApplicationEvent::Failed { message });
            TrackerError::Api(e)
        })
    }
}
