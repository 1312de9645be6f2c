//! Scripted `GenerationApi` double shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::api::{ApiError, GenerationApi};
use crate::models::generation::{
    EntityKind, GenerationRequest, JobStatus, StartedJob, StatusPayload, TrackedEntity,
};

/// One scripted answer of the status endpoint.
pub(crate) enum Step {
    Status(StatusPayload),
    Fail,
    /// Answers with the payload only once the gate hands out a permit.
    Gated(Arc<Semaphore>, StatusPayload),
}

pub(crate) fn status(status: JobStatus) -> Step {
    Step::Status(StatusPayload::new(status))
}

pub(crate) fn unavailable() -> ApiError {
    ApiError::Api {
        status: 503,
        message: "Service unavailable".to_string(),
    }
}

/// Answers `start` from a queue, `status` from a script (PROCESSING once the
/// script runs dry) and `list` from a fixed listing.
#[derive(Default)]
pub(crate) struct ScriptedApi {
    starts: Mutex<VecDeque<Result<StartedJob, ApiError>>>,
    steps: Mutex<VecDeque<Step>>,
    listing: Mutex<Option<Vec<TrackedEntity>>>,
    start_gate: Mutex<Option<Arc<Semaphore>>>,
    pub start_calls: Mutex<Vec<GenerationRequest>>,
    pub status_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starts(self, kind: EntityKind, job_id: &str, target: &str) -> Self {
        self.starts.lock().push_back(Ok(StartedJob {
            kind,
            job_id: job_id.to_string(),
            target_entity_id: target.to_string(),
        }));
        self
    }

    pub fn start_fails(self, status: u16, message: &str) -> Self {
        self.starts.lock().push_back(Err(ApiError::Api {
            status,
            message: message.to_string(),
        }));
        self
    }

    pub fn then(self, step: Step) -> Self {
        self.steps.lock().push_back(step);
        self
    }

    /// Holds every `start` until the gate hands out a permit.
    pub fn gate_starts(self, gate: Arc<Semaphore>) -> Self {
        *self.start_gate.lock() = Some(gate);
        self
    }

    pub fn listing(self, entities: Vec<TrackedEntity>) -> Self {
        *self.listing.lock() = Some(entities);
        self
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn start_requests(&self) -> Vec<GenerationRequest> {
        self.start_calls.lock().clone()
    }
}

#[async_trait]
impl GenerationApi for ScriptedApi {
    async fn start(&self, request: &GenerationRequest) -> Result<StartedJob, ApiError> {
        self.start_calls.lock().push(request.clone());
        let gate = self.start_gate.lock().clone();
        if let Some(gate) = gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        self.starts.lock().pop_front().unwrap_or_else(|| {
            Err(ApiError::Api {
                status: 500,
                message: "no scripted start".to_string(),
            })
        })
    }

    async fn status(&self, _kind: EntityKind, _job_id: &str) -> Result<StatusPayload, ApiError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.lock().pop_front();
        match step {
            Some(Step::Status(payload)) => Ok(payload),
            Some(Step::Fail) => Err(unavailable()),
            Some(Step::Gated(gate, payload)) => {
                let permit = gate.acquire().await.expect("gate closed");
                permit.forget();
                Ok(payload)
            }
            None => Ok(StatusPayload::new(JobStatus::Processing)),
        }
    }

    async fn list(&self, _kind: EntityKind) -> Result<Vec<TrackedEntity>, ApiError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.listing.lock().clone().ok_or_else(unavailable)
    }
}
