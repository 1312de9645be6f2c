//! Generation store: the single source of truth for in-flight resume or critique jobs.
//!
//! Flow: start_generation → POST start → in-flight marker recorded → poll loop
//!       spawned → every status merged by `on_status_update` → terminal status
//!       clears the marker → full list refresh.
//!
//! At most one job is in flight per target entity. A start for a target that
//! already has one is rejected, never merged or queued.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::{EventBus, StoreEvent};
use crate::api::{ApiError, GenerationApi};
use crate::errors::TrackerError;
use crate::models::generation::{
    EntityKind, GenerationRequest, JobStatus, StartedJob, StatusPayload, TrackedEntity,
};
use crate::poller::{poll_job, PollConfig, PollOutcome, PollRegistry};

/// The live job for a target. `epoch` identifies the poll loop allowed to
/// update it; anything reporting another epoch is stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InFlightJob {
    /// `None` while the start request is still on the wire.
    pub job_id: Option<String>,
    pub epoch: u64,
}

#[derive(Default)]
struct State {
    entities: Vec<TrackedEntity>,
    in_flight: HashMap<String, InFlightJob>,
    /// Original request per target, replayed by `retry`.
    requests: HashMap<String, GenerationRequest>,
    last_error: Option<String>,
}

struct Inner {
    kind: EntityKind,
    api: Arc<dyn GenerationApi>,
    config: PollConfig,
    state: Mutex<State>,
    polls: PollRegistry,
    events: EventBus<StoreEvent>,
    epochs: AtomicU64,
}

/// Cheap to clone; all clones share the same state. Poll loops hold only a
/// weak reference, so dropping the last clone cancels every loop.
#[derive(Clone)]
pub struct GenerationStore {
    inner: Arc<Inner>,
}

impl GenerationStore {
    pub fn new(kind: EntityKind, api: Arc<dyn GenerationApi>, config: PollConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                kind,
                api,
                config,
                state: Mutex::new(State::default()),
                polls: PollRegistry::new(),
                events: EventBus::new(),
                epochs: AtomicU64::new(0),
            }),
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.inner.kind
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.events.subscribe()
    }

    /// Starts a generation job and begins polling it.
    ///
    /// Fails with `AlreadyInFlight` if the target is already being generated,
    /// and with `GenerationStart` if the backend rejects the request. In both
    /// cases nothing new is tracked. If `stop_tracking` is called for the
    /// target while the request is on the wire, the accepted job is returned
    /// but not polled.
    pub async fn start_generation(
        &self,
        request: GenerationRequest,
    ) -> Result<StartedJob, TrackerError> {
        let kind = request.kind();
        if kind != self.inner.kind {
            return Err(TrackerError::WrongKind {
                expected: self.inner.kind,
                actual: kind,
            });
        }

        let epoch = self.inner.epochs.fetch_add(1, Ordering::SeqCst) + 1;
        let reserved = request.target_id();

        // Reserve the target before the POST so concurrent starts cannot both go out.
        if let Some(target) = &reserved {
            let mut state = self.inner.state.lock();
            if state.in_flight.contains_key(target) {
                return Err(TrackerError::AlreadyInFlight {
                    kind,
                    entity_id: target.clone(),
                });
            }
            state.in_flight.insert(
                target.clone(),
                InFlightJob {
                    job_id: None,
                    epoch,
                },
            );
        }

        let started = match self.inner.api.start(&request).await {
            Ok(started) => started,
            Err(source) => {
                warn!(%kind, error = %source, "Failed to start generation");
                let message = source.user_message();
                {
                    let mut state = self.inner.state.lock();
                    if let Some(target) = &reserved {
                        if state.in_flight.get(target).map(|f| f.epoch) == Some(epoch) {
                            state.in_flight.remove(target);
                        }
                    }
                    state.last_error = Some(message.clone());
                }
                self.inner.events.publish(StoreEvent::StartFailed { message });
                return Err(TrackerError::GenerationStart { kind, source });
            }
        };

        let target = started.target_entity_id.clone();
        {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            let live = state.in_flight.get(&target).map(|f| f.epoch);

            // `stop_tracking` withdrew the reservation while the POST was out.
            if reserved.is_some() && live != Some(epoch) {
                info!(%kind, entity = %target, job_id = %started.job_id, "Tracking stopped before the job started; not polling");
                return Ok(started);
            }

            // Only reachable for resumes, whose target is unknown until the backend answers.
            if live.is_some_and(|e| e != epoch) {
                warn!(%kind, entity = %target, "Backend returned a target that is already in flight");
                return Err(TrackerError::AlreadyInFlight {
                    kind,
                    entity_id: target,
                });
            }

            state.in_flight.insert(
                target.clone(),
                InFlightJob {
                    job_id: Some(started.job_id.clone()),
                    epoch,
                },
            );
            state.requests.insert(target.clone(), request);
            state.last_error = None;

            let entity = entry(&mut state.entities, &target);
            entity.status = Some(JobStatus::Pending);
            entity.error_message = None;
        }

        info!(%kind, entity = %target, job_id = %started.job_id, "Generation started");
        self.inner.events.publish(StoreEvent::Started {
            target: target.clone(),
            job_id: started.job_id.clone(),
        });
        self.inner.spawn_poll(target, started.job_id.clone(), epoch);

        Ok(started)
    }

    /// Adopts a job that was started elsewhere (another session, or before a
    /// restart) and polls it like one started here.
    pub fn track(&self, job: StartedJob) -> Result<(), TrackerError> {
        if job.kind != self.inner.kind {
            return Err(TrackerError::WrongKind {
                expected: self.inner.kind,
                actual: job.kind,
            });
        }

        let epoch = self.inner.epochs.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            if state.in_flight.contains_key(&job.target_entity_id) {
                return Err(TrackerError::AlreadyInFlight {
                    kind: job.kind,
                    entity_id: job.target_entity_id,
                });
            }
            state.in_flight.insert(
                job.target_entity_id.clone(),
                InFlightJob {
                    job_id: Some(job.job_id.clone()),
                    epoch,
                },
            );
            entry(&mut state.entities, &job.target_entity_id);
        }

        info!(kind = %job.kind, entity = %job.target_entity_id, job_id = %job.job_id, "Tracking existing job");
        self.inner.spawn_poll(job.target_entity_id, job.job_id, epoch);
        Ok(())
    }

    /// Reducer for one status response. Ignored (returns `false`) unless
    /// `epoch` belongs to the live job for `target`.
    ///
    /// A terminal status handled here ends the job's poll loop and triggers
    /// the full refresh, exactly as if the loop had observed it.
    pub async fn on_status_update(
        &self,
        target: &str,
        epoch: u64,
        payload: &StatusPayload,
    ) -> bool {
        if !self.inner.apply_status(target, epoch, payload) {
            return false;
        }
        if payload.status.is_terminal() {
            self.inner.polls.release(target, epoch);
            if let Err(e) = self.inner.refresh(Some(target)).await {
                warn!(kind = %self.inner.kind, error = %e, "Refresh after terminal status failed; keeping merged record");
            }
        }
        true
    }

    /// Stops following `target`, e.g. because the view showing it went away.
    ///
    /// The entity keeps its last observed state and a response still on the
    /// wire is discarded when it lands.
    pub fn stop_tracking(&self, target: &str) -> bool {
        let was_tracked = self.inner.state.lock().in_flight.remove(target).is_some();
        let had_loop = self.inner.polls.cancel(target);

        if was_tracked || had_loop {
            info!(kind = %self.inner.kind, entity = target, "Stopped tracking");
            self.inner.events.publish(StoreEvent::TrackingStopped {
                target: target.to_string(),
            });
        }
        was_tracked || had_loop
    }

    /// Re-issues the original request for an entity whose last job failed or timed out.
    pub async fn retry(&self, target: &str) -> Result<StartedJob, TrackerError> {
        let request = {
            let state = self.inner.state.lock();
            let retryable = state
                .entities
                .iter()
                .find(|e| e.id == target)
                .and_then(|e| e.status)
                .is_some_and(|s| s.is_retryable());
            if !retryable || state.in_flight.contains_key(target) {
                return Err(TrackerError::NothingToRetry(target.to_string()));
            }
            state
                .requests
                .get(target)
                .cloned()
                .ok_or_else(|| TrackerError::NothingToRetry(target.to_string()))?
        };

        info!(kind = %self.inner.kind, entity = target, "Retrying generation");
        self.start_generation(request).await
    }

    /// Replaces the entity list with the backend's. Entities still in flight
    /// keep their local record until their job finishes.
    pub async fn refresh(&self) -> Result<usize, TrackerError> {
        Ok(self.inner.refresh(None).await?)
    }

    /// Cancels every poll loop this store owns.
    pub fn shutdown(&self) {
        self.inner.polls.cancel_all();
        self.inner.state.lock().in_flight.clear();
    }

    // ── Queries ─────────────────────────────────────────────────────────────

    pub fn entities(&self) -> Vec<TrackedEntity> {
        self.inner.state.lock().entities.clone()
    }

    pub fn entity(&self, id: &str) -> Option<TrackedEntity> {
        self.inner
            .state
            .lock()
            .entities
            .iter()
            .find(|e| e.id == id)
            .cloned()
    }

    pub fn in_flight(&self, id: &str) -> Option<InFlightJob> {
        self.inner.state.lock().in_flight.get(id).cloned()
    }

    pub fn is_in_flight(&self, id: &str) -> bool {
        self.inner.state.lock().in_flight.contains_key(id)
    }

    pub fn in_flight_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.state.lock().in_flight.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.state.lock().last_error.clone()
    }

    pub fn clear_error(&self) {
        self.inner.state.lock().last_error = None;
    }

    /// Number of poll loops currently running.
    pub fn active_polls(&self) -> usize {
        self.inner.polls.active_count()
    }
}

impl Inner {
    fn spawn_poll(self: &Arc<Self>, target: String, job_id: String, epoch: u64) {
        let weak = Arc::downgrade(self);
        let api = Arc::clone(&self.api);
        let kind = self.kind;
        let config = self.config.clone();
        let key = target.clone();

        self.polls.spawn(&key, epoch, move |cancel| async move {
            let mut terminal_applied = false;
            let outcome = poll_job(api.as_ref(), kind, &job_id, &config, &cancel, |payload| {
                if let Some(inner) = weak.upgrade() {
                    if inner.apply_status(&target, epoch, payload) && payload.status.is_terminal()
                    {
                        terminal_applied = true;
                    }
                }
            })
            .await;

            if let Some(inner) = weak.upgrade() {
                inner.finish(&target, epoch, outcome, terminal_applied).await;
            }
        });
    }

    fn apply_status(&self, target: &str, epoch: u64, payload: &StatusPayload) -> bool {
        let status = payload.status;
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;

            let live = state.in_flight.get(target).is_some_and(|f| f.epoch == epoch);
            if !live {
                debug!(kind = %self.kind, entity = target, epoch, "Discarding stale status update");
                return false;
            }

            entry(&mut state.entities, target).merge(payload);
            if status.is_terminal() {
                state.in_flight.remove(target);
            }
            if status == JobStatus::Completed {
                state.requests.remove(target);
            }
        }

        self.events.publish(StoreEvent::Updated {
            target: target.to_string(),
            status,
        });
        if status.is_terminal() {
            self.events.publish(StoreEvent::Finished {
                target: target.to_string(),
                status,
            });
        }
        true
    }

    async fn finish(&self, target: &str, epoch: u64, outcome: PollOutcome, terminal_applied: bool) {
        self.polls.release(target, epoch);

        match outcome {
            PollOutcome::Terminal(_) => {
                // The status payload is narrower than the list shape, so scores
                // and content only arrive with a full refresh.
                if terminal_applied {
                    if let Err(e) = self.refresh(Some(target)).await {
                        warn!(kind = %self.kind, error = %e, "Refresh after terminal status failed; keeping merged record");
                    }
                }
            }
            PollOutcome::TimedOut { .. } => {
                if self.abandon(target, epoch, JobStatus::TimedOut, None) {
                    warn!(kind = %self.kind, entity = target, "Stopped tracking after timeout");
                    self.events.publish(StoreEvent::TimedOut {
                        target: target.to_string(),
                    });
                }
            }
            PollOutcome::FailureLimit {
                failures,
                last_error,
            } => {
                let message = format!(
                    "Lost contact with the server after {failures} failed status checks: {last_error}"
                );
                if self.abandon(target, epoch, JobStatus::Failed, Some(message)) {
                    warn!(kind = %self.kind, entity = target, failures, "Stopped tracking after repeated failures");
                    self.events.publish(StoreEvent::Finished {
                        target: target.to_string(),
                        status: JobStatus::Failed,
                    });
                }
            }
            PollOutcome::Cancelled => {
                debug!(kind = %self.kind, entity = target, "Poll loop cancelled");
            }
        }
    }

    /// Ends tracking of a live job without a server verdict.
    fn abandon(
        &self,
        target: &str,
        epoch: u64,
        status: JobStatus,
        message: Option<String>,
    ) -> bool {
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            if !state.in_flight.get(target).is_some_and(|f| f.epoch == epoch) {
                return false;
            }
            state.in_flight.remove(target);

            let entity = entry(&mut state.entities, target);
            entity.status = Some(status);
            if message.is_some() {
                entity.error_message = message;
            }
        }

        self.events.publish(StoreEvent::Updated {
            target: target.to_string(),
            status,
        });
        true
    }

    /// Replaces the entity list with the server's. In-flight records win over
    /// the server copy. `just_finished` names a target whose job has just
    /// ended: the server copy wins for it when present, and the merged local
    /// record is kept when the list does not include it.
    async fn refresh(&self, just_finished: Option<&str>) -> Result<usize, ApiError> {
        let fetched = self.api.list(self.kind).await?;

        let count = {
            let mut guard = self.state.lock();
            let state = &mut *guard;

            let mut entities = fetched;
            for local in &state.entities {
                let in_flight = state.in_flight.contains_key(&local.id);
                if !in_flight && just_finished != Some(local.id.as_str()) {
                    continue;
                }
                match entities.iter().position(|e| e.id == local.id) {
                    Some(index) if in_flight => entities[index] = local.clone(),
                    Some(_) => {}
                    None => entities.insert(0, local.clone()),
                }
            }

            state
                .requests
                .retain(|id, _| entities.iter().any(|e| &e.id == id));
            state.entities = entities;
            state.entities.len()
        };

        debug!(kind = %self.kind, count, "Entity list refreshed");
        self.events.publish(StoreEvent::Refreshed { count });
        Ok(count)
    }
}

/// The record for `id`, inserting a provisional one at the front if missing.
fn entry<'a>(entities: &'a mut Vec<TrackedEntity>, id: &str) -> &'a mut TrackedEntity {
    let index = match entities.iter().position(|e| e.id == id) {
        Some(index) => index,
        None => {
            entities.insert(0, TrackedEntity::provisional(id));
            0
        }
    };
    &mut entities[index]
}
