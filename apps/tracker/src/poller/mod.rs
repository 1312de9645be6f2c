//! Status poller: observes one generation job until the server reports a
//! terminal status, the time budget runs out, or the owner cancels.
//!
//! Requests for a job are strictly sequential: the next tick is only scheduled
//! after the previous response has been handled, so updates for one job can
//! never arrive out of order. Between ticks the loop parks on a timer and
//! yields to everything else on the runtime.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::GenerationApi;
use crate::models::generation::{EntityKind, StatusPayload};

pub mod registry;

pub use registry::PollRegistry;

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(3000);
pub const RESUME_TIMEOUT: Duration = Duration::from_secs(300);
pub const CRITIQUE_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    /// Wait between the end of one status check and the start of the next.
    pub interval: Duration,
    /// Wall-clock budget for the whole loop, measured from its first tick.
    pub timeout: Duration,
    /// Give up after this many status checks in a row have failed.
    /// `None` keeps polling through any number of failures.
    pub max_consecutive_failures: Option<u32>,
}

impl PollConfig {
    pub fn for_kind(kind: EntityKind) -> Self {
        let timeout = match kind {
            EntityKind::Resume => RESUME_TIMEOUT,
            EntityKind::Critique => CRITIQUE_TIMEOUT,
        };
        Self {
            interval: DEFAULT_INTERVAL,
            timeout,
            max_consecutive_failures: None,
        }
    }
}

/// Why a poll loop stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// COMPLETED or FAILED was observed and delivered.
    Terminal(StatusPayload),
    /// The time budget ran out; `last` is the most recent status seen, if any.
    TimedOut { last: Option<StatusPayload> },
    /// The owner cancelled. Any request still in flight was dropped unanswered.
    Cancelled,
    FailureLimit { failures: u32, last_error: String },
}

/// Polls `job_id` until one of the termination conditions is met, passing
/// every successfully fetched payload (including the terminal one) to
/// `on_update`. A failed status check is logged and the next tick proceeds
/// on schedule.
pub async fn poll_job<F>(
    api: &dyn GenerationApi,
    kind: EntityKind,
    job_id: &str,
    config: &PollConfig,
    cancel: &CancellationToken,
    mut on_update: F,
) -> PollOutcome
where
    F: FnMut(&StatusPayload) + Send,
{
    let deadline = Instant::now() + config.timeout;
    let mut last: Option<StatusPayload> = None;
    let mut failures = 0u32;
    let mut tick = 0u32;

    loop {
        tick += 1;
        debug!(%kind, job_id, tick, "Checking generation status");

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return PollOutcome::Cancelled,
            _ = tokio::time::sleep_until(deadline) => {
                info!(%kind, job_id, tick, "Gave up polling after {:?}", config.timeout);
                return PollOutcome::TimedOut { last };
            }
            result = api.status(kind, job_id) => result,
        };

        match result {
            Ok(payload) => {
                failures = 0;
                on_update(&payload);
                if payload.status.is_terminal() {
                    info!(%kind, job_id, status = %payload.status, "Generation finished");
                    return PollOutcome::Terminal(payload);
                }
                last = Some(payload);
            }
            Err(e) => {
                failures += 1;
                warn!(%kind, job_id, failures, error = %e, "Status check failed");
                if let Some(max) = config.max_consecutive_failures {
                    if failures >= max {
                        return PollOutcome::FailureLimit {
                            failures,
                            last_error: e.user_message(),
                        };
                    }
                }
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return PollOutcome::Cancelled,
            _ = tokio::time::sleep_until(deadline) => {
                info!(%kind, job_id, tick, "Gave up polling after {:?}", config.timeout);
                return PollOutcome::TimedOut { last };
            }
            _ = tokio::time::sleep(config.interval) => {}
        }
    }
}
