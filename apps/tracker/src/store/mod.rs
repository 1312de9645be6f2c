//! Client-side state containers. Each store owns its records, mutates them only
//! through its own handlers, and announces changes on a broadcast channel so
//! any number of views can follow along.

pub mod applications;
pub mod generation;

pub use applications::{ApplicationEvent, ApplicationsStore, StatusFilter, ViewMode};
pub use generation::GenerationStore;

use tokio::sync::broadcast;

use crate::models::generation::JobStatus;

const EVENT_CAPACITY: usize = 256;

/// Change notifications published by `GenerationStore`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Started { target: String, job_id: String },
    StartFailed { message: String },
    Updated { target: String, status: JobStatus },
    /// The server reported COMPLETED or FAILED, or polling gave up after
    /// repeated failures. Published once per job.
    Finished { target: String, status: JobStatus },
    TimedOut { target: String },
    TrackingStopped { target: String },
    Refreshed { count: usize },
}

impl StoreEvent {
    pub fn target(&self) -> Option<&str> {
        match self {
            StoreEvent::Started { target, .. }
            | StoreEvent::Updated { target, .. }
            | StoreEvent::Finished { target, .. }
            | StoreEvent::TimedOut { target }
            | StoreEvent::TrackingStopped { target } => Some(target),
            StoreEvent::StartFailed { .. } | StoreEvent::Refreshed { .. } => None,
        }
    }
}

pub(crate) struct EventBus<E> {
    sender: broadcast::Sender<E>,
}

impl<E: Clone> EventBus<E> {
    pub(crate) fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    pub(crate) fn publish(&self, event: E) {
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }
}
