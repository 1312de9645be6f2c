//! Ownership of running poll loops, one per target entity.
//!
//! A `PollHandle` owns the loop's cancellation token and task. Dropping the
//! handle cancels the loop, so removing it from the registry (or dropping the
//! registry) always releases the task.

use std::collections::HashMap;
use std::future::Future;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct PollHandle {
    epoch: u64,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[derive(Default)]
pub struct PollRegistry {
    handles: Mutex<HashMap<String, PollHandle>>,
}

impl PollRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns the loop built by `make` for `target`.
    ///
    /// No-op returning `false` if a live loop of the same or a newer epoch is
    /// already registered for `target`. A live loop of an older epoch is
    /// cancelled and superseded.
    pub fn spawn<F, Fut>(&self, target: &str, epoch: u64, make: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut handles = self.handles.lock();

        if let Some(existing) = handles.get(target) {
            if !existing.is_finished() && existing.epoch >= epoch {
                debug!(entity = target, epoch, "Poll loop already active; ignoring start");
                return false;
            }
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(make(cancel.clone()));
        // Replacing drops the previous handle, which cancels it.
        handles.insert(
            target.to_string(),
            PollHandle {
                epoch,
                cancel,
                task,
            },
        );
        true
    }

    /// Cancels and forgets the loop for `target`. Returns whether one was registered.
    pub fn cancel(&self, target: &str) -> bool {
        let removed = self.handles.lock().remove(target);
        removed.is_some()
    }

    /// Forgets the loop for `target` once it has finished on its own. Only
    /// removes the handle if it still belongs to `epoch`.
    pub fn release(&self, target: &str, epoch: u64) {
        let mut handles = self.handles.lock();
        if handles.get(target).map(|h| h.epoch) == Some(epoch) {
            handles.remove(target);
        }
    }

    pub fn cancel_all(&self) {
        let drained: Vec<PollHandle> = self.handles.lock().drain().map(|(_, h)| h).collect();
        debug!(count = drained.len(), "Cancelling all poll loops");
    }

    pub fn is_active(&self, target: &str) -> bool {
        self.handles
            .lock()
            .get(target)
            .is_some_and(|h| !h.is_finished())
    }

    pub fn active_count(&self) -> usize {
        self.handles
            .lock()
            .values()
            .filter(|h| !h.is_finished())
            .count()
    }
}
