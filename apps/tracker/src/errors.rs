use thiserror::Error;

use crate::api::ApiError;
use crate::models::generation::EntityKind;

/// Errors surfaced to callers of the stores.
///
/// Failures observed while polling never show up here: a single failed status
/// check is logged and absorbed, and a job the server reports as FAILED is
/// recorded on the entity itself.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// The initiating POST failed. Nothing is tracked.
    #[error("Failed to start {kind} generation: {source}")]
    GenerationStart {
        kind: EntityKind,
        #[source]
        source: ApiError,
    },

    #[error("A {kind} generation is already in flight for {entity_id}")]
    AlreadyInFlight { kind: EntityKind, entity_id: String },

    #[error("This store tracks {expected} jobs, not {actual}")]
    WrongKind {
        expected: EntityKind,
        actual: EntityKind,
    },

    #[error("Nothing to retry for {0}")]
    NothingToRetry(String),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl TrackerError {
    /// Text suitable for an inline error banner.
    pub fn user_message(&self) -> String {
        match self {
            TrackerError::GenerationStart { source, .. } => source.user_message(),
            TrackerError::Api(source) => source.user_message(),
            other => other.to_string(),
        }
    }
}
