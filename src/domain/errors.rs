//! Domain errors for the tour guide pipeline.

use std::time::Duration;
use thiserror::Error;

use super::models::{WorkUnitId, WorkerKind};

/// Domain-level errors raised while building or validating domain values.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

/// Errors returned by the generation and evaluation collaborators.
///
/// These never abort a run: the worker turns them into a result and the
/// aggregator turns them into a fallback selection.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("Collaborator timed out after {0:?}")]
    Timeout(Duration),

    #[error("Collaborator failed: {0}")]
    Failed(String),

    #[error("Malformed collaborator response: {0}")]
    Malformed(String),

    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("Collaborator panicked: {0}")]
    Panicked(String),
}

/// Pipeline error taxonomy.
///
/// Generation and evaluation variants are recorded on results and decisions;
/// only the remaining variants are returned from `Supervisor::run`.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Generation for {unit_id} ({kind}) timed out after {timeout:?}")]
    GenerationTimeout {
        unit_id: WorkUnitId,
        kind: WorkerKind,
        timeout: Duration,
    },

    #[error("Generation for {unit_id} ({kind}) failed: {source}")]
    GenerationFailure {
        unit_id: WorkUnitId,
        kind: WorkerKind,
        #[source]
        source: CollaboratorError,
    },

    #[error("Evaluation for {unit_id} failed: {reason}")]
    EvaluationFailure { unit_id: WorkUnitId, reason: String },

    #[error("Channel '{channel}' at capacity {capacity} did not accept an item within {timeout:?}")]
    ChannelCapacityExceeded {
        channel: String,
        capacity: usize,
        timeout: Duration,
    },

    #[error("Worker {kind} was force-terminated without a result for {unit_id}")]
    SupervisorForcedTermination { kind: WorkerKind, unit_id: WorkUnitId },

    #[error("Too many waypoints: {count} (maximum {max})")]
    TooManyWaypoints { count: usize, max: usize },

    #[error("Invalid waypoint at position {index}: {source}")]
    InvalidWaypoint {
        index: usize,
        #[source]
        source: DomainError,
    },

    #[error("Aggregator task crashed: {0}")]
    AggregatorCrashed(String),

    #[error("Dispatcher task crashed: {0}")]
    DispatcherCrashed(String),

    #[error("Channel '{0}' closed unexpectedly")]
    ChannelClosed(String),

    #[error("Invalid pipeline configuration: {0}")]
    InvalidConfiguration(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
