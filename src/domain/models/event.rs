use serde::{Deserialize, Serialize};
use std::fmt;

use super::decision::{Decision, DegradationLevel};
use super::generation::{GenerationStatus, WorkerKind};
use super::waypoint::WorkUnitId;

/// How a worker task ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WorkerExit {
    /// Observed end-of-stream and returned
    Completed,
    /// Returned an error (e.g. the collection channel rejected a result)
    Failed { reason: String },
    /// Panicked outside a collaborator call
    Crashed { reason: String },
    /// Aborted by the supervisor after the grace period
    ForceTerminated,
}

impl WorkerExit {
    pub const fn is_clean(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
            Self::Crashed { reason } => write!(f, "crashed: {reason}"),
            Self::ForceTerminated => write!(f, "force-terminated"),
        }
    }
}

/// Why the discovery stage stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownReason {
    /// Every worker drained its intake
    Completed,
    /// The discovery stage deadline elapsed
    DiscoveryDeadline,
    /// The overall run deadline elapsed
    RunDeadline,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::DiscoveryDeadline => write!(f, "discovery deadline"),
            Self::RunDeadline => write!(f, "run deadline"),
        }
    }
}

/// Progress notifications broadcast while a run executes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    UnitDispatched {
        unit_id: WorkUnitId,
        kind: WorkerKind,
    },
    ResultCollected {
        unit_id: WorkUnitId,
        kind: WorkerKind,
        status: GenerationStatus,
    },
    UnitFinalized {
        decision: Decision,
    },
    WorkerExited {
        kind: WorkerKind,
        exit: WorkerExit,
    },
    ShutdownInitiated {
        reason: ShutdownReason,
    },
    RunCompleted {
        degradation: DegradationLevel,
        decisions: usize,
    },
}
