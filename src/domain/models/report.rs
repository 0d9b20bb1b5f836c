use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

use super::decision::{Decision, DegradationLevel};
use super::event::{ShutdownReason, WorkerExit};
use super::generation::{duration_millis, GenerationResult, WorkerKind};
use super::waypoint::WorkUnitId;

/// Per-unit timing breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitTiming {
    pub unit_id: WorkUnitId,
    pub waypoint: String,

    /// Generation time per kind in milliseconds
    pub generation_ms: BTreeMap<WorkerKind, u64>,

    #[serde(with = "duration_millis")]
    pub evaluation: Duration,

    /// From the first pickup or result for the unit to its finalization
    #[serde(with = "duration_millis")]
    pub collection_wait: Duration,
}

/// Everything a run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,

    #[serde(with = "duration_millis")]
    pub elapsed: Duration,

    /// One per submitted waypoint, in input order
    pub decisions: Vec<Decision>,

    /// Exactly one per (unit, kind), ordered by unit then kind
    pub results: Vec<GenerationResult>,

    /// Aligned with `decisions`
    pub timings: Vec<UnitTiming>,

    pub degradation: DegradationLevel,
    pub success_ratio: f64,
    pub worker_exits: BTreeMap<WorkerKind, WorkerExit>,
    pub forced_terminations: usize,

    /// Results that arrived after their unit was finalized
    pub late_results: usize,

    pub shutdown_reason: ShutdownReason,
}

impl RunReport {
    pub fn successful_decisions(&self) -> usize {
        self.decisions.iter().filter(|d| d.has_content()).count()
    }

    pub fn decision_for(&self, unit_id: WorkUnitId) -> Option<&Decision> {
        self.decisions.iter().find(|d| d.unit_id == unit_id)
    }

    pub fn results_for(&self, unit_id: WorkUnitId) -> impl Iterator<Item = &GenerationResult> {
        self.results.iter().filter(move |r| r.unit_id == unit_id)
    }

    pub fn result(&self, unit_id: WorkUnitId, kind: WorkerKind) -> Option<&GenerationResult> {
        self.results
            .iter()
            .find(|r| r.unit_id == unit_id && r.kind == kind)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
