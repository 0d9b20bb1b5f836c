use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use super::config::DegradationThresholds;
use super::generation::{duration_millis, ContentPayload, WorkerKind};
use super::waypoint::WorkUnitId;

/// Rationale used when no kind produced content
pub const RATIONALE_ALL_FAILED: &str = "all generation attempts failed";

/// Rationale used when exactly one kind produced content
pub const RATIONALE_ONLY_SUCCESS: &str = "only this kind succeeded";

/// How the winning kind of a decision was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMethod {
    /// Nothing to select from
    NoCandidates,
    /// One success, evaluator skipped
    SingleCandidate,
    /// Evaluator picked a presented kind
    Evaluator,
    /// Evaluator reported a tie, broken by priority order
    TieBreak,
    /// Evaluator failed or misbehaved, fallback strategy applied
    Fallback,
}

impl fmt::Display for SelectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCandidates => write!(f, "no_candidates"),
            Self::SingleCandidate => write!(f, "single_candidate"),
            Self::Evaluator => write!(f, "evaluator"),
            Self::TieBreak => write!(f, "tie_break"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

/// What the evaluation collaborator returns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// `None` reports a tie
    pub selected: Option<WorkerKind>,
    pub rationale: String,
    #[serde(default)]
    pub scores: BTreeMap<WorkerKind, f64>,
}

impl Evaluation {
    pub fn pick(kind: WorkerKind, rationale: impl Into<String>) -> Self {
        Self {
            selected: Some(kind),
            rationale: rationale.into(),
            scores: BTreeMap::new(),
        }
    }

    pub fn tie(rationale: impl Into<String>) -> Self {
        Self {
            selected: None,
            rationale: rationale.into(),
            scores: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_scores(mut self, scores: BTreeMap<WorkerKind, f64>) -> Self {
        self.scores = scores;
        self
    }
}

/// The single per-unit output of the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub unit_id: WorkUnitId,

    /// Winning kind; serialized as `"none"` when nothing succeeded
    #[serde(with = "selected_kind")]
    pub selected: Option<WorkerKind>,

    pub content: Option<ContentPayload>,
    pub rationale: String,

    /// One score per kind
    pub scores: BTreeMap<WorkerKind, f64>,

    #[serde(with = "duration_millis")]
    pub evaluation_duration: Duration,

    pub method: SelectionMethod,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

impl Decision {
    /// Decision for a unit where every kind failed or timed out
    pub fn none(unit_id: WorkUnitId, kinds: &[WorkerKind]) -> Self {
        Self {
            unit_id,
            selected: None,
            content: None,
            rationale: RATIONALE_ALL_FAILED.to_string(),
            scores: kinds.iter().map(|k| (*k, 0.0)).collect(),
            evaluation_duration: Duration::ZERO,
            method: SelectionMethod::NoCandidates,
            fallback_reason: None,
        }
    }

    pub const fn has_content(&self) -> bool {
        self.selected.is_some()
    }

    pub fn selected_label(&self) -> String {
        self.selected
            .map_or_else(|| "none".to_string(), |k| k.to_string())
    }
}

mod selected_kind {
    use super::WorkerKind;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        selected: &Option<WorkerKind>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match selected {
            Some(kind) => kind.serialize(serializer),
            None => serializer.serialize_str("none"),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<WorkerKind>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw == "none" {
            return Ok(None);
        }
        raw.parse().map(Some).map_err(serde::de::Error::custom)
    }
}

/// Coarse run health derived from the share of units with content
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradationLevel {
    Full,
    Partial,
    Degraded,
    Minimal,
    CompleteFailure,
}

impl DegradationLevel {
    /// Classify `successful` out of `total` decisions.
    ///
    /// An empty run is vacuously `Full`.
    pub fn classify(successful: usize, total: usize, thresholds: &DegradationThresholds) -> Self {
        if total == 0 {
            return Self::Full;
        }
        if successful == 0 {
            return Self::CompleteFailure;
        }

        #[allow(clippy::cast_precision_loss)]
        let ratio = successful as f64 / total as f64;

        if ratio >= thresholds.full {
            Self::Full
        } else if ratio >= thresholds.partial {
            Self::Partial
        } else if ratio >= thresholds.degraded {
            Self::Degraded
        } else {
            Self::Minimal
        }
    }
}

impl fmt::Display for DegradationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Partial => write!(f, "partial"),
            Self::Degraded => write!(f, "degraded"),
            Self::Minimal => write!(f, "minimal"),
            Self::CompleteFailure => write!(f, "complete_failure"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degradation_thresholds_for_ten_units() {
        let thresholds = DegradationThresholds::default();
        let cases = [
            (10, DegradationLevel::Full),
            (9, DegradationLevel::Full),
            (8, DegradationLevel::Partial),
            (7, DegradationLevel::Partial),
            (6, DegradationLevel::Degraded),
            (5, DegradationLevel::Degraded),
            (4, DegradationLevel::Minimal),
            (1, DegradationLevel::Minimal),
            (0, DegradationLevel::CompleteFailure),
        ];
        for (successful, expected) in cases {
            assert_eq!(
                DegradationLevel::classify(successful, 10, &thresholds),
                expected,
                "{successful}/10"
            );
        }
    }

    #[test]
    fn test_empty_run_is_full() {
        assert_eq!(
            DegradationLevel::classify(0, 0, &DegradationThresholds::default()),
            DegradationLevel::Full
        );
    }

    #[test]
    fn test_none_decision() {
        let decision = Decision::none(WorkUnitId(0), &WorkerKind::ALL);
        assert!(!decision.has_content());
        assert_eq!(decision.rationale, RATIONALE_ALL_FAILED);
        assert_eq!(decision.scores.len(), 3);
        assert!(decision.scores.values().all(|s| *s == 0.0));
        assert_eq!(decision.selected_label(), "none");
    }

    #[test]
    fn test_selected_serializes_none_sentinel() {
        let decision = Decision::none(WorkUnitId(1), &WorkerKind::ALL);
        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json["selected"], "none");
        assert_eq!(json["method"], "no_candidates");

        let back: Decision = serde_json::from_value(json).unwrap();
        assert_eq!(back.selected, None);
    }
}
