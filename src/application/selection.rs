//! Turning a unit's generation results into its decision.
//!
//! Zero or one success never reaches the evaluator. Two or more successes
//! go to the evaluator, whose answer is checked against the presented
//! candidates before it is trusted.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::domain::errors::{CollaboratorError, PipelineError};
use crate::domain::models::{
    clamp_score, ContentPayload, Decision, Evaluation, FallbackStrategy, GenerationResult,
    PipelineConfig, SelectionMethod, WorkUnitId, WorkerKind, RATIONALE_ONLY_SUCCESS,
};

/// Results for one unit, keyed by kind
pub type UnitResults = BTreeMap<WorkerKind, GenerationResult>;

/// Deterministic selection rules shared by fallback and tie-breaking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionPolicy {
    kinds: Vec<WorkerKind>,
    priority: Vec<WorkerKind>,
    strategy: FallbackStrategy,
}

impl SelectionPolicy {
    pub fn new(kinds: Vec<WorkerKind>, priority: Vec<WorkerKind>, strategy: FallbackStrategy) -> Self {
        Self {
            kinds,
            priority,
            strategy,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.kinds.clone(),
            config.effective_priority(),
            config.fallback_strategy,
        )
    }

    pub fn kinds(&self) -> &[WorkerKind] {
        &self.kinds
    }

    /// First of `candidates` in priority order
    pub fn by_priority(&self, candidates: &[WorkerKind]) -> Option<WorkerKind> {
        self.priority
            .iter()
            .copied()
            .find(|k| candidates.contains(k))
            .or_else(|| candidates.first().copied())
    }

    /// Apply the configured fallback strategy to scored candidates
    pub fn fallback(&self, scores: &BTreeMap<WorkerKind, f64>) -> Option<WorkerKind> {
        let candidates: Vec<WorkerKind> = scores.keys().copied().collect();
        match self.strategy {
            FallbackStrategy::Priority => self.by_priority(&candidates),
            FallbackStrategy::HighestScore => self.by_priority(&top_scored(scores)),
        }
    }

    /// Successful content, the only thing the evaluator ever sees
    pub fn candidates(results: &UnitResults) -> BTreeMap<WorkerKind, ContentPayload> {
        results
            .values()
            .filter_map(|r| {
                r.content
                    .as_ref()
                    .filter(|_| r.is_success())
                    .map(|c| (r.kind, c.payload.clone()))
            })
            .collect()
    }

    /// Decide without the evaluator when there is no real choice.
    ///
    /// Returns `None` when two or more kinds succeeded.
    pub fn shortcut(&self, unit_id: WorkUnitId, results: &UnitResults) -> Option<Decision> {
        let successes: Vec<&GenerationResult> =
            results.values().filter(|r| r.is_success()).collect();

        match successes.as_slice() {
            [] => Some(Decision::none(unit_id, &self.kinds)),
            [only] => {
                let mut scores = self.zero_scores();
                scores.insert(only.kind, only.relevance_score());
                Some(Decision {
                    unit_id,
                    selected: Some(only.kind),
                    content: only.content.as_ref().map(|c| c.payload.clone()),
                    rationale: RATIONALE_ONLY_SUCCESS.to_string(),
                    scores,
                    evaluation_duration: Duration::ZERO,
                    method: SelectionMethod::SingleCandidate,
                    fallback_reason: None,
                })
            }
            _ => None,
        }
    }

    /// Decide from the evaluator's outcome for two or more successes
    pub fn decide(
        &self,
        unit_id: WorkUnitId,
        results: &UnitResults,
        outcome: Result<Evaluation, CollaboratorError>,
        evaluation_duration: Duration,
    ) -> Decision {
        let relevance: BTreeMap<WorkerKind, f64> = results
            .values()
            .filter(|r| r.is_success())
            .map(|r| (r.kind, r.relevance_score()))
            .collect();

        let mut scores = self.zero_scores();
        scores.extend(relevance.iter().map(|(k, s)| (*k, *s)));

        let (selected, rationale, method, fallback_reason) = match outcome {
            Ok(evaluation) => {
                for (kind, score) in &evaluation.scores {
                    if relevance.contains_key(kind) {
                        scores.insert(*kind, clamp_score(*score));
                    }
                }

                match evaluation.selected {
                    Some(kind) if relevance.contains_key(&kind) => (
                        Some(kind),
                        evaluation.rationale,
                        SelectionMethod::Evaluator,
                        None,
                    ),
                    Some(kind) => {
                        let reason = format!(
                            "evaluator selected {kind}, which was not among the presented candidates"
                        );
                        self.fallback_outcome(unit_id, &relevance, reason)
                    }
                    None => {
                        let presented: BTreeMap<WorkerKind, f64> = scores
                            .iter()
                            .filter(|(k, _)| relevance.contains_key(k))
                            .map(|(k, s)| (*k, *s))
                            .collect();
                        let tied = top_scored(&presented);
                        let winner = self.by_priority(&tied);
                        let rationale = format!(
                            "evaluator reported a tie between {}; broken by priority order. {}",
                            join_kinds(&tied),
                            evaluation.rationale
                        );
                        (
                            winner,
                            rationale.trim_end().to_string(),
                            SelectionMethod::TieBreak,
                            None,
                        )
                    }
                }
            }
            Err(err) => {
                let reason = PipelineError::EvaluationFailure {
                    unit_id,
                    reason: err.to_string(),
                }
                .to_string();
                self.fallback_outcome(unit_id, &relevance, reason)
            }
        };

        let content = selected.and_then(|kind| {
            results
                .get(&kind)
                .and_then(|r| r.content.as_ref())
                .map(|c| c.payload.clone())
        });

        Decision {
            unit_id,
            selected,
            content,
            rationale,
            scores,
            evaluation_duration,
            method,
            fallback_reason,
        }
    }

    fn fallback_outcome(
        &self,
        unit_id: WorkUnitId,
        relevance: &BTreeMap<WorkerKind, f64>,
        reason: String,
    ) -> (Option<WorkerKind>, String, SelectionMethod, Option<String>) {
        let winner = self.fallback(relevance);
        tracing::warn!(
            unit_id = %unit_id,
            strategy = %self.strategy,
            selected = ?winner,
            reason = %reason,
            "Evaluation unusable, applying fallback"
        );
        (
            winner,
            format!("selected by {} fallback", self.strategy),
            SelectionMethod::Fallback,
            Some(reason),
        )
    }

    fn zero_scores(&self) -> BTreeMap<WorkerKind, f64> {
        self.kinds.iter().map(|k| (*k, 0.0)).collect()
    }
}

/// Kinds sharing the maximum score
fn top_scored(scores: &BTreeMap<WorkerKind, f64>) -> Vec<WorkerKind> {
    let best = scores.values().copied().fold(f64::NEG_INFINITY, f64::max);
    scores
        .iter()
        .filter(|(_, s)| (**s - best).abs() < f64::EPSILON)
        .map(|(k, _)| *k)
        .collect()
}

fn join_kinds(kinds: &[WorkerKind]) -> String {
    kinds
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{GeneratedContent, RATIONALE_ALL_FAILED};

    const UNIT: WorkUnitId = WorkUnitId(1);

    fn policy(strategy: FallbackStrategy) -> SelectionPolicy {
        SelectionPolicy::new(
            WorkerKind::ALL.to_vec(),
            vec![WorkerKind::History, WorkerKind::Video, WorkerKind::Music],
            strategy,
        )
    }

    fn success(kind: WorkerKind, score: f64) -> GenerationResult {
        GenerationResult::success(
            UNIT,
            kind,
            GeneratedContent::new(ContentPayload::new(format!("{kind} pick"), "body"), score),
            Duration::from_secs(1),
        )
    }

    fn timeout(kind: WorkerKind) -> GenerationResult {
        GenerationResult::timeout(UNIT, kind, "timed out", Duration::from_secs(30))
    }

    fn results(items: Vec<GenerationResult>) -> UnitResults {
        items.into_iter().map(|r| (r.kind, r)).collect()
    }

    #[test]
    fn test_no_success_selects_none() {
        let all_failed = results(WorkerKind::ALL.iter().map(|k| timeout(*k)).collect());
        let decision = policy(FallbackStrategy::Priority)
            .shortcut(UNIT, &all_failed)
            .unwrap();
        assert_eq!(decision.selected, None);
        assert_eq!(decision.rationale, RATIONALE_ALL_FAILED);
        assert!(decision.scores.values().all(|s| *s == 0.0));
    }

    #[test]
    fn test_single_success_skips_evaluator() {
        let single = results(vec![
            success(WorkerKind::Video, 80.0),
            timeout(WorkerKind::Music),
            timeout(WorkerKind::History),
        ]);
        let decision = policy(FallbackStrategy::Priority)
            .shortcut(UNIT, &single)
            .unwrap();
        assert_eq!(decision.selected, Some(WorkerKind::Video));
        assert_eq!(decision.rationale, RATIONALE_ONLY_SUCCESS);
        assert_eq!(decision.method, SelectionMethod::SingleCandidate);
        assert!((decision.scores[&WorkerKind::Video] - 80.0).abs() < f64::EPSILON);
        assert!(decision.scores[&WorkerKind::Music].abs() < f64::EPSILON);
    }

    #[test]
    fn test_two_successes_need_evaluation() {
        let two = results(vec![
            success(WorkerKind::Video, 80.0),
            success(WorkerKind::Music, 70.0),
            timeout(WorkerKind::History),
        ]);
        let policy = policy(FallbackStrategy::Priority);
        assert!(policy.shortcut(UNIT, &two).is_none());
        assert_eq!(SelectionPolicy::candidates(&two).len(), 2);
    }

    #[test]
    fn test_evaluator_choice_is_trusted_when_presented() {
        let two = results(vec![
            success(WorkerKind::Video, 80.0),
            success(WorkerKind::Music, 70.0),
        ]);
        let decision = policy(FallbackStrategy::Priority).decide(
            UNIT,
            &two,
            Ok(Evaluation::pick(WorkerKind::Music, "better mood")),
            Duration::from_secs(3),
        );
        assert_eq!(decision.selected, Some(WorkerKind::Music));
        assert_eq!(decision.method, SelectionMethod::Evaluator);
        assert_eq!(decision.rationale, "better mood");
        assert_eq!(decision.content.unwrap().title, "music pick");
    }

    #[test]
    fn test_unpresented_kind_falls_back_to_priority() {
        let two = results(vec![
            success(WorkerKind::Video, 80.0),
            success(WorkerKind::Music, 90.0),
            timeout(WorkerKind::History),
        ]);
        let decision = policy(FallbackStrategy::Priority).decide(
            UNIT,
            &two,
            Ok(Evaluation::pick(WorkerKind::History, "history wins")),
            Duration::from_secs(1),
        );
        assert_eq!(decision.selected, Some(WorkerKind::Video));
        assert_eq!(decision.method, SelectionMethod::Fallback);
        assert!(decision
            .fallback_reason
            .unwrap()
            .contains("not among the presented candidates"));
    }

    #[test]
    fn test_highest_score_fallback() {
        let two = results(vec![
            success(WorkerKind::Video, 60.0),
            success(WorkerKind::Music, 90.0),
        ]);
        let decision = policy(FallbackStrategy::HighestScore).decide(
            UNIT,
            &two,
            Err(CollaboratorError::Failed("service down".to_string())),
            Duration::from_secs(1),
        );
        assert_eq!(decision.selected, Some(WorkerKind::Music));
        assert_eq!(decision.method, SelectionMethod::Fallback);
        assert!(decision.fallback_reason.unwrap().contains("service down"));
    }

    #[test]
    fn test_reported_tie_broken_by_priority() {
        let all = results(vec![
            success(WorkerKind::Video, 75.0),
            success(WorkerKind::Music, 75.0),
            success(WorkerKind::History, 40.0),
        ]);
        let scores = BTreeMap::from([
            (WorkerKind::Video, 88.0),
            (WorkerKind::Music, 88.0),
            (WorkerKind::History, 50.0),
        ]);
        let decision = policy(FallbackStrategy::Priority).decide(
            UNIT,
            &all,
            Ok(Evaluation::tie("equally good").with_scores(scores)),
            Duration::from_secs(1),
        );
        // history scored lower, so priority picks video over music
        assert_eq!(decision.selected, Some(WorkerKind::Video));
        assert_eq!(decision.method, SelectionMethod::TieBreak);
        assert!((decision.scores[&WorkerKind::Video] - 88.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_scores_for_unpresented_kinds_are_ignored() {
        let two = results(vec![
            success(WorkerKind::Video, 60.0),
            success(WorkerKind::Music, 65.0),
            timeout(WorkerKind::History),
        ]);
        let scores = BTreeMap::from([(WorkerKind::History, 99.0), (WorkerKind::Video, 140.0)]);
        let decision = policy(FallbackStrategy::Priority).decide(
            UNIT,
            &two,
            Ok(Evaluation::pick(WorkerKind::Video, "ok").with_scores(scores)),
            Duration::from_secs(1),
        );
        assert!(decision.scores[&WorkerKind::History].abs() < f64::EPSILON);
        assert!((decision.scores[&WorkerKind::Video] - 100.0).abs() < f64::EPSILON);
        assert!((decision.scores[&WorkerKind::Music] - 65.0).abs() < f64::EPSILON);
    }
}
