//! Scripted collaborators for tests, benchmarks and the demo command.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::domain::errors::CollaboratorError;
use crate::domain::models::{
    ContentPayload, Evaluation, GeneratedContent, WorkUnit, WorkUnitId, WorkerKind,
};
use crate::domain::ports::{ContentEvaluator, ContentGenerator};

/// What a scripted generator does for one call.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedBehavior {
    /// Return content with `score` after `delay`
    Succeed { delay: Duration, score: f64 },
    /// Return an error after `delay`
    Fail { delay: Duration, message: String },
    /// Never return
    Hang,
    /// Panic inside the call
    Panic,
}

impl ScriptedBehavior {
    pub const fn succeed(delay: Duration, score: f64) -> Self {
        Self::Succeed { delay, score }
    }

    pub fn fail(delay: Duration, message: impl Into<String>) -> Self {
        Self::Fail {
            delay,
            message: message.into(),
        }
    }
}

impl Default for ScriptedBehavior {
    fn default() -> Self {
        Self::succeed(Duration::from_millis(100), 50.0)
    }
}

/// Deterministic generator driven by per-kind and per-unit scripts.
///
/// A per-unit script wins over the per-kind script, which wins over the
/// default.
pub struct ScriptedGenerator {
    default_behavior: ScriptedBehavior,
    by_kind: HashMap<WorkerKind, ScriptedBehavior>,
    by_unit: HashMap<(WorkUnitId, WorkerKind), ScriptedBehavior>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::with_default(ScriptedBehavior::default())
    }

    pub fn with_default(behavior: ScriptedBehavior) -> Self {
        Self {
            default_behavior: behavior,
            by_kind: HashMap::new(),
            by_unit: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn with_kind(mut self, kind: WorkerKind, behavior: ScriptedBehavior) -> Self {
        self.by_kind.insert(kind, behavior);
        self
    }

    #[must_use]
    pub fn with_unit(
        mut self,
        unit_id: WorkUnitId,
        kind: WorkerKind,
        behavior: ScriptedBehavior,
    ) -> Self {
        self.by_unit.insert((unit_id, kind), behavior);
        self
    }

    /// Number of generate calls started so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn behavior(&self, unit_id: WorkUnitId, kind: WorkerKind) -> &ScriptedBehavior {
        self.by_unit
            .get(&(unit_id, kind))
            .or_else(|| self.by_kind.get(&kind))
            .unwrap_or(&self.default_behavior)
    }
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        kind: WorkerKind,
        unit: &WorkUnit,
    ) -> Result<GeneratedContent, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        match self.behavior(unit.id, kind).clone() {
            ScriptedBehavior::Succeed { delay, score } => {
                tokio::time::sleep(delay).await;
                let payload = ContentPayload::new(
                    format!("{} {kind}", unit.name()),
                    format!("Scripted {kind} content for {}", unit.name()),
                )
                .with_metadata("scripted", serde_json::Value::Bool(true));
                Ok(GeneratedContent::new(payload, score))
            }
            ScriptedBehavior::Fail { delay, message } => {
                tokio::time::sleep(delay).await;
                Err(CollaboratorError::Failed(message))
            }
            ScriptedBehavior::Hang => {
                std::future::pending::<()>().await;
                Err(CollaboratorError::Unavailable("unreachable".to_string()))
            }
            ScriptedBehavior::Panic => panic!("scripted generator panic for {kind}"),
        }
    }
}

/// What a scripted evaluator answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluatorScript {
    /// First presented kind in declaration order
    PickFirst,
    /// Always this kind, presented or not
    Pick(WorkerKind),
    /// First presented kind in the given order
    Prefer(Vec<WorkerKind>),
    /// Report a tie with equal scores
    Tie,
    Fail(String),
    Hang,
    Panic,
}

/// Deterministic evaluator that records what it was shown.
pub struct ScriptedEvaluator {
    script: EvaluatorScript,
    by_unit: HashMap<WorkUnitId, EvaluatorScript>,
    delay: Duration,
    calls: AtomicUsize,
    presented: Mutex<BTreeMap<WorkUnitId, Vec<WorkerKind>>>,
}

impl ScriptedEvaluator {
    pub fn new(script: EvaluatorScript) -> Self {
        Self {
            script,
            by_unit: HashMap::new(),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            presented: Mutex::new(BTreeMap::new()),
        }
    }

    #[must_use]
    pub fn with_unit(mut self, unit_id: WorkUnitId, script: EvaluatorScript) -> Self {
        self.by_unit.insert(unit_id, script);
        self
    }

    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Kinds presented for a unit, if it was ever evaluated
    pub fn presented(&self, unit_id: WorkUnitId) -> Option<Vec<WorkerKind>> {
        self.presented
            .lock()
            .ok()
            .and_then(|p| p.get(&unit_id).cloned())
    }
}

#[async_trait]
impl ContentEvaluator for ScriptedEvaluator {
    async fn evaluate(
        &self,
        unit: &WorkUnit,
        candidates: &BTreeMap<WorkerKind, ContentPayload>,
    ) -> Result<Evaluation, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let kinds: Vec<WorkerKind> = candidates.keys().copied().collect();
        if let Ok(mut presented) = self.presented.lock() {
            presented.insert(unit.id, kinds.clone());
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let even_scores = || kinds.iter().map(|k| (*k, 75.0)).collect::<BTreeMap<_, _>>();
        let script = self.by_unit.get(&unit.id).unwrap_or(&self.script).clone();
        match script {
            EvaluatorScript::PickFirst => kinds
                .first()
                .map(|k| Evaluation::pick(*k, format!("{k} fits {} best", unit.name())))
                .ok_or_else(|| CollaboratorError::Malformed("no candidates".to_string())),
            EvaluatorScript::Pick(kind) => Ok(Evaluation::pick(kind, format!("{kind} chosen"))),
            EvaluatorScript::Prefer(order) => order
                .iter()
                .find(|k| kinds.contains(k))
                .or_else(|| kinds.first())
                .map(|k| Evaluation::pick(*k, format!("{k} preferred for {}", unit.name())))
                .ok_or_else(|| CollaboratorError::Malformed("no candidates".to_string())),
            EvaluatorScript::Tie => {
                Ok(Evaluation::tie("candidates are equally good").with_scores(even_scores()))
            }
            EvaluatorScript::Fail(message) => Err(CollaboratorError::Failed(message)),
            EvaluatorScript::Hang => {
                std::future::pending::<()>().await;
                Err(CollaboratorError::Unavailable("unreachable".to_string()))
            }
            EvaluatorScript::Panic => panic!("scripted evaluator panic"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Coordinates, Waypoint, WaypointCategory};

    fn unit(index: u32) -> WorkUnit {
        WorkUnit::new(
            WorkUnitId(index),
            Waypoint::new(
                "Latrun",
                Coordinates::new(31.8389, 34.9783),
                WaypointCategory::Historical,
                "",
            ),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_unit_script_overrides_kind() {
        let generator = ScriptedGenerator::new()
            .with_kind(WorkerKind::Video, ScriptedBehavior::succeed(Duration::ZERO, 40.0))
            .with_unit(
                WorkUnitId(1),
                WorkerKind::Video,
                ScriptedBehavior::fail(Duration::ZERO, "no results"),
            );

        let ok = generator.generate(WorkerKind::Video, &unit(0)).await.unwrap();
        assert!((ok.relevance_score - 40.0).abs() < f64::EPSILON);
        assert!(generator.generate(WorkerKind::Video, &unit(1)).await.is_err());
        assert_eq!(generator.calls(), 2);
    }

    #[tokio::test]
    async fn test_evaluator_records_presented_kinds() {
        let evaluator = ScriptedEvaluator::new(EvaluatorScript::Prefer(vec![WorkerKind::Music]));
        let candidates = BTreeMap::from([
            (WorkerKind::Video, ContentPayload::new("v", "")),
            (WorkerKind::History, ContentPayload::new("h", "")),
        ]);

        let evaluation = evaluator.evaluate(&unit(2), &candidates).await.unwrap();
        assert_eq!(evaluation.selected, Some(WorkerKind::Video));
        assert_eq!(
            evaluator.presented(WorkUnitId(2)).unwrap(),
            vec![WorkerKind::Video, WorkerKind::History]
        );
    }

    #[tokio::test]
    async fn test_tie_script() {
        let evaluator = ScriptedEvaluator::new(EvaluatorScript::Tie);
        let candidates = BTreeMap::from([
            (WorkerKind::Video, ContentPayload::new("v", "")),
            (WorkerKind::Music, ContentPayload::new("m", "")),
        ]);
        let evaluation = evaluator.evaluate(&unit(0), &candidates).await.unwrap();
        assert_eq!(evaluation.selected, None);
        assert_eq!(evaluation.scores.len(), 2);
    }
}
