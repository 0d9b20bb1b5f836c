//! Aggregator: groups results by unit and finalizes one decision per unit.
//!
//! The aggregator exclusively owns its per-unit accumulation. A unit is
//! finalized when all configured kinds have reported or when its collection
//! deadline elapses, whichever comes first. The deadline is armed only once
//! every kind has picked the unit up, and counts from the latest pickup, so a
//! kind that is merely behind in its queue is never cut off. Missing kinds
//! are filled with synthetic timeouts so every unit ends with exactly one
//! result per kind.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, info, warn};

use crate::application::channel::{ChannelReceiver, Received, RecvError};
use crate::application::selection::{SelectionPolicy, UnitResults};
use crate::application::worker::panic_message;
use crate::domain::errors::CollaboratorError;
use crate::domain::models::{
    Decision, Evaluation, GenerationResult, PipelineEvent, UnitTiming, WorkUnit, WorkUnitId,
    WorkerKind, WorkerMessage,
};
use crate::domain::ports::ContentEvaluator;

/// Timing knobs for the aggregator
#[derive(Debug, Clone, Copy)]
pub struct AggregatorSettings {
    pub collection_timeout: Duration,
    pub evaluation_timeout: Duration,
    pub poll_interval: Duration,
}

/// Everything the aggregator accumulated
#[derive(Debug, Default)]
pub struct AggregatorOutput {
    pub decisions: BTreeMap<WorkUnitId, Decision>,
    /// Exactly one per (unit, kind) for every finalized unit
    pub results: BTreeMap<WorkUnitId, UnitResults>,
    pub timings: BTreeMap<WorkUnitId, UnitTiming>,
    /// Results for units that had already been finalized
    pub late_results: usize,
    pub duplicate_results: usize,
    /// Evaluations cut short by force-finalization
    pub aborted_evaluations: usize,
}

struct Pending {
    results: UnitResults,
    /// When each kind picked the unit up
    picked_up: BTreeMap<WorkerKind, Instant>,
    first_at: Instant,
    /// Armed once every kind has picked the unit up or reported
    deadline: Option<Instant>,
}

impl Pending {
    fn new(now: Instant) -> Self {
        Self {
            results: BTreeMap::new(),
            picked_up: BTreeMap::new(),
            first_at: now,
            deadline: None,
        }
    }
}

struct InFlight {
    results: UnitResults,
    first_at: Instant,
    started: Instant,
}

type EvaluationOutcome = (WorkUnitId, Result<Evaluation, CollaboratorError>);

/// Consumes the collection channel and produces decisions
pub struct Aggregator {
    units: BTreeMap<WorkUnitId, WorkUnit>,
    policy: SelectionPolicy,
    evaluator: Arc<dyn ContentEvaluator>,
    results: ChannelReceiver<WorkerMessage>,
    events: broadcast::Sender<PipelineEvent>,
    settings: AggregatorSettings,
    force_finalize: CancellationToken,

    pending: HashMap<WorkUnitId, Pending>,
    in_flight: HashMap<WorkUnitId, InFlight>,
    evaluations: JoinSet<EvaluationOutcome>,
    output: AggregatorOutput,
}

impl Aggregator {
    pub fn new(
        units: &[WorkUnit],
        policy: SelectionPolicy,
        evaluator: Arc<dyn ContentEvaluator>,
        results: ChannelReceiver<WorkerMessage>,
        events: broadcast::Sender<PipelineEvent>,
        settings: AggregatorSettings,
        force_finalize: CancellationToken,
    ) -> Self {
        Self {
            units: units.iter().map(|u| (u.id, u.clone())).collect(),
            policy,
            evaluator,
            results,
            events,
            settings,
            force_finalize,
            pending: HashMap::new(),
            in_flight: HashMap::new(),
            evaluations: JoinSet::new(),
            output: AggregatorOutput::default(),
        }
    }

    /// Run until the collection channel ends and every unit is finalized.
    ///
    /// Cancelling the force-finalize token aborts running evaluations (their
    /// units use the fallback policy), stops reading the channel and
    /// finalizes everything still pending with what has arrived.
    pub async fn run(mut self) -> AggregatorOutput {
        let force = self.force_finalize.clone();
        let mut input_open = true;

        loop {
            if !input_open && self.pending.is_empty() && self.evaluations.is_empty() {
                break;
            }

            let next_deadline = self.pending.values().filter_map(|p| p.deadline).min();

            tokio::select! {
                biased;
                () = force.cancelled() => {
                    self.force_finalize_all().await;
                    break;
                }
                Some(joined) = self.evaluations.join_next(), if !self.evaluations.is_empty() => {
                    match joined {
                        Ok((unit_id, outcome)) => self.complete_evaluation(unit_id, outcome),
                        // Evaluation tasks catch their own panics; nothing else aborts them here
                        Err(err) => warn!(error = %err, "Evaluation task ended unexpectedly"),
                    }
                }
                () = sleep_until_opt(next_deadline), if next_deadline.is_some() => {
                    self.finalize_expired(Instant::now());
                }
                received = self.results.recv(self.settings.poll_interval), if input_open => {
                    match received {
                        Ok(Received::Item(WorkerMessage::Started { unit_id, kind })) => {
                            self.picked_up(unit_id, kind);
                        }
                        Ok(Received::Item(WorkerMessage::Finished(result))) => self.accept(result),
                        Ok(Received::EndOfStream) => {
                            input_open = false;
                            self.finalize_remaining();
                        }
                        Err(RecvError::EmptyTimeout { .. }) => {}
                    }
                }
            }
        }

        info!(
            decisions = self.output.decisions.len(),
            late = self.output.late_results,
            duplicates = self.output.duplicate_results,
            "Aggregation complete"
        );
        self.output
    }

    fn picked_up(&mut self, unit_id: WorkUnitId, kind: WorkerKind) {
        if !self.units.contains_key(&unit_id) {
            warn!(unit_id = %unit_id, kind = %kind, "Pickup for unknown unit ignored");
            return;
        }
        if self.output.decisions.contains_key(&unit_id) || self.in_flight.contains_key(&unit_id) {
            debug!(unit_id = %unit_id, kind = %kind, "Pickup for finalized unit ignored");
            return;
        }

        let now = Instant::now();
        self.pending
            .entry(unit_id)
            .or_insert_with(|| Pending::new(now))
            .picked_up
            .entry(kind)
            .or_insert(now);
        self.arm_deadline(unit_id);
    }

    /// Start the unit's collection clock once no kind is still queued for it
    fn arm_deadline(&mut self, unit_id: WorkUnitId) {
        let Some(pending) = self.pending.get_mut(&unit_id) else {
            return;
        };
        if pending.deadline.is_some() {
            return;
        }
        let all_started = self
            .policy
            .kinds()
            .iter()
            .all(|k| pending.picked_up.contains_key(k) || pending.results.contains_key(k));
        if !all_started {
            return;
        }

        let latest = pending
            .picked_up
            .values()
            .max()
            .copied()
            .unwrap_or_else(Instant::now);
        let deadline = latest + self.settings.collection_timeout;
        debug!(
            unit_id = %unit_id,
            in_ms = deadline.saturating_duration_since(Instant::now()).as_millis(),
            "Collection deadline armed"
        );
        pending.deadline = Some(deadline);
    }

    fn accept(&mut self, result: GenerationResult) {
        let unit_id = result.unit_id;
        let kind = result.kind;

        if !self.units.contains_key(&unit_id) {
            warn!(unit_id = %unit_id, kind = %kind, "Result for unknown unit discarded");
            return;
        }

        if self.output.decisions.contains_key(&unit_id) || self.in_flight.contains_key(&unit_id) {
            self.output.late_results += 1;
            warn!(
                unit_id = %unit_id,
                kind = %kind,
                status = %result.status,
                "Late result discarded, unit already finalized"
            );
            return;
        }

        let now = Instant::now();
        let entry = self
            .pending
            .entry(unit_id)
            .or_insert_with(|| Pending::new(now));

        if entry.results.contains_key(&kind) {
            self.output.duplicate_results += 1;
            warn!(unit_id = %unit_id, kind = %kind, "Duplicate result ignored");
            return;
        }

        debug!(unit_id = %unit_id, kind = %kind, status = %result.status, "Result collected");
        let _ = self.events.send(PipelineEvent::ResultCollected {
            unit_id,
            kind,
            status: result.status,
        });
        entry.results.insert(kind, result);

        let complete = self
            .policy
            .kinds()
            .iter()
            .all(|k| entry.results.contains_key(k));
        if complete {
            if let Some(pending) = self.pending.remove(&unit_id) {
                self.finalize(unit_id, pending);
            }
        } else {
            self.arm_deadline(unit_id);
        }
    }

    fn finalize_expired(&mut self, now: Instant) {
        let expired: Vec<WorkUnitId> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline.is_some_and(|d| d <= now))
            .map(|(id, _)| *id)
            .collect();

        for unit_id in expired {
            if let Some(pending) = self.pending.remove(&unit_id) {
                warn!(
                    unit_id = %unit_id,
                    received = pending.results.len(),
                    expected = self.policy.kinds().len(),
                    "Collection deadline elapsed, finalizing with partial results"
                );
                self.finalize(unit_id, pending);
            }
        }
    }

    /// Input ended: finalize pending units and units that never produced a result.
    fn finalize_remaining(&mut self) {
        let now = Instant::now();
        let mut pending: Vec<(WorkUnitId, Pending)> = self.pending.drain().collect();
        pending.sort_by_key(|(id, _)| *id);
        for (unit_id, p) in pending {
            self.finalize(unit_id, p);
        }

        let unseen: Vec<WorkUnitId> = self
            .units
            .keys()
            .copied()
            .filter(|id| !self.output.decisions.contains_key(id) && !self.in_flight.contains_key(id))
            .collect();
        for unit_id in unseen {
            debug!(unit_id = %unit_id, "Unit produced no results before input ended");
            self.finalize(unit_id, Pending::new(now));
        }
    }

    fn finalize(&mut self, unit_id: WorkUnitId, pending: Pending) {
        let Pending {
            mut results,
            picked_up,
            first_at,
            ..
        } = pending;

        // A kind that never picked the unit up spent no time on it
        for kind in self.policy.kinds() {
            results.entry(*kind).or_insert_with(|| {
                GenerationResult::timeout(
                    unit_id,
                    *kind,
                    "no result before the unit was finalized",
                    picked_up.get(kind).map_or(Duration::ZERO, |t| t.elapsed()),
                )
                .into_synthetic()
            });
        }

        if let Some(decision) = self.policy.shortcut(unit_id, &results) {
            self.record(decision, results, first_at);
            return;
        }

        let Some(unit) = self.units.get(&unit_id).cloned() else {
            return;
        };
        let candidates = SelectionPolicy::candidates(&results);
        let evaluator = Arc::clone(&self.evaluator);
        let evaluation_timeout = self.settings.evaluation_timeout;

        debug!(unit_id = %unit_id, candidates = candidates.len(), "Evaluating candidates");
        self.evaluations.spawn(async move {
            let mut call = AbortOnDropHandle::new(tokio::spawn(async move {
                evaluator.evaluate(&unit, &candidates).await
            }));
            let outcome = match tokio::time::timeout(evaluation_timeout, &mut call).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(err)) if err.is_panic() => {
                    Err(CollaboratorError::Panicked(panic_message(err.into_panic())))
                }
                Ok(Err(err)) => Err(CollaboratorError::Failed(err.to_string())),
                Err(_) => {
                    call.abort();
                    Err(CollaboratorError::Timeout(evaluation_timeout))
                }
            };
            (unit_id, outcome)
        });

        self.in_flight.insert(
            unit_id,
            InFlight {
                results,
                first_at,
                started: Instant::now(),
            },
        );
    }

    fn complete_evaluation(
        &mut self,
        unit_id: WorkUnitId,
        outcome: Result<Evaluation, CollaboratorError>,
    ) {
        let Some(in_flight) = self.in_flight.remove(&unit_id) else {
            return;
        };
        let duration = in_flight.started.elapsed();
        let decision = self
            .policy
            .decide(unit_id, &in_flight.results, outcome, duration);
        self.record(decision, in_flight.results, in_flight.first_at);
    }

    async fn force_finalize_all(&mut self) {
        warn!(
            pending = self.pending.len(),
            evaluating = self.in_flight.len(),
            "Force-finalizing aggregator"
        );

        self.evaluations.abort_all();
        while self.evaluations.join_next().await.is_some() {}

        let mut in_flight: Vec<(WorkUnitId, InFlight)> = self.in_flight.drain().collect();
        in_flight.sort_by_key(|(id, _)| *id);
        self.output.aborted_evaluations += in_flight.len();
        for (unit_id, flight) in in_flight {
            let outcome = Err(CollaboratorError::Unavailable(
                "run deadline reached before evaluation completed".to_string(),
            ));
            let decision =
                self.policy
                    .decide(unit_id, &flight.results, outcome, flight.started.elapsed());
            self.record(decision, flight.results, flight.first_at);
        }

        self.finalize_remaining();

        // Anything finalize_remaining queued for evaluation cannot wait either
        let queued: Vec<(WorkUnitId, InFlight)> = self.in_flight.drain().collect();
        self.evaluations.abort_all();
        while self.evaluations.join_next().await.is_some() {}
        self.output.aborted_evaluations += queued.len();
        for (unit_id, flight) in queued {
            let outcome = Err(CollaboratorError::Unavailable(
                "run deadline reached before evaluation started".to_string(),
            ));
            let decision = self
                .policy
                .decide(unit_id, &flight.results, outcome, Duration::ZERO);
            self.record(decision, flight.results, flight.first_at);
        }
    }

    fn record(&mut self, decision: Decision, results: UnitResults, first_at: Instant) {
        let unit_id = decision.unit_id;
        info!(
            unit_id = %unit_id,
            selected = %decision.selected_label(),
            method = %decision.method,
            "Unit finalized"
        );

        let waypoint = self
            .units
            .get(&unit_id)
            .map(|u| u.name().to_string())
            .unwrap_or_default();
        let timing = UnitTiming {
            unit_id,
            waypoint,
            generation_ms: results
                .iter()
                .map(|(k, r)| (*k, u64::try_from(r.elapsed.as_millis()).unwrap_or(u64::MAX)))
                .collect(),
            evaluation: decision.evaluation_duration,
            collection_wait: first_at.elapsed().saturating_sub(decision.evaluation_duration),
        };

        let _ = self.events.send(PipelineEvent::UnitFinalized {
            decision: decision.clone(),
        });
        self.output.timings.insert(unit_id, timing);
        self.output.results.insert(unit_id, results);
        self.output.decisions.insert(unit_id, decision);
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
