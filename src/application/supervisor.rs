//! Lifecycle supervisor: wires the pipeline, owns the deadlines and reports.
//!
//! ```text
//! Dispatcher ──► intake/video ──► Worker(video) ─┐
//!            ──► intake/music ──► Worker(music) ─┼──► collection ──► Aggregator ──► decisions
//!            ──► intake/history ► Worker(history)┘
//! ```
//!
//! Deadlines nest from outer to inner: the run, the discovery stage, the
//! per-unit collection window, then per-call generation and evaluation.
//! When the discovery stage expires the supervisor closes every intake,
//! waits a grace period, then aborts workers still running. Each worker has
//! a monitor that turns an abnormal exit into a synthetic result for the
//! unit that was in flight.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::{broadcast, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::application::aggregator::{Aggregator, AggregatorOutput, AggregatorSettings};
use crate::application::channel::{bounded, ChannelCloser, ChannelError, ChannelSender};
use crate::application::dispatcher::Dispatcher;
use crate::application::selection::SelectionPolicy;
use crate::application::worker::{
    panic_message, GenerationWorker, WorkerSettings, WorkerState, WorkerStatus,
};
use crate::domain::errors::PipelineError;
use crate::domain::models::{
    Decision, DegradationLevel, DegradationThresholds, GenerationResult, PipelineConfig,
    PipelineEvent, RunReport, ShutdownReason, UnitTiming, Waypoint, WorkUnit, WorkerExit,
    WorkerKind, WorkerMessage,
};
use crate::domain::ports::{ContentEvaluator, ContentGenerator};

/// Capacity of the event broadcast; slow subscribers lag rather than block
const EVENT_BUFFER: usize = 256;

/// Heartbeats older than this many poll intervals are reported as stale
const STALE_HEARTBEAT_POLLS: u32 = 4;

/// What a worker monitor observed
#[derive(Debug)]
pub struct MonitorOutcome {
    pub kind: WorkerKind,
    pub exit: WorkerExit,
    /// Error that must fail the run
    pub fatal: Option<PipelineError>,
}

/// Runs the pipeline for a route
pub struct Supervisor {
    config: PipelineConfig,
    thresholds: DegradationThresholds,
    generator: Arc<dyn ContentGenerator>,
    evaluator: Arc<dyn ContentEvaluator>,
    events: broadcast::Sender<PipelineEvent>,
}

struct WorkerHandles {
    kind: WorkerKind,
    abort: AbortHandle,
    intake: ChannelCloser,
    status: watch::Receiver<WorkerStatus>,
}

impl Supervisor {
    pub fn new(
        config: PipelineConfig,
        thresholds: DegradationThresholds,
        generator: Arc<dyn ContentGenerator>,
        evaluator: Arc<dyn ContentEvaluator>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            config,
            thresholds,
            generator,
            evaluator,
            events,
        }
    }

    /// Subscribe to progress events of subsequent runs
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the pipeline over `waypoints`.
    ///
    /// Returns one decision per waypoint, in input order, whatever the
    /// collaborators do. Errors only for invalid input or a broken pipeline
    /// (capacity misconfiguration, a lost synthetic result, a crashed stage).
    #[instrument(skip_all, fields(waypoints = waypoints.len()))]
    pub async fn run(&self, waypoints: &[Waypoint]) -> Result<RunReport, PipelineError> {
        if waypoints.len() > self.config.max_waypoints {
            return Err(PipelineError::TooManyWaypoints {
                count: waypoints.len(),
                max: self.config.max_waypoints,
            });
        }
        for (index, waypoint) in waypoints.iter().enumerate() {
            waypoint
                .validate()
                .map_err(|source| PipelineError::InvalidWaypoint { index, source })?;
        }

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = Instant::now();
        let run_deadline = start + self.config.run_timeout();
        let stage_deadline = (start + self.config.discovery_timeout()).min(run_deadline);

        info!(
            run_id = %run_id,
            kinds = ?self.config.kinds,
            run_timeout_secs = self.config.run_timeout_secs,
            "Pipeline run starting"
        );

        let units = Dispatcher::create_units(waypoints);
        let (results_tx, results_rx) =
            bounded::<WorkerMessage>("collection", self.config.collection_capacity)?;
        let collection = results_tx.closer();
        let force_finalize = CancellationToken::new();

        let aggregator = tokio::spawn(
            Aggregator::new(
                &units,
                SelectionPolicy::from_config(&self.config),
                Arc::clone(&self.evaluator),
                results_rx,
                self.events.clone(),
                AggregatorSettings {
                    collection_timeout: self.config.collection_timeout(),
                    evaluation_timeout: self.config.evaluation_timeout(),
                    poll_interval: self.config.poll_interval(),
                },
                force_finalize.clone(),
            )
            .run(),
        );

        let mut intakes = Vec::with_capacity(self.config.kinds.len());
        let mut handles = Vec::with_capacity(self.config.kinds.len());
        let mut monitors = Vec::with_capacity(self.config.kinds.len());
        for kind in &self.config.kinds {
            let (intake_tx, intake_rx) =
                bounded(format!("intake-{kind}"), self.config.intake_capacity)?;
            let (worker, status) = GenerationWorker::new(
                *kind,
                Arc::clone(&self.generator),
                intake_rx,
                results_tx.clone(),
                WorkerSettings {
                    generation_timeout: self.config.generation_timeout(),
                    poll_interval: self.config.poll_interval(),
                    send_timeout: self.config.send_timeout(),
                },
            );
            let handle = tokio::spawn(worker.run());

            handles.push(WorkerHandles {
                kind: *kind,
                abort: handle.abort_handle(),
                intake: intake_tx.closer(),
                status: status.clone(),
            });
            monitors.push(monitor_worker(
                *kind,
                handle,
                status,
                intake_tx.closer(),
                results_tx.clone(),
                self.config.send_timeout(),
                self.events.clone(),
            ));
            intakes.push((*kind, intake_tx));
        }
        drop(results_tx);

        let dispatcher = Dispatcher::new(intakes, self.config.send_timeout(), self.events.clone());
        let dispatch_units = units.clone();
        let dispatch =
            tokio::spawn(async move { dispatcher.dispatch(&dispatch_units).await });

        let monitors = join_all(monitors);
        tokio::pin!(monitors);

        let (outcomes, shutdown_reason) = tokio::select! {
            outcomes = &mut monitors => (outcomes, ShutdownReason::Completed),
            () = tokio::time::sleep_until(stage_deadline) => {
                let reason = if stage_deadline >= run_deadline {
                    ShutdownReason::RunDeadline
                } else {
                    ShutdownReason::DiscoveryDeadline
                };
                let outcomes = self.shut_down_workers(&handles, reason, &mut monitors).await;
                (outcomes, reason)
            }
        };

        let mut fatal: Option<PipelineError> = None;
        match dispatch.await {
            Ok(Ok(summary)) => info!(deliveries = summary.total(), "Dispatcher finished"),
            Ok(Err(err)) => {
                error!(error = %err, "Dispatcher failed");
                fatal = Some(err.into());
            }
            Err(err) => {
                error!(error = %err, "Dispatcher task crashed");
                fatal = Some(PipelineError::DispatcherCrashed(join_error_message(err)));
            }
        }

        let mut worker_exits = BTreeMap::new();
        for outcome in outcomes {
            if let Some(err) = outcome.fatal {
                error!(kind = %outcome.kind, error = %err, "Worker failure is fatal to the run");
                fatal.get_or_insert(err);
            }
            worker_exits.insert(outcome.kind, outcome.exit);
        }

        // Every producer is gone; let the aggregator drain and finish
        collection.close_for_sending();
        if fatal.is_some() {
            force_finalize.cancel();
        }
        let output = self
            .await_aggregator(aggregator, run_deadline, &force_finalize)
            .await?;

        if let Some(err) = fatal {
            return Err(err);
        }

        let report = self.build_report(
            run_id,
            started_at,
            start.elapsed(),
            &units,
            output,
            worker_exits,
            shutdown_reason,
        );

        info!(
            run_id = %run_id,
            degradation = %report.degradation,
            successful = report.successful_decisions(),
            total = report.decisions.len(),
            elapsed_ms = report.elapsed.as_millis(),
            "Pipeline run complete"
        );
        let _ = self.events.send(PipelineEvent::RunCompleted {
            degradation: report.degradation,
            decisions: report.decisions.len(),
        });

        Ok(report)
    }

    /// Close intakes, wait out the grace period, then abort stragglers.
    async fn shut_down_workers<F>(
        &self,
        handles: &[WorkerHandles],
        reason: ShutdownReason,
        monitors: &mut std::pin::Pin<&mut F>,
    ) -> Vec<MonitorOutcome>
    where
        F: std::future::Future<Output = Vec<MonitorOutcome>>,
    {
        warn!(reason = %reason, "Stage deadline reached, closing worker intakes");
        let _ = self.events.send(PipelineEvent::ShutdownInitiated { reason });
        for handle in handles {
            handle.intake.shutdown();
        }

        if let Ok(outcomes) =
            tokio::time::timeout(self.config.shutdown_grace(), monitors.as_mut()).await
        {
            return outcomes;
        }

        let stale_after = self.config.poll_interval() * STALE_HEARTBEAT_POLLS;
        for handle in handles {
            let status = *handle.status.borrow();
            if !matches!(status.state, WorkerState::Terminated) {
                warn!(
                    kind = %handle.kind,
                    state = ?status.state,
                    stale = status.is_stale(stale_after),
                    "Grace period elapsed, force-terminating worker"
                );
            }
            handle.abort.abort();
        }
        monitors.as_mut().await
    }

    async fn await_aggregator(
        &self,
        mut aggregator: JoinHandle<AggregatorOutput>,
        run_deadline: Instant,
        force_finalize: &CancellationToken,
    ) -> Result<AggregatorOutput, PipelineError> {
        let joined = match tokio::time::timeout_at(run_deadline, &mut aggregator).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!("Run deadline reached, force-finalizing aggregator");
                force_finalize.cancel();
                aggregator.await
            }
        };
        joined.map_err(|err| PipelineError::AggregatorCrashed(join_error_message(err)))
    }

    #[allow(clippy::too_many_arguments)]
    fn build_report(
        &self,
        run_id: Uuid,
        started_at: chrono::DateTime<Utc>,
        elapsed: Duration,
        units: &[WorkUnit],
        mut output: AggregatorOutput,
        worker_exits: BTreeMap<WorkerKind, WorkerExit>,
        shutdown_reason: ShutdownReason,
    ) -> RunReport {
        let mut decisions = Vec::with_capacity(units.len());
        let mut results = Vec::with_capacity(units.len() * self.config.kinds.len());
        let mut timings = Vec::with_capacity(units.len());

        for unit in units {
            let decision = output.decisions.remove(&unit.id).unwrap_or_else(|| {
                error!(unit_id = %unit.id, "Aggregator returned no decision, recording none");
                Decision::none(unit.id, &self.config.kinds)
            });
            decisions.push(decision);

            if let Some(unit_results) = output.results.remove(&unit.id) {
                results.extend(unit_results.into_values());
            }

            timings.push(output.timings.remove(&unit.id).unwrap_or_else(|| UnitTiming {
                unit_id: unit.id,
                waypoint: unit.name().to_string(),
                generation_ms: BTreeMap::new(),
                evaluation: Duration::ZERO,
                collection_wait: Duration::ZERO,
            }));
        }

        let successful = decisions.iter().filter(|d| d.has_content()).count();
        let degradation = DegradationLevel::classify(successful, units.len(), &self.thresholds);
        #[allow(clippy::cast_precision_loss)]
        let success_ratio = if units.is_empty() {
            1.0
        } else {
            successful as f64 / units.len() as f64
        };
        let forced_terminations = worker_exits
            .values()
            .filter(|e| matches!(e, WorkerExit::ForceTerminated))
            .count();

        RunReport {
            run_id,
            started_at,
            elapsed,
            decisions,
            results,
            timings,
            degradation,
            success_ratio,
            worker_exits,
            forced_terminations,
            late_results: output.late_results,
            shutdown_reason,
        }
    }
}

/// Await a worker and account for how it ended.
///
/// A worker that panicked or was aborted while holding a unit gets a
/// synthetic result for that unit, so grouping never waits on a dead worker.
/// Abnormal exits also shut the worker's intake so the dispatcher stops
/// feeding it.
pub async fn monitor_worker(
    kind: WorkerKind,
    handle: JoinHandle<Result<usize, ChannelError>>,
    status: watch::Receiver<WorkerStatus>,
    intake: ChannelCloser,
    results: ChannelSender<WorkerMessage>,
    send_timeout: Duration,
    events: broadcast::Sender<PipelineEvent>,
) -> MonitorOutcome {
    let joined = handle.await;
    let last = *status.borrow();
    let busy_for = last.busy_since.map_or(Duration::ZERO, |t| t.elapsed());

    let mut fatal = None;
    let (exit, synthetic) = match joined {
        Ok(Ok(processed)) => {
            info!(kind = %kind, processed, "Worker exited cleanly");
            (WorkerExit::Completed, None)
        }
        Ok(Err(err)) => {
            error!(kind = %kind, error = %err, "Worker could not deliver a result");
            let reason = err.to_string();
            fatal = Some(PipelineError::from(err));
            (WorkerExit::Failed { reason }, None)
        }
        Err(err) if err.is_panic() => {
            let reason = panic_message(err.into_panic());
            error!(kind = %kind, reason = %reason, "Worker crashed");
            let synthetic = last.state.outstanding_unit().map(|unit_id| {
                GenerationResult::failure(
                    unit_id,
                    kind,
                    format!("worker {kind} crashed: {reason}"),
                    busy_for,
                )
                .into_synthetic()
            });
            (WorkerExit::Crashed { reason }, synthetic)
        }
        Err(_) => {
            warn!(kind = %kind, state = ?last.state, "Worker force-terminated");
            let synthetic = last.state.outstanding_unit().map(|unit_id| {
                GenerationResult::timeout(
                    unit_id,
                    kind,
                    format!("worker {kind} force-terminated by supervisor after the grace period"),
                    busy_for,
                )
                .into_synthetic()
            });
            (WorkerExit::ForceTerminated, synthetic)
        }
    };

    if !exit.is_clean() {
        intake.shutdown();
    }

    if let Some(result) = synthetic {
        let unit_id = result.unit_id;
        match results.send(result.into(), send_timeout).await {
            Ok(()) => info!(kind = %kind, unit_id = %unit_id, "Synthetic result emitted"),
            Err(err) => {
                error!(kind = %kind, unit_id = %unit_id, error = %err, "Synthetic result lost");
                fatal.get_or_insert(PipelineError::SupervisorForcedTermination { kind, unit_id });
            }
        }
    }

    let _ = events.send(PipelineEvent::WorkerExited {
        kind,
        exit: exit.clone(),
    });

    MonitorOutcome { kind, exit, fatal }
}

fn join_error_message(err: tokio::task::JoinError) -> String {
    if err.is_panic() {
        panic_message(err.into_panic())
    } else {
        err.to_string()
    }
}
