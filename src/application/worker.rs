//! Generation worker: one isolated task per worker kind.
//!
//! The worker pulls units from its own intake, calls the generator in a
//! separately spawned task under a hard deadline and emits exactly one
//! [`GenerationResult`] per unit, preceded by a pickup notice. Its state is published on a `watch`
//! channel so the supervisor can tell which unit was in flight if the
//! worker itself dies.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, info, warn};

use crate::application::channel::{
    ChannelError, ChannelReceiver, ChannelSender, Received, RecvError,
};
use crate::domain::errors::{CollaboratorError, PipelineError};
use crate::domain::models::{
    GenerationResult, WorkUnit, WorkUnitId, WorkerKind, WorkerMessage,
};
use crate::domain::ports::ContentGenerator;

/// Worker lifecycle
///
/// `Idle -> Running -> {Succeeded, TimedOut, Failed} -> Idle`, looping until
/// end-of-stream, then `Terminated`. The three outcome states last until the
/// unit's result has been accepted by the collection channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Running { unit_id: WorkUnitId },
    Succeeded { unit_id: WorkUnitId },
    TimedOut { unit_id: WorkUnitId },
    Failed { unit_id: WorkUnitId },
    Terminated,
}

impl WorkerState {
    /// Unit whose result has not yet reached the collection channel
    pub const fn outstanding_unit(&self) -> Option<WorkUnitId> {
        match self {
            Self::Running { unit_id }
            | Self::Succeeded { unit_id }
            | Self::TimedOut { unit_id }
            | Self::Failed { unit_id } => Some(*unit_id),
            Self::Idle | Self::Terminated => None,
        }
    }
}

/// Snapshot published by a worker on every state change and heartbeat
#[derive(Debug, Clone, Copy)]
pub struct WorkerStatus {
    pub state: WorkerState,
    pub heartbeat_at: Instant,
    /// When the current unit was picked up
    pub busy_since: Option<Instant>,
    pub processed: usize,
}

impl WorkerStatus {
    pub fn idle() -> Self {
        Self {
            state: WorkerState::Idle,
            heartbeat_at: Instant::now(),
            busy_since: None,
            processed: 0,
        }
    }

    /// No heartbeat for longer than `threshold`
    pub fn is_stale(&self, threshold: Duration) -> bool {
        self.heartbeat_at.elapsed() > threshold
    }
}

/// Timing knobs for a worker
#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    pub generation_timeout: Duration,
    pub poll_interval: Duration,
    pub send_timeout: Duration,
}

/// A single worker kind's processing loop
pub struct GenerationWorker {
    kind: WorkerKind,
    generator: Arc<dyn ContentGenerator>,
    intake: ChannelReceiver<WorkUnit>,
    results: ChannelSender<WorkerMessage>,
    status: watch::Sender<WorkerStatus>,
    settings: WorkerSettings,
}

impl GenerationWorker {
    pub fn new(
        kind: WorkerKind,
        generator: Arc<dyn ContentGenerator>,
        intake: ChannelReceiver<WorkUnit>,
        results: ChannelSender<WorkerMessage>,
        settings: WorkerSettings,
    ) -> (Self, watch::Receiver<WorkerStatus>) {
        let (status, status_rx) = watch::channel(WorkerStatus::idle());
        (
            Self {
                kind,
                generator,
                intake,
                results,
                status,
                settings,
            },
            status_rx,
        )
    }

    pub const fn kind(&self) -> WorkerKind {
        self.kind
    }

    /// Process units until end-of-stream; returns how many were processed.
    ///
    /// Each unit is announced on the collection channel before generation
    /// starts. Errors only when the collection channel refuses a message.
    pub async fn run(mut self) -> Result<usize, ChannelError> {
        info!(kind = %self.kind, "Worker started");

        loop {
            match self.intake.recv(self.settings.poll_interval).await {
                Err(RecvError::EmptyTimeout { .. }) => self.beat(),
                Ok(Received::EndOfStream) => break,
                Ok(Received::Item(unit)) => {
                    let started = WorkerMessage::Started {
                        unit_id: unit.id,
                        kind: self.kind,
                    };
                    self.results.send(started, self.settings.send_timeout).await?;
                    let result = self.process(&unit).await;
                    self.results
                        .send(result.into(), self.settings.send_timeout)
                        .await?;
                    self.status.send_modify(|s| {
                        s.state = WorkerState::Idle;
                        s.busy_since = None;
                        s.processed += 1;
                        s.heartbeat_at = Instant::now();
                    });
                }
            }
        }

        let processed = self.status.borrow().processed;
        self.set_state(WorkerState::Terminated);
        info!(kind = %self.kind, processed, "Worker terminated");
        Ok(processed)
    }

    async fn process(&self, unit: &WorkUnit) -> GenerationResult {
        let unit_id = unit.id;
        let kind = self.kind;
        self.status.send_modify(|s| {
            s.state = WorkerState::Running { unit_id };
            s.busy_since = Some(Instant::now());
            s.heartbeat_at = Instant::now();
        });
        debug!(unit_id = %unit_id, kind = %kind, waypoint = %unit.name(), "Generating content");

        let started = Instant::now();
        let deadline = started + self.settings.generation_timeout;

        let generator = Arc::clone(&self.generator);
        let call_unit = unit.clone();
        let mut call = AbortOnDropHandle::new(tokio::spawn(async move {
            generator.generate(kind, &call_unit).await
        }));

        let joined = loop {
            tokio::select! {
                joined = &mut call => break Some(joined),
                () = tokio::time::sleep_until(deadline) => break None,
                () = tokio::time::sleep(self.settings.poll_interval) => self.beat(),
            }
        };
        let elapsed = started.elapsed();

        let (result, state) = match joined {
            Some(Ok(Ok(content))) => (
                GenerationResult::success(unit_id, kind, content, elapsed),
                WorkerState::Succeeded { unit_id },
            ),
            Some(Ok(Err(err))) => (
                self.failure(unit_id, err, elapsed),
                WorkerState::Failed { unit_id },
            ),
            Some(Err(join_err)) => {
                let err = if join_err.is_panic() {
                    CollaboratorError::Panicked(panic_message(join_err.into_panic()))
                } else {
                    CollaboratorError::Failed(join_err.to_string())
                };
                (
                    self.failure(unit_id, err, elapsed),
                    WorkerState::Failed { unit_id },
                )
            }
            None => {
                call.abort();
                let err = PipelineError::GenerationTimeout {
                    unit_id,
                    kind,
                    timeout: self.settings.generation_timeout,
                };
                warn!(
                    unit_id = %unit_id,
                    kind = %kind,
                    elapsed_ms = elapsed.as_millis(),
                    "Generation deadline elapsed, call abandoned"
                );
                (
                    GenerationResult::timeout(unit_id, kind, err.to_string(), elapsed),
                    WorkerState::TimedOut { unit_id },
                )
            }
        };

        if result.is_success() {
            info!(
                unit_id = %unit_id,
                kind = %kind,
                score = result.relevance_score(),
                elapsed_ms = elapsed.as_millis(),
                "Generation succeeded"
            );
        }

        self.set_state(state);
        result
    }

    fn failure(
        &self,
        unit_id: WorkUnitId,
        source: CollaboratorError,
        elapsed: Duration,
    ) -> GenerationResult {
        let err = PipelineError::GenerationFailure {
            unit_id,
            kind: self.kind,
            source,
        };
        warn!(unit_id = %unit_id, kind = %self.kind, error = %err, "Generation failed");
        GenerationResult::failure(unit_id, self.kind, err.to_string(), elapsed)
    }

    fn set_state(&self, state: WorkerState) {
        self.status.send_modify(|s| {
            s.state = state;
            s.heartbeat_at = Instant::now();
        });
    }

    fn beat(&self) {
        self.status.send_modify(|s| s.heartbeat_at = Instant::now());
    }
}

/// Best-effort text of a panic payload
pub fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::substrates::{ScriptedBehavior, ScriptedGenerator};
    use crate::application::channel::bounded;
    use crate::domain::models::{Coordinates, GenerationStatus, Waypoint, WaypointCategory};

    fn unit(index: u32) -> WorkUnit {
        WorkUnit::new(
            WorkUnitId(index),
            Waypoint::new(
                format!("Stop {index}"),
                Coordinates::new(32.0, 34.8),
                WaypointCategory::Cultural,
                "",
            ),
        )
    }

    fn settings() -> WorkerSettings {
        WorkerSettings {
            generation_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(250),
            send_timeout: Duration::from_secs(35),
        }
    }

    async fn run_one(behavior: ScriptedBehavior) -> GenerationResult {
        let generator = Arc::new(ScriptedGenerator::new().with_kind(WorkerKind::Music, behavior));
        let (intake_tx, intake_rx) = bounded("intake-music", 2).unwrap();
        let (results_tx, mut results_rx) = bounded("collection", 2).unwrap();
        let (worker, _status) = GenerationWorker::new(
            WorkerKind::Music,
            generator,
            intake_rx,
            results_tx,
            settings(),
        );

        intake_tx.send(unit(0), Duration::from_secs(1)).await.unwrap();
        intake_tx
            .send_end_of_stream(Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(worker.run().await.unwrap(), 1);
        let started = results_rx.recv(Duration::from_secs(1)).await.unwrap();
        assert!(matches!(
            started,
            Received::Item(WorkerMessage::Started {
                unit_id: WorkUnitId(0),
                kind: WorkerKind::Music
            })
        ));
        match results_rx.recv(Duration::from_secs(1)).await.unwrap() {
            Received::Item(WorkerMessage::Finished(result)) => result,
            other => panic!("expected a result, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_result() {
        let result = run_one(ScriptedBehavior::succeed(Duration::from_secs(2), 80.0)).await;
        assert_eq!(result.status, GenerationStatus::Success);
        assert!((result.relevance_score() - 80.0).abs() < f64::EPSILON);
        assert!(result.elapsed >= Duration::from_secs(2));
        assert!(result.elapsed < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hang_becomes_timeout_at_deadline() {
        let result = run_one(ScriptedBehavior::Hang).await;
        assert_eq!(result.status, GenerationStatus::Timeout);
        assert!(result.elapsed >= Duration::from_secs(30));
        assert!(result.elapsed < Duration::from_secs(31));
        assert!(result.error.unwrap().contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_becomes_failure() {
        let result = run_one(ScriptedBehavior::fail(Duration::from_secs(1), "quota")).await;
        assert_eq!(result.status, GenerationStatus::Failure);
        assert!(result.error.unwrap().contains("quota"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_becomes_failure() {
        let result = run_one(ScriptedBehavior::Panic).await;
        assert_eq!(result.status, GenerationStatus::Failure);
        assert!(result.error.unwrap().contains("panicked"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_tracks_lifecycle() {
        let generator = Arc::new(ScriptedGenerator::new().with_kind(
            WorkerKind::Video,
            ScriptedBehavior::succeed(Duration::from_secs(5), 60.0),
        ));
        let (intake_tx, intake_rx) = bounded("intake-video", 2).unwrap();
        let (results_tx, mut results_rx) = bounded("collection", 2).unwrap();
        let (worker, status) = GenerationWorker::new(
            WorkerKind::Video,
            generator,
            intake_rx,
            results_tx,
            settings(),
        );
        let handle = tokio::spawn(worker.run());

        intake_tx.send(unit(4), Duration::from_secs(1)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(
            status.borrow().state,
            WorkerState::Running {
                unit_id: WorkUnitId(4)
            }
        );
        assert_eq!(status.borrow().state.outstanding_unit(), Some(WorkUnitId(4)));
        assert!(matches!(
            results_rx.recv(Duration::from_secs(1)).await.unwrap(),
            Received::Item(WorkerMessage::Started {
                unit_id: WorkUnitId(4),
                ..
            })
        ));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(status.borrow().state, WorkerState::Idle);
        assert_eq!(status.borrow().processed, 1);

        intake_tx
            .send_end_of_stream(Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(handle.await.unwrap().unwrap(), 1);
        assert_eq!(status.borrow().state, WorkerState::Terminated);
    }

    #[test]
    fn test_panic_message_extraction() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new("bang".to_string())), "bang");
        assert_eq!(panic_message(Box::new(7_u8)), "unknown panic");
    }
}
