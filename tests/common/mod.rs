//! Common test utilities for integration tests
//!
//! Route fixtures, pipeline configs and supervisor builders shared across
//! the integration test files.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tour_guide::adapters::substrates::{ScriptedEvaluator, ScriptedGenerator};
use tour_guide::domain::models::{
    Coordinates, DegradationThresholds, PipelineConfig, RunReport, Waypoint, WaypointCategory,
    WorkerKind,
};
use tour_guide::Supervisor;

/// Setup test logging
///
/// Call this at the beginning of tests that need logging.
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// `count` valid waypoints heading south from Jerusalem
pub fn route(count: usize) -> Vec<Waypoint> {
    (0..count)
        .map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let step = i as f64;
            Waypoint::new(
                format!("Stop {i}"),
                Coordinates::new(31.77 - 0.1 * step, 35.21 + 0.01 * step),
                WaypointCategory::Historical,
                format!("Waypoint number {i} on the test route"),
            )
            .with_distance(12.5 * step)
        })
        .collect()
}

/// Production deadlines
pub fn default_pipeline() -> PipelineConfig {
    PipelineConfig::default()
}

pub fn supervisor(
    config: PipelineConfig,
    generator: Arc<ScriptedGenerator>,
    evaluator: Arc<ScriptedEvaluator>,
) -> Supervisor {
    Supervisor::new(config, DegradationThresholds::default(), generator, evaluator)
}

/// Selected kind per decision, in report order
pub fn selections(report: &RunReport) -> Vec<Option<WorkerKind>> {
    report.decisions.iter().map(|d| d.selected).collect()
}

pub const fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

pub const fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}
