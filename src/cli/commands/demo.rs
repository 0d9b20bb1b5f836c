//! Implementation of the `tour-guide demo` command.
//!
//! Runs the real pipeline over a built-in route with scripted collaborators,
//! so deadlines, fallbacks and degradation can be watched without the
//! Claude CLI.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::{execute_pipeline, load_config, RunOutput};
use crate::adapters::substrates::{
    EvaluatorScript, ScriptedBehavior, ScriptedEvaluator, ScriptedGenerator,
};
use crate::application::Supervisor;
use crate::cli::output::output;
use crate::cli::types::Scenario;
use crate::domain::models::{
    Config, Coordinates, PipelineConfig, Waypoint, WaypointCategory, WorkUnitId, WorkerKind,
};
use crate::infrastructure::config::ConfigLoader;

/// Tel Aviv to Eilat via Jerusalem and the Dead Sea
pub fn demo_route() -> Vec<Waypoint> {
    use WaypointCategory::{Cultural, Entertainment, Historical, Natural, Religious};

    let stops = [
        ("Old Jaffa Port", 32.0543, 34.7516, Historical, "One of the oldest ports in the world, mentioned in the story of Jonah.", 0.0),
        ("Latrun", 31.8389, 34.9783, Historical, "Trappist monastery and armoured corps memorial on the road to Jerusalem.", 28.4),
        ("Abu Ghosh", 31.8050, 35.1100, Cultural, "Hill village known for its music festival and crusader church.", 49.0),
        ("Western Wall", 31.7767, 35.2345, Religious, "Remnant of the Second Temple compound in the Old City of Jerusalem.", 61.2),
        ("Qumran", 31.7413, 35.4594, Historical, "Site where the Dead Sea Scrolls were discovered in 1947.", 101.7),
        ("Ein Gedi", 31.4617, 35.3878, Natural, "Desert oasis with waterfalls and ibex above the Dead Sea.", 138.9),
        ("Masada", 31.3156, 35.3536, Historical, "Herod's fortress and the site of the last stand against Rome in 73 CE.", 157.3),
        ("Ein Bokek", 31.2000, 35.3625, Entertainment, "Resort strip on the shore of the lowest place on earth.", 172.0),
        ("Mitzpe Ramon", 30.6100, 34.8019, Natural, "Town on the rim of the Ramon erosion crater.", 268.5),
        ("Coral Beach", 29.5087, 34.9211, Natural, "Nature reserve protecting the northernmost coral reef in the world.", 405.0),
    ];

    stops
        .into_iter()
        .map(|(name, lat, lon, category, description, km)| {
            Waypoint::new(name, Coordinates::new(lat, lon), category, description).with_distance(km)
        })
        .collect()
}

/// Compact deadlines so a scenario finishes in seconds
pub fn demo_pipeline(base: &PipelineConfig) -> PipelineConfig {
    PipelineConfig {
        run_timeout_secs: 30,
        discovery_timeout_secs: 24,
        generation_timeout_secs: 2,
        evaluation_timeout_secs: 2,
        collection_timeout_secs: 3,
        shutdown_grace_secs: 1,
        send_timeout_secs: 3,
        poll_interval_ms: 100,
        ..base.clone()
    }
}

/// Scripted collaborators for a scenario over `count` units
pub fn scenario_collaborators(
    scenario: Scenario,
    count: usize,
) -> (ScriptedGenerator, ScriptedEvaluator) {
    let ids = (0..count).filter_map(|i| u32::try_from(i).ok()).map(WorkUnitId);

    match scenario {
        Scenario::Healthy => {
            let mut generator = ScriptedGenerator::new();
            let mut evaluator = ScriptedEvaluator::new(EvaluatorScript::PickFirst);
            for id in ids {
                let n = f64::from(id.0);
                generator = generator
                    .with_unit(id, WorkerKind::Video, ScriptedBehavior::succeed(ms(400 + 90 * id.0), 62.0 + 3.0 * n))
                    .with_unit(id, WorkerKind::Music, ScriptedBehavior::succeed(ms(300 + 120 * id.0 % 700), 55.0 + 4.0 * n))
                    .with_unit(id, WorkerKind::History, ScriptedBehavior::succeed(ms(650), 88.0 - 2.0 * n));
                if id.0 % 3 == 0 {
                    evaluator = evaluator.with_unit(id, EvaluatorScript::Pick(WorkerKind::History));
                }
            }
            (generator, evaluator)
        }
        Scenario::Flaky => {
            let mut generator = ScriptedGenerator::with_default(ScriptedBehavior::succeed(ms(500), 70.0));
            let mut evaluator =
                ScriptedEvaluator::new(EvaluatorScript::Prefer(vec![WorkerKind::Music, WorkerKind::Video]));
            for id in ids {
                if id.0 % 2 == 0 {
                    generator = generator.with_unit(
                        id,
                        WorkerKind::Music,
                        ScriptedBehavior::fail(ms(200), "rate limited by upstream catalogue"),
                    );
                }
                match id.0 % 4 {
                    1 => generator = generator.with_unit(id, WorkerKind::Video, ScriptedBehavior::Hang),
                    2 => evaluator = evaluator.with_unit(id, EvaluatorScript::Tie),
                    3 => evaluator = evaluator.with_unit(id, EvaluatorScript::Pick(WorkerKind::Music)),
                    _ => {}
                }
            }
            (generator, evaluator)
        }
        Scenario::Outage => {
            let generator = ScriptedGenerator::with_default(ScriptedBehavior::succeed(ms(300), 65.0))
                .with_kind(WorkerKind::History, ScriptedBehavior::Hang);
            let evaluator =
                ScriptedEvaluator::new(EvaluatorScript::Fail("evaluation service unavailable".to_string()));
            (generator, evaluator)
        }
    }
}

const fn ms(millis: u32) -> Duration {
    Duration::from_millis(millis as u64)
}

pub async fn execute(
    scenario: Scenario,
    waypoint_count: usize,
    config_path: Option<&Path>,
    json_mode: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let pipeline = demo_pipeline(&config.pipeline);
    ConfigLoader::validate(&Config {
        pipeline: pipeline.clone(),
        ..config.clone()
    })?;

    let mut waypoints = demo_route();
    waypoints.truncate(waypoint_count.min(pipeline.max_waypoints));

    info!(scenario = ?scenario, waypoints = waypoints.len(), "Running demo");

    let (generator, evaluator) = scenario_collaborators(scenario, waypoints.len());
    let supervisor = Supervisor::new(
        pipeline,
        config.degradation,
        Arc::new(generator),
        Arc::new(evaluator),
    );

    let report = execute_pipeline(supervisor, &waypoints, json_mode).await?;
    output(&RunOutput { report }, json_mode);
    Ok(())
}
