//! End-to-end pipeline scenarios against scripted collaborators
//!
//! Every test runs on paused time, so deadlines of minutes resolve instantly
//! while keeping their relative order.

mod common;

use std::sync::Arc;

use common::{millis, route, secs, selections, supervisor};
use tour_guide::adapters::substrates::{
    EvaluatorScript, ScriptedBehavior, ScriptedEvaluator, ScriptedGenerator,
};
use tour_guide::domain::models::{
    Coordinates, DegradationLevel, GenerationStatus, PipelineConfig, PipelineEvent,
    SelectionMethod, ShutdownReason, Waypoint, WaypointCategory, WorkUnitId, WorkerExit,
    WorkerKind, RATIONALE_ALL_FAILED, RATIONALE_ONLY_SUCCESS,
};
use tour_guide::PipelineError;

#[tokio::test(start_paused = true)]
async fn test_one_decision_per_waypoint_in_input_order() {
    let generator = Arc::new(
        ScriptedGenerator::with_default(ScriptedBehavior::succeed(millis(300), 60.0))
            .with_unit(WorkUnitId(1), WorkerKind::Video, ScriptedBehavior::fail(millis(50), "quota"))
            .with_unit(WorkUnitId(1), WorkerKind::Music, ScriptedBehavior::fail(millis(50), "quota"))
            .with_unit(WorkUnitId(1), WorkerKind::History, ScriptedBehavior::fail(millis(50), "quota"))
            .with_unit(WorkUnitId(3), WorkerKind::Music, ScriptedBehavior::succeed(secs(4), 90.0)),
    );
    let evaluator = Arc::new(ScriptedEvaluator::new(EvaluatorScript::PickFirst));
    let waypoints = route(5);

    let report = supervisor(common::default_pipeline(), generator, Arc::clone(&evaluator))
        .run(&waypoints)
        .await
        .unwrap();

    assert_eq!(report.decisions.len(), 5);
    for (index, decision) in report.decisions.iter().enumerate() {
        assert_eq!(decision.unit_id, WorkUnitId(u32::try_from(index).unwrap()));
        assert_eq!(report.timings[index].waypoint, waypoints[index].name);
    }
    assert_eq!(report.results.len(), 5 * 3);
    assert_eq!(report.decisions[1].selected, None);
    assert_eq!(report.degradation, DegradationLevel::Partial);
    assert!((report.success_ratio - 0.8).abs() < f64::EPSILON);
    assert_eq!(report.shutdown_reason, ShutdownReason::Completed);
    assert_eq!(report.forced_terminations, 0);
    assert!(report.worker_exits.values().all(WorkerExit::is_clean));
}

#[tokio::test(start_paused = true)]
async fn test_single_success_skips_evaluator() {
    let generator = Arc::new(
        ScriptedGenerator::with_default(ScriptedBehavior::Hang)
            .with_kind(WorkerKind::Video, ScriptedBehavior::succeed(secs(2), 80.0)),
    );
    let evaluator = Arc::new(ScriptedEvaluator::new(EvaluatorScript::PickFirst));

    let report = supervisor(
        common::default_pipeline(),
        generator,
        Arc::clone(&evaluator),
    )
    .run(&route(1))
    .await
    .unwrap();

    let decision = &report.decisions[0];
    assert_eq!(decision.selected, Some(WorkerKind::Video));
    assert_eq!(decision.rationale, RATIONALE_ONLY_SUCCESS);
    assert_eq!(decision.method, SelectionMethod::SingleCandidate);
    assert!((decision.scores[&WorkerKind::Video] - 80.0).abs() < f64::EPSILON);
    assert_eq!(decision.scores[&WorkerKind::Music], 0.0);
    assert_eq!(evaluator.calls(), 0);
    assert_eq!(report.degradation, DegradationLevel::Full);

    let music = report.result(WorkUnitId(0), WorkerKind::Music).unwrap();
    assert_eq!(music.status, GenerationStatus::Timeout);
    assert!(!music.synthetic);

    // Both hanging kinds give up at the 30s generation deadline
    assert!(report.elapsed >= secs(30));
    assert!(report.elapsed < secs(35));
}

#[tokio::test(start_paused = true)]
async fn test_all_failures_yield_empty_decision() {
    let generator = Arc::new(ScriptedGenerator::with_default(ScriptedBehavior::fail(
        millis(200),
        "upstream unavailable",
    )));
    let evaluator = Arc::new(ScriptedEvaluator::new(EvaluatorScript::PickFirst));

    let report = supervisor(common::default_pipeline(), generator, Arc::clone(&evaluator))
        .run(&route(3))
        .await
        .unwrap();

    assert_eq!(selections(&report), vec![None, None, None]);
    for decision in &report.decisions {
        assert_eq!(decision.rationale, RATIONALE_ALL_FAILED);
        assert_eq!(decision.method, SelectionMethod::NoCandidates);
        assert_eq!(decision.scores.len(), 3);
        assert!(decision.scores.values().all(|s| *s == 0.0));
        assert!(decision.content.is_none());
    }
    assert_eq!(evaluator.calls(), 0);
    assert_eq!(report.degradation, DegradationLevel::CompleteFailure);
    assert_eq!(report.success_ratio, 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_unpresented_pick_falls_back_by_priority() {
    let generator = Arc::new(
        ScriptedGenerator::with_default(ScriptedBehavior::succeed(millis(500), 70.0)).with_unit(
            WorkUnitId(1),
            WorkerKind::Video,
            ScriptedBehavior::fail(millis(100), "video search returned nothing"),
        ),
    );
    let evaluator = Arc::new(
        ScriptedEvaluator::new(EvaluatorScript::PickFirst)
            .with_unit(WorkUnitId(1), EvaluatorScript::Pick(WorkerKind::Video)),
    );

    let report = supervisor(common::default_pipeline(), generator, Arc::clone(&evaluator))
        .run(&route(2))
        .await
        .unwrap();

    let first = &report.decisions[0];
    assert_eq!(first.method, SelectionMethod::Evaluator);
    assert_eq!(first.selected, Some(WorkerKind::Video));

    let second = &report.decisions[1];
    assert_eq!(
        evaluator.presented(WorkUnitId(1)),
        Some(vec![WorkerKind::Music, WorkerKind::History])
    );
    assert_eq!(second.method, SelectionMethod::Fallback);
    assert_eq!(second.selected, Some(WorkerKind::History));
    assert!(second.fallback_reason.is_some());
    assert!(second.content.is_some());
    assert_eq!(report.degradation, DegradationLevel::Full);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_kind_resolves_by_generation_timeout() {
    let generator = Arc::new(
        ScriptedGenerator::with_default(ScriptedBehavior::succeed(millis(100), 50.0))
            .with_kind(WorkerKind::Video, ScriptedBehavior::Hang),
    );
    let evaluator = Arc::new(ScriptedEvaluator::new(EvaluatorScript::PickFirst));
    let config = common::default_pipeline();

    let report = supervisor(config.clone(), generator, evaluator)
        .run(&route(3))
        .await
        .unwrap();

    // Video spends 30s per unit; each unit waits for its own video timeout
    for unit in 0..3 {
        let video = report.result(WorkUnitId(unit), WorkerKind::Video).unwrap();
        assert_eq!(video.status, GenerationStatus::Timeout);
        assert!(!video.synthetic);
        assert!(video.elapsed >= config.generation_timeout());
        assert!(video.elapsed < config.generation_timeout() + secs(1));
    }
    let last = &report.timings[2];
    assert!(last.collection_wait >= secs(90));

    assert_eq!(report.late_results, 0);
    assert_eq!(report.results.len(), 9);
    assert!(report.decisions.iter().all(|d| d.has_content()));
}

#[tokio::test(start_paused = true)]
async fn test_slow_kind_within_deadline_is_kept() {
    let generator = Arc::new(
        ScriptedGenerator::with_default(ScriptedBehavior::succeed(secs(1), 50.0))
            .with_kind(WorkerKind::Music, ScriptedBehavior::succeed(secs(20), 90.0)),
    );
    let evaluator = Arc::new(ScriptedEvaluator::new(EvaluatorScript::Prefer(vec![
        WorkerKind::Music,
    ])));

    let report = supervisor(common::default_pipeline(), generator, Arc::clone(&evaluator))
        .run(&route(4))
        .await
        .unwrap();

    // Music finishes unit 3 at 80s, long after the other kinds' first results
    for unit in 0..4 {
        let music = report.result(WorkUnitId(unit), WorkerKind::Music).unwrap();
        assert_eq!(music.status, GenerationStatus::Success);
        assert!(!music.synthetic);
    }
    assert_eq!(report.late_results, 0);
    assert_eq!(selections(&report), vec![Some(WorkerKind::Music); 4]);
    assert_eq!(evaluator.calls(), 4);
    assert!(report.elapsed >= secs(80));
    assert_eq!(report.degradation, DegradationLevel::Full);
}

#[tokio::test(start_paused = true)]
async fn test_stuck_worker_is_force_terminated() {
    let generator = Arc::new(
        ScriptedGenerator::with_default(ScriptedBehavior::succeed(millis(100), 55.0))
            .with_kind(WorkerKind::Video, ScriptedBehavior::Hang),
    );
    let evaluator = Arc::new(ScriptedEvaluator::new(EvaluatorScript::PickFirst));
    let config = PipelineConfig {
        discovery_timeout_secs: 140,
        ..common::default_pipeline()
    };
    let mut events = {
        let sup = supervisor(config.clone(), Arc::clone(&generator), Arc::clone(&evaluator));
        let events = sup.subscribe();
        let report = sup.run(&route(10)).await.unwrap();

        assert_eq!(report.decisions.len(), 10);
        assert_eq!(report.shutdown_reason, ShutdownReason::DiscoveryDeadline);
        assert_eq!(report.forced_terminations, 1);
        assert_eq!(report.worker_exits[&WorkerKind::Video], WorkerExit::ForceTerminated);
        assert!(report.worker_exits[&WorkerKind::Music].is_clean());
        assert_eq!(report.degradation, DegradationLevel::Full);
        assert_eq!(report.late_results, 0);

        // Units 0-3 saw real video timeouts; unit 4 was in flight when the
        // worker was aborted; units 5-9 were never picked up by video
        let unit3 = report.result(WorkUnitId(3), WorkerKind::Video).unwrap();
        assert_eq!(unit3.status, GenerationStatus::Timeout);
        assert!(!unit3.synthetic);
        let unit4 = report.result(WorkUnitId(4), WorkerKind::Video).unwrap();
        assert!(unit4.synthetic);
        assert!(unit4.error.as_deref().unwrap().contains("force-terminated"));
        let unit7 = report.result(WorkUnitId(7), WorkerKind::Video).unwrap();
        assert!(unit7.synthetic);
        assert_eq!(unit7.elapsed, std::time::Duration::ZERO);
        assert!(report.elapsed >= secs(145));
        assert!(report.elapsed < config.run_timeout());
        events
    };

    let mut saw_shutdown = false;
    let mut saw_forced_exit = false;
    while let Ok(event) = events.try_recv() {
        match event {
            PipelineEvent::ShutdownInitiated { reason } => {
                assert_eq!(reason, ShutdownReason::DiscoveryDeadline);
                saw_shutdown = true;
            }
            PipelineEvent::WorkerExited {
                kind: WorkerKind::Video,
                exit,
            } => {
                assert_eq!(exit, WorkerExit::ForceTerminated);
                saw_forced_exit = true;
            }
            _ => {}
        }
    }
    assert!(saw_shutdown);
    assert!(saw_forced_exit);
}

#[tokio::test(start_paused = true)]
async fn test_repeat_runs_agree() {
    let build = || {
        let generator = Arc::new(
            ScriptedGenerator::with_default(ScriptedBehavior::succeed(millis(400), 65.0))
                .with_kind(WorkerKind::Music, ScriptedBehavior::fail(millis(100), "no tracks"))
                .with_unit(WorkUnitId(2), WorkerKind::History, ScriptedBehavior::Hang),
        );
        let evaluator = Arc::new(
            ScriptedEvaluator::new(EvaluatorScript::Prefer(vec![WorkerKind::History]))
                .with_unit(WorkUnitId(0), EvaluatorScript::Tie),
        );
        supervisor(common::default_pipeline(), generator, evaluator)
    };
    let waypoints = route(4);

    let first = build().run(&waypoints).await.unwrap();
    let second = build().run(&waypoints).await.unwrap();

    assert_eq!(selections(&first), selections(&second));
    assert_eq!(first.degradation, second.degradation);
    let methods = |r: &tour_guide::RunReport| {
        r.decisions.iter().map(|d| d.method).collect::<Vec<_>>()
    };
    assert_eq!(methods(&first), methods(&second));
    assert_eq!(first.decisions[0].method, SelectionMethod::TieBreak);
    assert_eq!(first.decisions[2].method, SelectionMethod::SingleCandidate);
}

#[tokio::test(start_paused = true)]
async fn test_empty_route_is_vacuously_full() {
    let generator = Arc::new(ScriptedGenerator::new());
    let report = supervisor(
        common::default_pipeline(),
        Arc::clone(&generator),
        Arc::new(ScriptedEvaluator::new(EvaluatorScript::PickFirst)),
    )
    .run(&[])
    .await
    .unwrap();

    assert!(report.decisions.is_empty());
    assert!(report.results.is_empty());
    assert_eq!(report.degradation, DegradationLevel::Full);
    assert_eq!(report.success_ratio, 1.0);
    assert_eq!(generator.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_rejects_invalid_input() {
    let generator = Arc::new(ScriptedGenerator::new());
    let evaluator = Arc::new(ScriptedEvaluator::new(EvaluatorScript::PickFirst));
    let sup = supervisor(
        common::default_pipeline(),
        Arc::clone(&generator),
        evaluator,
    );

    let err = sup.run(&route(11)).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::TooManyWaypoints { count: 11, max: 10 }
    ));

    let mut waypoints = route(3);
    waypoints[1] = Waypoint::new(
        "Nowhere",
        Coordinates::new(95.0, 35.0),
        WaypointCategory::Natural,
        "",
    );
    let err = sup.run(&waypoints).await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidWaypoint { index: 1, .. }));
    assert_eq!(generator.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_crashing_generator_does_not_lose_units() {
    let generator = Arc::new(
        ScriptedGenerator::with_default(ScriptedBehavior::succeed(millis(200), 70.0))
            .with_kind(WorkerKind::History, ScriptedBehavior::Panic),
    );
    let evaluator = Arc::new(ScriptedEvaluator::new(EvaluatorScript::PickFirst));

    let report = supervisor(common::default_pipeline(), generator, evaluator)
        .run(&route(3))
        .await
        .unwrap();

    assert_eq!(report.decisions.len(), 3);
    for unit in 0..3 {
        let history = report.result(WorkUnitId(unit), WorkerKind::History).unwrap();
        assert_eq!(history.status, GenerationStatus::Failure);
    }
    assert!(report.worker_exits[&WorkerKind::History].is_clean());
    assert_eq!(selections(&report), vec![Some(WorkerKind::Video); 3]);
}
