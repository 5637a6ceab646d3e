//! Run Controller tests: the phase state machine end to end.

use pharmq_core::{
    config::SimConfig,
    controller::{RunController, RunPhase},
    error::{ErrorKind, SimError},
    event::SimEvent,
    model::{Provenance, RequestStatus},
    policy::SchedulingPolicy,
    store::RequestStore,
};
use std::sync::mpsc::Receiver;

fn hundred_request_config() -> SimConfig {
    let mut config = SimConfig::default_test();
    config.workload.min_requests = 100;
    config.workload.max_requests = 100;
    config
}

fn drain(rx: &Receiver<SimEvent>) -> Vec<SimEvent> {
    rx.try_iter().collect()
}

#[test]
fn full_run_walks_every_phase() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut controller = RunController::build_test_with(hundred_request_config(), 42).unwrap();
    assert_eq!(controller.phase(), RunPhase::Idle);

    let report = controller.prepare().unwrap();
    assert_eq!(report.total, 100);
    assert_eq!(controller.phase(), RunPhase::Prepared);
    assert!(controller.phase().is_simulation_mode());
    assert!(controller.state().run_id.is_some());

    let first = controller.start().unwrap();
    assert_eq!(controller.phase(), RunPhase::Pause30);
    assert_eq!(first.outcome.processed_count, 30);
    assert_eq!(first.metric.phase, "PHASE_1");
    assert_eq!(first.metric.policy, SchedulingPolicy::Fifo);
    assert!(first.recommendation.is_some());
    assert_eq!(controller.metrics().len(), 1);

    let second = controller
        .continue_to_next(Some(SchedulingPolicy::Priority))
        .unwrap();
    assert_eq!(controller.phase(), RunPhase::Pause70);
    assert_eq!(second.outcome.processed_count, 70);
    assert_eq!(controller.state().policy, SchedulingPolicy::Priority);
    let phases: Vec<(&str, SchedulingPolicy)> = controller
        .metrics()
        .iter()
        .map(|m| (m.phase.as_str(), m.policy))
        .collect();
    assert_eq!(
        phases,
        vec![("PHASE_1", SchedulingPolicy::Fifo), ("PHASE_2", SchedulingPolicy::Priority)]
    );

    let third = controller
        .continue_to_next(Some(SchedulingPolicy::Multilevel))
        .unwrap();
    assert_eq!(controller.phase(), RunPhase::Completed);
    assert!(third.recommendation.is_none());
    assert!(controller.recommendation().is_none());

    let state = controller.state();
    assert_eq!(state.processed_count, 100);
    assert!(state.completed_count <= 100);
    assert_eq!(state.metrics.len(), 3);
    assert_eq!(state.metrics[2].policy, SchedulingPolicy::Multilevel);
}

#[test]
fn continue_without_policy_keeps_current_one() {
    let mut controller = RunController::build_test(5).unwrap();
    controller
        .select_initial_policy(SchedulingPolicy::MultilevelFeedback)
        .unwrap();
    controller.prepare().unwrap();
    controller.start().unwrap();
    controller.continue_to_next(None).unwrap();

    assert!(controller
        .metrics()
        .iter()
        .all(|m| m.policy == SchedulingPolicy::MultilevelFeedback));
}

#[test]
fn out_of_order_operations_are_state_errors() {
    let mut controller = RunController::build_test(1).unwrap();

    let err = controller.start().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);
    assert!(matches!(
        err,
        SimError::InvalidTransition { phase: RunPhase::Idle, .. }
    ));
    assert_eq!(controller.continue_to_next(None).unwrap_err().kind(), ErrorKind::State);

    controller.prepare().unwrap();
    assert_eq!(controller.prepare().unwrap_err().kind(), ErrorKind::State);
    assert_eq!(controller.continue_to_next(None).unwrap_err().kind(), ErrorKind::State);

    controller.start().unwrap();
    assert_eq!(controller.start().unwrap_err().kind(), ErrorKind::State);
    assert_eq!(
        controller
            .select_initial_policy(SchedulingPolicy::Priority)
            .unwrap_err()
            .kind(),
        ErrorKind::State
    );
    // Rejected calls leave the phase untouched.
    assert_eq!(controller.phase(), RunPhase::Pause30);
}

#[test]
fn completed_run_can_be_prepared_again() {
    let mut controller = RunController::build_test(8).unwrap();
    controller.prepare().unwrap();
    controller.start().unwrap();
    controller.continue_to_next(None).unwrap();
    controller.continue_to_next(None).unwrap();
    let first_run = controller.state().run_id.clone();

    let report = controller.prepare().unwrap();
    assert_eq!(controller.phase(), RunPhase::Prepared);
    assert_eq!(report.deleted_prior, report.total);
    assert!(controller.metrics().is_empty());
    assert_ne!(controller.state().run_id, first_run);
    assert_eq!(controller.store().run_count().unwrap(), 2);
}

#[test]
fn failed_prepare_returns_to_idle() {
    let mut config = SimConfig::default_test();
    for sp in config.service_points.iter_mut() {
        sp.enabled = false;
    }
    let mut controller = RunController::build_test_with(config, 3).unwrap();

    let err = controller.prepare().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(controller.phase(), RunPhase::Idle);
    assert!(controller.state().run_id.is_none());
}

#[test]
fn failed_phase_leaves_pre_transition_phase_in_place() {
    let mut config = SimConfig::default_test();
    config.processing.target_service_point = Some("sp-99".into());
    let mut controller = RunController::build_test_with(config, 3).unwrap();
    controller.prepare().unwrap();

    let err = controller.start().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(controller.phase(), RunPhase::Prepared);
    assert!(controller.metrics().is_empty());
}

#[test]
fn cleanup_removes_population_and_returns_to_idle() {
    let mut controller = RunController::build_test(12).unwrap();
    let report = controller.prepare().unwrap();
    controller.start().unwrap();

    let deleted = controller.cleanup().unwrap();
    assert_eq!(deleted, report.total);
    assert_eq!(controller.phase(), RunPhase::Idle);
    assert!(!controller.phase().is_simulation_mode());
    assert!(controller.metrics().is_empty());
    assert_eq!(
        controller
            .store()
            .count_requests(Provenance::Synthetic, None)
            .unwrap(),
        0
    );

    // Cleanup from IDLE is allowed and deletes nothing.
    assert_eq!(controller.cleanup().unwrap(), 0);
}

#[test]
fn events_announce_each_transition() {
    let mut controller = RunController::build_test(21).unwrap();
    let rx = controller.subscribe();

    controller.prepare().unwrap();
    let events = drain(&rx);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0], SimEvent::SimulationModeChanged { active: true });
    assert!(matches!(events[1], SimEvent::RunPrepared { .. }));

    controller.start().unwrap();
    let events = drain(&rx);
    assert!(matches!(events[0], SimEvent::PhaseCompleted { ref phase, .. } if phase == "PHASE_1"));
    assert!(matches!(events[1], SimEvent::RecommendationIssued { .. }));

    controller
        .continue_to_next(Some(SchedulingPolicy::Priority))
        .unwrap();
    let events = drain(&rx);
    assert!(events.iter().any(|e| matches!(
        e,
        SimEvent::PolicySwitched {
            from: SchedulingPolicy::Fifo,
            to: SchedulingPolicy::Priority,
            ..
        }
    )));

    controller.continue_to_next(None).unwrap();
    let events = drain(&rx);
    assert!(matches!(events.last(), Some(SimEvent::RunCompleted { .. })));

    controller.cleanup().unwrap();
    let events = drain(&rx);
    assert!(matches!(events[0], SimEvent::RunReset { .. }));
    assert_eq!(events[1], SimEvent::SimulationModeChanged { active: false });
}

#[test]
fn events_are_persisted_to_the_run_log() {
    let mut controller = RunController::build_test(33).unwrap();
    controller.prepare().unwrap();
    controller.start().unwrap();
    let run_id = controller.state().run_id.clone().unwrap();

    let log = controller.store().events_for_run(&run_id).unwrap();
    let types: Vec<&str> = log.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(
        types,
        vec![
            "simulation_mode_changed",
            "run_prepared",
            "phase_completed",
            "recommendation_issued"
        ]
    );
    assert_eq!(log[2].step, 1);
    let payload: SimEvent = serde_json::from_str(&log[1].payload).unwrap();
    assert!(matches!(payload, SimEvent::RunPrepared { seed: 33, .. }));
}

#[test]
fn summary_reports_best_phase_and_turnaround() {
    let mut controller = RunController::build_test(44).unwrap();
    controller.prepare().unwrap();
    controller.start().unwrap();
    controller.continue_to_next(None).unwrap();
    controller.continue_to_next(None).unwrap();

    let summary = controller.summary().unwrap();
    assert_eq!(summary.phase, RunPhase::Completed);
    assert_eq!(summary.metrics.len(), 3);
    assert!(summary.best_phase.is_some());
    assert!(summary.avg_turnaround_minutes > 0.0);
    assert_eq!(
        summary.completed_count,
        controller
            .store()
            .count_requests(Provenance::Synthetic, Some(RequestStatus::Completed))
            .unwrap()
    );
}
