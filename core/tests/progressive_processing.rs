//! Progressive Processor tests: checkpoint advances over a live pool.

use pharmq_core::{
    config::SimConfig,
    error::ErrorKind,
    generator::WorkloadGenerator,
    model::{CategoryRank, Provenance, RequestStatus, ServiceRequest},
    policy::SchedulingPolicy,
    processor::{average_wait_minutes, checkpoint_count, ProgressiveProcessor},
    rng::{ComponentSlot, RngBank, ComponentRng},
    store::{ReferenceSource, RequestStore, SimStore},
};

/// Store holding exactly `n` WAITING synthetic requests.
fn pool_of(n: u32, seed: u64) -> (SimConfig, SimStore) {
    let mut config = SimConfig::default_test();
    config.workload.min_requests = n;
    config.workload.max_requests = n;
    let store = SimStore::in_memory().unwrap();
    store.migrate().unwrap();
    store.seed_reference_data(&config).unwrap();
    WorkloadGenerator::new(
        config.workload.clone(),
        RngBank::new(seed).for_component(ComponentSlot::Generator),
    )
    .generate(&store)
    .unwrap();
    (config, store)
}

fn step_rng(seed: u64, step: u64) -> ComponentRng {
    RngBank::new(seed).for_component_at_step(ComponentSlot::Processor, step)
}

fn waiting(store: &SimStore) -> Vec<ServiceRequest> {
    store
        .select_requests(Provenance::Synthetic, Some(RequestStatus::Waiting))
        .unwrap()
}

#[test]
fn checkpoint_count_floors() {
    assert_eq!(checkpoint_count(100, 30), 30);
    assert_eq!(checkpoint_count(101, 30), 30);
    assert_eq!(checkpoint_count(87, 70), 60);
    assert_eq!(checkpoint_count(87, 100), 87);
    assert_eq!(checkpoint_count(0, 70), 0);
}

#[test]
fn first_leg_under_fifo_calls_the_earliest_arrivals() {
    let _ = env_logger::builder().is_test(true).try_init();
    let (config, store) = pool_of(100, 42);
    let earliest: Vec<String> = waiting(&store).into_iter().take(30).map(|r| r.id).collect();

    let processor = ProgressiveProcessor::new(config.processing.clone(), 100);
    let outcome = processor
        .advance(&store, 30, 0, SchedulingPolicy::Fifo, &mut step_rng(42, 1))
        .unwrap();

    assert_eq!(outcome.processed_count, 30);
    assert_eq!(outcome.selected, earliest);
    assert_eq!(outcome.shortfall, 0);
    assert_eq!(outcome.remaining_count, 70);
    assert!(outcome.completed_count <= outcome.processed_count);
}

#[test]
fn second_leg_under_priority_favors_urgent_and_elderly() {
    let (config, store) = pool_of(100, 42);
    let processor = ProgressiveProcessor::new(config.processing.clone(), 100);
    processor
        .advance(&store, 30, 0, SchedulingPolicy::Fifo, &mut step_rng(42, 1))
        .unwrap();

    let pool = waiting(&store);
    assert_eq!(pool.len(), 70);
    let priority_waiting: Vec<String> = pool
        .iter()
        .filter(|r| CategoryRank::of(&r.category).is_priority_class())
        .map(|r| r.id.clone())
        .collect();

    let outcome = processor
        .advance(&store, 70, 30, SchedulingPolicy::Priority, &mut step_rng(42, 2))
        .unwrap();
    assert_eq!(outcome.selected.len(), 40);
    assert_eq!(outcome.processed_count, 70);

    // Every urgent/elderly ticket is called before any other category.
    let expected_priority = priority_waiting.len().min(40);
    assert!(
        outcome.selected[..expected_priority]
            .iter()
            .all(|id| priority_waiting.contains(id)),
        "priority-class tickets must lead the selection"
    );
    if priority_waiting.len() <= 40 {
        for id in &priority_waiting {
            assert!(outcome.selected.contains(id), "{id} should have been called");
        }
    }
}

#[test]
fn full_run_processes_every_request() {
    let (config, store) = pool_of(100, 7);
    let processor = ProgressiveProcessor::new(config.processing.clone(), 100);

    let legs = [
        (30, 0, SchedulingPolicy::Fifo),
        (70, 30, SchedulingPolicy::Priority),
        (100, 70, SchedulingPolicy::Multilevel),
    ];
    let mut last = None;
    for (step, (target, previous, policy)) in legs.into_iter().enumerate() {
        let outcome = processor
            .advance(&store, target, previous, policy, &mut step_rng(7, step as u64 + 1))
            .unwrap();
        assert_eq!(outcome.processed_count, checkpoint_count(100, target));
        assert!(outcome.completed_count <= outcome.processed_count);
        last = Some(outcome);
    }

    let last = last.unwrap();
    assert_eq!(last.processed_count, 100);
    assert_eq!(last.completed_count, 100);
    assert_eq!(last.remaining_count, 0);

    for r in store.select_requests(Provenance::Synthetic, None).unwrap() {
        assert_eq!(r.status, RequestStatus::Completed);
        assert!(r.is_consistent(), "{} has inconsistent timestamps", r.id);
        assert!(r.called_at.unwrap() >= r.created_at);
        assert!(r.completed_at.unwrap() >= r.called_at.unwrap());
    }
}

#[test]
fn processed_count_is_exact_for_odd_population() {
    let (config, store) = pool_of(87, 13);
    let processor = ProgressiveProcessor::new(config.processing.clone(), 87);

    let first = processor
        .advance(&store, 30, 0, SchedulingPolicy::MultilevelFeedback, &mut step_rng(13, 1))
        .unwrap();
    assert_eq!(first.processed_count, 26);

    let second = processor
        .advance(&store, 70, 30, SchedulingPolicy::MultilevelFeedback, &mut step_rng(13, 2))
        .unwrap();
    assert_eq!(second.processed_count, 60);
    assert_eq!(second.selected.len(), 34);
}

#[test]
fn average_wait_is_the_mean_over_completed_requests() {
    let (config, store) = pool_of(100, 21);
    let processor = ProgressiveProcessor::new(config.processing.clone(), 100);
    let outcome = processor
        .advance(&store, 30, 0, SchedulingPolicy::Priority, &mut step_rng(21, 1))
        .unwrap();

    let completed = store
        .select_requests(Provenance::Synthetic, Some(RequestStatus::Completed))
        .unwrap();
    assert_eq!(completed.len(), outcome.metrics.completed_count);
    let mean = completed.iter().filter_map(|r| r.wait_minutes()).sum::<f64>() / completed.len() as f64;
    assert!((outcome.metrics.avg_wait_minutes - mean).abs() < 1e-9);
    assert!((average_wait_minutes(&completed) - mean).abs() < 1e-9);
    assert_eq!(outcome.metrics.throughput, outcome.newly_completed.len());
}

#[test]
fn average_wait_of_empty_set_is_zero() {
    assert_eq!(average_wait_minutes(&[]), 0.0);
}

#[test]
fn calls_apply_policy_base_wait_plus_bounded_jitter() {
    let (mut config, store) = pool_of(100, 5);
    config.processing.jitter_max_minutes = 0;
    let processor = ProgressiveProcessor::new(config.processing.clone(), 100);
    processor
        .advance(&store, 30, 0, SchedulingPolicy::Fifo, &mut step_rng(5, 1))
        .unwrap();

    let called: Vec<ServiceRequest> = store
        .select_requests(Provenance::Synthetic, None)
        .unwrap()
        .into_iter()
        .filter(|r| r.status != RequestStatus::Waiting)
        .collect();
    assert_eq!(called.len(), 30);
    for r in called {
        assert_eq!(r.wait_minutes(), Some(20.0), "FIFO waits are flat without jitter");
    }
}

#[test]
fn capability_filter_leaves_unsupported_requests_waiting() {
    let (config, store) = pool_of(100, 17);
    let counter = store
        .service_points()
        .unwrap()
        .into_iter()
        .find(|sp| sp.id == "sp-03")
        .unwrap();
    let supported = waiting(&store)
        .iter()
        .filter(|r| counter.supports(&r.category))
        .count();

    let processor =
        ProgressiveProcessor::new(config.processing.clone(), 100).with_service_point(Some(counter));
    let outcome = processor
        .advance(&store, 100, 0, SchedulingPolicy::Fifo, &mut step_rng(17, 1))
        .unwrap();

    assert_eq!(outcome.selected.len(), supported);
    assert_eq!(outcome.shortfall, 100 - supported);
    for r in waiting(&store) {
        assert!(!CategoryRank::of(&r.category).is_priority_class(), "{} left waiting", r.id);
    }
    for r in store
        .select_requests(Provenance::Synthetic, Some(RequestStatus::Completed))
        .unwrap()
    {
        assert_eq!(r.service_point_id.as_deref(), Some("sp-03"));
    }
}

#[test]
fn exhausted_pool_is_accepted_with_a_shortfall() {
    let (config, store) = pool_of(80, 3);
    // Processor believes the population is larger than it is.
    let processor = ProgressiveProcessor::new(config.processing.clone(), 120);

    let outcome = processor
        .advance(&store, 100, 0, SchedulingPolicy::Fifo, &mut step_rng(3, 1))
        .unwrap();
    assert_eq!(outcome.selected.len(), 80);
    assert_eq!(outcome.shortfall, 40);
    assert_eq!(outcome.remaining_count, 0);
}

#[test]
fn backwards_or_overflowing_advance_is_rejected() {
    let (config, store) = pool_of(80, 3);
    let processor = ProgressiveProcessor::new(config.processing.clone(), 80);

    let err = processor
        .advance(&store, 30, 70, SchedulingPolicy::Fifo, &mut step_rng(3, 1))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = processor
        .advance(&store, 130, 70, SchedulingPolicy::Fifo, &mut step_rng(3, 1))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(waiting(&store).len(), 80);
}
