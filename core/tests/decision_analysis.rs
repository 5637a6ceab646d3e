//! Decision Analyzer tests: predictions, recommendations and confidence.

use chrono::NaiveDate;
use pharmq_core::{
    analyzer::{score, Confidence, DecisionAnalyzer, PerformanceSample, PoolSnapshot},
    config::AnalysisConfig,
    model::{category, Provenance, RequestStatus, ServiceRequest},
    policy::SchedulingPolicy,
};

/// WAITING pool with `priority` urgent/elderly tickets out of `total`,
/// all routed to `service_point`.
fn pool(total: usize, priority: usize, service_point: &str) -> Vec<ServiceRequest> {
    let opened = NaiveDate::from_ymd_opt(2026, 3, 2)
        .unwrap()
        .and_hms_opt(8, 0, 0)
        .unwrap();
    (0..total)
        .map(|i| ServiceRequest {
            id: format!("r{i}"),
            sequence: i as u32 + 1,
            category: match i {
                i if i < priority && i % 2 == 0 => category::URGENT.into(),
                i if i < priority => category::ELDERLY.into(),
                _ => category::GENERAL.into(),
            },
            status: RequestStatus::Waiting,
            created_at: opened + chrono::Duration::minutes(i as i64),
            called_at: None,
            completed_at: None,
            skipped_at: None,
            service_point_id: Some(service_point.to_string()),
            provenance: Provenance::Synthetic,
        })
        .collect()
}

fn observed(avg_wait_minutes: f64, throughput: f64) -> PerformanceSample {
    PerformanceSample {
        avg_wait_minutes,
        throughput,
    }
}

#[test]
fn score_formula() {
    // 0.4·(100−25) + 0.3·2 + 0.3·(2/25·10)
    assert!((score(25.0, 2.0) - 30.84).abs() < 1e-9);
    // Wait below one minute is clamped in the efficiency term.
    assert!((score(0.5, 1.0) - (0.4 * 99.5 + 0.3 + 0.3 * 10.0)).abs() < 1e-9);
}

#[test]
fn heavy_priority_load_under_fifo_recommends_priority_with_high_confidence() {
    let analyzer = DecisionAnalyzer::new(AnalysisConfig::default());
    let snapshot = analyzer.snapshot(&pool(10, 4, "sp-01"));
    assert!((snapshot.priority_share() - 0.4).abs() < 1e-9);

    let rec = analyzer.recommend(SchedulingPolicy::Fifo, observed(25.0, 2.0), &snapshot);

    assert_eq!(rec.current_policy, SchedulingPolicy::Fifo);
    assert_eq!(rec.recommended_policy, SchedulingPolicy::Priority);
    assert_eq!(rec.confidence, Confidence::High);
    assert!(rec.is_switch());
    assert!((rec.score_gap - 4.21).abs() < 0.01, "gap {}", rec.score_gap);
    assert!(rec.reason.contains("PRIORITY"), "reason: {}", rec.reason);
}

#[test]
fn comparison_covers_every_policy_in_order() {
    let analyzer = DecisionAnalyzer::new(AnalysisConfig::default());
    let snapshot = analyzer.snapshot(&pool(10, 4, "sp-01"));
    let rec = analyzer.recommend(SchedulingPolicy::Fifo, observed(25.0, 2.0), &snapshot);

    let policies: Vec<SchedulingPolicy> = rec.comparison.iter().map(|s| s.policy).collect();
    assert_eq!(policies, SchedulingPolicy::ALL.to_vec());

    let priority = &rec.comparison[1];
    assert!((priority.predicted_wait_minutes - 15.0).abs() < 1e-9);
    assert!((priority.predicted_throughput - 2.1).abs() < 1e-9);
    // The current policy predicts exactly what was observed.
    assert!((rec.comparison[0].predicted_wait_minutes - 25.0).abs() < 1e-9);
}

#[test]
fn recommendation_is_idempotent() {
    let analyzer = DecisionAnalyzer::new(AnalysisConfig::default());
    let snapshot = analyzer.snapshot(&pool(30, 9, "sp-02"));
    for policy in SchedulingPolicy::ALL {
        let a = analyzer.recommend(policy, observed(18.0, 7.0), &snapshot);
        let b = analyzer.recommend(policy, observed(18.0, 7.0), &snapshot);
        assert_eq!(a, b, "{policy}");
    }
}

#[test]
fn best_current_policy_is_kept() {
    let analyzer = DecisionAnalyzer::new(AnalysisConfig::default());
    let snapshot = analyzer.snapshot(&pool(10, 4, "sp-01"));

    let rec = analyzer.recommend(SchedulingPolicy::Priority, observed(25.0, 2.0), &snapshot);

    assert_eq!(rec.recommended_policy, SchedulingPolicy::Priority);
    assert!(!rec.is_switch());
    assert!(rec.score_gap < 0.0);
    assert_eq!(rec.confidence, Confidence::High);
}

#[test]
fn small_gain_switches_with_low_confidence() {
    let analyzer = DecisionAnalyzer::new(AnalysisConfig::default());
    // 10% priority share: mixed pool, MULTILEVEL predicted best.
    let snapshot = analyzer.snapshot(&pool(10, 1, "sp-01"));

    let rec = analyzer.recommend(SchedulingPolicy::Fifo, observed(25.0, 2.0), &snapshot);

    assert_eq!(rec.recommended_policy, SchedulingPolicy::Multilevel);
    assert!(rec.score_gap > 1.0 && rec.score_gap < 1.5, "gap {}", rec.score_gap);
    assert_eq!(rec.confidence, Confidence::Low);
}

#[test]
fn gain_within_significance_margin_keeps_current_policy() {
    let analyzer = DecisionAnalyzer::new(AnalysisConfig {
        significance_margin: 2.0,
        ..AnalysisConfig::default()
    });
    let snapshot = analyzer.snapshot(&pool(10, 1, "sp-01"));

    let rec = analyzer.recommend(SchedulingPolicy::Fifo, observed(25.0, 2.0), &snapshot);

    assert_eq!(rec.recommended_policy, SchedulingPolicy::Fifo);
    assert!(rec.score_gap > 0.0);
    assert_eq!(rec.confidence, Confidence::Low);
}

#[test]
fn bottleneck_requires_more_than_threshold_waiting() {
    let mut waiting = pool(21, 0, "sp-02");
    waiting.extend(pool(20, 0, "sp-03").into_iter().map(|mut r| {
        r.id = format!("b-{}", r.id);
        r
    }));

    let snapshot = PoolSnapshot::from_requests(&waiting, 20);
    assert_eq!(snapshot.total_waiting, 41);
    assert_eq!(snapshot.by_service_point.get("sp-02"), Some(&21));
    assert_eq!(snapshot.bottlenecks, vec!["sp-02".to_string()]);

    let analyzer = DecisionAnalyzer::new(AnalysisConfig::default());
    let rec = analyzer.recommend(
        SchedulingPolicy::Fifo,
        observed(25.0, 2.0),
        &analyzer.snapshot(&waiting),
    );
    assert!(rec.reason.contains("sp-02"), "reason: {}", rec.reason);
}

#[test]
fn empty_pool_has_zero_priority_share() {
    let snapshot = PoolSnapshot::from_requests(&[], 20);
    assert_eq!(snapshot.total_waiting, 0);
    assert_eq!(snapshot.priority_share(), 0.0);
    assert!(snapshot.bottlenecks.is_empty());
}
