//! Decision Analyzer: should the run switch policy at this checkpoint?
//!
//! For every policy the analyzer predicts avg wait and throughput by
//! scaling the current metrics with the strategy-table factors
//! (alt_factor / current_factor), scores all candidates with
//!
//!   score = 0.4·(100 − wait) + 0.3·throughput + 0.3·efficiency
//!   efficiency = throughput / max(wait, 1) · 10
//!
//! and recommends the best alternative only if it beats the current
//! policy by the significance margin. Stateless: same inputs, same answer.

use crate::{
    config::AnalysisConfig,
    model::{CategoryRank, ServiceRequest},
    policy::SchedulingPolicy,
    processor::QueueMetrics,
    types::{CategoryCode, ServicePointId},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Composition of the WAITING pool at a checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub total_waiting: usize,
    pub by_category: BTreeMap<CategoryCode, usize>,
    pub by_service_point: BTreeMap<ServicePointId, usize>,
    /// Service points whose WAITING count exceeds the bottleneck threshold.
    pub bottlenecks: Vec<ServicePointId>,
}

impl PoolSnapshot {
    pub fn from_requests(waiting: &[ServiceRequest], bottleneck_threshold: usize) -> Self {
        let mut by_category = BTreeMap::new();
        let mut by_service_point = BTreeMap::new();
        for r in waiting {
            *by_category.entry(r.category.clone()).or_insert(0) += 1;
            if let Some(sp) = &r.service_point_id {
                *by_service_point.entry(sp.clone()).or_insert(0) += 1;
            }
        }
        let bottlenecks = by_service_point
            .iter()
            .filter(|(_, n)| **n > bottleneck_threshold)
            .map(|(sp, _)| sp.clone())
            .collect();
        Self {
            total_waiting: waiting.len(),
            by_category,
            by_service_point,
            bottlenecks,
        }
    }

    /// Fraction of waiting requests that are urgent or elderly.
    pub fn priority_share(&self) -> f64 {
        if self.total_waiting == 0 {
            return 0.0;
        }
        let priority: usize = self
            .by_category
            .iter()
            .filter(|(code, _)| CategoryRank::of(code).is_priority_class())
            .map(|(_, n)| *n)
            .sum();
        priority as f64 / self.total_waiting as f64
    }
}

/// The observed performance a recommendation is based on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub avg_wait_minutes: f64,
    pub throughput: f64,
}

impl From<&QueueMetrics> for PerformanceSample {
    fn from(m: &QueueMetrics) -> Self {
        Self {
            avg_wait_minutes: m.avg_wait_minutes,
            throughput: m.throughput as f64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyScore {
    pub policy: SchedulingPolicy,
    pub predicted_wait_minutes: f64,
    pub predicted_throughput: f64,
    pub efficiency: f64,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub current_policy: SchedulingPolicy,
    pub recommended_policy: SchedulingPolicy,
    pub reason: String,
    pub confidence: Confidence,
    /// Best alternative's score minus the current policy's score.
    pub score_gap: f64,
    /// Every candidate, current policy included, in `SchedulingPolicy::ALL` order.
    pub comparison: Vec<PolicyScore>,
}

impl Recommendation {
    pub fn is_switch(&self) -> bool {
        self.recommended_policy != self.current_policy
    }
}

pub fn efficiency(avg_wait_minutes: f64, throughput: f64) -> f64 {
    throughput / avg_wait_minutes.max(1.0) * 10.0
}

pub fn score(avg_wait_minutes: f64, throughput: f64) -> f64 {
    0.4 * (100.0 - avg_wait_minutes)
        + 0.3 * throughput
        + 0.3 * efficiency(avg_wait_minutes, throughput)
}

pub struct DecisionAnalyzer {
    config: AnalysisConfig,
}

impl DecisionAnalyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn snapshot(&self, waiting: &[ServiceRequest]) -> PoolSnapshot {
        PoolSnapshot::from_requests(waiting, self.config.bottleneck_threshold)
    }

    /// Predicted performance of `candidate` given what `current` achieved.
    pub fn predict(
        &self,
        current: SchedulingPolicy,
        observed: PerformanceSample,
        snapshot: &PoolSnapshot,
        candidate: SchedulingPolicy,
    ) -> PolicyScore {
        let share = snapshot.priority_share();
        let threshold = self.config.priority_share_threshold;
        let (cur, alt) = (current.profile(), candidate.profile());

        let wait = observed.avg_wait_minutes * alt.wait_factor(share, threshold)
            / cur.wait_factor(share, threshold);
        let throughput = observed.throughput * alt.throughput_factor() / cur.throughput_factor();
        PolicyScore {
            policy: candidate,
            predicted_wait_minutes: wait,
            predicted_throughput: throughput,
            efficiency: efficiency(wait, throughput),
            score: score(wait, throughput),
        }
    }

    pub fn recommend(
        &self,
        current: SchedulingPolicy,
        observed: PerformanceSample,
        snapshot: &PoolSnapshot,
    ) -> Recommendation {
        let comparison: Vec<PolicyScore> = SchedulingPolicy::ALL
            .iter()
            .map(|p| self.predict(current, observed, snapshot, *p))
            .collect();
        let current_score = comparison
            .iter()
            .find(|s| s.policy == current)
            .map_or(score(observed.avg_wait_minutes, observed.throughput), |s| s.score);

        // Strict `>` keeps the earliest policy on ties.
        let mut best: Option<&PolicyScore> = None;
        for candidate in comparison.iter().filter(|s| s.policy != current) {
            if best.map_or(true, |b| candidate.score > b.score) {
                best = Some(candidate);
            }
        }
        let Some(best) = best.cloned() else {
            return self.stay(current, 0.0, comparison, snapshot);
        };
        let gap = best.score - current_score;

        if gap > self.config.significance_margin {
            let confidence = self.band(gap);
            let reason = format!(
                "{} scores {:.1} vs {:.1} for {current} (predicted wait {:.1} min, throughput {:.1}; urgent/elderly share {:.0}%){}",
                best.policy,
                best.score,
                current_score,
                best.predicted_wait_minutes,
                best.predicted_throughput,
                snapshot.priority_share() * 100.0,
                bottleneck_note(snapshot),
            );
            log::info!("recommend switch {current} → {} ({confidence:?}, gap {gap:.2})", best.policy);
            return Recommendation {
                current_policy: current,
                recommended_policy: best.policy,
                reason,
                confidence,
                score_gap: gap,
                comparison,
            };
        }
        self.stay(current, gap, comparison, snapshot)
    }

    fn stay(
        &self,
        current: SchedulingPolicy,
        gap: f64,
        comparison: Vec<PolicyScore>,
        snapshot: &PoolSnapshot,
    ) -> Recommendation {
        // Current policy is best by a clear margin → confident; a small
        // positive gap below the margin → low confidence.
        let confidence = if gap <= 0.0 { self.band(-gap) } else { Confidence::Low };
        let reason = if gap <= 0.0 {
            format!("{current} already scores best{}", bottleneck_note(snapshot))
        } else {
            format!(
                "no alternative beats {current} by more than {:.1} points (best gain {gap:.2}){}",
                self.config.significance_margin,
                bottleneck_note(snapshot)
            )
        };
        log::info!("recommend keeping {current} ({confidence:?})");
        Recommendation {
            current_policy: current,
            recommended_policy: current,
            reason,
            confidence,
            score_gap: gap,
            comparison,
        }
    }

    fn band(&self, gap: f64) -> Confidence {
        if gap >= self.config.high_confidence_gap {
            Confidence::High
        } else if gap >= self.config.medium_confidence_gap {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

fn bottleneck_note(snapshot: &PoolSnapshot) -> String {
    if snapshot.bottlenecks.is_empty() {
        String::new()
    } else {
        format!("; bottleneck at {}", snapshot.bottlenecks.join(", "))
    }
}
