//! Per-policy strategy table.
//!
//! The processor's wait-time table and the analyzer's prediction
//! factors both come from here, keyed by policy, so the two can't
//! disagree about what a policy is good at.

use super::SchedulingPolicy;
use crate::model::CategoryRank;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicyProfile {
    pub policy: SchedulingPolicy,
    /// Base minutes from arrival to call, indexed by `CategoryRank`.
    base_wait: [u32; 5],
    /// Wait multiplier when the pool is dominated by urgent/elderly tickets.
    wait_factor_priority_heavy: f64,
    /// Wait multiplier otherwise.
    wait_factor_mixed: f64,
    throughput_factor: f64,
}

const FIFO: PolicyProfile = PolicyProfile {
    policy: SchedulingPolicy::Fifo,
    base_wait: [20, 20, 20, 20, 20],
    wait_factor_priority_heavy: 1.0,
    wait_factor_mixed: 1.0,
    throughput_factor: 1.0,
};

const PRIORITY: PolicyProfile = PolicyProfile {
    policy: SchedulingPolicy::Priority,
    base_wait: [5, 8, 18, 25, 25],
    wait_factor_priority_heavy: 0.6,
    wait_factor_mixed: 1.1,
    throughput_factor: 1.05,
};

const MULTILEVEL: PolicyProfile = PolicyProfile {
    policy: SchedulingPolicy::Multilevel,
    base_wait: [12, 12, 12, 12, 12],
    wait_factor_priority_heavy: 0.9,
    wait_factor_mixed: 0.9,
    throughput_factor: 1.15,
};

// Heuristic only: aging is approximated by a flatter spread than PRIORITY.
const MULTILEVEL_FEEDBACK: PolicyProfile = PolicyProfile {
    policy: SchedulingPolicy::MultilevelFeedback,
    base_wait: [6, 9, 14, 18, 18],
    wait_factor_priority_heavy: 0.8,
    wait_factor_mixed: 0.95,
    throughput_factor: 1.05,
};

impl SchedulingPolicy {
    pub fn profile(&self) -> &'static PolicyProfile {
        match self {
            Self::Fifo => &FIFO,
            Self::Priority => &PRIORITY,
            Self::Multilevel => &MULTILEVEL,
            Self::MultilevelFeedback => &MULTILEVEL_FEEDBACK,
        }
    }
}

impl PolicyProfile {
    /// Base minutes a request of `category` waits before being called.
    pub fn base_wait_minutes(&self, category: &str) -> u32 {
        self.base_wait[CategoryRank::of(category) as usize]
    }

    /// Relative average-wait multiplier for a pool whose urgent/elderly
    /// share is `priority_share`, against a FIFO baseline of 1.0.
    pub fn wait_factor(&self, priority_share: f64, share_threshold: f64) -> f64 {
        if priority_share > share_threshold {
            self.wait_factor_priority_heavy
        } else {
            self.wait_factor_mixed
        }
    }

    /// Relative throughput multiplier against a FIFO baseline of 1.0.
    pub fn throughput_factor(&self) -> f64 {
        self.throughput_factor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::category;

    #[test]
    fn priority_waits_shorter_for_urgent_than_general() {
        let p = SchedulingPolicy::Priority.profile();
        assert!(p.base_wait_minutes(category::URGENT) < p.base_wait_minutes(category::GENERAL));
        assert!(p.base_wait_minutes(category::ELDERLY) < p.base_wait_minutes(category::APPOINTMENT));
    }

    #[test]
    fn flat_policies_ignore_category() {
        for policy in [SchedulingPolicy::Fifo, SchedulingPolicy::Multilevel] {
            let p = policy.profile();
            assert_eq!(
                p.base_wait_minutes(category::URGENT),
                p.base_wait_minutes("PHARMACIST_CONSULT")
            );
        }
        assert!(
            SchedulingPolicy::Multilevel.profile().base_wait_minutes(category::GENERAL)
                < SchedulingPolicy::Fifo.profile().base_wait_minutes(category::GENERAL)
        );
    }

    #[test]
    fn priority_only_helps_priority_heavy_pools() {
        let p = SchedulingPolicy::Priority.profile();
        assert!(p.wait_factor(0.4, 0.3) < 1.0);
        assert!(p.wait_factor(0.2, 0.3) > 1.0);
    }

    #[test]
    fn every_policy_has_its_own_profile() {
        for policy in SchedulingPolicy::ALL {
            assert_eq!(policy.profile().policy, policy);
        }
    }
}
