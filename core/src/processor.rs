//! Progressive Processor: moves one synthetic run between checkpoints.
//!
//! advance(target%, previous%, policy):
//!   1. targetCount = floor(target% × N), delta = targetCount − previousCount,
//!      with N frozen at generation time (never re-counted from the store).
//!   2. Re-read the live WAITING pool and order it with the Policy Engine.
//!   3. Call the first min(delta, |pool|) requests: ACTIVE, with
//!      called = created + base wait (policy profile) + jitter.
//!   4. Complete the oldest ACTIVE requests (by called) until targetCount
//!      requests are COMPLETED overall; completed = called + service time.
//!   5. Recompute metrics over every COMPLETED synthetic request.
//!
//! A pool that runs dry early is accepted silently (logged, not retried).
//! Writes are not rolled back if a later update fails.

use crate::{
    config::ProcessingConfig,
    error::{SimError, SimResult},
    model::{Provenance, RequestStatus, ServicePoint, ServiceRequest},
    policy::{self, SchedulingPolicy, SelectionContext},
    rng::ComponentRng,
    store::{ReferenceSource, RequestPatch, RequestStore},
    types::{minutes_between, RequestId},
};
use chrono::Duration;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueMetrics {
    /// Mean (called − created) over all COMPLETED synthetic requests.
    pub avg_wait_minutes: f64,
    /// COMPLETED synthetic requests, cumulative.
    pub completed_count: usize,
    /// Requests completed during this advance.
    pub throughput: usize,
    /// Mean wait over the requests completed during this advance.
    pub interval_avg_wait_minutes: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvanceOutcome {
    /// Requests that have ever left WAITING, cumulative.
    pub processed_count: usize,
    /// COMPLETED requests, cumulative.
    pub completed_count: usize,
    /// WAITING requests left after this advance.
    pub remaining_count: usize,
    /// Requests called (WAITING → ACTIVE) by this advance, in selection order.
    pub selected: Vec<RequestId>,
    /// Requests completed (ACTIVE → COMPLETED) by this advance.
    pub newly_completed: Vec<RequestId>,
    /// How many selections the pool could not supply.
    pub shortfall: usize,
    pub metrics: QueueMetrics,
}

/// Mean wait in minutes over `requests` that have been called.
/// Zero for an empty slice.
pub fn average_wait_minutes(requests: &[ServiceRequest]) -> f64 {
    let waits: Vec<f64> = requests.iter().filter_map(ServiceRequest::wait_minutes).collect();
    if waits.is_empty() {
        return 0.0;
    }
    waits.iter().sum::<f64>() / waits.len() as f64
}

/// floor(percent / 100 × total), in integer arithmetic.
pub fn checkpoint_count(total: usize, percent: u8) -> usize {
    total * usize::from(percent) / 100
}

pub struct ProgressiveProcessor {
    config: ProcessingConfig,
    total: usize,
    service_point: Option<ServicePoint>,
}

impl ProgressiveProcessor {
    /// `total` is the population size frozen at generation time.
    pub fn new(config: ProcessingConfig, total: usize) -> Self {
        Self {
            config,
            total,
            service_point: None,
        }
    }

    /// Restrict selection to the categories `service_point` supports and
    /// route every called request to it.
    pub fn with_service_point(mut self, service_point: Option<ServicePoint>) -> Self {
        self.service_point = service_point;
        self
    }

    pub fn advance<S: RequestStore + ReferenceSource>(
        &self,
        store: &S,
        target_percent: u8,
        previous_percent: u8,
        policy: SchedulingPolicy,
        rng: &mut ComponentRng,
    ) -> SimResult<AdvanceOutcome> {
        if target_percent > 100 || previous_percent > target_percent {
            return Err(SimError::Validation(format!(
                "cannot advance from {previous_percent}% to {target_percent}%"
            )));
        }
        let target_count = checkpoint_count(self.total, target_percent);
        let previous_count = checkpoint_count(self.total, previous_percent);
        let delta = target_count - previous_count;

        // 2–3. Select from the live pool and call.
        let waiting = store.select_requests(Provenance::Synthetic, Some(RequestStatus::Waiting))?;
        let types = store.queue_types()?;
        let ctx = SelectionContext::new(&types)
            .with_service_point(self.service_point.as_ref())
            .with_aging(self.config.aging_per_minute);
        let ordered = policy::order_with(&waiting, &ctx, policy);

        let take = delta.min(ordered.len());
        let shortfall = delta - take;
        if shortfall > 0 {
            log::warn!(
                "{policy}: pool supplied {take} of {delta} selections for {previous_percent}%→{target_percent}%"
            );
        }

        let profile = policy.profile();
        let mut selected = Vec::with_capacity(take);
        for request in ordered.into_iter().take(take) {
            let wait = profile.base_wait_minutes(&request.category)
                + rng.range_inclusive(0, u64::from(self.config.jitter_max_minutes)) as u32;
            let called_at = request.created_at + Duration::minutes(i64::from(wait));
            let patch = RequestPatch {
                status: Some(RequestStatus::Active),
                called_at: Some(called_at),
                service_point_id: self.service_point.as_ref().map(|sp| sp.id.clone()),
                ..RequestPatch::default()
            };
            store.update_request(&request.id, &patch)?;
            selected.push(request.id);
        }

        // 4. Complete the oldest calls until target_count are done overall.
        let already_completed =
            store.count_requests(Provenance::Synthetic, Some(RequestStatus::Completed))?;
        let need = target_count.saturating_sub(already_completed);
        let mut active = store.select_requests(Provenance::Synthetic, Some(RequestStatus::Active))?;
        active.sort_by_key(|r| (r.called_at, r.created_at));

        let mut newly_completed = Vec::with_capacity(need.min(active.len()));
        for request in active.into_iter().take(need) {
            let Some(called_at) = request.called_at else {
                return Err(SimError::UnexpectedShape(format!(
                    "ACTIVE request {} has no called_at",
                    request.id
                )));
            };
            let service = rng.range_inclusive(
                u64::from(self.config.service_minutes_min),
                u64::from(self.config.service_minutes_max),
            );
            let patch = RequestPatch {
                status: Some(RequestStatus::Completed),
                completed_at: Some(called_at + Duration::minutes(service as i64)),
                ..RequestPatch::default()
            };
            store.update_request(&request.id, &patch)?;
            newly_completed.push(request.id);
        }

        // 5. Metrics.
        let completed = store.select_requests(Provenance::Synthetic, Some(RequestStatus::Completed))?;
        let interval: Vec<ServiceRequest> = completed
            .iter()
            .filter(|r| newly_completed.contains(&r.id))
            .cloned()
            .collect();
        let metrics = QueueMetrics {
            avg_wait_minutes: average_wait_minutes(&completed),
            completed_count: completed.len(),
            throughput: interval.len(),
            interval_avg_wait_minutes: average_wait_minutes(&interval),
        };

        let remaining_count =
            store.count_requests(Provenance::Synthetic, Some(RequestStatus::Waiting))?;
        let synthetic_total = store.count_requests(Provenance::Synthetic, None)?;
        let outcome = AdvanceOutcome {
            processed_count: synthetic_total - remaining_count,
            completed_count: completed.len(),
            remaining_count,
            selected,
            newly_completed,
            shortfall,
            metrics,
        };
        log::debug!(
            "{policy} {previous_percent}%→{target_percent}%: called {} completed {} (avg wait {:.1} min)",
            outcome.selected.len(),
            outcome.newly_completed.len(),
            metrics.avg_wait_minutes
        );
        Ok(outcome)
    }
}

/// Minutes from arrival to completion, for reporting.
pub fn turnaround_minutes(request: &ServiceRequest) -> Option<f64> {
    request
        .completed_at
        .map(|done| minutes_between(request.created_at, done))
}
