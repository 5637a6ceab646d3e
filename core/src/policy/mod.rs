//! Policy Engine: orders a pool of WAITING requests.
//!
//! Pure and deterministic: no I/O, no clock, no randomness.
//! Each policy lives in its own module; `profile` holds the
//! per-policy strategy table shared with the processor and analyzer.

mod feedback;
mod fifo;
mod multilevel;
mod priority;
pub mod profile;

pub use profile::PolicyProfile;

use crate::{
    model::{CategoryRank, RequestStatus, ServicePoint, ServiceRequest, TypeConfig},
    types::Timestamp,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Priority points gained per minute of waiting under MULTILEVEL_FEEDBACK
/// when the caller does not configure a rate.
pub const DEFAULT_AGING_PER_MINUTE: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SchedulingPolicy {
    Fifo,
    Priority,
    Multilevel,
    MultilevelFeedback,
}

impl SchedulingPolicy {
    pub const ALL: [SchedulingPolicy; 4] = [
        Self::Fifo,
        Self::Priority,
        Self::Multilevel,
        Self::MultilevelFeedback,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fifo => "FIFO",
            Self::Priority => "PRIORITY",
            Self::Multilevel => "MULTILEVEL",
            Self::MultilevelFeedback => "MULTILEVEL_FEEDBACK",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "FIFO" => Some(Self::Fifo),
            "PRIORITY" => Some(Self::Priority),
            "MULTILEVEL" => Some(Self::Multilevel),
            "MULTILEVEL_FEEDBACK" | "MLFQ" => Some(Self::MultilevelFeedback),
            _ => None,
        }
    }
}

impl fmt::Display for SchedulingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a policy may consult besides the requests themselves.
#[derive(Debug, Clone, Copy)]
pub struct SelectionContext<'a> {
    pub types: &'a [TypeConfig],
    /// When set, only categories this service point supports are eligible.
    pub service_point: Option<&'a ServicePoint>,
    /// Reference instant for wait-time aging. Defaults to the latest
    /// arrival among the eligible requests.
    pub as_of: Option<Timestamp>,
    pub aging_per_minute: f64,
}

impl<'a> SelectionContext<'a> {
    pub fn new(types: &'a [TypeConfig]) -> Self {
        Self {
            types,
            service_point: None,
            as_of: None,
            aging_per_minute: DEFAULT_AGING_PER_MINUTE,
        }
    }

    pub fn with_service_point(mut self, service_point: Option<&'a ServicePoint>) -> Self {
        self.service_point = service_point;
        self
    }

    pub fn with_as_of(mut self, as_of: Timestamp) -> Self {
        self.as_of = Some(as_of);
        self
    }

    pub fn with_aging(mut self, aging_per_minute: f64) -> Self {
        self.aging_per_minute = aging_per_minute;
        self
    }

    /// Configured weight for a category, falling back to the fixed ranking.
    pub fn weight_of(&self, category: &str) -> u8 {
        self.types
            .iter()
            .find(|t| t.code == category)
            .map(TypeConfig::effective_weight)
            .unwrap_or_else(|| CategoryRank::of(category).fallback_weight())
    }

    fn is_eligible(&self, request: &ServiceRequest) -> bool {
        request.status == RequestStatus::Waiting
            && self
                .service_point
                .map_or(true, |sp| sp.supports(&request.category))
    }
}

/// Order `requests` under `policy`. Ineligible requests (wrong status or
/// unsupported by the capability filter) are left out of the result; they
/// are not modified and keep their place for later selections.
pub fn order(
    requests: &[ServiceRequest],
    types: &[TypeConfig],
    policy: SchedulingPolicy,
    capability_filter: Option<&ServicePoint>,
) -> Vec<ServiceRequest> {
    let ctx = SelectionContext::new(types).with_service_point(capability_filter);
    order_with(requests, &ctx, policy)
}

/// Like [`order`], with full control over the selection context.
pub fn order_with(
    requests: &[ServiceRequest],
    ctx: &SelectionContext<'_>,
    policy: SchedulingPolicy,
) -> Vec<ServiceRequest> {
    let eligible: Vec<&ServiceRequest> = requests.iter().filter(|r| ctx.is_eligible(r)).collect();
    let ordered = match policy {
        SchedulingPolicy::Fifo => fifo::order(eligible),
        SchedulingPolicy::Priority => priority::order(eligible, ctx),
        SchedulingPolicy::Multilevel => multilevel::order(eligible, ctx),
        SchedulingPolicy::MultilevelFeedback => feedback::order(eligible, ctx),
    };
    ordered.into_iter().cloned().collect()
}
