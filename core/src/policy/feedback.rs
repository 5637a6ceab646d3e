//! MULTILEVEL_FEEDBACK: priority ordering with wait-time aging.
//!
//! effective = weight + aging_per_minute × minutes waited (as of the
//! context instant). Recomputed on every call, never stored.

use super::SelectionContext;
use crate::{model::ServiceRequest, types::minutes_between};

pub(super) fn order<'r>(
    mut eligible: Vec<&'r ServiceRequest>,
    ctx: &SelectionContext<'_>,
) -> Vec<&'r ServiceRequest> {
    let Some(as_of) = ctx
        .as_of
        .or_else(|| eligible.iter().map(|r| r.created_at).max())
    else {
        return eligible;
    };

    let effective = |r: &ServiceRequest| -> f64 {
        let waited = minutes_between(r.created_at, as_of).max(0.0);
        f64::from(ctx.weight_of(&r.category)) + ctx.aging_per_minute * waited
    };

    eligible.sort_by(|a, b| {
        effective(b)
            .total_cmp(&effective(a))
            .then(a.created_at.cmp(&b.created_at))
    });
    eligible
}
