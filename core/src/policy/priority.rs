//! PRIORITY: heaviest category first, oldest arrival within a weight.

use super::SelectionContext;
use crate::model::ServiceRequest;
use std::cmp::Reverse;

pub(super) fn order<'r>(
    mut eligible: Vec<&'r ServiceRequest>,
    ctx: &SelectionContext<'_>,
) -> Vec<&'r ServiceRequest> {
    eligible.sort_by_key(|r| (Reverse(ctx.weight_of(&r.category)), r.created_at));
    eligible
}
