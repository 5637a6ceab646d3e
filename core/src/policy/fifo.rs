//! FIFO: oldest arrival first.

use crate::model::ServiceRequest;

/// Ascending by `created_at`. `sort_by_key` is stable, so equal
/// timestamps keep their insertion order.
pub(super) fn order(mut eligible: Vec<&ServiceRequest>) -> Vec<&ServiceRequest> {
    eligible.sort_by_key(|r| r.created_at);
    eligible
}
