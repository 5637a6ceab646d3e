//! MULTILEVEL: one FIFO sub-queue per category, served round-robin.
//!
//! Each round takes the head of every non-empty sub-queue, so a
//! low-volume category waits at most one round behind the others.
//! Rounds visit categories heaviest-weight first, then by code.

use super::SelectionContext;
use crate::model::ServiceRequest;
use std::{cmp::Reverse, collections::VecDeque};

pub(super) fn order<'r>(
    eligible: Vec<&'r ServiceRequest>,
    ctx: &SelectionContext<'_>,
) -> Vec<&'r ServiceRequest> {
    let total = eligible.len();
    let mut levels: Vec<(&str, VecDeque<&'r ServiceRequest>)> = Vec::new();
    for request in super::fifo::order(eligible) {
        match levels.iter_mut().find(|(code, _)| *code == request.category) {
            Some((_, queue)) => queue.push_back(request),
            None => levels.push((request.category.as_str(), VecDeque::from([request]))),
        }
    }
    levels.sort_by_key(|(code, _)| (Reverse(ctx.weight_of(code)), *code));

    let mut out = Vec::with_capacity(total);
    while out.len() < total {
        for (_, queue) in levels.iter_mut() {
            if let Some(r) = queue.pop_front() {
                out.push(r);
            }
        }
    }
    out
}
