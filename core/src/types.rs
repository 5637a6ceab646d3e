//! Shared primitive types used across the queue engine.

use chrono::NaiveDateTime;

/// Opaque identifier of a service request ("queue ticket").
pub type RequestId = String;

/// Category code, e.g. `URGENT` or `GENERAL`.
pub type CategoryCode = String;

/// Identifier of a capability-tagged service point (counter, window).
pub type ServicePointId = String;

/// The canonical run identifier.
pub type RunId = String;

/// Wall-clock instant on the simulated service day.
pub type Timestamp = NaiveDateTime;

/// Whole minutes between two instants, as a float for averaging.
pub fn minutes_between(from: Timestamp, to: Timestamp) -> f64 {
    (to - from).num_seconds() as f64 / 60.0
}
