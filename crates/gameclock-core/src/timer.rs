//! Timer engine: state tree + current time → per-tick timer values.
//!
//! The engine is a pure function. When a countdown has already elapsed (or a
//! count-up has not started yet) the affected node clamps to zero and the
//! result carries a refresh-request count; the caller turns any non-zero
//! count into a single state pull.

use chrono::{DateTime, Utc};

use crate::types::{ClockState, TimerValue};

/// Result of one engine pass over a state tree.
#[derive(Debug, Clone, PartialEq)]
pub struct TimerComputation {
    pub value: TimerValue,
    /// Number of nodes that clamped to zero and want fresh state.
    /// Any non-zero count means one idempotent refresh — the requests are
    /// not deduplicated here.
    pub refresh_requests: u32,
}

/// Compute the timer-value tree for `node` at `now`.
pub fn compute(node: Option<&ClockState>, now: DateTime<Utc>) -> TimerComputation {
    let mut refresh_requests = 0;
    let value = match node {
        Some(node) => compute_node(node, now, &mut refresh_requests),
        None => TimerValue::unconfigured(),
    };
    TimerComputation {
        value,
        refresh_requests,
    }
}

fn compute_node(node: &ClockState, now: DateTime<Utc>, refresh: &mut u32) -> TimerValue {
    let mut value = TimerValue {
        message: node.message.clone(),
        message_only: node.message_only,
        seconds: 0.0,
        minor: None,
        major: None,
        reported: None,
    };

    if let Some(base) = node.base_time {
        // A zone conversion never moves the instant, so the difference is
        // taken on the UTC instants directly regardless of `node.timezone`.
        let delta_ms = if node.countdown {
            (base - now).num_milliseconds()
        } else {
            (now - base).num_milliseconds()
        };
        if delta_ms > 0 {
            value.seconds = delta_ms as f64 / 1000.0;
        } else {
            // Elapsed countdown, or a count-up whose base is still ahead:
            // clamp and ask for fresh state.
            *refresh += 1;
        }
    }

    value.minor = node
        .minor
        .as_deref()
        .map(|c| Box::new(compute_node(c, now, refresh)));
    value.major = node
        .major
        .as_deref()
        .map(|c| Box::new(compute_node(c, now, refresh)));
    value.reported = node
        .reported
        .as_deref()
        .map(|c| Box::new(compute_node(c, now, refresh)));

    value
}
