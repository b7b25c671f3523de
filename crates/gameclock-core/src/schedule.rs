//! Wake-up planner: at most one scheduled future state refresh.
//!
//! The state tree embeds upcoming transition times (`next_time`,
//! `trial_start_time`, `trial_end_time`). No push message announces those
//! transitions, so the planner picks the soonest strictly-future one and asks
//! the runtime to arm a single wake-up; when it fires, fresh state is pulled.
//!
//! Pure, deterministic state machine. All time values are passed in as
//! parameters; the runtime half owns the actual timer.

use chrono::{DateTime, Utc};

use crate::types::ClockState;

/// Upper bound on how far ahead a wake-up may be armed. Anything further out
/// is ignored until a later re-evaluation brings it inside the window, which
/// bounds drift accumulated while asleep.
pub const MAX_WAKEUP_DELAY_MS: i64 = 24 * 60 * 60 * 1000;

/// The single armed wake-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmedWakeup {
    pub armed_at_ms: i64,
    pub due_in_ms: i64,
}

impl ArmedWakeup {
    /// Time left until this wake-up is due, as seen at `now_ms`.
    pub fn remaining_ms(&self, now_ms: i64) -> i64 {
        self.due_in_ms - (now_ms - self.armed_at_ms)
    }
}

/// What the runtime should do after a re-evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeupDecision {
    /// Cancel whatever is armed and arm a wake-up after `delay_ms`.
    Arm { delay_ms: i64 },
    /// The current arming (possibly none) stands.
    Keep,
}

/// Tracks the single armed wake-up across state replacements.
#[derive(Debug, Clone, Default)]
pub struct WakeupPlanner {
    armed: Option<ArmedWakeup>,
}

impl WakeupPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn armed(&self) -> Option<ArmedWakeup> {
        self.armed
    }

    /// Re-evaluate against a state tree. Called on every new tree, and again
    /// whenever nothing is armed.
    ///
    /// Arms only when the soonest strictly-future candidate is inside the
    /// 24 h window, and — when something is already armed — only when the new
    /// delay is strictly smaller than the remaining time on it.
    pub fn on_new_state(&mut self, tree: &ClockState, now: DateTime<Utc>) -> WakeupDecision {
        let candidate = match soonest_transition(tree, now) {
            Some(delay) if delay > 0 && delay < MAX_WAKEUP_DELAY_MS => delay,
            _ => return WakeupDecision::Keep,
        };

        let now_ms = now.timestamp_millis();
        if let Some(current) = self.armed {
            if candidate >= current.remaining_ms(now_ms) {
                return WakeupDecision::Keep;
            }
        }

        self.armed = Some(ArmedWakeup {
            armed_at_ms: now_ms,
            due_in_ms: candidate,
        });
        WakeupDecision::Arm {
            delay_ms: candidate,
        }
    }

    /// The armed wake-up elapsed. Clears the slot; the caller pulls fresh
    /// state exactly once afterwards.
    pub fn on_fire(&mut self) {
        self.armed = None;
    }

    /// Drop any armed wake-up without firing (teardown).
    pub fn disarm(&mut self) {
        self.armed = None;
    }
}

/// Soonest strictly-future transition in the tree, in ms from `now`.
///
/// A node's candidate times count only when the node carries a timezone;
/// children are walked either way.
fn soonest_transition(node: &ClockState, now: DateTime<Utc>) -> Option<i64> {
    let mut best = None;
    collect(node, now, &mut best);
    best
}

fn collect(node: &ClockState, now: DateTime<Utc>, best: &mut Option<i64>) {
    if node.timezone.is_some() {
        for time in [node.next_time, node.trial_start_time, node.trial_end_time]
            .into_iter()
            .flatten()
        {
            let delay = (time - now).num_milliseconds();
            if delay > 0 && best.is_none_or(|b| delay < b) {
                *best = Some(delay);
            }
        }
    }
    for child in [&node.minor, &node.major, &node.reported]
        .into_iter()
        .flatten()
    {
        collect(child, now, best);
    }
}
