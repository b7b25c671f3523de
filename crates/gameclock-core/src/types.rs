//! Clock state and timer value trees.
//!
//! `ClockState` is the authoritative description delivered by the remote
//! side: a target time, a counting direction, a display message, and up to
//! three named child clocks (`minor`, `major`, `reported`), each itself a
//! full `ClockState`. `TimerValue` mirrors that shape and is recomputed from
//! scratch every tick — it is never mutated incrementally.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message published when no clock state has been configured yet.
pub const UNCONFIGURED_MESSAGE: &str = "Clock state not configured";

/// One node of the clock state tree.
///
/// Children are owned slots, so the state is a tree by construction — there
/// is no aliasing between nodes. The engine places no bound on nesting depth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trial_id: Option<i64>,
    pub message: String,
    pub message_only: bool,
    pub countdown: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trial_start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trial_end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minor: Option<Box<ClockState>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub major: Option<Box<ClockState>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reported: Option<Box<ClockState>>,
}

impl Default for ClockState {
    fn default() -> Self {
        Self {
            trial_id: None,
            message: UNCONFIGURED_MESSAGE.to_string(),
            message_only: false,
            countdown: false,
            base_time: None,
            next_time: None,
            trial_start_time: None,
            trial_end_time: None,
            timezone: None,
            minor: None,
            major: None,
            reported: None,
        }
    }
}

/// Per-tick snapshot derived from a `ClockState` node: remaining or elapsed
/// seconds plus the display message. Child slots appear only where the state
/// tree has them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerValue {
    pub message: String,
    pub message_only: bool,
    /// Fractional seconds, never negative. Rounding is the display's job.
    pub seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minor: Option<Box<TimerValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub major: Option<Box<TimerValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reported: Option<Box<TimerValue>>,
}

impl TimerValue {
    /// Placeholder value published while no state is configured.
    pub fn unconfigured() -> Self {
        Self {
            message: UNCONFIGURED_MESSAGE.to_string(),
            message_only: true,
            seconds: 0.0,
            minor: None,
            major: None,
            reported: None,
        }
    }
}

impl Default for TimerValue {
    fn default() -> Self {
        Self::unconfigured()
    }
}
