//! The clock service: one event loop that owns every state transition.
//!
//! Inbound channel updates, tick firings, scheduled wake-ups, and teardown
//! are all serialized onto this single `tokio::select!` loop, so the current
//! state, the armed wake-up, and the published outputs never race. A state
//! replacement and its schedule re-evaluation complete before the next tick
//! can observe them.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use gameclock_core::cadence::TickCadence;
use gameclock_core::format;
use gameclock_core::schedule::{WakeupDecision, WakeupPlanner};
use gameclock_core::timer;
use gameclock_core::types::{ClockState, TimerValue};

use crate::channel::StateUpdate;
use crate::source::ClockStateSource;

#[derive(Debug, Clone)]
pub struct ClockServiceConfig {
    /// Tick period in milliseconds.
    pub tick_period_ms: i64,
    /// Render the wall clock in military format.
    pub military: bool,
}

impl Default for ClockServiceConfig {
    fn default() -> Self {
        Self {
            tick_period_ms: 1000,
            military: false,
        }
    }
}

/// Receiving ends of the published output streams.
pub struct ClockStreams {
    /// Formatted wall-clock display, updated every tick.
    pub clock_rx: watch::Receiver<String>,
    /// Timer-value tree, updated every tick a state exists.
    pub timer_rx: watch::Receiver<TimerValue>,
}

pub struct ClockService<S> {
    config: ClockServiceConfig,
    source: Arc<S>,
    updates_rx: mpsc::Receiver<StateUpdate>,
    clock_tx: watch::Sender<String>,
    timer_tx: watch::Sender<TimerValue>,
    state: Option<ClockState>,
    planner: WakeupPlanner,
    cadence: TickCadence,
    /// Newest connection generation observed; older updates are dropped.
    last_generation: u64,
    /// One refresh per applied state: armed on every state replacement,
    /// consumed by the next pull. Keeps repeated clamp signals idempotent.
    refresh_ready: bool,
    cancel: CancellationToken,
}

impl<S: ClockStateSource> ClockService<S> {
    pub fn new(
        config: ClockServiceConfig,
        source: Arc<S>,
        updates_rx: mpsc::Receiver<StateUpdate>,
        cancel: CancellationToken,
    ) -> (Self, ClockStreams) {
        let (clock_tx, clock_rx) = watch::channel(String::new());
        let (timer_tx, timer_rx) = watch::channel(TimerValue::unconfigured());
        let cadence = TickCadence::new(config.tick_period_ms);
        (
            Self {
                config,
                source,
                updates_rx,
                clock_tx,
                timer_tx,
                state: None,
                planner: WakeupPlanner::new(),
                cadence,
                last_generation: 0,
                refresh_ready: false,
                cancel,
            },
            ClockStreams { clock_rx, timer_rx },
        )
    }

    /// Run until cancelled.
    pub async fn run(mut self) {
        let mut wake_deadline: Option<Instant> = None;

        // Initial pull; push updates and scheduled wake-ups take over from
        // here.
        match self.source.fetch().await {
            Ok(state) => self.apply_state(state, &mut wake_deadline),
            Err(e) => tracing::warn!(error = %e, "initial state fetch failed"),
        }

        let first_delay = self.cadence.next_delay_ms(Utc::now().timestamp_millis());
        let mut next_tick = Instant::now() + Duration::from_millis(first_delay as u64);
        let mut updates_open = true;

        loop {
            let wake_at = wake_deadline;
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.planner.disarm();
                    tracing::info!("clock service: cancellation requested, shutting down");
                    break;
                }
                _ = tokio::time::sleep_until(next_tick) => {
                    let now = Utc::now();
                    let delay = self.cadence.next_delay_ms(now.timestamp_millis());
                    next_tick = Instant::now() + Duration::from_millis(delay as u64);
                    self.tick(now, &mut wake_deadline).await;
                }
                _ = wake_sleep(wake_at), if wake_at.is_some() => {
                    wake_deadline = None;
                    self.planner.on_fire();
                    tracing::info!("scheduled wake-up fired, pulling fresh state");
                    self.refresh(&mut wake_deadline).await;
                }
                maybe_update = self.updates_rx.recv(), if updates_open => {
                    match maybe_update {
                        Some(update) if update.generation < self.last_generation => {
                            tracing::debug!(
                                generation = update.generation,
                                newest = self.last_generation,
                                "dropping update from superseded connection"
                            );
                        }
                        Some(update) => {
                            self.last_generation = update.generation;
                            self.apply_state(update.state, &mut wake_deadline);
                        }
                        None => {
                            tracing::info!("push update channel closed");
                            updates_open = false;
                        }
                    }
                }
            }
        }
    }

    /// One tick: recompute and publish the timer tree (when state exists) and
    /// the wall-clock display string (always).
    async fn tick(&mut self, now: DateTime<Utc>, wake_deadline: &mut Option<Instant>) {
        let mut refresh_needed = false;

        if let Some(state) = &self.state {
            let computation = timer::compute(Some(state), now);
            refresh_needed = computation.refresh_requests > 0;
            let _ = self.timer_tx.send(computation.value);

            // Transition times beyond the arming window drift into range
            // while nothing is armed; re-evaluate from the tree we have.
            if self.planner.armed().is_none()
                && let WakeupDecision::Arm { delay_ms } = self.planner.on_new_state(state, now)
            {
                *wake_deadline = Some(Instant::now() + Duration::from_millis(delay_ms as u64));
                tracing::debug!(delay_ms, "armed state refresh wake-up");
            }
        }

        let timezone = self.state.as_ref().and_then(|s| s.timezone.clone());
        match format::format_clock(now, timezone.as_deref(), self.config.military) {
            Ok(line) => {
                let _ = self.clock_tx.send(line);
            }
            Err(e) => tracing::error!(error = %e, "clock display formatting failed"),
        }

        if refresh_needed {
            tracing::debug!("timer clamped to zero, requesting fresh state");
            self.refresh(wake_deadline).await;
        }
    }

    /// Pull fresh state from the collaborator. Guarded so repeated clamp
    /// signals between state replacements collapse into one request.
    async fn refresh(&mut self, wake_deadline: &mut Option<Instant>) {
        if !self.refresh_ready {
            return;
        }
        self.refresh_ready = false;
        match self.source.fetch().await {
            Ok(state) => self.apply_state(state, wake_deadline),
            Err(e) => {
                tracing::warn!(error = %e, "state refresh failed");
                // Let the next trigger retry.
                self.refresh_ready = true;
            }
        }
    }

    /// Replace the current state wholesale and re-evaluate the wake-up.
    fn apply_state(&mut self, state: ClockState, wake_deadline: &mut Option<Instant>) {
        let now = Utc::now();
        let decision = self.planner.on_new_state(&state, now);
        self.state = Some(state);
        self.refresh_ready = true;
        if let WakeupDecision::Arm { delay_ms } = decision {
            *wake_deadline = Some(Instant::now() + Duration::from_millis(delay_ms as u64));
            tracing::info!(delay_ms, "armed state refresh wake-up");
        }
    }
}

/// Sleep until the armed wake-up, or forever when nothing is armed. The
/// branch using this is gated on `wake_at.is_some()`, so the pending arm
/// only exists to keep the future well-formed.
async fn wake_sleep(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending().await,
    }
}
