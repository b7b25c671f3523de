//! State-source collaborators: where fresh clock state is pulled from.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use gameclock_core::types::ClockState;
use gameclock_core::wire::WireClockState;

/// A collaborator that can be asked for the authoritative clock state, and
/// told whether it should compensate for a dead push channel by polling on
/// its own cadence.
///
/// The polling flag is advisory — the daemon itself only pulls at startup and
/// when a scheduled wake-up (or an elapsed timer) asks for fresh state.
pub trait ClockStateSource: Send + Sync + 'static {
    /// Fetch the current clock state.
    fn fetch(&self) -> impl Future<Output = anyhow::Result<ClockState>> + Send;

    /// Enable or disable fallback polling on the collaborator.
    fn set_fallback_polling(&self, enabled: bool);
}

/// HTTP state source: GETs the wire-model JSON from the clock state API.
pub struct HttpStateSource {
    client: reqwest::Client,
    url: String,
    poll_fallback: AtomicBool,
}

impl HttpStateSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            poll_fallback: AtomicBool::new(false),
        }
    }

    /// Whether fallback polling is currently requested.
    pub fn fallback_polling(&self) -> bool {
        self.poll_fallback.load(Ordering::Relaxed)
    }
}

impl ClockStateSource for HttpStateSource {
    fn fetch(&self) -> impl Future<Output = anyhow::Result<ClockState>> + Send {
        async move {
            let wire: WireClockState = self
                .client
                .get(&self.url)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            Ok(wire.into())
        }
    }

    fn set_fallback_polling(&self, enabled: bool) {
        let was = self.poll_fallback.swap(enabled, Ordering::Relaxed);
        if was != enabled {
            tracing::info!(enabled, "fallback polling toggled");
        }
    }
}
