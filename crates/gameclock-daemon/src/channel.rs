//! Push-channel supervisor.
//!
//! Owns the consumer socket for its whole lifetime: connect with a fresh
//! subscription identity, acknowledge every decoded frame, hand decoded
//! state to the service loop, and on any failure flip the collaborator's
//! fallback-polling flag and reconnect after a fixed delay. There is no
//! terminal state short of cancellation.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use gameclock_core::types::ClockState;
use gameclock_core::wire::{self, PushAck};

use crate::source::ClockStateSource;

/// Decoded state update forwarded to the service loop.
#[derive(Debug, Clone)]
pub struct StateUpdate {
    pub state: ClockState,
    /// Connection attempt that produced this update. The service drops
    /// anything older than the newest generation it has seen, so a
    /// superseded connection can never write state.
    pub generation: u64,
}

/// Connection lifecycle. Exactly one socket is live at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    ClosedRetrying,
}

pub struct ChannelSupervisor<S> {
    base_url: String,
    reconnect_delay: Duration,
    tx: mpsc::Sender<StateUpdate>,
    source: Arc<S>,
    cancel: CancellationToken,
    generation: u64,
    state: ConnectionState,
}

impl<S: ClockStateSource> ChannelSupervisor<S> {
    pub fn new(
        base_url: impl Into<String>,
        reconnect_delay: Duration,
        tx: mpsc::Sender<StateUpdate>,
        source: Arc<S>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            reconnect_delay,
            tx,
            source,
            cancel,
            generation: 0,
            state: ConnectionState::Connecting,
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state
    }

    /// Connect, read until failure or close, flip the fallback flag, wait out
    /// the reconnect delay, repeat. Runs until cancelled.
    pub async fn run(mut self) {
        loop {
            self.generation += 1;
            self.state = ConnectionState::Connecting;
            let attempt_started = Utc::now();

            let cancel = self.cancel.clone();
            let outcome = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("push channel: cancellation requested, shutting down");
                    return;
                }
                outcome = self.connect_and_listen(attempt_started) => outcome,
            };
            if self.cancel.is_cancelled() {
                tracing::info!("push channel: cancellation requested, shutting down");
                return;
            }
            match outcome {
                Ok(()) => tracing::info!("push channel closed by remote, will reconnect"),
                Err(e) => tracing::warn!(error = %e, "push channel failed, will reconnect"),
            }

            // Dead channel: the collaborator compensates by polling until the
            // connection is back.
            self.state = ConnectionState::ClosedRetrying;
            self.source.set_fallback_polling(true);
            let failed_at = Utc::now();

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("push channel: cancellation during reconnect delay");
                    return;
                }
                _ = tokio::time::sleep(self.reconnect_delay) => {
                    tracing::info!(
                        down_ms = (Utc::now() - failed_at).num_milliseconds(),
                        generation = self.generation,
                        "reconnecting push channel"
                    );
                }
            }
        }
    }

    /// Single connection attempt: connect under a fresh subscription token,
    /// then read frames until EOF, error, or cancellation.
    async fn connect_and_listen(
        &mut self,
        attempt_started: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let url = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            subscription_token()
        );
        let (ws, _response) = tokio_tungstenite::connect_async(&url).await?;
        self.state = ConnectionState::Open;
        tracing::info!(
            connect_ms = (Utc::now() - attempt_started).num_milliseconds(),
            generation = self.generation,
            "push channel connected"
        );
        // Live channel again: the collaborator can stop polling.
        self.source.set_fallback_polling(false);

        let (mut ws_tx, mut ws_rx) = ws.split();
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            match wire::decode_frame(&text) {
                                Ok(update) => {
                                    let ack = serde_json::to_string(&PushAck {
                                        message_id: update.message_id.clone(),
                                    })?;
                                    ws_tx.send(Message::Text(ack)).await?;

                                    if let Some(calltime) = update.calltime_ms {
                                        tracing::info!(
                                            latency_ms =
                                                Utc::now().timestamp_millis() - calltime,
                                            "clock transition latency"
                                        );
                                    }

                                    let forwarded = StateUpdate {
                                        state: update.state,
                                        generation: self.generation,
                                    };
                                    if self.tx.send(forwarded).await.is_err() {
                                        // Service is gone; nothing left to feed.
                                        return Ok(());
                                    }
                                }
                                Err(e) => {
                                    // Recoverable noise, not a connection
                                    // failure: drop the frame unacknowledged.
                                    tracing::warn!(error = %e, "dropping undecodable push frame");
                                }
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            ws_tx.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(_))) | None => return Ok(()),
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                    }
                }
            }
        }
    }
}

/// Random per-connection subscription token, so successive attempts from the
/// same session never collide on the remote delivery target.
fn subscription_token() -> String {
    use rand::Rng;
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ1234567890";
    const LEN: usize = 12;
    let mut rng = rand::rng();
    (0..LEN)
        .map(|_| CHARSET[rng.random_range(0..CHARSET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::future::Future;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use tokio::net::{TcpListener, TcpStream};
    use tokio::time::{Instant, timeout};
    use tokio_tungstenite::WebSocketStream;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    use gameclock_core::wire::{WireClockState, encode_frame};

    struct FakeSource {
        polling: AtomicBool,
    }

    impl FakeSource {
        fn new() -> Self {
            Self {
                polling: AtomicBool::new(false),
            }
        }

        fn polling(&self) -> bool {
            self.polling.load(Ordering::SeqCst)
        }
    }

    impl ClockStateSource for FakeSource {
        fn fetch(&self) -> impl Future<Output = anyhow::Result<ClockState>> + Send {
            async move { Ok(ClockState::default()) }
        }

        fn set_fallback_polling(&self, enabled: bool) {
            self.polling.store(enabled, Ordering::SeqCst);
        }
    }

    struct Harness {
        listener: TcpListener,
        paths: Arc<Mutex<Vec<String>>>,
        source: Arc<FakeSource>,
        update_rx: mpsc::Receiver<StateUpdate>,
        cancel: CancellationToken,
        task: Option<tokio::task::JoinHandle<()>>,
    }

    async fn start(reconnect_delay: Duration) -> Harness {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let base_url = format!("ws://127.0.0.1:{port}/consumer/game-clock");

        let source = Arc::new(FakeSource::new());
        let (tx, update_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let supervisor = ChannelSupervisor::new(
            base_url,
            reconnect_delay,
            tx,
            Arc::clone(&source),
            cancel.clone(),
        );
        let task = tokio::spawn(supervisor.run());

        Harness {
            listener,
            paths: Arc::new(Mutex::new(Vec::new())),
            source,
            update_rx,
            cancel,
            task: Some(task),
        }
    }

    impl Harness {
        /// Accept one consumer connection, recording its request path.
        async fn accept(&self) -> WebSocketStream<TcpStream> {
            let (stream, _) = self.listener.accept().await.expect("accept");
            let paths = Arc::clone(&self.paths);
            let record = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                paths
                    .lock()
                    .expect("paths lock")
                    .push(req.uri().path().to_string());
                Ok(resp)
            };
            tokio_tungstenite::accept_hdr_async(stream, record)
                .await
                .expect("handshake")
        }
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            self.cancel.cancel();
        }
    }

    fn push_state(message: &str) -> WireClockState {
        WireClockState {
            message: Some(message.into()),
            countdown: Some(true),
            ..WireClockState::default()
        }
    }

    #[tokio::test]
    async fn decoded_frame_is_acked_and_forwarded() {
        let mut harness = start(Duration::from_millis(100)).await;
        let mut server = harness.accept().await;

        server
            .send(Message::Text(encode_frame("m-1", &push_state("From push"))))
            .await
            .expect("send frame");

        let ack = timeout(Duration::from_secs(5), server.next())
            .await
            .expect("ack within timeout")
            .expect("stream alive")
            .expect("read ok");
        let ack: serde_json::Value =
            serde_json::from_str(ack.to_text().expect("text frame")).expect("ack json");
        assert_eq!(ack["messageId"], "m-1");

        let update = timeout(Duration::from_secs(5), harness.update_rx.recv())
            .await
            .expect("update within timeout")
            .expect("channel open");
        assert_eq!(update.state.message, "From push");
        assert_eq!(update.generation, 1);
        assert!(
            !harness.source.polling(),
            "open channel must keep fallback polling off"
        );
    }

    #[tokio::test]
    async fn undecodable_frame_is_dropped_without_ack() {
        let mut harness = start(Duration::from_millis(100)).await;
        let mut server = harness.accept().await;

        server
            .send(Message::Text("not a frame".into()))
            .await
            .expect("send garbage");
        server
            .send(Message::Text(encode_frame("m-2", &push_state("Good"))))
            .await
            .expect("send good frame");

        // The first (and only) thing coming back is the ack for the good
        // frame — the garbage produced neither an ack nor a disconnect.
        let ack = timeout(Duration::from_secs(5), server.next())
            .await
            .expect("ack within timeout")
            .expect("stream alive")
            .expect("read ok");
        let ack: serde_json::Value =
            serde_json::from_str(ack.to_text().expect("text frame")).expect("ack json");
        assert_eq!(ack["messageId"], "m-2");

        let update = timeout(Duration::from_secs(5), harness.update_rx.recv())
            .await
            .expect("update within timeout")
            .expect("channel open");
        assert_eq!(update.state.message, "Good");
    }

    #[tokio::test]
    async fn close_enables_fallback_and_reconnects_after_delay() {
        let delay = Duration::from_millis(300);
        let mut harness = start(delay).await;

        let server = harness.accept().await;
        let dropped_at = Instant::now();
        drop(server);

        // Fallback polling flips on once the failure is noticed.
        timeout(Duration::from_secs(5), async {
            while !harness.source.polling() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("fallback polling enabled");

        // The next attempt arrives, but no sooner than the configured delay.
        let mut server = harness.accept().await;
        assert!(
            dropped_at.elapsed() >= delay,
            "reconnected after only {:?}",
            dropped_at.elapsed()
        );

        // The client flips the flag back off once its side of the handshake
        // completes.
        timeout(Duration::from_secs(5), async {
            while harness.source.polling() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("fallback polling disabled after reconnect");

        // Updates from the new connection carry the new generation.
        server
            .send(Message::Text(encode_frame("m-3", &push_state("Again"))))
            .await
            .expect("send frame");
        let update = timeout(Duration::from_secs(5), harness.update_rx.recv())
            .await
            .expect("update within timeout")
            .expect("channel open");
        assert_eq!(update.generation, 2);

        // Each attempt used a fresh subscription token under the same base.
        let paths = harness.paths.lock().expect("paths lock").clone();
        assert_eq!(paths.len(), 2);
        assert!(paths[0].starts_with("/consumer/game-clock/"));
        assert!(paths[1].starts_with("/consumer/game-clock/"));
        assert_ne!(paths[0], paths[1], "subscription identity must not repeat");
    }

    #[tokio::test]
    async fn cancellation_stops_the_supervisor() {
        let mut harness = start(Duration::from_millis(100)).await;
        let _server = harness.accept().await;

        harness.cancel.cancel();
        let task = harness.task.take().expect("task handle");
        timeout(Duration::from_secs(5), task)
            .await
            .expect("supervisor exits after cancel")
            .expect("task join");
    }

    #[test]
    fn subscription_tokens_are_twelve_chars_from_the_charset() {
        for _ in 0..32 {
            let token = subscription_token();
            assert_eq!(token.len(), 12);
            assert!(
                token
                    .chars()
                    .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()),
                "unexpected char in {token}"
            );
        }
    }

    #[test]
    fn subscription_tokens_do_not_repeat() {
        assert_ne!(subscription_token(), subscription_token());
    }
}
