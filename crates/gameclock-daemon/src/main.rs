use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use gameclock_daemon::channel::ChannelSupervisor;
use gameclock_daemon::service::{ClockService, ClockServiceConfig, ClockStreams};
use gameclock_daemon::source::HttpStateSource;

#[derive(Parser)]
#[command(name = "gameclockd", about = "Drift-corrected trial game clock daemon")]
struct Cli {
    /// Push-channel consumer URL; a fresh subscription token is appended per
    /// connection attempt
    #[arg(long, env = "GAMECLOCK_CHANNEL_URL")]
    channel_url: String,

    /// Clock state API endpoint
    #[arg(long, env = "GAMECLOCK_API_URL")]
    api_url: String,

    /// Tick period in milliseconds
    #[arg(long, default_value_t = 1000)]
    tick_ms: i64,

    /// Delay before reconnecting a failed push channel, in seconds
    #[arg(long, default_value_t = 10)]
    reconnect_delay_secs: u64,

    /// Render the clock in military format
    #[arg(long)]
    military: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing. Respects RUST_LOG env var, defaults to info.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cancel = CancellationToken::new();
    let source = Arc::new(HttpStateSource::new(cli.api_url));
    let (update_tx, update_rx) = mpsc::channel(32);

    let supervisor = ChannelSupervisor::new(
        cli.channel_url,
        Duration::from_secs(cli.reconnect_delay_secs),
        update_tx,
        Arc::clone(&source),
        cancel.clone(),
    );
    let channel_handle = tokio::spawn(supervisor.run());

    let config = ClockServiceConfig {
        tick_period_ms: cli.tick_ms,
        military: cli.military,
    };
    let (service, streams) =
        ClockService::new(config, Arc::clone(&source), update_rx, cancel.clone());
    let service_handle = tokio::spawn(service.run());

    let display_handle = tokio::spawn(print_display(streams, cancel.clone()));

    shutdown_signal().await;
    cancel.cancel();

    let (channel, service, display) =
        tokio::join!(channel_handle, service_handle, display_handle);
    channel?;
    service?;
    display?;

    tracing::info!("gameclockd stopped");
    Ok(())
}

/// Print one line per tick: the wall-clock display plus the root timer.
async fn print_display(mut streams: ClockStreams, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = streams.clock_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let line = streams.clock_rx.borrow_and_update().clone();
                let timer = streams.timer_rx.borrow().clone();
                if timer.message_only {
                    println!("{line} | {}", timer.message);
                } else {
                    println!("{line} | {} {:.0}s", timer.message, timer.seconds);
                }
            }
        }
    }
}

/// Wait for ctrl-c or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
            _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        tracing::info!("received ctrl-c, shutting down");
    }
}
