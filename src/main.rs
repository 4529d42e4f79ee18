// ABOUTME: Main entry point for the Slack-agent bridge.
// ABOUTME: Initializes logging and config, runs dispatcher and health server, drains on signal.

use anyhow::Result;
use hearsay::config::Config;
use hearsay::dispatcher::Dispatcher;
use hearsay::registry::ConversationRegistry;
use hearsay::slack::SlackGateway;
use hearsay::{health, metrics};
use hearsay_agent::backends::CliBackend;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Log panics before they crash the process
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("PANIC! Bridge crashed with the following error:\n");
        eprintln!("{}", panic_info);
        eprintln!("\nBacktrace:");
        eprintln!("{:?}", std::backtrace::Backtrace::force_capture());
    }));

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting hearsay bridge");

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::load()?;

    tracing::info!(
        agent_binary = %config.agent.binary,
        model = %config.agent.model,
        working_dir = ?config.agent.working_dir,
        health_port = config.health.port,
        "Configuration loaded"
    );

    let metrics_handle = metrics::init_metrics()?;

    // Every conversation gets a fresh session built from the same fixed options
    let agent_config = config.agent.clone();
    let registry = Arc::new(ConversationRegistry::new(Box::new(move || {
        Ok(CliBackend::new(agent_config.clone()).into_handle())
    })));

    let gateway = SlackGateway::new(&config.slack).await?;
    let responder = Arc::new(gateway.responder());

    let (mentions, listener_task) = gateway.mention_stream();

    // Shutdown signal: SIGINT or SIGTERM flips the watch channel
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        let signalled = wait_for_signal().await;
        tracing::info!(signal = signalled, "Termination signal received, initiating graceful shutdown");
        let _ = shutdown_tx.send(true);
    });

    // Health server runs on its own task so it stays responsive
    let health_task = {
        let registry = Arc::clone(&registry);
        let health_config = config.health.clone();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = health::serve(&health_config, registry, metrics_handle, shutdown).await {
                tracing::error!(error = %e, "Health server failed");
            }
        })
    };

    tracing::info!("Bridge ready - mention me in a channel to start a conversation");

    // Dispatcher runs on the main task until shutdown
    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&registry), responder));
    dispatcher.run(mentions, shutdown_rx).await;

    // Stop the listener, let the health server finish, then drain sessions
    listener_task.abort();
    if let Err(e) = health_task.await {
        if !e.is_cancelled() {
            tracing::warn!(error = %e, "Health server task ended abnormally");
        }
    }
    registry.close_all().await;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Wait for SIGINT or SIGTERM, returning which one arrived
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return "SIGINT";
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
    }
}
