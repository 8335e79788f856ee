mod agent;
mod app;
mod bootstrap;
mod conversations;
mod copilot;
mod error;
mod health;
mod records;

use std::future::IntoFuture;
use std::time::Duration;

use anyhow::{Context, Result};
use dealdesk_core::config::{AppConfig, LoadOptions};
use tokio::net::TcpListener;
use tokio::sync::watch;

fn init_logging(config: &AppConfig) {
    use dealdesk_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Logging comes up before bootstrap so its events are visible.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener =
        TcpListener::bind(&address).await.with_context(|| format!("could not bind {address}"))?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        address = %address,
        agent_mode = app.config.agent.mode.as_str(),
        "dealdesk-server listening"
    );

    let (stop_tx, mut stop_rx) = watch::channel(false);
    let server = axum::serve(listener, app::router(app.state)).with_graceful_shutdown(async move {
        wait_for_shutdown().await;
        let _ = stop_tx.send(true);
    });

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    let drain_deadline = async move {
        let _ = stop_rx.changed().await;
        tokio::time::sleep(grace).await;
    };

    tokio::select! {
        result = server.into_future() => result.context("server terminated with an error")?,
        () = drain_deadline => {
            tracing::warn!(
                event_name = "system.server.drain_timeout",
                correlation_id = "shutdown",
                grace_secs = grace.as_secs(),
                "open connections did not drain in time"
            );
        }
    }

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "dealdesk-server stopping"
    );
    app.db_pool.close().await;

    Ok(())
}

async fn wait_for_shutdown() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!(
            event_name = "system.server.shutdown_requested",
            correlation_id = "shutdown",
            "shutdown signal received"
        ),
        Err(error) => {
            tracing::error!(
                event_name = "system.server.signal_failed",
                correlation_id = "shutdown",
                error = %error,
                "could not listen for shutdown signal"
            );
            std::future::pending::<()>().await;
        }
    }
}
