use anyhow::{Context, Result};
use fieldpulse_service::config::Config;
use fieldpulse_service::{AppState, build_router};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .init();

    let bind_addr = config.bind_addr;
    let state = AppState::from_config(config)
        .await
        .context("failed to open the document store and start data sync")?;
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    tracing::info!(target: "fieldpulse.service", %bind_addr, "fieldpulse service listening");
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server exited")?;
    tracing::info!(target: "fieldpulse.service", "fieldpulse service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(target: "fieldpulse.service", %error, "failed to listen for shutdown signal");
    }
}
