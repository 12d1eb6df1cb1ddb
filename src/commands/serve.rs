// ABOUTME: Runs the HTTP API and the task scheduler until Ctrl+C
// ABOUTME: Scheduled tasks that were running before shutdown are registered again on start

use anyhow::{Context, Result};
use tokio::net::TcpListener;

use crate::api;
use crate::app::App;

pub async fn serve(app: App) -> Result<()> {
    let restored = app
        .scheduler
        .restore()
        .context("Failed to restore scheduled tasks")?;
    if restored > 0 {
        tracing::info!("Restored {} scheduled task(s)", restored);
    }

    let listen = app.config.server.listen.clone();
    let listener = TcpListener::bind(&listen)
        .await
        .with_context(|| format!("Failed to bind {}", listen))?;
    tracing::info!("Listening on http://{}", listen);

    let scheduler = app.scheduler.clone();
    axum::serve(listener, api::router(app))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    scheduler.shutdown();
    tracing::info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
