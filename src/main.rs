use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use worker_hub::config::HubConfig;
use worker_hub::hub::{self, Hub, WorkerAdapter};
use worker_hub::tools::ToolRegistry;
use worker_hub::ws::hub_routes;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Optional daily-rolling file log next to stderr output
    let (file_layer, _log_guard) = match std::env::var("WORKER_HUB_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "worker-hub.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    let config = HubConfig::from_env();
    let port = config.port;

    eprintln!("🛰  Worker Hub v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   WS: ws://0.0.0.0:{}/ws", port);
    eprintln!("   API: http://0.0.0.0:{}/api/workers", port);
    eprintln!(
        "   Query timeout: {}ms, sweep every {}s (stale after {}s)",
        config.query_timeout.as_millis(),
        config.sweep_interval.as_secs(),
        config.stale_after.as_secs(),
    );

    // ── Hub ─────────────────────────────────────────────────────────────
    let hub = Hub::new(config);
    let _sweeper = hub::spawn_sweeper(Arc::clone(&hub));

    // ── Tools ───────────────────────────────────────────────────────────
    let tools = Arc::new(ToolRegistry::with_worker_tools(WorkerAdapter::new(
        Arc::clone(&hub),
    )));
    eprintln!("   Tools: {} registered\n", tools.count());

    // ── Server ──────────────────────────────────────────────────────────
    let app = hub_routes(hub, tools);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("failed to bind port {}", port))?;
    tracing::info!(port, "Worker hub server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown requested");
        })
        .await
        .context("server error")?;

    Ok(())
}
