//! Main entry point for the webserver binary
//!
//! Hosts the worker pool manager behind the HTTP API: pools come from the
//! JSON settings file, tasks come from request bodies, and all workers are
//! terminated on shutdown.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use manager::WorkerPoolManager;
use shared::{logging, process_info, process_warn, ManagerSettings, ProcessId};
use webserver::{router, WebServerResult};

/// HTTP front-end for the worker pool manager
#[derive(Parser)]
#[command(name = "webserver")]
#[command(about = "Serves the worker pool API over HTTP")]
pub struct Args {
    /// Bind address for the HTTP listener
    #[arg(long, default_value = "127.0.0.1:3000")]
    pub bind: String,

    /// Path to the JSON settings file (workerPool, statsIntervalMs, ...)
    #[arg(long, default_value = "./pools.json")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[tokio::main]
async fn main() -> WebServerResult<()> {
    let args = Args::parse();

    ProcessId::init_webserver();
    logging::init_tracing_with_level(Some(&args.log_level));
    logging::log_startup(ProcessId::current(), "worker pool webserver");

    let settings = std::fs::read_to_string(&args.config)
        .ok()
        .and_then(|raw| serde_json::from_str::<ManagerSettings>(&raw).ok())
        .unwrap_or_else(|| {
            process_warn!(
                ProcessId::current(),
                "⚠️ No usable settings at {}; continuing without pools",
                args.config
            );
            ManagerSettings::default()
        });

    let manager = Arc::new(WorkerPoolManager::with_default_services());

    match settings.worker_pool {
        Some(pools) if !pools.is_empty() => {
            manager.init_worker_pools(pools).await?;
        }
        _ => {
            process_warn!(
                ProcessId::current(),
                "⚠️ No workerPool configuration found; one-shot tasks only"
            );
        }
    }

    if settings.log_worker_stats {
        manager.start_stats_logging(Duration::from_millis(settings.stats_interval_ms));
    }

    let app = router(manager.clone());
    let listener = tokio::net::TcpListener::bind(&args.bind).await?;
    process_info!(ProcessId::current(), "🌐 Listening on {}", args.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Terminate all workers before the host process exits
    logging::log_shutdown(ProcessId::current(), "signal received");
    if let Err(e) = manager.terminate_workers(None).await {
        process_warn!(ProcessId::current(), "⚠️ Terminate on shutdown failed: {}", e);
    }
    manager.shutdown().await;

    process_info!(ProcessId::current(), "✅ WebServer stopped gracefully");
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
