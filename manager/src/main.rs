//! Main entry point for the manager binary
//!
//! Standalone supervisor mode: loads pool definitions from a JSON config
//! file, keeps the pools alive (crash-restart included), optionally logs
//! per-worker stats, and terminates all workers on Ctrl-C or SIGTERM.

use std::time::Duration;

use clap::Parser;
use manager::{ManagerResult, WorkerPoolManager};
use shared::{logging, process_info, process_warn, ManagerSettings, ProcessId};

/// Worker pool supervisor
#[derive(Parser)]
#[command(name = "manager")]
#[command(about = "Supervises pools of worker processes")]
pub struct Args {
    /// Path to the JSON settings file (workerPool, statsIntervalMs, ...)
    #[arg(long, default_value = "./pools.json")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

fn load_settings(path: &str) -> ManagerSettings {
    match std::fs::read_to_string(path) {
        Ok(raw) => match serde_json::from_str(&raw) {
            Ok(settings) => settings,
            Err(e) => {
                process_warn!(
                    ProcessId::current(),
                    "⚠️ Invalid settings file {}: {}. Continuing without pools.",
                    path,
                    e
                );
                ManagerSettings::default()
            }
        },
        Err(e) => {
            process_warn!(
                ProcessId::current(),
                "⚠️ Could not read settings file {}: {}. Continuing without pools.",
                path,
                e
            );
            ManagerSettings::default()
        }
    }
}

#[tokio::main]
async fn main() -> ManagerResult<()> {
    let args = Args::parse();

    ProcessId::init_manager();
    logging::init_tracing_with_level(Some(&args.log_level));
    logging::log_startup(ProcessId::current(), "worker pool manager");

    let settings = load_settings(&args.config);

    let manager = WorkerPoolManager::with_default_services();

    match settings.worker_pool {
        Some(pools) if !pools.is_empty() => {
            manager.init_worker_pools(pools).await?;
        }
        _ => {
            process_warn!(
                ProcessId::current(),
                "⚠️ No workerPool configuration found; running without pools"
            );
        }
    }

    if settings.log_worker_stats {
        manager.start_stats_logging(Duration::from_millis(settings.stats_interval_ms));
    }

    // Terminate all workers before the host process exits
    wait_for_shutdown_signal().await;
    logging::log_shutdown(ProcessId::current(), "signal received");

    if let Err(e) = manager.terminate_workers(None).await {
        process_warn!(ProcessId::current(), "⚠️ Terminate on shutdown failed: {}", e);
    }
    manager.shutdown().await;

    process_info!(ProcessId::current(), "✅ Manager stopped gracefully");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            process_warn!(
                ProcessId::current(),
                "⚠️ Could not install SIGTERM handler: {}",
                e
            );
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
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
