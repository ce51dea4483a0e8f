//! Main entry point for the worker binary
//!
//! Spawned by the manager with piped stdio: stdin carries task messages,
//! stdout carries replies, and all logging goes to stderr.

use clap::Parser;
use shared::{logging, process_debug, process_warn, ProcessId};
use tokio::io::BufReader;
use worker::{runtime, DefaultWorkloads, WorkerResult};

/// Pool worker process
#[derive(Parser)]
#[command(name = "worker")]
#[command(about = "Runs workloads dispatched by the pool manager")]
pub struct Args {
    /// Memory ceiling in megabytes, enforced via an address-space rlimit
    #[arg(long = "memory-limit-mb")]
    pub memory_limit_mb: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[tokio::main]
async fn main() -> WorkerResult<()> {
    let args = Args::parse();

    ProcessId::init_worker(std::process::id());
    logging::init_tracing_with_level(Some(&args.log_level));

    if let Some(limit_mb) = args.memory_limit_mb {
        match worker::limits::apply_memory_limit(limit_mb) {
            Ok(()) => process_debug!(
                ProcessId::current(),
                "📏 Address space capped at {} MB",
                limit_mb
            ),
            Err(e) => process_warn!(
                ProcessId::current(),
                "⚠️ Could not apply memory limit of {} MB: {}",
                limit_mb,
                e
            ),
        }
    }

    process_debug!(ProcessId::current(), "🔨 Worker ready for tasks");

    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    runtime::serve(stdin, stdout, &DefaultWorkloads).await?;

    // TERMINATE or parent EOF: exit 0
    Ok(())
}
