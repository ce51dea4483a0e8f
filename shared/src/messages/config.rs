//! Pool and manager configuration schemas

use serde::{Deserialize, Serialize};

/// Default memory ceiling for workers, in megabytes
pub const DEFAULT_WORKER_MEMORY_LIMIT_MB: u64 = 4096;

fn default_worker_count() -> u32 {
    1
}

fn default_memory_limit() -> u64 {
    DEFAULT_WORKER_MEMORY_LIMIT_MB
}

fn default_stats_interval_ms() -> u64 {
    1000
}

/// Configuration for one named worker pool
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct WorkerPoolConfig {
    #[serde(rename = "poolName")]
    pub pool_name: String,

    /// Path to the worker executable
    #[serde(rename = "workerScript")]
    pub worker_script: String,

    #[serde(rename = "workerCount", default = "default_worker_count")]
    pub worker_count: u32,

    /// Memory ceiling per worker, in megabytes
    #[serde(rename = "workerMemoryLimit", default = "default_memory_limit")]
    pub worker_memory_limit: u64,
}

impl WorkerPoolConfig {
    pub fn new(pool_name: impl Into<String>, worker_script: impl Into<String>) -> Self {
        Self {
            pool_name: pool_name.into(),
            worker_script: worker_script.into(),
            worker_count: default_worker_count(),
            worker_memory_limit: default_memory_limit(),
        }
    }

    pub fn with_worker_count(mut self, count: u32) -> Self {
        self.worker_count = count;
        self
    }

    pub fn with_memory_limit(mut self, limit_mb: u64) -> Self {
        self.worker_memory_limit = limit_mb;
        self
    }
}

/// Top-level settings for the manager host processes
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ManagerSettings {
    /// Pool definitions; absent means "run with no pools"
    #[serde(rename = "workerPool", default)]
    pub worker_pool: Option<Vec<WorkerPoolConfig>>,

    /// Whether the periodic per-worker stats log is enabled
    #[serde(rename = "logWorkerStats", default)]
    pub log_worker_stats: bool,

    /// Interval of the stats log, in milliseconds
    #[serde(rename = "statsIntervalMs", default = "default_stats_interval_ms")]
    pub stats_interval_ms: u64,
}
