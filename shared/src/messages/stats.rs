//! Worker resource usage reporting types

use serde::{Deserialize, Serialize};

/// One OS-level usage sample for a worker process
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq)]
pub struct WorkerUsage {
    /// CPU load in percent
    pub cpu: f32,
    /// Resident memory in bytes
    pub memory: u64,
}

/// Per-worker stats entry
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStats {
    pub pool_name: String,
    pub pid: u32,
    pub running_tasks: usize,
    /// Jobs completed over the worker's lifetime
    pub jobs_completed: u64,
    /// Crashed predecessors this worker replaces
    pub restarts: u64,
    pub stats: WorkerUsage,
}

/// Aggregate returned by the stats operation
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct WorkerStatsReport {
    pub workers: Vec<WorkerStats>,
}
