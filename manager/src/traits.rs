//! Service traits for dependency injection
//!
//! The pluggable seams of the manager: process spawning, OS-level resource
//! sampling, and task id generation. Each trait is mockable for testing.

use async_trait::async_trait;
use tokio::sync::mpsc;

use shared::{TaskId, TaskMessage, WorkerId, WorkerUsage};

use crate::error::ManagerResult;
use crate::handle::{PoolAssignment, WorkerEvent};

/// Everything needed to launch one worker process
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    pub worker_id: WorkerId,
    /// Path to the worker executable
    pub script: String,
    pub assignment: PoolAssignment,
    /// Memory ceiling in megabytes, passed to the child as
    /// `--memory-limit-mb`
    pub memory_limit_mb: u64,
}

/// Result of a successful spawn: the child's pid and the write side of
/// its message channel. Replies and the exit event arrive on the event
/// channel handed to [`WorkerSpawner::spawn`].
#[derive(Debug)]
pub struct SpawnedWorker {
    pub pid: u32,
    pub outbox: mpsc::Sender<TaskMessage>,
}

/// Worker process launching service
#[mockall::automock]
#[async_trait]
pub trait WorkerSpawner: Send + Sync {
    /// Spawn a worker process and wire its IO to `events`
    async fn spawn(
        &self,
        spec: SpawnSpec,
        events: mpsc::Sender<WorkerEvent>,
    ) -> ManagerResult<SpawnedWorker>;
}

/// OS-level resource usage sampling service
#[mockall::automock]
#[async_trait]
pub trait ResourceProbe: Send + Sync {
    /// Sample CPU and memory for a pid; `None` means the probe failed and
    /// the worker is skipped in stats
    async fn sample(&self, pid: u32) -> Option<WorkerUsage>;
}

/// Task id generation service
#[mockall::automock]
pub trait TaskIdSource: Send + Sync {
    /// A fresh unique task id; assigned by the manager, never by callers
    fn next_id(&self) -> TaskId;
}
