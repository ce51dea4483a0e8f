//! Public control surface over the dispatcher actor

use std::sync::Mutex;
use std::time::Duration;

use serde_json::Value;
use shared::{
    process_info, ProcessId, ReplyMessage, TaskId, WorkerPoolConfig, WorkerStatsReport,
    DEFAULT_WORKER_MEMORY_LIMIT_MB,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::dispatcher::{Command, Dispatcher, TaskCallback};
use crate::error::{ManagerError, ManagerResult};
use crate::services::{RealWorkerSpawner, SysinfoProbe, UuidTaskIds};
use crate::traits::{ResourceProbe, TaskIdSource, WorkerSpawner};

/// Worker pool manager
///
/// An ordinary constructible value; the host application decides whether to
/// keep one or several. Cloning is not supported on purpose: the value owns
/// the dispatcher's command channel and the optional stats-logging task.
pub struct WorkerPoolManager {
    commands: mpsc::Sender<Command>,
    stats_logger: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerPoolManager {
    /// Create a manager with injected services and start its dispatcher
    pub fn new<S, P, I>(spawner: S, probe: P, ids: I) -> Self
    where
        S: WorkerSpawner + 'static,
        P: ResourceProbe + 'static,
        I: TaskIdSource + 'static,
    {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::channel(256);

        let dispatcher = Dispatcher::new(spawner, probe, ids, cmd_rx, event_rx, event_tx);
        tokio::spawn(dispatcher.run());

        Self {
            commands: cmd_tx,
            stats_logger: Mutex::new(None),
        }
    }

    /// Create a manager wired to the production services
    pub fn with_default_services() -> Self {
        Self::new(RealWorkerSpawner::new(), SysinfoProbe::new(), UuidTaskIds)
    }

    /// Initialize the configured pools. Malformed entries are logged and
    /// skipped; spawn failures are logged per worker.
    pub async fn init_worker_pools(&self, configs: Vec<WorkerPoolConfig>) -> ManagerResult<()> {
        let (ack, done) = oneshot::channel();
        self.send(Command::InitPools { configs, ack }).await?;
        done.await.map_err(|_| ManagerError::Shutdown)
    }

    /// Submit a task against a named pool
    ///
    /// The synchronous gate: an unknown pool is rejected with
    /// [`ManagerError::UnknownPool`] and the callback is never invoked.
    /// Otherwise the callback fires exactly once with the worker's reply
    /// (or a synthesized ERROR reply if the worker dies first).
    pub async fn execute_pool_worker_task(
        &self,
        data: Option<Value>,
        callback: impl FnOnce(ReplyMessage) + Send + 'static,
        pool_name: &str,
    ) -> ManagerResult<TaskId> {
        let (ack, outcome) = oneshot::channel();
        self.send(Command::SubmitPool {
            pool_name: pool_name.to_string(),
            data,
            callback: Box::new(callback) as TaskCallback,
            ack,
        })
        .await?;
        outcome.await.map_err(|_| ManagerError::Shutdown)?
    }

    /// Run a task on a fresh transient worker that serves exactly this one
    /// task and is then terminated. `memory_limit_mb` defaults to
    /// [`DEFAULT_WORKER_MEMORY_LIMIT_MB`].
    pub async fn execute_one_shot_worker_task(
        &self,
        worker_script: &str,
        data: Option<Value>,
        callback: impl FnOnce(ReplyMessage) + Send + 'static,
        memory_limit_mb: Option<u64>,
    ) -> ManagerResult<TaskId> {
        let (ack, outcome) = oneshot::channel();
        self.send(Command::SubmitOneShot {
            script: worker_script.to_string(),
            data,
            memory_limit_mb: memory_limit_mb.unwrap_or(DEFAULT_WORKER_MEMORY_LIMIT_MB),
            callback: Box::new(callback) as TaskCallback,
            ack,
        })
        .await?;
        outcome.await.map_err(|_| ManagerError::Shutdown)?
    }

    /// Resource usage and task accounting for the target workers (all
    /// workers when `pool_name` is `None`). Workers whose probe fails are
    /// excluded.
    pub async fn get_worker_stats(
        &self,
        pool_name: Option<&str>,
    ) -> ManagerResult<WorkerStatsReport> {
        let (reply, report) = oneshot::channel();
        self.send(Command::GetStats {
            pool_name: pool_name.map(str::to_string),
            reply,
        })
        .await?;
        report.await.map_err(|_| ManagerError::Shutdown)
    }

    /// Send TERMINATE to every worker in the target set (all pools when
    /// `pool_name` is `None`). Does not wait for the exits.
    pub async fn terminate_workers(&self, pool_name: Option<&str>) -> ManagerResult<()> {
        let (ack, done) = oneshot::channel();
        self.send(Command::Terminate {
            pool_name: pool_name.map(str::to_string),
            ack,
        })
        .await?;
        done.await.map_err(|_| ManagerError::Shutdown)
    }

    /// Start the periodic per-worker stats log (default interval 1000 ms)
    pub fn start_stats_logging(&self, interval: Duration) {
        let commands = self.commands.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;

                let (reply, report) = oneshot::channel();
                if commands
                    .send(Command::GetStats {
                        pool_name: None,
                        reply,
                    })
                    .await
                    .is_err()
                {
                    break;
                }
                let Ok(report) = report.await else { break };

                for worker in &report.workers {
                    process_info!(
                        ProcessId::current(),
                        "📊 worker pid {} pool='{}' running={} completed={} cpu={:.1}% mem={}B",
                        worker.pid,
                        worker.pool_name,
                        worker.running_tasks,
                        worker.jobs_completed,
                        worker.stats.cpu,
                        worker.stats.memory
                    );
                }
            }
        });

        let mut slot = self.stats_logger.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = slot.replace(task) {
            previous.abort();
        }
    }

    /// Stop the dispatcher. Pending commands already queued are dropped;
    /// workers see their stdin close and exit on their own.
    pub async fn shutdown(&self) {
        if let Some(task) = self
            .stats_logger
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            task.abort();
        }
        let _ = self.commands.send(Command::Shutdown).await;
    }

    async fn send(&self, command: Command) -> ManagerResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ManagerError::Shutdown)
    }
}
