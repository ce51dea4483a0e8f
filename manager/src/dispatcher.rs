//! Pool registry and dispatcher actor
//!
//! A single task owns every piece of mutable registry state: the per-pool
//! worker sets, the global worker map, the pending FIFO, the callbacks map,
//! and the worker → in-flight-task reverse index. Callers talk to it over a
//! command channel; per-worker IO tasks funnel replies and exit events into
//! it over an event channel. Mutations therefore serialize without locks.

use std::collections::{HashMap, HashSet, VecDeque};

use futures_util::future::join_all;
use serde_json::Value;
use shared::{
    process_debug, process_info, process_warn, MessageType, ProcessId, ReplyMessage, TaskId,
    TaskMessage, WorkerId, WorkerPoolConfig, WorkerStats, WorkerStatsReport,
};
use tokio::sync::{mpsc, oneshot};

use crate::error::{ManagerError, ManagerResult};
use crate::handle::{ExitSummary, PoolAssignment, WorkerEvent, WorkerHandle, WorkerState};
use crate::traits::{ResourceProbe, SpawnSpec, TaskIdSource, WorkerSpawner};

/// Caller-supplied completion callback, invoked exactly once with the
/// worker's reply (or a synthesized ERROR reply)
pub type TaskCallback = Box<dyn FnOnce(ReplyMessage) + Send + 'static>;

/// Commands accepted by the dispatcher actor
pub(crate) enum Command {
    InitPools {
        configs: Vec<WorkerPoolConfig>,
        ack: oneshot::Sender<()>,
    },
    SubmitPool {
        pool_name: String,
        data: Option<Value>,
        callback: TaskCallback,
        ack: oneshot::Sender<ManagerResult<TaskId>>,
    },
    SubmitOneShot {
        script: String,
        data: Option<Value>,
        memory_limit_mb: u64,
        callback: TaskCallback,
        ack: oneshot::Sender<ManagerResult<TaskId>>,
    },
    GetStats {
        pool_name: Option<String>,
        reply: oneshot::Sender<WorkerStatsReport>,
    },
    Terminate {
        pool_name: Option<String>,
        ack: oneshot::Sender<()>,
    },
    Shutdown,
}

/// A submitted task waiting for dispatch. While queued it owns its
/// callback; on dispatch the callback moves to the callbacks map, so every
/// in-flight task id lives in exactly one of the two places.
struct QueuedTask {
    id: TaskId,
    pool_name: String,
    data: Option<Value>,
    callback: TaskCallback,
}

pub(crate) struct Dispatcher<S, P, I> {
    spawner: S,
    probe: P,
    ids: I,

    /// Pool tag → member worker ids, in spawn order
    pools: HashMap<String, Vec<WorkerId>>,
    /// Union of all live workers, pool and one-shot alike
    workers: HashMap<WorkerId, WorkerHandle>,
    /// Global FIFO of tasks not yet bound to a worker
    pending: VecDeque<QueuedTask>,
    /// Task id → waiting callback, for dispatched tasks
    callbacks: HashMap<TaskId, TaskCallback>,
    /// Worker → ids of its in-flight tasks; consulted on exit to resolve
    /// dangling callbacks
    owned: HashMap<WorkerId, HashSet<TaskId>>,

    commands: mpsc::Receiver<Command>,
    events_rx: mpsc::Receiver<WorkerEvent>,
    events_tx: mpsc::Sender<WorkerEvent>,
}

impl<S, P, I> Dispatcher<S, P, I>
where
    S: WorkerSpawner,
    P: ResourceProbe,
    I: TaskIdSource,
{
    pub(crate) fn new(
        spawner: S,
        probe: P,
        ids: I,
        commands: mpsc::Receiver<Command>,
        events_rx: mpsc::Receiver<WorkerEvent>,
        events_tx: mpsc::Sender<WorkerEvent>,
    ) -> Self {
        Self {
            spawner,
            probe,
            ids,
            pools: HashMap::new(),
            workers: HashMap::new(),
            pending: VecDeque::new(),
            callbacks: HashMap::new(),
            owned: HashMap::new(),
            commands,
            events_rx,
            events_tx,
        }
    }

    /// Main event loop: demultiplexes caller commands and worker events
    pub(crate) async fn run(mut self) {
        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Shutdown) | None => break,
                    Some(cmd) => self.handle_command(cmd).await,
                },
                Some(event) = self.events_rx.recv() => self.handle_event(event).await,
            }
        }
        process_debug!(ProcessId::current(), "🛑 Dispatcher stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::InitPools { configs, ack } => {
                self.init_pools(configs).await;
                let _ = ack.send(());
            }
            Command::SubmitPool {
                pool_name,
                data,
                callback,
                ack,
            } => {
                let _ = ack.send(self.submit_pool_task(pool_name, data, callback).await);
            }
            Command::SubmitOneShot {
                script,
                data,
                memory_limit_mb,
                callback,
                ack,
            } => {
                let _ = ack.send(
                    self.submit_one_shot_task(script, data, memory_limit_mb, callback)
                        .await,
                );
            }
            Command::GetStats { pool_name, reply } => {
                let _ = reply.send(self.collect_stats(pool_name.as_deref()).await);
            }
            Command::Terminate { pool_name, ack } => {
                self.terminate(pool_name.as_deref()).await;
                let _ = ack.send(());
            }
            // Consumed by the run loop
            Command::Shutdown => {}
        }
    }

    /// Register and populate the configured pools. Malformed entries are
    /// logged and skipped; duplicate pool names are last-wins.
    async fn init_pools(&mut self, configs: Vec<WorkerPoolConfig>) {
        for config in configs {
            if config.pool_name.is_empty() || config.worker_script.is_empty() {
                process_warn!(
                    ProcessId::current(),
                    "⚠️ Skipping pool config with missing poolName or workerScript: {:?}",
                    config
                );
                continue;
            }

            self.pools.insert(config.pool_name.clone(), Vec::new());

            for _ in 0..config.worker_count {
                if let Err(e) = self
                    .spawn_worker(
                        PoolAssignment::Pool(config.pool_name.clone()),
                        &config.worker_script,
                        config.worker_memory_limit,
                        true,
                    )
                    .await
                {
                    process_warn!(
                        ProcessId::current(),
                        "❌ Failed to spawn worker for pool '{}': {}",
                        config.pool_name,
                        e
                    );
                }
            }

            process_info!(
                ProcessId::current(),
                "🏊 Pool '{}' initialized with {} worker(s) ({} MB each)",
                config.pool_name,
                self.pools
                    .get(&config.pool_name)
                    .map(Vec::len)
                    .unwrap_or(0),
                config.worker_memory_limit
            );
        }
    }

    /// Spawn one worker, register it in the indices, and (for pool
    /// workers) send the INIT handshake
    async fn spawn_worker(
        &mut self,
        assignment: PoolAssignment,
        script: &str,
        memory_limit_mb: u64,
        send_init: bool,
    ) -> ManagerResult<WorkerId> {
        let worker_id = WorkerId::new();
        let spec = SpawnSpec {
            worker_id,
            script: script.to_string(),
            assignment: assignment.clone(),
            memory_limit_mb,
        };
        let spawned = self.spawner.spawn(spec, self.events_tx.clone()).await?;

        let handle = WorkerHandle::new(
            worker_id,
            spawned.pid,
            assignment.clone(),
            script,
            memory_limit_mb,
            spawned.outbox,
        );

        if send_init {
            let init = TaskMessage::init(self.ids.next_id());
            if !handle.send(init).await {
                process_warn!(
                    ProcessId::current(),
                    "⚠️ Worker {} (pid {}) channel closed before INIT",
                    worker_id,
                    spawned.pid
                );
            }
        }

        if let Some(pool) = assignment.pool_name() {
            if let Some(members) = self.pools.get_mut(pool) {
                members.push(worker_id);
            }
        }
        self.owned.insert(worker_id, HashSet::new());
        self.workers.insert(worker_id, handle);

        process_debug!(
            ProcessId::current(),
            "🏭 Spawned worker pid {} for '{}'",
            spawned.pid,
            assignment
        );

        Ok(worker_id)
    }

    /// Synchronous gate plus enqueue-and-dispatch for pool submissions
    async fn submit_pool_task(
        &mut self,
        pool_name: String,
        data: Option<Value>,
        callback: TaskCallback,
    ) -> ManagerResult<TaskId> {
        if !self.pools.contains_key(&pool_name) {
            // Rejected synchronously; the callback is never invoked
            return Err(ManagerError::UnknownPool { pool: pool_name });
        }

        let id = self.ids.next_id();
        self.pending.push_back(QueuedTask {
            id: id.clone(),
            pool_name,
            data,
            callback,
        });
        self.process_next_task().await;

        Ok(id)
    }

    /// Dispatch policy: pop the queue head, pick the least-loaded worker
    /// in the task's pool, bind the callback, and send WORK. One task per
    /// invocation; completions call back in to drain the queue.
    async fn process_next_task(&mut self) {
        let Some(task) = self.pending.pop_front() else {
            return;
        };

        let members = match self.pools.get(&task.pool_name) {
            Some(members) => members,
            None => {
                // Reachable only after a config change raced the queue;
                // never dispatch to some other pool
                let pool = task.pool_name.clone();
                self.fail_task(task, format!("Worker pool {pool} does not exist"));
                return;
            }
        };

        // Least-loaded selection, ties broken by encounter order
        // (strict `<` keeps the first-seen minimum)
        let mut chosen: Option<WorkerId> = None;
        let mut lowest = usize::MAX;
        for worker_id in members {
            if let Some(handle) = self.workers.get(worker_id) {
                if handle.running_tasks < lowest {
                    lowest = handle.running_tasks;
                    chosen = Some(*worker_id);
                }
            }
        }

        let Some(worker_id) = chosen else {
            let pool = task.pool_name.clone();
            self.fail_task(task, format!("no workers available in pool '{pool}'"));
            return;
        };

        let message = TaskMessage::work(
            task.id.clone(),
            task.data.clone(),
            Some(task.pool_name.clone()),
        );

        self.callbacks.insert(task.id.clone(), task.callback);
        if let Some(owned) = self.owned.get_mut(&worker_id) {
            owned.insert(task.id.clone());
        }

        if let Some(handle) = self.workers.get_mut(&worker_id) {
            handle.running_tasks += 1;
            if !handle.send(message).await {
                // Writer task is gone; the exit event will synthesize an
                // ERROR reply for this task shortly
                process_warn!(
                    ProcessId::current(),
                    "⚠️ Failed to send task {} to worker pid {}",
                    task.id,
                    handle.pid
                );
            } else {
                process_debug!(
                    ProcessId::current(),
                    "📤 Task {} dispatched to worker pid {} (pool '{}', {} running)",
                    task.id,
                    handle.pid,
                    task.pool_name,
                    handle.running_tasks
                );
            }
        }
    }

    /// Resolve a task that cannot be dispatched with a synthesized ERROR
    /// reply instead of leaving its caller hanging
    fn fail_task(&self, task: QueuedTask, message: String) {
        process_warn!(
            ProcessId::current(),
            "❌ Dropping task {} for pool '{}': {}",
            task.id,
            task.pool_name,
            message
        );
        (task.callback)(ReplyMessage::error(task.id, message));
    }

    /// Spawn a transient worker for exactly one task. The INIT handshake
    /// is skipped; the reply handler terminates the worker after its
    /// single completion.
    async fn submit_one_shot_task(
        &mut self,
        script: String,
        data: Option<Value>,
        memory_limit_mb: u64,
        callback: TaskCallback,
    ) -> ManagerResult<TaskId> {
        let worker_id = self
            .spawn_worker(PoolAssignment::OneShot, &script, memory_limit_mb, false)
            .await?;

        let id = self.ids.next_id();
        self.callbacks.insert(id.clone(), callback);
        if let Some(owned) = self.owned.get_mut(&worker_id) {
            owned.insert(id.clone());
        }

        if let Some(handle) = self.workers.get_mut(&worker_id) {
            handle.running_tasks += 1;
            let message = TaskMessage::work(id.clone(), data, None);
            if !handle.send(message).await {
                process_warn!(
                    ProcessId::current(),
                    "⚠️ Failed to send one-shot task {} to worker pid {}",
                    id,
                    handle.pid
                );
            }
        }

        Ok(id)
    }

    async fn handle_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Message { worker_id, reply } => {
                self.handle_worker_message(worker_id, reply).await;
            }
            WorkerEvent::Exited { worker_id, exit } => {
                self.handle_worker_exit(worker_id, exit).await;
            }
        }
    }

    async fn handle_worker_message(&mut self, worker_id: WorkerId, reply: ReplyMessage) {
        match reply.kind {
            MessageType::InitDone => {
                if let Some(handle) = self.workers.get_mut(&worker_id) {
                    handle.state = WorkerState::Ready;
                    process_info!(
                        ProcessId::current(),
                        "✅ Worker pid {} ready in '{}'",
                        handle.pid,
                        handle.assignment
                    );
                }
            }
            MessageType::WorkDone | MessageType::Error => {
                let was_owned = self
                    .owned
                    .get_mut(&worker_id)
                    .map(|owned| owned.remove(&reply.id))
                    .unwrap_or(false);

                let mut terminate_one_shot = false;
                if let Some(handle) = self.workers.get_mut(&worker_id) {
                    if was_owned {
                        handle.running_tasks = handle.running_tasks.saturating_sub(1);
                        handle.jobs_completed += 1;
                        terminate_one_shot = handle.assignment.is_one_shot();
                    }
                }

                if let Some(callback) = self.callbacks.remove(&reply.id) {
                    callback(reply);
                }

                if terminate_one_shot {
                    if let Some(handle) = self.workers.get(&worker_id) {
                        handle.send(TaskMessage::terminate()).await;
                        process_debug!(
                            ProcessId::current(),
                            "🛑 One-shot worker pid {} done, terminating",
                            handle.pid
                        );
                    }
                }

                // A slot may have freed up; drain the queue
                self.process_next_task().await;
            }
            // INIT, WORK, TERMINATE are parent→child only; ignore echoes
            _ => {}
        }
    }

    /// Exit handling: deregister, resolve dangling callbacks with a
    /// synthetic ERROR reply, and respawn pool workers after abnormal
    /// exits with their original script and memory limit
    async fn handle_worker_exit(&mut self, worker_id: WorkerId, exit: ExitSummary) {
        let Some(mut handle) = self.workers.remove(&worker_id) else {
            return;
        };
        handle.state = WorkerState::Exited;

        if let Some(pool) = handle.assignment.pool_name() {
            if let Some(members) = self.pools.get_mut(pool) {
                members.retain(|id| *id != worker_id);
            }
        }

        process_warn!(
            ProcessId::current(),
            "💀 Worker pid {} ({}) {} [code={:?} signal={:?}]",
            handle.pid,
            handle.assignment,
            exit,
            exit.code,
            exit.signal
        );

        // A task can never complete once its worker is gone; resolve every
        // dangling callback so callers hear back exactly once
        if let Some(dangling) = self.owned.remove(&worker_id) {
            for task_id in dangling {
                if let Some(callback) = self.callbacks.remove(&task_id) {
                    callback(ReplyMessage::error(task_id, "worker exited unexpectedly"));
                }
            }
        }

        if exit.is_abnormal() && !handle.assignment.is_one_shot() {
            process_info!(
                ProcessId::current(),
                "🔄 Respawning replacement for worker pid {} in pool '{}'",
                handle.pid,
                handle.assignment
            );
            let assignment = handle.assignment.clone();
            match self
                .spawn_worker(assignment, &handle.script, handle.memory_limit_mb, true)
                .await
            {
                Ok(replacement_id) => {
                    if let Some(replacement) = self.workers.get_mut(&replacement_id) {
                        replacement.restarts = handle.restarts + 1;
                    }
                }
                Err(e) => {
                    process_warn!(
                        ProcessId::current(),
                        "❌ Failed to respawn worker for pool '{}': {}",
                        handle.assignment,
                        e
                    );
                }
            }
        }

        // Capacity changed either way; try to drain
        self.process_next_task().await;
    }

    /// Send TERMINATE to every worker in the target set. Does not wait
    /// for exits; they are observed and logged by the exit handler.
    async fn terminate(&mut self, pool_name: Option<&str>) {
        let targets: Vec<WorkerId> = match pool_name {
            Some(pool) => self.pools.get(pool).cloned().unwrap_or_default(),
            None => self.workers.keys().copied().collect(),
        };

        process_info!(
            ProcessId::current(),
            "🛑 Terminating {} worker(s){}",
            targets.len(),
            pool_name
                .map(|p| format!(" in pool '{p}'"))
                .unwrap_or_default()
        );

        for worker_id in targets {
            if let Some(handle) = self.workers.get(&worker_id) {
                handle.send(TaskMessage::terminate()).await;
            }
        }
    }

    /// Concurrently probe resource usage for the target workers; workers
    /// whose probe fails are skipped
    async fn collect_stats(&mut self, pool_name: Option<&str>) -> WorkerStatsReport {
        let snapshot: Vec<(&WorkerHandle, u32)> = self
            .workers
            .values()
            .filter(|handle| match pool_name {
                Some(pool) => handle.assignment.pool_name() == Some(pool),
                None => true,
            })
            .map(|handle| (handle, handle.pid))
            .collect();

        let samples = join_all(snapshot.iter().map(|(_, pid)| self.probe.sample(*pid))).await;

        let workers = snapshot
            .into_iter()
            .zip(samples)
            .filter_map(|((handle, pid), sample)| {
                sample.map(|stats| WorkerStats {
                    pool_name: handle.assignment.name().to_string(),
                    pid,
                    running_tasks: handle.running_tasks,
                    jobs_completed: handle.jobs_completed,
                    restarts: handle.restarts,
                    stats,
                })
            })
            .collect();

        WorkerStatsReport { workers }
    }
}
