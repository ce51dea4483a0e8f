//! Bookkeeping for a single live worker process

use std::fmt;

use shared::{ReplyMessage, TaskMessage, WorkerId};
use tokio::sync::mpsc;

/// Where a worker belongs: a named pool, or nowhere (one-shot)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolAssignment {
    Pool(String),
    OneShot,
}

impl PoolAssignment {
    /// Pool tag as reported in stats and logs
    pub fn name(&self) -> &str {
        match self {
            PoolAssignment::Pool(name) => name,
            PoolAssignment::OneShot => "one-shot",
        }
    }

    pub fn pool_name(&self) -> Option<&str> {
        match self {
            PoolAssignment::Pool(name) => Some(name),
            PoolAssignment::OneShot => None,
        }
    }

    pub fn is_one_shot(&self) -> bool {
        matches!(self, PoolAssignment::OneShot)
    }
}

impl fmt::Display for PoolAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Lifecycle state of a worker handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Spawned, INIT sent, INIT_DONE not yet received. Dispatch is still
    /// permitted: the inbound pipe is buffered and INIT_DONE has no
    /// prerequisite.
    Starting,
    Ready,
    Exited,
}

/// How a worker process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitSummary {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ExitSummary {
    pub fn clean() -> Self {
        Self {
            code: Some(0),
            signal: None,
        }
    }

    pub fn failed(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    pub fn killed(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }

    /// Anything but a zero exit code counts as abnormal, including
    /// signal-terminated processes (no code at all)
    pub fn is_abnormal(&self) -> bool {
        self.code != Some(0)
    }

    pub fn from_status(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

impl fmt::Display for ExitSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exited with code {code}"),
            // SIGKILL with no exit code is almost always the OOM killer
            (None, Some(9)) => write!(f, "killed by signal 9 (likely out of memory)"),
            (None, Some(signal)) => write!(f, "killed by signal {signal}"),
            (None, None) => write!(f, "exited for unknown reason"),
        }
    }
}

/// Event funneled from per-worker IO tasks into the dispatcher
#[derive(Debug)]
pub enum WorkerEvent {
    /// The worker wrote a protocol reply on its stdout
    Message {
        worker_id: WorkerId,
        reply: ReplyMessage,
    },
    /// The worker process exited
    Exited {
        worker_id: WorkerId,
        exit: ExitSummary,
    },
}

/// One live worker process, mutated only by the dispatcher
#[derive(Debug)]
pub struct WorkerHandle {
    pub id: WorkerId,
    pub pid: u32,
    pub assignment: PoolAssignment,
    pub script: String,
    pub memory_limit_mb: u64,
    pub running_tasks: usize,
    pub jobs_completed: u64,
    /// How many crashed predecessors this handle replaces
    pub restarts: u64,
    pub state: WorkerState,
    outbox: mpsc::Sender<TaskMessage>,
}

impl WorkerHandle {
    pub fn new(
        id: WorkerId,
        pid: u32,
        assignment: PoolAssignment,
        script: impl Into<String>,
        memory_limit_mb: u64,
        outbox: mpsc::Sender<TaskMessage>,
    ) -> Self {
        Self {
            id,
            pid,
            assignment,
            script: script.into(),
            memory_limit_mb,
            running_tasks: 0,
            jobs_completed: 0,
            restarts: 0,
            state: WorkerState::Starting,
            outbox,
        }
    }

    /// Best-effort send over the worker's stdin channel. A `false` return
    /// means the writer task is gone; the exit event will clean up any
    /// in-flight tasks shortly after.
    pub async fn send(&self, message: TaskMessage) -> bool {
        self.outbox.send(message).await.is_ok()
    }
}
