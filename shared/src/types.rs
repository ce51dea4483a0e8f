//! Core shared types and identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use uuid::Uuid;

/// Global process ID singleton - set once at startup
static PROCESS_ID: OnceLock<ProcessId> = OnceLock::new();

/// Process identifier for any component in the system
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessId {
    /// Pool manager process (singleton)
    Manager,
    /// Worker child process, tagged with its OS pid
    Worker(u32),
    /// WebServer process (typically singleton)
    WebServer,
}

impl ProcessId {
    /// Initialize the global process ID for the manager
    pub fn init_manager() -> &'static ProcessId {
        PROCESS_ID.get_or_init(|| ProcessId::Manager)
    }

    /// Initialize the global process ID for a worker with its OS pid
    pub fn init_worker(pid: u32) -> &'static ProcessId {
        PROCESS_ID.get_or_init(|| ProcessId::Worker(pid))
    }

    /// Initialize the global process ID for the webserver
    pub fn init_webserver() -> &'static ProcessId {
        PROCESS_ID.get_or_init(|| ProcessId::WebServer)
    }

    /// Get the global process ID; falls back to `Manager` when no
    /// `init_*` has run (library tests)
    pub fn current() -> &'static ProcessId {
        PROCESS_ID.get_or_init(ProcessId::default)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessId::Manager => write!(f, "manager"),
            ProcessId::Worker(pid) => write!(f, "worker_{pid}"),
            ProcessId::WebServer => write!(f, "webserver"),
        }
    }
}

impl Default for ProcessId {
    fn default() -> Self {
        ProcessId::Manager
    }
}

/// Unique identifier for a submitted task, assigned by the manager
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Wrap an already-generated identifier
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Internal identifier for a worker handle
///
/// Distinct from the OS pid: pids can be recycled by the kernel while a
/// stale exit event for the old process is still in flight.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerId(Uuid);

impl WorkerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
