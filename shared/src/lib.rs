//! Shared types and messages for the worker pool system
//!
//! This crate provides the core types and message definitions used for
//! communication between the pool manager, worker processes, and webserver.

pub mod errors;
pub mod logging;
pub mod messages;
pub mod types;

// Re-export commonly used types
pub use errors::{SharedError, SharedResult};
pub use types::{ProcessId, TaskId, WorkerId};

// Re-export message types
pub use messages::{
    config::{ManagerSettings, WorkerPoolConfig, DEFAULT_WORKER_MEMORY_LIMIT_MB},
    protocol::{MessageType, ReplyMessage, TaskMessage},
    stats::{WorkerStats, WorkerStatsReport, WorkerUsage},
};
