//! Parent ↔ child wire protocol
//!
//! Messages are JSON-serialized and newline-delimited over the child's
//! stdin/stdout pipes. The manager writes `TaskMessage` lines; the child
//! answers with `ReplyMessage` lines, echoing the request id.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{SharedError, SharedResult};
use crate::types::TaskId;

/// Closed set of message type tags shared by both directions
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageType {
    #[serde(rename = "INIT")]
    Init,
    #[serde(rename = "INIT_DONE")]
    InitDone,
    #[serde(rename = "WORK")]
    Work,
    #[serde(rename = "WORK_DONE")]
    WorkDone,
    #[serde(rename = "TERMINATE")]
    Terminate,
    #[serde(rename = "ERROR")]
    Error,
}

/// Message from the manager to a worker process
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TaskMessage {
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<TaskId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(rename = "poolName", skip_serializing_if = "Option::is_none")]
    pub pool_name: Option<String>,
}

impl TaskMessage {
    /// One-time setup request, sent right after spawning a pool worker
    pub fn init(id: TaskId) -> Self {
        Self {
            kind: MessageType::Init,
            id: Some(id),
            data: None,
            pool_name: None,
        }
    }

    /// Workload dispatch carrying the caller's opaque payload
    pub fn work(id: TaskId, data: Option<Value>, pool_name: Option<String>) -> Self {
        Self {
            kind: MessageType::Work,
            id: Some(id),
            data,
            pool_name,
        }
    }

    /// Shutdown request; the child exits without replying
    pub fn terminate() -> Self {
        Self {
            kind: MessageType::Terminate,
            id: None,
            data: None,
            pool_name: None,
        }
    }

    /// Serialize to a JSON line (with trailing newline)
    pub fn to_line(&self) -> SharedResult<String> {
        let mut json =
            serde_json::to_string(self).map_err(|e| SharedError::SerializationError {
                message: format!("task message: {e}"),
            })?;
        json.push('\n');
        Ok(json)
    }

    /// Deserialize from a JSON line
    pub fn from_line(line: &str) -> SharedResult<Self> {
        serde_json::from_str(line.trim()).map_err(|e| SharedError::DeserializationError {
            message: format!("task message: {e}"),
        })
    }
}

/// Message from a worker process back to the manager
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ReplyMessage {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub id: TaskId,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ReplyMessage {
    /// Setup acknowledgment carrying the worker's OS pid
    pub fn init_done(id: TaskId, pid: u32) -> Self {
        Self {
            kind: MessageType::InitDone,
            id,
            ok: true,
            data: Some(serde_json::json!({ "pid": pid })),
        }
    }

    /// Successful workload completion with its result payload
    pub fn work_done(id: TaskId, data: Value) -> Self {
        Self {
            kind: MessageType::WorkDone,
            id,
            ok: true,
            data: Some(data),
        }
    }

    /// Failure report for a specific task
    pub fn error(id: TaskId, message: impl Into<String>) -> Self {
        Self {
            kind: MessageType::Error,
            id,
            ok: false,
            data: Some(Value::String(message.into())),
        }
    }

    /// Serialize to a JSON line (with trailing newline)
    pub fn to_line(&self) -> SharedResult<String> {
        let mut json =
            serde_json::to_string(self).map_err(|e| SharedError::SerializationError {
                message: format!("reply message: {e}"),
            })?;
        json.push('\n');
        Ok(json)
    }

    /// Deserialize from a JSON line
    pub fn from_line(line: &str) -> SharedResult<Self> {
        serde_json::from_str(line.trim()).map_err(|e| SharedError::DeserializationError {
            message: format!("reply message: {e}"),
        })
    }
}
