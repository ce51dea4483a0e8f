//! Manager-specific error types

use shared::SharedError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("Worker pool {pool} does not exist")]
    UnknownPool { pool: String },

    #[error("Invalid pool configuration: {reason}")]
    InvalidPoolConfig { reason: String },

    #[error("Failed to spawn worker process {script}: {message}")]
    SpawnFailed { script: String, message: String },

    #[error("Worker pool manager is shut down")]
    Shutdown,

    #[error("Shared component error")]
    Shared(#[from] SharedError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ManagerResult<T> = Result<T, ManagerError>;
