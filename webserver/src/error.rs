//! WebServer-specific error types

use manager::ManagerError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WebServerError {
    #[error("Manager error: {0}")]
    Manager(#[from] ManagerError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type WebServerResult<T> = Result<T, WebServerError>;
