//! Worker child process library
//!
//! Implements the child side of the pool protocol: a single inbound
//! message loop over stdin/stdout plus a set of example workloads. The
//! manager spawns this binary with `--memory-limit-mb <N>`; the limit is
//! applied via an OS-level address-space cap at startup.

pub mod error;
pub mod limits;
pub mod runtime;
pub mod workloads;

pub use error::{WorkerError, WorkerResult};
pub use runtime::{serve, WorkloadRunner};
pub use workloads::DefaultWorkloads;
