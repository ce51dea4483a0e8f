//! OS-level memory ceiling for the worker process
//!
//! The manager passes `--memory-limit-mb <N>`; the worker caps its own
//! address space accordingly so runaway allocations die inside the child
//! instead of taking down the host.

/// Megabytes to an address-space byte limit
pub fn limit_bytes(limit_mb: u64) -> u64 {
    limit_mb.saturating_mul(1024 * 1024)
}

#[cfg(unix)]
pub fn apply_memory_limit(limit_mb: u64) -> std::io::Result<()> {
    use nix::sys::resource::{setrlimit, Resource};

    let bytes = limit_bytes(limit_mb);
    setrlimit(Resource::RLIMIT_AS, bytes, bytes).map_err(std::io::Error::from)
}

#[cfg(not(unix))]
pub fn apply_memory_limit(_limit_mb: u64) -> std::io::Result<()> {
    // No address-space cap on this platform; the flag is advisory only
    Ok(())
}
