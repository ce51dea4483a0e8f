//! Service implementations
//!
//! Production implementations of the manager's service traits: real process
//! spawning, sysinfo-backed resource probing, and uuid task ids.

pub mod ids;
pub mod probe;
pub mod spawner;

#[cfg(test)]
mod tests;

// Re-export all service implementations
pub use ids::UuidTaskIds;
pub use probe::SysinfoProbe;
pub use spawner::RealWorkerSpawner;
