//! Resource usage probing via sysinfo

use async_trait::async_trait;
use shared::WorkerUsage;
use sysinfo::{Pid, PidExt, ProcessExt, System, SystemExt};
use tokio::sync::Mutex;

use crate::traits::ResourceProbe;

/// Samples per-process CPU and memory through the `sysinfo` crate
///
/// The `System` handle is kept behind a mutex so repeated samples of the
/// same pid reuse the previous refresh (CPU percentages need a prior
/// observation to be meaningful).
pub struct SysinfoProbe {
    system: Mutex<System>,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceProbe for SysinfoProbe {
    async fn sample(&self, pid: u32) -> Option<WorkerUsage> {
        let mut system = self.system.lock().await;
        let pid = Pid::from_u32(pid);
        if !system.refresh_process(pid) {
            return None;
        }
        let process = system.process(pid)?;
        Some(WorkerUsage {
            cpu: process.cpu_usage(),
            memory: process.memory(),
        })
    }
}
