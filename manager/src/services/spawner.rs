//! Worker process spawning service
//!
//! Launches the worker executable with piped stdio and wires four tasks per
//! child: a stdin writer fed by the handle's message channel, a stdout
//! reader that parses protocol replies, a stderr forwarder that relays the
//! child's log lines through tracing, and an exit watcher that reports the
//! final wait status.

use std::process::Stdio;

use async_trait::async_trait;
use shared::{process_debug, process_warn, ProcessId, ReplyMessage, TaskMessage};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::error::{ManagerError, ManagerResult};
use crate::handle::{ExitSummary, WorkerEvent};
use crate::traits::{SpawnSpec, SpawnedWorker, WorkerSpawner};

/// Capacity of the per-worker outbound message channel
const OUTBOX_CAPACITY: usize = 64;

/// Production spawner using `tokio::process`
pub struct RealWorkerSpawner {
    /// Additionally impose the memory ceiling from the parent side via
    /// `setrlimit(RLIMIT_AS)` before exec, for worker scripts that do not
    /// honor the `--memory-limit-mb` flag themselves
    enforce_address_space_limit: bool,
}

impl RealWorkerSpawner {
    pub fn new() -> Self {
        Self {
            enforce_address_space_limit: false,
        }
    }

    pub fn with_address_space_limit(mut self, enforce: bool) -> Self {
        self.enforce_address_space_limit = enforce;
        self
    }

    /// Assemble the child command line: the script plus its memory ceiling
    pub(crate) fn build_command(&self, spec: &SpawnSpec) -> Command {
        let mut cmd = Command::new(&spec.script);
        cmd.arg("--memory-limit-mb")
            .arg(spec.memory_limit_mb.to_string());
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        #[cfg(unix)]
        if self.enforce_address_space_limit {
            use nix::sys::resource::{setrlimit, Resource};
            let bytes = spec.memory_limit_mb.saturating_mul(1024 * 1024);
            // SAFETY: setrlimit is async-signal-safe and the closure
            // touches no allocator state
            unsafe {
                cmd.pre_exec(move || {
                    setrlimit(Resource::RLIMIT_AS, bytes, bytes).map_err(std::io::Error::from)
                });
            }
        }

        cmd
    }
}

impl Default for RealWorkerSpawner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkerSpawner for RealWorkerSpawner {
    async fn spawn(
        &self,
        spec: SpawnSpec,
        events: mpsc::Sender<WorkerEvent>,
    ) -> ManagerResult<SpawnedWorker> {
        let mut child = self.build_command(&spec).spawn().map_err(|e| {
            ManagerError::SpawnFailed {
                script: spec.script.clone(),
                message: e.to_string(),
            }
        })?;

        let pid = child.id().ok_or_else(|| ManagerError::SpawnFailed {
            script: spec.script.clone(),
            message: "child exited before pid could be read".to_string(),
        })?;

        let stdin = child.stdin.take().ok_or_else(|| ManagerError::SpawnFailed {
            script: spec.script.clone(),
            message: "child stdin was not piped".to_string(),
        })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ManagerError::SpawnFailed {
                script: spec.script.clone(),
                message: "child stdout was not piped".to_string(),
            })?;
        let stderr = child.stderr.take();

        // Writer: handle channel → child stdin
        let (outbox, mut outbox_rx) = mpsc::channel::<TaskMessage>(OUTBOX_CAPACITY);
        tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(message) = outbox_rx.recv().await {
                let line = match message.to_line() {
                    Ok(line) => line,
                    Err(e) => {
                        process_warn!(
                            ProcessId::current(),
                            "⚠️ Dropping unserializable message for worker pid {}: {}",
                            pid,
                            e
                        );
                        continue;
                    }
                };
                if stdin.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
            }
        });

        // Reader: child stdout → dispatcher events
        let worker_id = spec.worker_id;
        let message_events = events.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                match ReplyMessage::from_line(&line) {
                    Ok(reply) => {
                        if message_events
                            .send(WorkerEvent::Message { worker_id, reply })
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(e) => {
                        process_warn!(
                            ProcessId::current(),
                            "⚠️ Unparseable reply from worker pid {}: {}",
                            pid,
                            e
                        );
                    }
                }
            }
        });

        // Stderr forwarder: the child logs there because its stdout
        // carries the protocol
        if let Some(stderr) = stderr {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if line.trim().is_empty() {
                        continue;
                    }
                    tracing::debug!(worker_pid = pid, "{}", line);
                }
            });
        }

        // Exit watcher
        tokio::spawn(async move {
            let exit = match child.wait().await {
                Ok(status) => ExitSummary::from_status(status),
                Err(e) => {
                    process_warn!(
                        ProcessId::current(),
                        "⚠️ wait() failed for worker pid {}: {}",
                        pid,
                        e
                    );
                    ExitSummary {
                        code: None,
                        signal: None,
                    }
                }
            };
            let _ = events.send(WorkerEvent::Exited { worker_id, exit }).await;
        });

        process_debug!(
            ProcessId::current(),
            "🏭 Worker process pid {} spawned from {}",
            pid,
            spec.script
        );

        Ok(SpawnedWorker { pid, outbox })
    }
}
