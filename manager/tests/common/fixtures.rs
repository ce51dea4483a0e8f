//! Scripted in-process worker spawner
//!
//! Emulates protocol-honoring child processes as tokio tasks wired to the
//! same channels the real spawner uses, so dispatcher behavior can be
//! exercised deterministically without real subprocesses.
//!
//! The emulated worker understands WORK payloads of the shape
//! `{"label": "...", "durationMs": 100, "fail": false}` and echoes the
//! payload, its label, and its pid back in the WORK_DONE data.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};

use manager::{
    ExitSummary, ManagerResult, SpawnSpec, SpawnedWorker, WorkerEvent, WorkerSpawner,
};
use shared::{MessageType, ReplyMessage, TaskMessage, WorkerId};

/// First pid handed out by the fake spawner
pub const FIRST_FAKE_PID: u32 = 1000;

/// Spawner whose "processes" are tokio tasks speaking the wire protocol
///
/// Clones share state, so tests keep one clone for control (`kill_pid`,
/// `spawned`) after handing another to the manager.
#[derive(Clone)]
pub struct FakeWorkerSpawner {
    next_pid: Arc<AtomicU32>,
    spawns: Arc<Mutex<Vec<SpawnSpec>>>,
    kill_switches: Arc<Mutex<HashMap<u32, oneshot::Sender<()>>>>,
}

impl FakeWorkerSpawner {
    pub fn new() -> Self {
        Self {
            next_pid: Arc::new(AtomicU32::new(FIRST_FAKE_PID)),
            spawns: Arc::new(Mutex::new(Vec::new())),
            kill_switches: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Every spawn spec seen so far, in spawn order
    pub fn spawned(&self) -> Vec<SpawnSpec> {
        self.spawns.lock().unwrap().clone()
    }

    pub fn spawn_count(&self) -> usize {
        self.spawns.lock().unwrap().len()
    }

    /// Simulate a SIGKILL of the given emulated worker. Any task it is
    /// busy with never gets a reply; the exit event reports signal 9.
    pub fn kill_pid(&self, pid: u32) -> bool {
        match self.kill_switches.lock().unwrap().remove(&pid) {
            Some(switch) => switch.send(()).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl WorkerSpawner for FakeWorkerSpawner {
    async fn spawn(
        &self,
        spec: SpawnSpec,
        events: mpsc::Sender<WorkerEvent>,
    ) -> ManagerResult<SpawnedWorker> {
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        self.spawns.lock().unwrap().push(spec.clone());

        let (kill_tx, kill_rx) = oneshot::channel();
        self.kill_switches.lock().unwrap().insert(pid, kill_tx);

        let (outbox, outbox_rx) = mpsc::channel(64);
        tokio::spawn(emulate_worker(spec.worker_id, pid, outbox_rx, events, kill_rx));

        Ok(SpawnedWorker { pid, outbox })
    }
}

#[derive(Default)]
struct WorkOrder {
    label: Option<String>,
    duration_ms: u64,
    fail: bool,
}

fn parse_order(data: Option<&Value>) -> WorkOrder {
    let Some(data) = data else {
        return WorkOrder::default();
    };
    WorkOrder {
        label: data["label"].as_str().map(str::to_string),
        duration_ms: data["durationMs"].as_u64().unwrap_or(0),
        fail: data["fail"].as_bool().unwrap_or(false),
    }
}

/// One emulated child: serial task processing, killable at any point
async fn emulate_worker(
    worker_id: WorkerId,
    pid: u32,
    mut inbox: mpsc::Receiver<TaskMessage>,
    events: mpsc::Sender<WorkerEvent>,
    mut kill: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut kill => {
                let _ = events
                    .send(WorkerEvent::Exited { worker_id, exit: ExitSummary::killed(9) })
                    .await;
                return;
            }
            message = inbox.recv() => {
                let Some(message) = message else {
                    // Manager dropped the handle; vanish silently
                    return;
                };
                match message.kind {
                    MessageType::Init => {
                        if let Some(id) = message.id {
                            let _ = events
                                .send(WorkerEvent::Message {
                                    worker_id,
                                    reply: ReplyMessage::init_done(id, pid),
                                })
                                .await;
                        }
                    }
                    MessageType::Work => {
                        let Some(id) = message.id else { continue };
                        let order = parse_order(message.data.as_ref());

                        // Busy interval; stays killable while "working"
                        if order.duration_ms > 0 {
                            tokio::select! {
                                _ = &mut kill => {
                                    let _ = events
                                        .send(WorkerEvent::Exited {
                                            worker_id,
                                            exit: ExitSummary::killed(9),
                                        })
                                        .await;
                                    return;
                                }
                                _ = tokio::time::sleep(Duration::from_millis(order.duration_ms)) => {}
                            }
                        }

                        let reply = if order.fail {
                            ReplyMessage::error(id, "workload failed")
                        } else {
                            ReplyMessage::work_done(
                                id,
                                json!({
                                    "label": order.label,
                                    "pid": pid,
                                    "echo": message.data,
                                }),
                            )
                        };
                        let _ = events.send(WorkerEvent::Message { worker_id, reply }).await;
                    }
                    MessageType::Terminate => {
                        let _ = events
                            .send(WorkerEvent::Exited { worker_id, exit: ExitSummary::clean() })
                            .await;
                        return;
                    }
                    _ => {}
                }
            }
        }
    }
}
