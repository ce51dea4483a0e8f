//! Helpers shared by the dispatcher test suites

use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::timeout;

use manager::services::UuidTaskIds;
use manager::traits::MockResourceProbe;
use manager::WorkerPoolManager;
use shared::{ReplyMessage, WorkerPoolConfig, WorkerUsage};

use super::fixtures::FakeWorkerSpawner;

/// Fixed usage reported by the mocked probe
pub const PROBED_CPU: f32 = 7.5;
pub const PROBED_MEMORY: u64 = 64 * 1024 * 1024;

/// Manager wired to the scripted spawner plus an always-succeeding probe
pub fn manager_with(spawner: &FakeWorkerSpawner) -> WorkerPoolManager {
    let mut probe = MockResourceProbe::new();
    probe.expect_sample().returning(|_pid| {
        Some(WorkerUsage {
            cpu: PROBED_CPU,
            memory: PROBED_MEMORY,
        })
    });
    WorkerPoolManager::new(spawner.clone(), probe, UuidTaskIds)
}

/// One-pool manager, ready for submissions
pub async fn pool_manager(
    spawner: &FakeWorkerSpawner,
    pool_name: &str,
    worker_count: u32,
) -> WorkerPoolManager {
    let manager = manager_with(spawner);
    manager
        .init_worker_pools(vec![
            WorkerPoolConfig::new(pool_name, "./fake-worker").with_worker_count(worker_count),
        ])
        .await
        .expect("init_worker_pools should succeed");
    manager
}

/// Channel-backed callback: each invocation pushes the reply
pub fn reply_channel() -> (
    mpsc::UnboundedSender<ReplyMessage>,
    mpsc::UnboundedReceiver<ReplyMessage>,
) {
    mpsc::unbounded_channel()
}

/// Callback closure forwarding the reply into the channel
pub fn push_reply(
    replies: &mpsc::UnboundedSender<ReplyMessage>,
) -> impl FnOnce(ReplyMessage) + Send + 'static {
    let replies = replies.clone();
    move |reply| {
        let _ = replies.send(reply);
    }
}

/// Await the next reply, failing the test after two seconds
pub async fn next_reply(replies: &mut mpsc::UnboundedReceiver<ReplyMessage>) -> ReplyMessage {
    timeout(Duration::from_secs(2), replies.recv())
        .await
        .expect("timed out waiting for a reply")
        .expect("reply channel closed")
}

/// WORK payload understood by the emulated worker
pub fn order(label: &str, duration_ms: u64) -> serde_json::Value {
    json!({ "label": label, "durationMs": duration_ms })
}

/// Label a completed reply was tagged with by the emulated worker
pub fn label_of(reply: &ReplyMessage) -> String {
    reply.data.as_ref().unwrap()["label"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}

/// Pid the emulated worker stamped into its reply
pub fn pid_of(reply: &ReplyMessage) -> u64 {
    reply.data.as_ref().unwrap()["pid"].as_u64().unwrap_or(0)
}

/// Poll worker stats until the predicate holds or two seconds pass
pub async fn wait_for_stats<F>(manager: &WorkerPoolManager, predicate: F) -> bool
where
    F: Fn(usize) -> bool,
{
    for _ in 0..100 {
        let report = manager
            .get_worker_stats(None)
            .await
            .expect("stats should be available");
        if predicate(report.workers.len()) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
