//! Child-side protocol loop
//!
//! Reads newline-delimited JSON task messages from the inbound pipe and
//! writes replies to the outbound pipe. Generic over the transport so the
//! loop can be exercised in tests over in-memory pipes.

use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::Value;
use shared::{process_warn, MessageType, ProcessId, ReplyMessage, TaskId, TaskMessage};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::WorkerResult;

/// The user workload invoked for each WORK message
#[async_trait]
pub trait WorkloadRunner: Send + Sync {
    /// Run the workload with the task's opaque payload. `Err` becomes an
    /// ERROR reply; the process itself stays alive.
    async fn run(&self, data: Option<Value>) -> Result<Value, String>;
}

/// Serve the protocol until TERMINATE or EOF
///
/// Behavior per message type:
/// - INIT: reply INIT_DONE with `{pid}`, echoing the id
/// - WORK: run the workload; reply WORK_DONE on success, ERROR on failure
/// - TERMINATE: return immediately without replying (caller exits 0)
/// - anything else: log to stderr and ignore
///
/// At most one reply is written per incoming id.
pub async fn serve<R, W, H>(reader: R, mut writer: W, handler: &H) -> WorkerResult<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    H: WorkloadRunner,
{
    let pid = std::process::id();
    let mut lines = reader.lines();
    let mut replied: HashSet<TaskId> = HashSet::new();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let message = match TaskMessage::from_line(&line) {
            Ok(message) => message,
            Err(e) => {
                process_warn!(ProcessId::current(), "⚠️ Ignoring unparseable message: {}", e);
                continue;
            }
        };

        match message.kind {
            MessageType::Init => {
                let Some(id) = message.id else {
                    process_warn!(ProcessId::current(), "⚠️ INIT without id, ignoring");
                    continue;
                };
                if !replied.insert(id.clone()) {
                    continue;
                }
                write_reply(&mut writer, &ReplyMessage::init_done(id, pid)).await?;
            }
            MessageType::Work => {
                let Some(id) = message.id else {
                    process_warn!(ProcessId::current(), "⚠️ WORK without id, ignoring");
                    continue;
                };
                if !replied.insert(id.clone()) {
                    continue;
                }
                let reply = match handler.run(message.data).await {
                    Ok(result) => ReplyMessage::work_done(id, result),
                    Err(message) => ReplyMessage::error(id, message),
                };
                write_reply(&mut writer, &reply).await?;
            }
            MessageType::Terminate => {
                // Exit without replying
                return Ok(());
            }
            other => {
                process_warn!(
                    ProcessId::current(),
                    "⚠️ Ignoring unexpected message type {:?}",
                    other
                );
            }
        }
    }

    // EOF: the parent closed the pipe
    Ok(())
}

async fn write_reply<W>(writer: &mut W, reply: &ReplyMessage) -> WorkerResult<()>
where
    W: AsyncWrite + Unpin,
{
    let line = reply.to_line()?;
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workloads::DefaultWorkloads;
    use serde_json::json;
    use tokio::io::BufReader;

    struct Pipes {
        to_worker: tokio::io::WriteHalf<tokio::io::DuplexStream>,
        from_worker: tokio::io::Lines<BufReader<tokio::io::ReadHalf<tokio::io::DuplexStream>>>,
        served: tokio::task::JoinHandle<WorkerResult<()>>,
    }

    /// Spin up the protocol loop over in-memory pipes
    fn start_worker() -> Pipes {
        let (client, server) = tokio::io::duplex(4096);
        let (server_read, server_write) = tokio::io::split(server);
        let served = tokio::spawn(async move {
            serve(BufReader::new(server_read), server_write, &DefaultWorkloads).await
        });
        let (client_read, to_worker) = tokio::io::split(client);
        Pipes {
            to_worker,
            from_worker: BufReader::new(client_read).lines(),
            served,
        }
    }

    async fn send(pipes: &mut Pipes, message: &TaskMessage) {
        pipes
            .to_worker
            .write_all(message.to_line().unwrap().as_bytes())
            .await
            .unwrap();
    }

    async fn recv(pipes: &mut Pipes) -> ReplyMessage {
        let line = pipes
            .from_worker
            .next_line()
            .await
            .unwrap()
            .expect("worker closed its output");
        ReplyMessage::from_line(&line).unwrap()
    }

    #[tokio::test]
    async fn test_init_handshake_reports_pid() {
        let mut pipes = start_worker();
        send(&mut pipes, &TaskMessage::init(TaskId::from_string("i-1"))).await;

        let reply = recv(&mut pipes).await;
        assert_eq!(reply.kind, MessageType::InitDone);
        assert_eq!(reply.id, TaskId::from_string("i-1"));
        assert!(reply.ok);
        assert_eq!(reply.data.unwrap()["pid"], std::process::id());
    }

    #[tokio::test]
    async fn test_echo_work_round_trip() {
        let mut pipes = start_worker();
        let payload = json!({"workload": "echo", "payload": {"x": 1}});
        send(
            &mut pipes,
            &TaskMessage::work(TaskId::from_string("w-1"), Some(payload), None),
        )
        .await;

        let reply = recv(&mut pipes).await;
        assert_eq!(reply.kind, MessageType::WorkDone);
        assert!(reply.ok);
        assert_eq!(reply.data, Some(json!({"x": 1})));
    }

    #[tokio::test]
    async fn test_failing_workload_becomes_error_reply() {
        let mut pipes = start_worker();
        send(
            &mut pipes,
            &TaskMessage::work(
                TaskId::from_string("w-2"),
                Some(json!({"workload": "no-such-thing"})),
                None,
            ),
        )
        .await;

        let reply = recv(&mut pipes).await;
        assert_eq!(reply.kind, MessageType::Error);
        assert!(!reply.ok);

        // The process survives a failed workload
        send(
            &mut pipes,
            &TaskMessage::work(
                TaskId::from_string("w-3"),
                Some(json!({"workload": "echo", "payload": 7})),
                None,
            ),
        )
        .await;
        assert!(recv(&mut pipes).await.ok);
    }

    #[tokio::test]
    async fn test_terminate_stops_loop_without_reply() {
        let mut pipes = start_worker();
        send(&mut pipes, &TaskMessage::terminate()).await;

        let result = pipes.served.await.unwrap();
        assert!(result.is_ok());
        let next = pipes.from_worker.next_line().await.unwrap();
        assert!(next.is_none(), "TERMINATE must not be answered");
    }

    #[tokio::test]
    async fn test_duplicate_id_gets_single_reply() {
        let mut pipes = start_worker();
        let work = TaskMessage::work(
            TaskId::from_string("dup"),
            Some(json!({"workload": "echo", "payload": 1})),
            None,
        );
        send(&mut pipes, &work).await;
        send(&mut pipes, &work).await;
        send(
            &mut pipes,
            &TaskMessage::work(
                TaskId::from_string("fresh"),
                Some(json!({"workload": "echo", "payload": 2})),
                None,
            ),
        )
        .await;

        // Exactly two replies: one per distinct id
        assert_eq!(recv(&mut pipes).await.id, TaskId::from_string("dup"));
        assert_eq!(recv(&mut pipes).await.id, TaskId::from_string("fresh"));
    }

    #[tokio::test]
    async fn test_unknown_message_type_is_ignored() {
        let mut pipes = start_worker();
        // A child should never receive a child→parent tag; it must not reply
        pipes
            .to_worker
            .write_all(b"{\"type\":\"WORK_DONE\",\"id\":\"x\"}\n")
            .await
            .unwrap();
        send(&mut pipes, &TaskMessage::terminate()).await;

        assert!(pipes.served.await.unwrap().is_ok());
        let next = pipes.from_worker.next_line().await.unwrap();
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn test_eof_ends_loop_cleanly() {
        let mut pipes = start_worker();
        pipes.to_worker.shutdown().await.unwrap();
        assert!(pipes.served.await.unwrap().is_ok());
    }
}
