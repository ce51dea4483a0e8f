//! REST API handlers
//!
//! HTTP endpoints for task submission and worker stats.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::oneshot;

use manager::{ManagerError, WorkerPoolManager};
use shared::ReplyMessage;

/// Body of `POST /example/pool`
#[derive(Debug, Serialize, Deserialize)]
pub struct PoolTaskRequest {
    #[serde(rename = "poolName")]
    pub pool_name: String,
    #[serde(rename = "workerTask", default)]
    pub worker_task: Option<Value>,
}

/// Body of `POST /example/oneShot`
#[derive(Debug, Serialize, Deserialize)]
pub struct OneShotTaskRequest {
    #[serde(rename = "workerScript")]
    pub worker_script: String,
    #[serde(rename = "workerTask", default)]
    pub worker_task: Option<Value>,
    #[serde(rename = "workerMemoryLimit", default)]
    pub worker_memory_limit: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub pool: Option<String>,
}

/// Build the application router
pub fn router(manager: Arc<WorkerPoolManager>) -> Router {
    Router::new()
        .route("/example/pool", post(run_pool_task))
        .route("/example/oneShot", post(run_one_shot_task))
        .route("/api/stats", get(get_stats))
        .route("/api/status", get(get_status))
        .with_state(manager)
}

/// Submit a task to a named pool and relay the worker's reply
async fn run_pool_task(
    State(manager): State<Arc<WorkerPoolManager>>,
    Json(request): Json<PoolTaskRequest>,
) -> (StatusCode, Json<Value>) {
    let (reply_tx, reply_rx) = oneshot::channel();
    let submitted = manager
        .execute_pool_worker_task(
            request.worker_task,
            move |reply| {
                let _ = reply_tx.send(reply);
            },
            &request.pool_name,
        )
        .await;

    match submitted {
        Ok(_) => relay_reply(reply_rx).await,
        Err(e) => rejection(e),
    }
}

/// Run a task on a fresh one-shot worker and relay its reply
async fn run_one_shot_task(
    State(manager): State<Arc<WorkerPoolManager>>,
    Json(request): Json<OneShotTaskRequest>,
) -> (StatusCode, Json<Value>) {
    let (reply_tx, reply_rx) = oneshot::channel();
    let submitted = manager
        .execute_one_shot_worker_task(
            &request.worker_script,
            request.worker_task,
            move |reply| {
                let _ = reply_tx.send(reply);
            },
            request.worker_memory_limit,
        )
        .await;

    match submitted {
        Ok(_) => relay_reply(reply_rx).await,
        Err(e) => rejection(e),
    }
}

/// Worker stats, optionally filtered by `?pool=<name>`
async fn get_stats(
    State(manager): State<Arc<WorkerPoolManager>>,
    Query(query): Query<StatsQuery>,
) -> (StatusCode, Json<Value>) {
    match manager.get_worker_stats(query.pool.as_deref()).await {
        Ok(report) => (
            StatusCode::OK,
            Json(serde_json::to_value(&report).unwrap_or(Value::Null)),
        ),
        Err(e) => rejection(e),
    }
}

/// Liveness endpoint
async fn get_status() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Map the worker's reply onto the HTTP response: 200 when ok, 500 when
/// the worker reported (or the manager synthesized) an error
async fn relay_reply(reply_rx: oneshot::Receiver<ReplyMessage>) -> (StatusCode, Json<Value>) {
    match reply_rx.await {
        Ok(reply) => {
            let status = if reply.ok {
                StatusCode::OK
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            (status, Json(serde_json::to_value(&reply).unwrap_or(Value::Null)))
        }
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "ok": false,
                "message": "manager shut down before replying",
            })),
        ),
    }
}

/// Map a synchronous submission rejection onto an HTTP error body
fn rejection(error: ManagerError) -> (StatusCode, Json<Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "ok": false,
            "message": error.to_string(),
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use manager::services::UuidTaskIds;
    use manager::traits::{MockResourceProbe, MockWorkerSpawner};
    use tower::ServiceExt;

    /// Manager with no pools and mocked services; enough for the
    /// marshalling paths
    fn empty_manager() -> Arc<WorkerPoolManager> {
        Arc::new(WorkerPoolManager::new(
            MockWorkerSpawner::new(),
            MockResourceProbe::new(),
            UuidTaskIds,
        ))
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let app = router(empty_manager());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_stats_endpoint_empty() {
        let app = router(empty_manager());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/stats")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["workers"], json!([]));
    }

    #[tokio::test]
    async fn test_pool_submission_to_unknown_pool_is_500() {
        let app = router(empty_manager());
        let request = Request::builder()
            .method("POST")
            .uri("/example/pool")
            .header("content-type", "application/json")
            .body(Body::from(
                json!({"poolName": "NOPE", "workerTask": {"x": 1}}).to_string(),
            ))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["ok"], false);
        assert_eq!(body["message"], "Worker pool NOPE does not exist");
    }
}
