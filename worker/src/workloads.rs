//! Example workloads
//!
//! The WORK payload selects a workload by tag:
//! `{"workload": "echo", "payload": ...}`,
//! `{"workload": "sleep", "durationMs": 500}`,
//! `{"workload": "cpuBurn", "durationMs": 500}`,
//! `{"workload": "allocate", "megabytes": 256, "holdMs": 100}`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::runtime::WorkloadRunner;

#[derive(Deserialize, Debug)]
#[serde(tag = "workload", rename_all = "camelCase")]
enum WorkOrder {
    /// Return the payload unchanged
    Echo {
        #[serde(default)]
        payload: Value,
    },
    /// Idle for the given duration
    Sleep {
        #[serde(rename = "durationMs")]
        duration_ms: u64,
    },
    /// Busy-spin a CPU core for the given duration
    CpuBurn {
        #[serde(rename = "durationMs")]
        duration_ms: u64,
    },
    /// Allocate and touch memory, optionally holding it for a while
    Allocate {
        megabytes: usize,
        #[serde(rename = "holdMs", default)]
        hold_ms: u64,
    },
}

/// The workload set served by the example worker binary
pub struct DefaultWorkloads;

#[async_trait]
impl WorkloadRunner for DefaultWorkloads {
    async fn run(&self, data: Option<Value>) -> Result<Value, String> {
        let Some(data) = data else {
            return Err("no task data provided".to_string());
        };
        let order: WorkOrder = serde_json::from_value(data)
            .map_err(|e| format!("unrecognized workload: {e}"))?;

        match order {
            WorkOrder::Echo { payload } => Ok(payload),

            WorkOrder::Sleep { duration_ms } => {
                tokio::time::sleep(Duration::from_millis(duration_ms)).await;
                Ok(json!({ "sleptMs": duration_ms }))
            }

            WorkOrder::CpuBurn { duration_ms } => {
                let result = tokio::task::spawn_blocking(move || {
                    let deadline = Instant::now() + Duration::from_millis(duration_ms);
                    let mut iterations: u64 = 0;
                    while Instant::now() < deadline {
                        iterations = iterations.wrapping_add(1);
                        std::hint::black_box(iterations);
                    }
                    iterations
                })
                .await
                .map_err(|e| format!("workload panicked: {e}"))?;
                Ok(json!({ "burnedMs": duration_ms, "iterations": result }))
            }

            WorkOrder::Allocate { megabytes, hold_ms } => {
                tokio::task::spawn_blocking(move || {
                    let bytes = megabytes.saturating_mul(1024 * 1024);
                    let mut buffer = vec![0u8; bytes];
                    // Touch every page so the allocation is resident
                    for index in (0..buffer.len()).step_by(4096) {
                        buffer[index] = 1;
                    }
                    if hold_ms > 0 {
                        std::thread::sleep(Duration::from_millis(hold_ms));
                    }
                    // Buffer dropped here, releasing the memory before the
                    // next task arrives
                    drop(buffer);
                })
                .await
                .map_err(|e| format!("workload panicked: {e}"))?;
                Ok(json!({ "allocatedMegabytes": megabytes }))
            }
        }
    }
}
