//! Health check HTTP endpoint.
//!
//! Provides a tiny HTTP server on localhost:9090/health that returns
//! tracker status as JSON. Used by external uptime monitors.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::tracking::scheduler::SchedulerState;

/// Shared health state updated after every poll cycle.
#[derive(Clone)]
pub struct HealthState {
    inner: Arc<RwLock<HealthData>>,
}

#[derive(Debug, Clone, Serialize)]
struct HealthData {
    status: String,
    scheduler_state: String,
    cycle_number: u64,
    tracked_items: usize,
    started_at: DateTime<Utc>,
    last_cycle_at: Option<DateTime<Utc>>,
    uptime_seconds: i64,
}

impl HealthState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HealthData {
                status: "ok".to_string(),
                scheduler_state: SchedulerState::Idle.to_string(),
                cycle_number: 0,
                tracked_items: 0,
                started_at: Utc::now(),
                last_cycle_at: None,
                uptime_seconds: 0,
            })),
        }
    }

    /// Applied inline by the cycle that produced the numbers; an update from
    /// an older cycle racing a newer one never rolls the state back.
    pub async fn record_cycle(
        &self,
        cycle_number: u64,
        state: SchedulerState,
        tracked_items: usize,
    ) {
        let mut data = self.inner.write().await;
        if cycle_number < data.cycle_number {
            return;
        }
        data.cycle_number = cycle_number;
        data.scheduler_state = state.to_string();
        data.tracked_items = tracked_items;
        data.last_cycle_at = Some(Utc::now());
        data.uptime_seconds = (Utc::now() - data.started_at).num_seconds();
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn the health check HTTP server. Returns a handle that can be aborted.
pub fn spawn_health_server(state: HealthState) -> JoinHandle<()> {
    tokio::spawn(async move {
        let addr = "127.0.0.1:9090";
        let listener = match TcpListener::bind(addr).await {
            Ok(l) => {
                info!(addr, "Health check server listening");
                l
            }
            Err(e) => {
                warn!(error = %e, addr, "Failed to bind health check server — continuing without it");
                return;
            }
        };

        loop {
            let (mut socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "Failed to accept health check connection");
                    continue;
                }
            };

            let state = state.clone();
            tokio::spawn(async move {
                // Read the request (we don't care about the contents)
                let mut buf = [0u8; 1024];
                let _ = tokio::io::AsyncReadExt::read(&mut socket, &mut buf).await;

                // Build JSON response
                let data = state.inner.read().await;
                let body = serde_json::to_string(&*data).unwrap_or_else(|_| {
                    r#"{"status":"error","message":"serialization failed"}"#.to_string()
                });

                let response = format!(
                    "HTTP/1.1 200 OK\r\n\
                     Content-Type: application/json\r\n\
                     Content-Length: {}\r\n\
                     Connection: close\r\n\
                     \r\n\
                     {}",
                    body.len(),
                    body
                );

                let _ = socket.write_all(response.as_bytes()).await;
            });
        }
    })
}
