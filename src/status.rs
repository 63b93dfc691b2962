//! HTTP status endpoint
//!
//! Read-only view of the latest published snapshot. Handlers clone the
//! snapshot out of the watch channel and never wait on the controller.

use crate::error::Result;
use crate::session::Target;
use crate::state::{Phase, Snapshot};
use axum::extract::State;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::watch;

#[derive(Clone)]
pub struct StatusState {
    snapshots: watch::Receiver<Snapshot>,
    target: Arc<Target>,
    started: Instant,
}

impl StatusState {
    pub fn new(snapshots: watch::Receiver<Snapshot>, target: Target) -> Self {
        Self {
            snapshots,
            target: Arc::new(target),
            started: Instant::now(),
        }
    }

    fn report(&self) -> StatusReport {
        let snapshot = self.snapshots.borrow().clone();
        StatusReport::from_snapshot(&snapshot, &self.target, self.started.elapsed())
    }
}

/// Body of `GET /status`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub connected: bool,
    pub is_connecting: bool,
    pub server: String,
    pub port: u16,
    pub username: String,
    /// Seconds since the process started
    pub uptime: f64,
}

impl StatusReport {
    pub fn from_snapshot(snapshot: &Snapshot, target: &Target, uptime: Duration) -> Self {
        Self {
            connected: snapshot.phase == Phase::Connected,
            is_connecting: snapshot.phase.is_connecting(),
            server: target.host.clone(),
            port: target.port,
            username: target.username.clone(),
            uptime: uptime.as_secs_f64(),
        }
    }
}

pub fn router(state: StatusState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/status", get(status))
        .with_state(state)
}

/// Bind `addr` and serve until `shutdown` resolves
pub async fn serve<F>(addr: SocketAddr, state: StatusState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "Status server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    tracing::info!("Status server stopped");
    Ok(())
}

async fn status(State(state): State<StatusState>) -> Json<StatusReport> {
    Json(state.report())
}

async fn index(State(state): State<StatusState>) -> impl IntoResponse {
    Html(render_page(&state.report()))
}

/// `Hh Mm Ss`
pub fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn render_page(report: &StatusReport) -> String {
    let (label, color) = if report.connected {
        ("Connected", "#00ff00")
    } else if report.is_connecting {
        ("Connecting", "#ffaa00")
    } else {
        ("Disconnected", "#ff0000")
    };
    let uptime = format_uptime(Duration::from_secs_f64(report.uptime));

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <title>Minecraft Bot Status</title>
  <style>
    body {{ font-family: Arial, sans-serif; max-width: 600px; margin: 50px auto; padding: 20px; background: #1a1a1a; color: #fff; }}
    .status {{ padding: 20px; border-radius: 10px; background: #2a2a2a; margin: 20px 0; }}
    .indicator {{ display: inline-block; width: 12px; height: 12px; border-radius: 50%; margin-right: 8px; background: {color}; }}
    h1 {{ color: #5865F2; }}
    .info {{ margin: 10px 0; }}
  </style>
</head>
<body>
  <h1>Minecraft Bot Status</h1>
  <div class="status">
    <h2><span class="indicator"></span>{label}</h2>
    <div class="info"><strong>Server:</strong> {server}:{port}</div>
    <div class="info"><strong>Username:</strong> {username}</div>
    <div class="info"><strong>Uptime:</strong> {uptime}</div>
  </div>
</body>
</html>
"#,
        server = escape(&report.server),
        port = report.port,
        username = escape(&report.username),
    )
}
