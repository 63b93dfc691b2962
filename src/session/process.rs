//! Session client backed by a bridge process
//!
//! The game-protocol client runs as a child process. It receives the
//! target through `MC_HOST`, `MC_PORT`, `MC_USERNAME` and `MC_AUTH` and
//! reports its lifecycle as one JSON object per stdout line:
//!
//! ```text
//! {"event":"auth_challenge","verification_uri":"https://www.microsoft.com/link","user_code":"ABC123"}
//! {"event":"spawned","position":{"x":1.5,"y":64.0,"z":-3.2}}
//! {"event":"error","message":"ECONNREFUSED"}
//! {"event":"kicked","reason":"afk"}
//! {"event":"ended"}
//! ```
//!
//! Lines that are not JSON events are forwarded to the log. Stdout EOF
//! counts as `ended`.

use super::{SessionClient, SessionEvent, SessionHandle, SessionSink, Target};
use crate::error::{Error, Result};
use crate::state::{DeviceCode, Position};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};

const KILL_TIMEOUT: Duration = Duration::from_secs(5);

/// Spawns one bridge process per session
pub struct ProcessSessionClient {
    command: String,
}

impl ProcessSessionClient {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl SessionClient for ProcessSessionClient {
    async fn open(&self, target: &Target, sink: SessionSink) -> Result<Box<dyn SessionHandle>> {
        let parts = split_cmd(&self.command);
        let Some((program, args)) = parts.split_first() else {
            return Err(Error::SessionOpen {
                target: target.to_string(),
                reason: "empty session command".to_string(),
            });
        };

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .env("MC_HOST", &target.host)
            .env("MC_PORT", target.port.to_string())
            .env("MC_USERNAME", &target.username)
            .env("MC_AUTH", &target.auth)
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| Error::SessionOpen {
            target: target.to_string(),
            reason: format!("cannot spawn '{}': {e}", self.command),
        })?;

        let pid = child.id().unwrap_or(0);
        tracing::info!(pid, generation = sink.generation(), target = %target, "Session bridge started");

        if let Some(stdout) = child.stdout.take() {
            attach_events(stdout, sink);
        }
        if let Some(stderr) = child.stderr.take() {
            attach_stderr(stderr, pid);
        }

        Ok(Box::new(ProcessSessionHandle { child, pid }))
    }

    fn name(&self) -> &str {
        "process"
    }
}

struct ProcessSessionHandle {
    child: Child,
    pid: u32,
}

#[async_trait]
impl SessionHandle for ProcessSessionHandle {
    async fn close(&mut self) {
        match tokio::time::timeout(KILL_TIMEOUT, self.child.kill()).await {
            Ok(Ok(())) => tracing::debug!(pid = self.pid, "Session bridge stopped"),
            Ok(Err(e)) => tracing::debug!(pid = self.pid, "Session bridge already gone: {e}"),
            Err(_) => tracing::warn!(pid = self.pid, "Session bridge did not exit after kill"),
        }
    }
}

/// Spawn a task that turns stdout lines into session events.
fn attach_events(stdout: ChildStdout, sink: SessionSink) {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = reader.next_line().await {
            match parse_line(&line) {
                Some(event) => sink.emit(event),
                None if line.trim().is_empty() => {}
                None => tracing::debug!(generation = sink.generation(), "[bridge] {line}"),
            }
        }
        sink.ended();
    });
}

/// Spawn a task that forwards stderr lines to the log.
fn attach_stderr(stderr: ChildStderr, pid: u32) {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = reader.next_line().await {
            tracing::warn!(pid, "[bridge] {line}");
        }
    });
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum BridgeEvent {
    AuthChallenge(DeviceCode),
    Spawned { position: BridgePosition },
    Error { message: String },
    Kicked { reason: serde_json::Value },
    Ended,
}

#[derive(Debug, Deserialize)]
struct BridgePosition {
    x: f64,
    y: f64,
    z: f64,
}

/// Parse one bridge stdout line; `None` for anything that is not an event.
pub fn parse_line(line: &str) -> Option<SessionEvent> {
    let event: BridgeEvent = serde_json::from_str(line.trim()).ok()?;
    Some(match event {
        BridgeEvent::AuthChallenge(device) => SessionEvent::AuthChallenge(device),
        BridgeEvent::Spawned { position } => SessionEvent::Spawned {
            position: Position::from_f64(position.x, position.y, position.z),
        },
        BridgeEvent::Error { message } => SessionEvent::Error { message },
        BridgeEvent::Kicked { reason } => SessionEvent::Kicked {
            reason: kick_reason(reason),
        },
        BridgeEvent::Ended => SessionEvent::Ended,
    })
}

/// Kick reasons arrive either as plain text or as a chat component.
fn kick_reason(reason: serde_json::Value) -> String {
    match reason {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Shell-style command splitting: handles single/double quotes and backslash escapes.
/// e.g. `node bridge.js --title 'hello world'` → ["node", "bridge.js", "--title", "hello world"]
pub fn split_cmd(cmd: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut chars = cmd.chars();
    let mut in_single = false;
    let mut in_double = false;

    while let Some(ch) = chars.next() {
        match ch {
            '\\' if !in_single => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            ' ' | '\t' if !in_single && !in_double => {
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(ch),
        }
    }
    if !current.is_empty() {
        args.push(current);
    }
    args
}
