//! Discord gateway client
//!
//! Holds one websocket session open, heartbeats on the interval the server
//! announces, and turns `INTERACTION_CREATE` button presses into
//! [`UserAction`]s. Dropped sessions are reopened with exponential backoff.

use super::UserAction;
use crate::error::{Error, Result};
use futures::{Sink, SinkExt, StreamExt};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;

pub const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

const MIN_BACKOFF: Duration = Duration::from_secs(2);
const MAX_BACKOFF: Duration = Duration::from_secs(60);
/// A session that lived this long resets the backoff
const HEALTHY_THRESHOLD: Duration = Duration::from_secs(120);
const HELLO_TIMEOUT: Duration = Duration::from_secs(10);

const OP_DISPATCH: u8 = 0;
const OP_HEARTBEAT: u8 = 1;
const OP_IDENTIFY: u8 = 2;
const OP_RECONNECT: u8 = 7;
const OP_INVALID_SESSION: u8 = 9;
const OP_HELLO: u8 = 10;
const OP_HEARTBEAT_ACK: u8 = 11;

/// GUILDS | GUILD_MESSAGES
const INTENTS: u64 = 1 | (1 << 9);

/// Interaction type for message component presses
const INTERACTION_MESSAGE_COMPONENT: u64 = 3;

pub(crate) struct GatewayConfig {
    pub url: String,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Frame {
    pub op: u8,
    #[serde(default)]
    pub d: serde_json::Value,
    #[serde(default)]
    pub s: Option<u64>,
    #[serde(default)]
    pub t: Option<String>,
}

pub(crate) fn parse_frame(text: &str) -> Result<Frame> {
    serde_json::from_str(text).map_err(|e| Error::Gateway(format!("bad frame: {e}")))
}

pub(crate) fn identify(token: &str) -> serde_json::Value {
    serde_json::json!({
        "op": OP_IDENTIFY,
        "d": {
            "token": token,
            "intents": INTENTS,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "mc-tether",
                "device": "mc-tether",
            },
        },
    })
}

pub(crate) fn heartbeat(seq: Option<u64>) -> serde_json::Value {
    serde_json::json!({ "op": OP_HEARTBEAT, "d": seq })
}

/// Extract a button press from an `INTERACTION_CREATE` payload.
pub(crate) fn interaction_action(d: &serde_json::Value) -> Option<UserAction> {
    if d["type"].as_u64() != Some(INTERACTION_MESSAGE_COMPONENT) {
        return None;
    }
    Some(UserAction {
        interaction_id: d["id"].as_str()?.to_string(),
        token: d["token"].as_str()?.to_string(),
        message_id: d["message"]["id"].as_str()?.to_string(),
        action_id: d["data"]["custom_id"].as_str()?.to_string(),
    })
}

/// Run gateway sessions until `stop` flips to true.
pub(crate) async fn run(
    config: GatewayConfig,
    actions: mpsc::Sender<UserAction>,
    mut stop: watch::Receiver<bool>,
) {
    let mut backoff = MIN_BACKOFF;

    loop {
        if *stop.borrow() {
            break;
        }

        let started = Instant::now();
        match run_session(&config, &actions, &mut stop).await {
            Ok(()) => break,
            Err(e) => {
                if started.elapsed() >= HEALTHY_THRESHOLD {
                    backoff = MIN_BACKOFF;
                }
                tracing::warn!(
                    error = %e,
                    backoff_secs = backoff.as_secs(),
                    "Discord gateway session ended, reconnecting after backoff"
                );
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = stop.changed() => break,
                }
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }

    tracing::debug!("Discord gateway loop exited");
}

async fn send_json<S>(write: &mut S, value: serde_json::Value) -> Result<()>
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    write
        .send(Message::Text(value.to_string()))
        .await
        .map_err(|e| Error::Gateway(format!("send failed: {e}")))
}

/// One websocket session. `Ok` means a requested stop; every other exit is
/// an error the caller retries.
async fn run_session(
    config: &GatewayConfig,
    actions: &mpsc::Sender<UserAction>,
    stop: &mut watch::Receiver<bool>,
) -> Result<()> {
    let (ws, _) = tokio_tungstenite::connect_async(config.url.as_str())
        .await
        .map_err(|e| Error::Gateway(format!("connect failed: {e}")))?;
    let (mut write, mut read) = ws.split();

    let hello = match tokio::time::timeout(HELLO_TIMEOUT, read.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => parse_frame(&text)?,
        Ok(other) => return Err(Error::Gateway(format!("expected hello, got {other:?}"))),
        Err(_) => return Err(Error::Gateway("timed out waiting for hello".to_string())),
    };
    if hello.op != OP_HELLO {
        return Err(Error::Gateway(format!("expected hello, got op {}", hello.op)));
    }
    let interval_ms = hello.d["heartbeat_interval"]
        .as_u64()
        .ok_or_else(|| Error::Gateway("hello without heartbeat_interval".to_string()))?;

    send_json(&mut write, identify(&config.token)).await?;

    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;
    let mut seq: Option<u64> = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                send_json(&mut write, heartbeat(seq)).await?;
            }
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
            }
            msg = read.next() => {
                let frame = match msg {
                    Some(Ok(Message::Text(text))) => parse_frame(&text)?,
                    Some(Ok(Message::Close(close))) => {
                        return Err(Error::Gateway(format!("closed by server: {close:?}")));
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(Error::Gateway(format!("read failed: {e}"))),
                    None => return Err(Error::Gateway("stream ended".to_string())),
                };
                if frame.s.is_some() {
                    seq = frame.s;
                }

                match frame.op {
                    OP_DISPATCH => dispatch(&frame, actions).await,
                    OP_HEARTBEAT => send_json(&mut write, heartbeat(seq)).await?,
                    OP_HEARTBEAT_ACK => {}
                    OP_RECONNECT => {
                        return Err(Error::Gateway("server requested reconnect".to_string()));
                    }
                    OP_INVALID_SESSION => {
                        return Err(Error::Gateway("invalid session".to_string()));
                    }
                    op => tracing::debug!(op, "Ignoring gateway frame"),
                }
            }
        }
    }
}

async fn dispatch(frame: &Frame, actions: &mpsc::Sender<UserAction>) {
    match frame.t.as_deref() {
        Some("READY") => {
            let user = frame.d["user"]["username"].as_str().unwrap_or("unknown");
            tracing::info!(user, "Discord gateway ready");
        }
        Some("INTERACTION_CREATE") => {
            if let Some(action) = interaction_action(&frame.d) {
                tracing::debug!(
                    action = %action.action_id,
                    message_id = %action.message_id,
                    "Received button press"
                );
                if actions.send(action).await.is_err() {
                    tracing::debug!("Action receiver dropped, press discarded");
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hello() {
        let frame = parse_frame(r#"{"op":10,"d":{"heartbeat_interval":41250},"s":null,"t":null}"#)
            .unwrap();
        assert_eq!(frame.op, OP_HELLO);
        assert_eq!(frame.d["heartbeat_interval"], 41250);
        assert!(frame.s.is_none());
    }

    #[test]
    fn test_parse_frame_rejects_garbage() {
        assert!(matches!(parse_frame("not json"), Err(Error::Gateway(_))));
    }

    #[test]
    fn test_identify_payload() {
        let payload = identify("secret");
        assert_eq!(payload["op"], 2);
        assert_eq!(payload["d"]["token"], "secret");
        assert_eq!(payload["d"]["intents"], 513);
    }

    #[test]
    fn test_heartbeat_carries_sequence() {
        assert_eq!(heartbeat(Some(7))["d"], 7);
        assert!(heartbeat(None)["d"].is_null());
    }

    #[test]
    fn test_interaction_action() {
        let d = serde_json::json!({
            "id": "int-1",
            "type": 3,
            "token": "tok",
            "message": { "id": "42" },
            "data": { "custom_id": "connect", "component_type": 2 },
        });
        let action = interaction_action(&d).unwrap();
        assert_eq!(action.interaction_id, "int-1");
        assert_eq!(action.token, "tok");
        assert_eq!(action.message_id, "42");
        assert_eq!(action.action_id, "connect");
    }

    #[test]
    fn test_interaction_action_ignores_slash_commands() {
        let d = serde_json::json!({
            "id": "int-2",
            "type": 2,
            "token": "tok",
            "data": { "name": "ping" },
        });
        assert!(interaction_action(&d).is_none());
    }

    #[test]
    fn test_interaction_action_requires_message() {
        let d = serde_json::json!({
            "id": "int-3",
            "type": 3,
            "token": "tok",
            "data": { "custom_id": "connect" },
        });
        assert!(interaction_action(&d).is_none());
    }
}
