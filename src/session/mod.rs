//! Session client trait: the boundary to the game-protocol client
//!
//! The controller never speaks the game protocol. It opens a session
//! through a [`SessionClient`], closes it through the returned
//! [`SessionHandle`], and learns everything else from [`SessionEvent`]s
//! pushed into a [`SessionSink`].

use crate::error::Result;
use crate::state::{DeviceCode, Position};
use async_trait::async_trait;
use tokio::sync::mpsc;

pub mod memory;
pub mod process;

/// Server and account a session connects with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
    pub username: String,
    /// Auth backend passed through to the client (e.g. "microsoft", "offline")
    pub auth: String,
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// High-level lifecycle events of one session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Device-code login required before the session can proceed
    AuthChallenge(DeviceCode),
    /// Bot entered the world
    Spawned { position: Position },
    /// Connection or protocol error
    Error { message: String },
    /// Server removed the bot
    Kicked { reason: String },
    /// Connection closed
    Ended,
}

/// A session event stamped with the connect generation that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedEvent {
    pub generation: u64,
    pub event: SessionEvent,
}

/// Event emitter handed to a session when it is opened
///
/// Sending never blocks, so it is safe to call from synchronous
/// callbacks. Events emitted after the controller moved on to a newer
/// generation are dropped by the controller.
#[derive(Debug, Clone)]
pub struct SessionSink {
    generation: u64,
    tx: mpsc::UnboundedSender<TaggedEvent>,
}

impl SessionSink {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<TaggedEvent>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn emit(&self, event: SessionEvent) {
        let tagged = TaggedEvent {
            generation: self.generation,
            event,
        };
        if self.tx.send(tagged).is_err() {
            tracing::debug!(generation = self.generation, "Controller gone, session event dropped");
        }
    }

    pub fn auth_challenge(&self, device: DeviceCode) {
        self.emit(SessionEvent::AuthChallenge(device));
    }

    pub fn spawned(&self, position: Position) {
        self.emit(SessionEvent::Spawned { position });
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(SessionEvent::Error {
            message: message.into(),
        });
    }

    pub fn kicked(&self, reason: impl Into<String>) {
        self.emit(SessionEvent::Kicked {
            reason: reason.into(),
        });
    }

    pub fn ended(&self) {
        self.emit(SessionEvent::Ended);
    }
}

/// Opens sessions to the remote server
#[async_trait]
pub trait SessionClient: Send + Sync {
    /// Start connecting. Must return promptly; progress arrives through `sink`.
    async fn open(&self, target: &Target, sink: SessionSink) -> Result<Box<dyn SessionHandle>>;

    /// Client name for logs (e.g. "process", "memory")
    fn name(&self) -> &str;
}

/// One open session
#[async_trait]
pub trait SessionHandle: Send + Sync {
    /// End the session. Calling it twice is harmless.
    async fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_tags_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = SessionSink::new(7, tx);

        sink.kicked("afk");
        sink.ended();

        let first = rx.try_recv().unwrap();
        assert_eq!(first.generation, 7);
        assert_eq!(
            first.event,
            SessionEvent::Kicked {
                reason: "afk".into()
            }
        );
        assert_eq!(rx.try_recv().unwrap().event, SessionEvent::Ended);
    }

    #[test]
    fn test_sink_survives_closed_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        SessionSink::new(1, tx).error("boom");
    }

    #[test]
    fn test_target_display() {
        let target = Target {
            host: "mc.example.net".into(),
            port: 25565,
            username: "steve".into(),
            auth: "microsoft".into(),
        };
        assert_eq!(target.to_string(), "mc.example.net:25565");
    }
}
