//! In-memory session client for tests and dry runs
//!
//! Records every open/close and hands the sinks back so a test can play
//! the part of the remote server.

use super::{SessionClient, SessionHandle, SessionSink, Target};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Inner {
    sinks: Vec<SessionSink>,
    targets: Vec<Target>,
    open: usize,
    max_open: usize,
    closed: usize,
    fail_next: Option<String>,
}

/// Session client that never touches the network
#[derive(Clone, Default)]
pub struct MemorySessionClient {
    inner: Arc<Mutex<Inner>>,
}

impl MemorySessionClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `open` call fail with the given reason
    pub fn fail_next_open(&self, reason: impl Into<String>) {
        self.lock().fail_next = Some(reason.into());
    }

    /// Number of successful `open` calls so far
    pub fn opened(&self) -> usize {
        self.lock().sinks.len()
    }

    /// Number of sessions closed so far
    pub fn closed(&self) -> usize {
        self.lock().closed
    }

    /// Sessions currently open
    pub fn open_now(&self) -> usize {
        self.lock().open
    }

    /// Highest number of sessions that were ever open at the same time
    pub fn max_concurrent(&self) -> usize {
        self.lock().max_open
    }

    /// Sink of the most recently opened session
    pub fn latest(&self) -> Option<SessionSink> {
        self.lock().sinks.last().cloned()
    }

    /// Sink of the n-th opened session (0-based)
    pub fn sink(&self, index: usize) -> Option<SessionSink> {
        self.lock().sinks.get(index).cloned()
    }

    /// Targets passed to `open`, in order
    pub fn targets(&self) -> Vec<Target> {
        self.lock().targets.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl SessionClient for MemorySessionClient {
    async fn open(&self, target: &Target, sink: SessionSink) -> Result<Box<dyn SessionHandle>> {
        let mut inner = self.lock();
        if let Some(reason) = inner.fail_next.take() {
            return Err(Error::SessionOpen {
                target: target.to_string(),
                reason,
            });
        }
        inner.sinks.push(sink);
        inner.targets.push(target.clone());
        inner.open += 1;
        inner.max_open = inner.max_open.max(inner.open);
        Ok(Box::new(MemorySessionHandle {
            inner: self.inner.clone(),
            closed: false,
        }))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

struct MemorySessionHandle {
    inner: Arc<Mutex<Inner>>,
    closed: bool,
}

#[async_trait]
impl SessionHandle for MemorySessionHandle {
    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner.open -= 1;
        inner.closed += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn target() -> Target {
        Target {
            host: "localhost".into(),
            port: 25565,
            username: "bot".into(),
            auth: "offline".into(),
        }
    }

    #[tokio::test]
    async fn test_open_close_counts() {
        let client = MemorySessionClient::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        let mut handle = client.open(&target(), SessionSink::new(1, tx)).await.unwrap();
        assert_eq!(client.opened(), 1);
        assert_eq!(client.open_now(), 1);

        handle.close().await;
        handle.close().await;
        assert_eq!(client.open_now(), 0);
        assert_eq!(client.closed(), 1);
        assert_eq!(client.max_concurrent(), 1);
    }

    #[tokio::test]
    async fn test_fail_next_open() {
        let client = MemorySessionClient::new();
        client.fail_next_open("connection refused");
        let (tx, _rx) = mpsc::unbounded_channel();

        let err = client
            .open(&target(), SessionSink::new(1, tx.clone()))
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("connection refused"));
        assert_eq!(client.opened(), 0);

        assert!(client.open(&target(), SessionSink::new(2, tx)).await.is_ok());
        assert_eq!(client.latest().unwrap().generation(), 2);
    }
}
