//! In-memory control surface for tests
//!
//! Keeps the rendered payloads in a map and records every call, so tests
//! can assert what the operator would have seen.

use super::{ControlSurface, MessageRef, UserAction};
use crate::error::{Error, Result};
use crate::render::RenderedPayload;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// A call made against the surface, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceCall {
    Resolve(String),
    Create(String),
    Update(String),
    Acknowledge(String),
}

#[derive(Default)]
struct Inner {
    messages: HashMap<String, RenderedPayload>,
    calls: Vec<SurfaceCall>,
    next_id: u64,
    actions: Option<mpsc::Sender<UserAction>>,
    fail_creates: usize,
    fail_updates: usize,
}

#[derive(Clone)]
pub struct MemorySurface {
    inner: Arc<Mutex<Inner>>,
}

impl Default for MemorySurface {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySurface {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                next_id: 1000,
                ..Inner::default()
            })),
        }
    }

    /// Pre-populate an existing message, as if posted by an earlier run
    pub fn insert_message(&self, id: &str, payload: RenderedPayload) {
        self.lock().messages.insert(id.to_string(), payload);
    }

    /// Delete a message, as if removed by a moderator
    pub fn delete_message(&self, id: &str) {
        self.lock().messages.remove(id);
    }

    /// Fail the next `n` create calls
    pub fn fail_creates(&self, n: usize) {
        self.lock().fail_creates = n;
    }

    /// Reject the next `n` update calls, as a rate-limited platform would
    pub fn fail_updates(&self, n: usize) {
        self.lock().fail_updates = n;
    }

    pub fn message(&self, id: &str) -> Option<RenderedPayload> {
        self.lock().messages.get(id).cloned()
    }

    pub fn message_count(&self) -> usize {
        self.lock().messages.len()
    }

    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.lock().calls.clone()
    }

    /// Simulate a button press; false if the surface was not started
    pub async fn press(&self, action: UserAction) -> bool {
        let tx = self.lock().actions.clone();
        match tx {
            Some(tx) => tx.send(action).await.is_ok(),
            None => false,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ControlSurface for MemorySurface {
    fn name(&self) -> &str {
        "memory"
    }

    async fn start(&self, actions: mpsc::Sender<UserAction>) -> Result<()> {
        self.lock().actions = Some(actions);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.lock().actions = None;
        Ok(())
    }

    async fn resolve_message(&self, id: &str) -> Result<Option<MessageRef>> {
        let mut inner = self.lock();
        inner.calls.push(SurfaceCall::Resolve(id.to_string()));
        Ok(inner.messages.contains_key(id).then(|| MessageRef::new(id)))
    }

    async fn create_message(&self, payload: &RenderedPayload) -> Result<MessageRef> {
        let mut inner = self.lock();
        if inner.fail_creates > 0 {
            inner.fail_creates -= 1;
            return Err(Error::Surface("create rejected".to_string()));
        }
        inner.next_id += 1;
        let id = inner.next_id.to_string();
        inner.calls.push(SurfaceCall::Create(id.clone()));
        inner.messages.insert(id.clone(), payload.clone());
        Ok(MessageRef::new(id))
    }

    async fn update_message(&self, message: &MessageRef, payload: &RenderedPayload) -> Result<()> {
        let mut inner = self.lock();
        inner.calls.push(SurfaceCall::Update(message.id.clone()));
        if inner.fail_updates > 0 {
            inner.fail_updates -= 1;
            return Err(Error::Surface("429 Too Many Requests".to_string()));
        }
        match inner.messages.get_mut(&message.id) {
            Some(existing) => {
                *existing = payload.clone();
                Ok(())
            }
            None => Err(Error::SurfaceMissing(message.id.clone())),
        }
    }

    async fn acknowledge(&self, action: &UserAction) -> Result<()> {
        self.lock()
            .calls
            .push(SurfaceCall::Acknowledge(action.interaction_id.clone()));
        Ok(())
    }
}
