//! Control surface adapters
//!
//! A control surface is the messaging platform that hosts the one control
//! message. Adapters create and edit that message from a
//! [`RenderedPayload`](crate::render::RenderedPayload) and report button
//! presses as [`UserAction`]s.

use crate::error::Result;
use crate::render::RenderedPayload;
use async_trait::async_trait;
use tokio::sync::mpsc;

pub mod discord;
mod gateway;
pub mod memory;

pub use discord::DiscordSurface;
pub use memory::MemorySurface;

/// Reference to a message owned by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    pub id: String,
}

impl MessageRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// A button press reported by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAction {
    /// Platform id of the interaction
    pub interaction_id: String,
    /// Token needed to acknowledge the interaction
    pub token: String,
    /// Message the button belongs to
    pub message_id: String,
    /// Button identifier, e.g. "connect"
    pub action_id: String,
}

/// Trait for control surface adapters
#[async_trait]
pub trait ControlSurface: Send + Sync {
    /// Adapter name for logs
    fn name(&self) -> &str;

    /// Start receiving user actions
    async fn start(&self, actions: mpsc::Sender<UserAction>) -> Result<()>;

    /// Stop receiving user actions
    async fn stop(&self) -> Result<()>;

    /// Look up a message by id; `Ok(None)` when it no longer exists
    async fn resolve_message(&self, id: &str) -> Result<Option<MessageRef>>;

    /// Post a new control message
    async fn create_message(&self, payload: &RenderedPayload) -> Result<MessageRef>;

    /// Edit a control message in place
    ///
    /// Returns [`Error::SurfaceMissing`](crate::Error::SurfaceMissing) when
    /// the message was deleted on the platform.
    async fn update_message(&self, message: &MessageRef, payload: &RenderedPayload)
        -> Result<()>;

    /// Tell the platform the action was received
    async fn acknowledge(&self, action: &UserAction) -> Result<()>;
}
