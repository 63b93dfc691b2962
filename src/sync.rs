//! Control message synchronizer
//!
//! Owns the one control message: attaches to it at startup (reusing the
//! persisted id when the platform still knows it), re-renders it after
//! every published state change, and turns button presses into controller
//! commands.

use crate::controller::ControllerHandle;
use crate::error::{Error, Result};
use crate::render::{render, Action};
use crate::state::Snapshot;
use crate::store::{StateStore, SurfaceRecord};
use crate::surface::{ControlSurface, MessageRef, UserAction};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

const ATTACH_MIN_BACKOFF: Duration = Duration::from_secs(2);
const ATTACH_MAX_BACKOFF: Duration = Duration::from_secs(60);
const RENDER_MIN_BACKOFF: Duration = Duration::from_secs(1);
const RENDER_MAX_BACKOFF: Duration = Duration::from_secs(30);
const FINAL_RENDER_ATTEMPTS: usize = 3;

/// Backoff state for a render that did not reach the platform
#[derive(Debug, Default)]
struct RenderRetry {
    due: Option<Instant>,
    backoff: Option<Duration>,
}

impl RenderRetry {
    fn is_pending(&self) -> bool {
        self.due.is_some()
    }

    /// Schedule the next attempt after a failure; clear on success
    fn record(&mut self, synced: bool) {
        if synced {
            self.reset();
            return;
        }
        let backoff = match self.backoff {
            Some(previous) => (previous * 2).min(RENDER_MAX_BACKOFF),
            None => RENDER_MIN_BACKOFF,
        };
        self.backoff = Some(backoff);
        self.due = Some(Instant::now() + backoff);
    }

    fn reset(&mut self) {
        self.due = None;
        self.backoff = None;
    }

    async fn wait(&self) {
        if let Some(due) = self.due {
            tokio::time::sleep_until(due).await;
        }
    }
}

pub struct Synchronizer {
    surface: Arc<dyn ControlSurface>,
    store: Arc<dyn StateStore>,
    controller: ControllerHandle,
    message: MessageRef,
}

impl Synchronizer {
    /// Find or create the control message.
    ///
    /// A missing, unreadable or unresolvable record leads to a new message
    /// whose id replaces the record. Only a failed create is an error.
    pub async fn attach(
        surface: Arc<dyn ControlSurface>,
        store: Arc<dyn StateStore>,
        controller: ControllerHandle,
    ) -> Result<Self> {
        let record = store.load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to load control message record, starting fresh");
            SurfaceRecord::default()
        });

        let existing = match record.message_id.as_deref() {
            Some(id) => match surface.resolve_message(id).await {
                Ok(found) => {
                    if found.is_none() {
                        tracing::info!(message_id = id, "Persisted control message is gone");
                    }
                    found
                }
                Err(e) => {
                    tracing::warn!(message_id = id, error = %e, "Failed to resolve control message");
                    None
                }
            },
            None => None,
        };

        let message = match existing {
            Some(message) => {
                tracing::info!(message_id = %message.id, "Reusing control message");
                message
            }
            None => {
                let message = surface.create_message(&render(&controller.current())).await?;
                tracing::info!(message_id = %message.id, "Created control message");
                persist(store.as_ref(), &message);
                message
            }
        };

        Ok(Self {
            surface,
            store,
            controller,
            message,
        })
    }

    /// `attach` with exponential backoff; returns once a message is attached.
    pub async fn attach_with_retry(
        surface: Arc<dyn ControlSurface>,
        store: Arc<dyn StateStore>,
        controller: ControllerHandle,
    ) -> Self {
        let mut backoff = ATTACH_MIN_BACKOFF;
        loop {
            match Self::attach(surface.clone(), store.clone(), controller.clone()).await {
                Ok(sync) => return sync,
                Err(e) => {
                    tracing::warn!(
                        surface = surface.name(),
                        error = %e,
                        backoff_secs = backoff.as_secs(),
                        "Failed to attach control message, retrying after backoff"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(ATTACH_MAX_BACKOFF);
                }
            }
        }
    }

    /// Id of the message currently owned
    pub fn message_id(&self) -> &str {
        &self.message.id
    }

    /// Keep the message in step with the controller until the controller
    /// goes away. A failed render is retried with backoff until it lands
    /// or a newer state replaces it. The last published state is rendered
    /// before returning.
    pub async fn run(mut self, mut actions: mpsc::Receiver<UserAction>) {
        let mut snapshots = self.controller.subscribe();
        let initial = snapshots.borrow_and_update().clone();
        let mut resync = RenderRetry::default();
        resync.record(self.sync(&initial).await);

        let mut actions_open = true;
        loop {
            tokio::select! {
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = snapshots.borrow_and_update().clone();
                    resync.reset();
                    resync.record(self.sync(&snapshot).await);
                }
                _ = resync.wait(), if resync.is_pending() => {
                    let snapshot = snapshots.borrow().clone();
                    tracing::debug!(phase = snapshot.phase.label(), "Retrying control message render");
                    resync.record(self.sync(&snapshot).await);
                }
                action = actions.recv(), if actions_open => match action {
                    Some(action) => self.handle_action(action).await,
                    None => actions_open = false,
                },
            }
        }

        let last = snapshots.borrow().clone();
        for _ in 0..FINAL_RENDER_ATTEMPTS {
            if !resync.is_pending() {
                break;
            }
            resync.wait().await;
            resync.record(self.sync(&last).await);
        }

        tracing::debug!(message_id = %self.message.id, "Synchronizer stopped");
    }

    /// Render `snapshot` into the owned message, recreating it if deleted.
    ///
    /// Returns false when the message still shows an older state.
    pub async fn sync(&mut self, snapshot: &Snapshot) -> bool {
        let payload = render(snapshot);
        match self.surface.update_message(&self.message, &payload).await {
            Ok(()) => {
                tracing::debug!(phase = snapshot.phase.label(), "Control message updated");
                true
            }
            Err(Error::SurfaceMissing(id)) => {
                tracing::warn!(message_id = %id, "Control message was deleted, recreating");
                match self.surface.create_message(&payload).await {
                    Ok(message) => {
                        tracing::info!(message_id = %message.id, "Created control message");
                        persist(self.store.as_ref(), &message);
                        self.message = message;
                        true
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to recreate control message");
                        false
                    }
                }
            }
            Err(e) => {
                tracing::warn!(message_id = %self.message.id, error = %e, "Failed to update control message");
                false
            }
        }
    }

    /// Acknowledge a press on the owned message, then forward it.
    pub async fn handle_action(&self, action: UserAction) {
        if action.message_id != self.message.id {
            tracing::debug!(
                message_id = %action.message_id,
                "Ignoring action from another message"
            );
            return;
        }

        if let Err(e) = self.surface.acknowledge(&action).await {
            tracing::warn!(interaction = %action.interaction_id, error = %e, "Failed to acknowledge action");
        }

        let result = match Action::from_id(&action.action_id) {
            Some(Action::Connect) => self.controller.connect().await,
            Some(Action::Disconnect) => self.controller.disconnect().await,
            None => {
                tracing::debug!(action = %action.action_id, "Ignoring unknown action");
                return;
            }
        };
        if let Err(e) = result {
            tracing::warn!(action = %action.action_id, error = %e, "Failed to forward action");
        }
    }
}

fn persist(store: &dyn StateStore, message: &MessageRef) {
    if let Err(e) = store.save(&SurfaceRecord::new(message.id.clone())) {
        tracing::warn!(message_id = %message.id, error = %e, "Failed to persist control message id");
    }
}
