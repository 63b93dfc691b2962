//! Connection lifecycle controller
//!
//! A single task owns the connection state and applies every transition:
//! operator commands, session events and retry firings all arrive through
//! its mailbox, so no two transitions ever run at the same time. After each
//! transition the task publishes a fresh [`Snapshot`] on a watch channel;
//! readers only ever see complete states.
//!
//! Retry timers live inside the `Failing` variant. Leaving `Failing` for any
//! reason drops the variant, which aborts the timer. A timer that already
//! fired is still harmless: the retry is only honored while the controller
//! is failing in the generation that scheduled it.

use crate::error::{Error, Result};
use crate::session::{SessionClient, SessionEvent, SessionHandle, SessionSink, TaggedEvent, Target};
use crate::state::{AuthChallenge, Phase, Position, Snapshot};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// Fixed delay between a failure and the next connect attempt
pub const RETRY_DELAY: Duration = Duration::from_secs(2);

const COMMAND_BUFFER: usize = 64;

enum Command {
    Connect(oneshot::Sender<()>),
    Disconnect(oneshot::Sender<()>),
    Inspect(oneshot::Sender<Snapshot>),
    Shutdown(oneshot::Sender<()>),
}

/// Cloneable handle for driving the controller
///
/// Commands resolve once the controller has applied them, so a returned
/// `connect()` means the attempt has been started (or ignored).
#[derive(Clone)]
pub struct ControllerHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<Snapshot>,
}

impl ControllerHandle {
    /// Start a connect attempt; no-op while connecting or connected
    pub async fn connect(&self) -> Result<()> {
        self.request(Command::Connect).await
    }

    /// Drop the session and any pending retry; no-op while disconnected
    pub async fn disconnect(&self) -> Result<()> {
        self.request(Command::Disconnect).await
    }

    /// Close the session, cancel any retry and stop the controller task
    pub async fn shutdown(&self) -> Result<()> {
        self.request(Command::Shutdown).await
    }

    /// State after every input queued before this call has been applied
    pub async fn inspect(&self) -> Result<Snapshot> {
        self.request(Command::Inspect).await
    }

    /// Latest published state, without waiting on the controller
    pub fn current(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver that is notified after every transition
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| Error::ControllerClosed)?;
        rx.await.map_err(|_| Error::ControllerClosed)
    }
}

/// Scheduled reconnect; aborted when dropped
struct RetryTimer {
    task: JoinHandle<()>,
}

impl RetryTimer {
    fn schedule(generation: u64, delay: Duration, tx: mpsc::UnboundedSender<u64>) -> Self {
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(generation);
        });
        Self { task }
    }
}

impl Drop for RetryTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

enum Link {
    Disconnected,
    Connecting {
        session: Box<dyn SessionHandle>,
    },
    AwaitingAuth {
        session: Box<dyn SessionHandle>,
        challenge: AuthChallenge,
    },
    Connected {
        session: Box<dyn SessionHandle>,
        position: Position,
    },
    Failing {
        error: String,
        _retry: RetryTimer,
    },
}

impl Link {
    fn phase(&self) -> Phase {
        match self {
            Link::Disconnected => Phase::Disconnected,
            Link::Connecting { .. } => Phase::Connecting,
            Link::AwaitingAuth { .. } => Phase::AwaitingAuth,
            Link::Connected { .. } => Phase::Connected,
            Link::Failing { .. } => Phase::Failing,
        }
    }

    fn into_session(self) -> Option<Box<dyn SessionHandle>> {
        match self {
            Link::Connecting { session }
            | Link::AwaitingAuth { session, .. }
            | Link::Connected { session, .. } => Some(session),
            Link::Disconnected | Link::Failing { .. } => None,
        }
    }
}

/// The state machine task
pub struct Controller {
    client: Arc<dyn SessionClient>,
    target: Target,
    link: Link,
    generation: u64,
    commands: mpsc::Receiver<Command>,
    events_tx: mpsc::UnboundedSender<TaggedEvent>,
    events: mpsc::UnboundedReceiver<TaggedEvent>,
    retry_tx: mpsc::UnboundedSender<u64>,
    retries: mpsc::UnboundedReceiver<u64>,
    snapshots: watch::Sender<Snapshot>,
}

impl Controller {
    /// Spawn the controller task in the Disconnected phase
    pub fn spawn(client: Arc<dyn SessionClient>, target: Target) -> ControllerHandle {
        let (controller, handle) = Self::new(client, target);
        tokio::spawn(controller.run());
        handle
    }

    fn new(client: Arc<dyn SessionClient>, target: Target) -> (Self, ControllerHandle) {
        let (commands_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (events_tx, events) = mpsc::unbounded_channel();
        let (retry_tx, retries) = mpsc::unbounded_channel();
        let (snapshots, snapshots_rx) = watch::channel(Snapshot::default());

        tracing::info!(client = client.name(), target = %target, "Controller started");

        let controller = Self {
            client,
            target,
            link: Link::Disconnected,
            generation: 0,
            commands,
            events_tx,
            events,
            retry_tx,
            retries,
            snapshots,
        };
        let handle = ControllerHandle {
            commands: commands_tx,
            snapshots: snapshots_rx,
        };
        (controller, handle)
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                Some(tagged) = self.events.recv() => self.on_session_event(tagged).await,
                Some(generation) = self.retries.recv() => self.on_retry(generation).await,
                command = self.commands.recv() => match command {
                    Some(Command::Connect(reply)) => {
                        self.connect().await;
                        let _ = reply.send(());
                    }
                    Some(Command::Disconnect(reply)) => {
                        self.disconnect().await;
                        let _ = reply.send(());
                    }
                    Some(Command::Inspect(reply)) => {
                        let _ = reply.send(self.snapshot());
                    }
                    Some(Command::Shutdown(reply)) => {
                        self.disconnect().await;
                        let _ = reply.send(());
                        break;
                    }
                    None => {
                        self.disconnect().await;
                        break;
                    }
                },
            }
        }
        tracing::info!(generation = self.generation, "Controller stopped");
    }

    async fn connect(&mut self) {
        match &self.link {
            Link::Connecting { .. } | Link::AwaitingAuth { .. } | Link::Connected { .. } => {
                tracing::debug!(
                    phase = self.link.phase().label(),
                    "Connect ignored, attempt already active"
                );
                return;
            }
            Link::Failing { .. } => tracing::debug!("Manual connect cancels pending retry"),
            Link::Disconnected => {}
        }
        self.link = Link::Disconnected;
        self.open_session().await;
    }

    async fn disconnect(&mut self) {
        if matches!(self.link, Link::Disconnected) {
            tracing::debug!("Disconnect ignored, already disconnected");
            return;
        }
        self.close_link().await;
        self.publish();
    }

    async fn on_retry(&mut self, generation: u64) {
        if !matches!(self.link, Link::Failing { .. }) || generation != self.generation {
            tracing::debug!(
                generation,
                current = self.generation,
                phase = self.link.phase().label(),
                "Stale retry discarded"
            );
            return;
        }
        tracing::info!(generation, "Retrying connection");
        self.link = Link::Disconnected;
        self.open_session().await;
    }

    async fn on_session_event(&mut self, tagged: TaggedEvent) {
        let TaggedEvent { generation, event } = tagged;
        if generation < self.generation {
            tracing::debug!(
                generation,
                current = self.generation,
                ?event,
                "Stale session event discarded"
            );
            return;
        }

        match event {
            SessionEvent::AuthChallenge(device) => {
                let challenge = AuthChallenge::from(device);
                match std::mem::replace(&mut self.link, Link::Disconnected) {
                    Link::Connecting { session } | Link::AwaitingAuth { session, .. } => {
                        tracing::info!(
                            url = ?challenge.verification_url,
                            code = ?challenge.code,
                            "Authentication required"
                        );
                        self.link = Link::AwaitingAuth { session, challenge };
                        self.publish();
                    }
                    other => self.ignore(other, "auth challenge"),
                }
            }
            SessionEvent::Spawned { position } => {
                match std::mem::replace(&mut self.link, Link::Disconnected) {
                    Link::Connecting { session }
                    | Link::AwaitingAuth { session, .. }
                    | Link::Connected { session, .. } => {
                        self.link = Link::Connected { session, position };
                        self.publish();
                    }
                    other => self.ignore(other, "spawn"),
                }
            }
            SessionEvent::Error { message } => self.fail(message).await,
            SessionEvent::Kicked { reason } => self.fail(format!("Kicked: {reason}")).await,
            SessionEvent::Ended => self.fail("Connection ended".to_string()).await,
        }
    }

    /// Close the session and schedule a retry; no-op when no session is open.
    async fn fail(&mut self, error: String) {
        if !matches!(
            self.link,
            Link::Connecting { .. } | Link::AwaitingAuth { .. } | Link::Connected { .. }
        ) {
            tracing::debug!(
                phase = self.link.phase().label(),
                error = %error,
                "Session failure ignored, no session open"
            );
            return;
        }
        self.close_link().await;
        self.schedule_retry(error);
    }

    async fn open_session(&mut self) {
        self.generation += 1;
        let sink = SessionSink::new(self.generation, self.events_tx.clone());
        tracing::debug!(generation = self.generation, target = %self.target, "Opening session");

        match self.client.open(&self.target, sink).await {
            Ok(session) => {
                self.link = Link::Connecting { session };
                self.publish();
            }
            Err(e) => self.schedule_retry(e.to_string()),
        }
    }

    fn schedule_retry(&mut self, error: String) {
        tracing::warn!(
            generation = self.generation,
            error = %error,
            retry_in_secs = RETRY_DELAY.as_secs(),
            "Session failed"
        );
        let retry = RetryTimer::schedule(self.generation, RETRY_DELAY, self.retry_tx.clone());
        self.link = Link::Failing {
            error,
            _retry: retry,
        };
        self.publish();
    }

    async fn close_link(&mut self) {
        let previous = std::mem::replace(&mut self.link, Link::Disconnected);
        if let Some(mut session) = previous.into_session() {
            session.close().await;
        }
    }

    fn ignore(&mut self, link: Link, what: &str) {
        tracing::debug!(phase = link.phase().label(), "Ignoring {what}");
        self.link = link;
    }

    fn snapshot(&self) -> Snapshot {
        let mut snapshot = Snapshot {
            phase: self.link.phase(),
            generation: self.generation,
            ..Snapshot::default()
        };
        match &self.link {
            Link::AwaitingAuth { challenge, .. } => {
                snapshot.auth_challenge = Some(challenge.clone());
            }
            Link::Connected { position, .. } => snapshot.position = Some(*position),
            Link::Failing { error, .. } => {
                snapshot.last_error = Some(error.clone());
                snapshot.retry_pending = true;
            }
            Link::Disconnected | Link::Connecting { .. } => {}
        }
        snapshot
    }

    fn publish(&self) {
        let snapshot = self.snapshot();
        tracing::info!(
            phase = snapshot.phase.label(),
            generation = snapshot.generation,
            "State changed"
        );
        self.snapshots.send_replace(snapshot);
    }
}
