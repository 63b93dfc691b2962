//! # mc-tether
//!
//! Keeps one Minecraft bot session alive and lets an operator drive it from a
//! single Discord control message.
//!
//! ## Overview
//!
//! A [`Controller`] task owns the connection state machine. It opens sessions
//! through a [`SessionClient`], applies lifecycle events, retries failures
//! after a fixed delay and publishes a [`Snapshot`] after every transition.
//! The [`Synchronizer`] renders each snapshot into the control message and
//! turns button presses back into controller commands, while the status
//! endpoint serves the same snapshot over HTTP.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use mc_tether::{Controller, MemorySessionClient, Phase, Target};
//!
//! # async fn example() -> mc_tether::Result<()> {
//! let client = MemorySessionClient::new();
//! let target = Target {
//!     host: "localhost".into(),
//!     port: 25565,
//!     username: "bot".into(),
//!     auth: "offline".into(),
//! };
//!
//! let controller = Controller::spawn(Arc::new(client.clone()), target);
//! controller.connect().await?;
//! assert_eq!(controller.current().phase, Phase::Connecting);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **SessionClient** trait: opens a game session and reports its events
//! - **Controller**: single-task state machine with retry and stale-event guard
//! - **render**: pure snapshot to control-message payload
//! - **ControlSurface** trait: the platform hosting the control message
//! - **Synchronizer**: keeps the control message in step with the controller
//! - **StateStore** trait: remembers the control message id across restarts

pub mod config;
pub mod controller;
pub mod error;
pub mod render;
pub mod session;
pub mod state;
pub mod status;
pub mod store;
pub mod surface;
pub mod sync;

// Re-export core types
pub use config::Config;
pub use controller::{Controller, ControllerHandle, RETRY_DELAY};
pub use error::{Error, Result};
pub use render::{render, Action, ColorCategory, RenderedPayload};
pub use session::{SessionClient, SessionEvent, SessionHandle, SessionSink, Target};
pub use state::{AuthChallenge, DeviceCode, Phase, Position, Snapshot};
pub use store::{FileStateStore, MemoryStateStore, StateStore, SurfaceRecord};
pub use surface::{ControlSurface, MessageRef, UserAction};
pub use sync::Synchronizer;

// Re-export adapters for convenience
pub use session::memory::MemorySessionClient;
pub use session::process::ProcessSessionClient;
pub use surface::{DiscordSurface, MemorySurface};
