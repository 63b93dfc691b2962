//! Error types for mc-tether

use thiserror::Error;

/// Errors that can occur while keeping the session and control surface alive
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid startup configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// The session client could not open the remote connection
    #[error("Failed to open session to {target}: {reason}")]
    SessionOpen { target: String, reason: String },

    /// Loading or saving the persisted control message record failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// The control message no longer exists on the platform
    #[error("Control message {0} not found")]
    SurfaceMissing(String),

    /// Messaging platform rejected a request
    #[error("Surface error: {0}")]
    Surface(String),

    /// Messaging platform gateway connection failure
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// The controller task is no longer running
    #[error("Controller is not running")]
    ControllerClosed,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for mc-tether operations
pub type Result<T> = std::result::Result<T, Error>;
