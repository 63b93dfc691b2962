//! Connection state as seen from outside the controller
//!
//! The controller publishes a [`Snapshot`] after every transition. The
//! synchronizer renders it and the status endpoint reads it; neither can
//! mutate it.

use serde::{Deserialize, Serialize};

/// Fallback device-login page when the challenge omits one
pub const DEFAULT_VERIFICATION_URI: &str = "https://www.microsoft.com/link";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Disconnected,
    Connecting,
    AwaitingAuth,
    Connected,
    Failing,
}

impl Phase {
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Disconnected => "disconnected",
            Phase::Connecting => "connecting",
            Phase::AwaitingAuth => "awaiting_auth",
            Phase::Connected => "connected",
            Phase::Failing => "failing",
        }
    }

    /// True while an attempt is in flight and has not spawned yet
    pub fn is_connecting(&self) -> bool {
        matches!(self, Phase::Connecting | Phase::AwaitingAuth)
    }
}

/// Block position of the bot, floored to whole coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl Position {
    pub fn new(x: i64, y: i64, z: i64) -> Self {
        Self { x, y, z }
    }

    pub fn from_f64(x: f64, y: f64, z: f64) -> Self {
        Self {
            x: x.floor() as i64,
            y: y.floor() as i64,
            z: z.floor() as i64,
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, {}, {}", self.x, self.y, self.z)
    }
}

/// Raw device-code payload as the auth provider hands it over
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCode {
    #[serde(default, alias = "verificationUri")]
    pub verification_uri: Option<String>,
    #[serde(default, alias = "userCode")]
    pub user_code: Option<String>,
}

/// Login link and code shown to the operator while authentication is pending
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthChallenge {
    pub verification_url: Option<String>,
    pub code: Option<String>,
}

impl From<DeviceCode> for AuthChallenge {
    fn from(device: DeviceCode) -> Self {
        let code = device.user_code.filter(|c| !c.is_empty());
        let base = device
            .verification_uri
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_VERIFICATION_URI.to_string());
        let verification_url = match &code {
            Some(code) => Some(format!("{base}?otc={code}")),
            None => Some(base),
        };
        Self {
            verification_url,
            code,
        }
    }
}

/// Immutable copy of the controller state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub phase: Phase,
    pub auth_challenge: Option<AuthChallenge>,
    pub last_error: Option<String>,
    pub position: Option<Position>,
    pub generation: u64,
    pub retry_pending: bool,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            phase: Phase::Disconnected,
            auth_challenge: None,
            last_error: None,
            position: None,
            generation: 0,
            retry_pending: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_all_variants() {
        assert_eq!(Phase::Disconnected.label(), "disconnected");
        assert_eq!(Phase::Connecting.label(), "connecting");
        assert_eq!(Phase::AwaitingAuth.label(), "awaiting_auth");
        assert_eq!(Phase::Connected.label(), "connected");
        assert_eq!(Phase::Failing.label(), "failing");
    }

    #[test]
    fn test_is_connecting() {
        assert!(Phase::Connecting.is_connecting());
        assert!(Phase::AwaitingAuth.is_connecting());
        assert!(!Phase::Connected.is_connecting());
        assert!(!Phase::Failing.is_connecting());
        assert!(!Phase::Disconnected.is_connecting());
    }

    #[test]
    fn test_position_floors() {
        assert_eq!(Position::from_f64(1.7, 64.0, -0.5), Position::new(1, 64, -1));
        assert_eq!(Position::new(1, 64, 1).to_string(), "1, 64, 1");
    }

    #[test]
    fn test_device_code_camel_case() {
        let device: DeviceCode =
            serde_json::from_str(r#"{"verificationUri":"https://x","userCode":"ABC123"}"#)
                .unwrap();
        let challenge = AuthChallenge::from(device);
        assert_eq!(challenge.code.as_deref(), Some("ABC123"));
        assert_eq!(challenge.verification_url.as_deref(), Some("https://x?otc=ABC123"));
    }

    #[test]
    fn test_device_code_snake_case() {
        let device: DeviceCode =
            serde_json::from_str(r#"{"verification_uri":"https://y","user_code":"Q1"}"#).unwrap();
        assert_eq!(device.verification_uri.as_deref(), Some("https://y"));
        assert_eq!(device.user_code.as_deref(), Some("Q1"));
    }

    #[test]
    fn test_challenge_default_base() {
        let challenge = AuthChallenge::from(DeviceCode {
            verification_uri: None,
            user_code: Some("ZZ9".into()),
        });
        assert_eq!(
            challenge.verification_url.as_deref(),
            Some("https://www.microsoft.com/link?otc=ZZ9")
        );
    }

    #[test]
    fn test_challenge_without_code() {
        let challenge = AuthChallenge::from(DeviceCode::default());
        assert_eq!(challenge.code, None);
        assert_eq!(challenge.verification_url.as_deref(), Some(DEFAULT_VERIFICATION_URI));
    }

    #[test]
    fn test_default_snapshot() {
        let s = Snapshot::default();
        assert_eq!(s.phase, Phase::Disconnected);
        assert_eq!(s.generation, 0);
        assert!(!s.retry_pending);
    }
}
