//! Control message rendering
//!
//! `render` is a pure function of the snapshot: the same state always
//! yields the same payload, so re-rendering is idempotent. Platform
//! adapters turn the payload into their own wire format.

use crate::controller::RETRY_DELAY;
use crate::state::{Phase, Snapshot};
use serde::Serialize;

pub const TITLE: &str = "🎮 Minecraft Bot Control Center";
const PLACEHOLDER: &str = "Loading...";
/// Longest error text shown; the retry notice always follows it
const ERROR_LIMIT: usize = 1000;

/// Accent color of the control message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorCategory {
    Connected,
    Connecting,
    Auth,
    Alert,
}

impl ColorCategory {
    /// RGB value used by the Discord embed
    pub fn rgb(&self) -> u32 {
        match self {
            ColorCategory::Connected => 0x00ff00,
            ColorCategory::Connecting => 0xffaa00,
            ColorCategory::Auth => 0x0099ff,
            ColorCategory::Alert => 0xff0000,
        }
    }
}

/// The single button under the control message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Connect,
    Disconnect,
}

impl Action {
    /// Identifier carried by the button and echoed back on press
    pub fn id(&self) -> &'static str {
        match self {
            Action::Connect => "connect",
            Action::Disconnect => "disconnect",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "connect" => Some(Action::Connect),
            "disconnect" => Some(Action::Disconnect),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Action::Connect => "Connect",
            Action::Disconnect => "Disconnect",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Action::Connect => "🔗",
            Action::Disconnect => "🔌",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    pub name: String,
    pub value: String,
}

impl Field {
    fn new(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
        }
    }
}

/// Platform-neutral control message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedPayload {
    pub title: String,
    pub description: String,
    pub color: ColorCategory,
    pub fields: Vec<Field>,
    pub action: Action,
}

pub fn render(snapshot: &Snapshot) -> RenderedPayload {
    let mut fields = Vec::new();
    let (color, description) = match snapshot.phase {
        Phase::Disconnected => (
            ColorCategory::Alert,
            "Bot is currently **disconnected** from the Minecraft server.".to_string(),
        ),
        Phase::Connecting => (
            ColorCategory::Connecting,
            "Bot is **connecting** to the server...\nInitializing connection...".to_string(),
        ),
        Phase::AwaitingAuth => {
            let challenge = snapshot.auth_challenge.clone().unwrap_or_default();
            let url = challenge
                .verification_url
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| PLACEHOLDER.to_string());
            let code = challenge
                .code
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| PLACEHOLDER.to_string());
            fields.push(Field::new("🔗 Login URL", url));
            fields.push(Field::new("🔑 Code", format!("`{code}`")));
            fields.push(Field::new(
                "ℹ️ Instructions",
                "Click the link above and enter the code to authenticate.",
            ));
            (
                ColorCategory::Auth,
                "**Microsoft Authentication Required**".to_string(),
            )
        }
        Phase::Connected => {
            let position = snapshot
                .position
                .map(|p| p.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            (
                ColorCategory::Connected,
                format!("Bot is **connected** to the server!\nPosition: {position}"),
            )
        }
        Phase::Failing => {
            let error = snapshot.last_error.as_deref().unwrap_or("unknown error");
            let error = if error.chars().count() > ERROR_LIMIT {
                let mut cut: String = error.chars().take(ERROR_LIMIT).collect();
                cut.push('…');
                cut
            } else {
                error.to_string()
            };
            (
                ColorCategory::Alert,
                format!(
                    "**Error:** {error}\n\nRetrying in {} seconds...",
                    RETRY_DELAY.as_secs()
                ),
            )
        }
    };

    let action = if snapshot.phase == Phase::Connected {
        Action::Disconnect
    } else {
        Action::Connect
    };

    RenderedPayload {
        title: TITLE.to_string(),
        description,
        color,
        fields,
        action,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{AuthChallenge, DeviceCode, Position};

    fn snapshot(phase: Phase) -> Snapshot {
        Snapshot {
            phase,
            ..Snapshot::default()
        }
    }

    #[test]
    fn test_disconnected() {
        let payload = render(&snapshot(Phase::Disconnected));
        assert_eq!(payload.title, TITLE);
        assert!(payload.description.contains("**disconnected**"));
        assert_eq!(payload.color, ColorCategory::Alert);
        assert_eq!(payload.action, Action::Connect);
        assert!(payload.fields.is_empty());
    }

    #[test]
    fn test_connecting() {
        let payload = render(&snapshot(Phase::Connecting));
        assert!(payload.description.contains("**connecting**"));
        assert_eq!(payload.color, ColorCategory::Connecting);
        assert_eq!(payload.action, Action::Connect);
    }

    #[test]
    fn test_connected_shows_position_and_disconnect() {
        let payload = render(&Snapshot {
            phase: Phase::Connected,
            position: Some(Position::new(1, 64, 1)),
            ..Snapshot::default()
        });
        assert!(payload.description.ends_with("Position: 1, 64, 1"));
        assert_eq!(payload.color, ColorCategory::Connected);
        assert_eq!(payload.action, Action::Disconnect);
    }

    #[test]
    fn test_failing_shows_error_and_retry_notice() {
        let payload = render(&Snapshot {
            phase: Phase::Failing,
            last_error: Some("Kicked: afk".into()),
            retry_pending: true,
            ..Snapshot::default()
        });
        assert_eq!(
            payload.description,
            "**Error:** Kicked: afk\n\nRetrying in 2 seconds..."
        );
        assert_eq!(payload.action, Action::Connect);
    }

    #[test]
    fn test_long_error_keeps_retry_notice() {
        let kick = format!("Kicked: {}", "{\"text\":\"spam\"}".repeat(500));
        let payload = render(&Snapshot {
            phase: Phase::Failing,
            last_error: Some(kick),
            retry_pending: true,
            ..Snapshot::default()
        });
        assert!(payload.description.ends_with("…\n\nRetrying in 2 seconds..."));
        assert!(payload.description.chars().count() < 1100);
    }

    #[test]
    fn test_auth_challenge_fields() {
        let challenge = AuthChallenge::from(DeviceCode {
            verification_uri: Some("https://x".into()),
            user_code: Some("ABC123".into()),
        });
        let payload = render(&Snapshot {
            phase: Phase::AwaitingAuth,
            auth_challenge: Some(challenge),
            ..Snapshot::default()
        });
        assert_eq!(payload.color, ColorCategory::Auth);
        assert_eq!(payload.fields[0].value, "https://x?otc=ABC123");
        assert_eq!(payload.fields[1].value, "`ABC123`");
        assert_eq!(payload.fields.len(), 3);
    }

    #[test]
    fn test_auth_challenge_placeholders() {
        let payload = render(&Snapshot {
            phase: Phase::AwaitingAuth,
            auth_challenge: Some(AuthChallenge {
                verification_url: None,
                code: Some(String::new()),
            }),
            ..Snapshot::default()
        });
        assert_eq!(payload.fields[0].value, "Loading...");
        assert_eq!(payload.fields[1].value, "`Loading...`");

        let missing = render(&snapshot(Phase::AwaitingAuth));
        assert_eq!(missing.fields[0].value, "Loading...");
    }

    #[test]
    fn test_render_is_deterministic() {
        let s = Snapshot {
            phase: Phase::Connected,
            position: Some(Position::new(-5, 70, 12)),
            generation: 3,
            ..Snapshot::default()
        };
        assert_eq!(render(&s), render(&s.clone()));
    }

    #[test]
    fn test_action_ids_round_trip() {
        assert_eq!(Action::from_id("connect"), Some(Action::Connect));
        assert_eq!(Action::from_id(Action::Disconnect.id()), Some(Action::Disconnect));
        assert_eq!(Action::from_id("restart"), None);
    }

    #[test]
    fn test_color_values() {
        assert_eq!(ColorCategory::Connected.rgb(), 0x00ff00);
        assert_eq!(ColorCategory::Connecting.rgb(), 0xffaa00);
        assert_eq!(ColorCategory::Auth.rgb(), 0x0099ff);
        assert_eq!(ColorCategory::Alert.rgb(), 0xff0000);
    }
}
