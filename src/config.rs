//! Runtime configuration
//!
//! Every setting comes from a command-line flag or its environment variable.

use crate::error::{Error, Result};
use crate::session::Target;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "mc-tether")]
#[command(version)]
#[command(about = "Keeps a Minecraft bot connected and controllable from a Discord message")]
pub struct Config {
    /// Discord bot token
    #[arg(long, env = "DISCORD_TOKEN", hide_env_values = true)]
    pub discord_token: String,

    /// Channel that hosts the control message
    #[arg(long, env = "CHANNEL_ID")]
    pub channel_id: String,

    /// Minecraft server host
    #[arg(long, env = "MINECRAFT_HOST")]
    pub minecraft_host: String,

    /// Minecraft server port
    #[arg(long, env = "MINECRAFT_PORT", default_value_t = 25565)]
    pub minecraft_port: u16,

    /// Account the bot logs in as
    #[arg(long, env = "MINECRAFT_USERNAME")]
    pub minecraft_username: String,

    /// Authentication mode passed to the session bridge
    #[arg(long, env = "MINECRAFT_AUTH", default_value = "microsoft")]
    pub minecraft_auth: String,

    /// Where the control message id is remembered
    #[arg(long, env = "SECRETS_FILE", default_value = "secrets.json")]
    pub secrets_file: PathBuf,

    /// Bind address of the status endpoint
    #[arg(long, env = "STATUS_ADDR", default_value = "0.0.0.0:10000")]
    pub status_addr: SocketAddr,

    /// Command that runs the session bridge; the default runs the
    /// `session-bridge.js` shipped next to `Cargo.toml`
    #[arg(long, env = "SESSION_COMMAND", default_value = "node session-bridge.js")]
    pub session_command: String,

    /// Wait for a button press instead of connecting at startup
    #[arg(long)]
    pub no_auto_connect: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Config {
    /// Reject values clap accepts but the bot cannot run with.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("DISCORD_TOKEN", &self.discord_token),
            ("CHANNEL_ID", &self.channel_id),
            ("MINECRAFT_HOST", &self.minecraft_host),
            ("MINECRAFT_USERNAME", &self.minecraft_username),
            ("SESSION_COMMAND", &self.session_command),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(Error::Config(format!("{name} must not be empty")));
            }
        }

        if !self.channel_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::Config(format!(
                "CHANNEL_ID must be a numeric channel id, got '{}'",
                self.channel_id
            )));
        }

        if self.minecraft_port == 0 {
            return Err(Error::Config("MINECRAFT_PORT must not be 0".to_string()));
        }

        Ok(())
    }

    pub fn target(&self) -> Target {
        Target {
            host: self.minecraft_host.clone(),
            port: self.minecraft_port,
            username: self.minecraft_username.clone(),
            auth: self.minecraft_auth.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> std::result::Result<Config, clap::Error> {
        let mut args = vec![
            "mc-tether",
            "--discord-token",
            "tok",
            "--channel-id",
            "1234567890",
            "--minecraft-host",
            "mc.example.net",
            "--minecraft-username",
            "bot",
        ];
        args.extend_from_slice(extra);
        Config::try_parse_from(args)
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.minecraft_port, 25565);
        assert_eq!(config.minecraft_auth, "microsoft");
        assert_eq!(config.secrets_file, PathBuf::from("secrets.json"));
        assert_eq!(config.status_addr, "0.0.0.0:10000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.session_command, "node session-bridge.js");
        assert!(!config.no_auto_connect);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_target() {
        let config = parse(&["--minecraft-port", "25570", "--minecraft-auth", "offline"]).unwrap();
        let target = config.target();
        assert_eq!(target.host, "mc.example.net");
        assert_eq!(target.port, 25570);
        assert_eq!(target.username, "bot");
        assert_eq!(target.auth, "offline");
    }

    #[test]
    fn test_validate_rejects_non_numeric_channel() {
        let mut config = parse(&[]).unwrap();
        config.channel_id = "general".into();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_blank_values() {
        let mut config = parse(&[]).unwrap();
        config.minecraft_host = "  ".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("MINECRAFT_HOST"));
    }

    #[test]
    fn test_invalid_port_is_a_parse_error() {
        assert!(parse(&["--minecraft-port", "not-a-port"]).is_err());
    }
}
