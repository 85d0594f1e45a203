//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.reelbot/config.json`) and environment.
//! Secrets (Slack bot token, TMDB api key, slash-command tokens) can be provided
//! either in the config file or as environment variables; env wins.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Slack connection and reply settings.
    #[serde(default)]
    pub slack: SlackConfig,

    /// TMDB api settings.
    #[serde(default)]
    pub tmdb: TmdbConfig,

    /// Webhook server bind and port.
    #[serde(default)]
    pub server: ServerConfig,

    /// Bot behavior (session timeout, repeat cap, shutdown delay).
    #[serde(default)]
    pub bot: BotConfig,
}

/// Slack settings: bot token, optional per-command verification tokens, reply visibility.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlackConfig {
    /// Bot user OAuth token. Overridden by SLACK_BOT_TOKEN env when set.
    pub bot_token: Option<String>,

    /// Verification token for the /movie slash command. Overridden by SLACK_MOVIE_CMD_TOKEN.
    /// When unset, /movie payloads are accepted without a token check.
    pub movie_command_token: Option<String>,

    /// Verification token for the /actor slash command. Overridden by SLACK_ACTOR_CMD_TOKEN.
    pub actor_command_token: Option<String>,

    /// Whether slash-command replies are visible to the whole channel or only the caller.
    #[serde(default)]
    pub response_visibility: ResponseVisibility,
}

/// Visibility of slash-command replies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResponseVisibility {
    /// Reply is posted to the channel for everyone.
    #[default]
    InChannel,

    /// Reply is shown only to the user who ran the command.
    Ephemeral,
}

impl ResponseVisibility {
    /// Slack `response_type` wire value.
    pub fn response_type(self) -> &'static str {
        match self {
            ResponseVisibility::InChannel => "in_channel",
            ResponseVisibility::Ephemeral => "ephemeral",
        }
    }
}

/// TMDB settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TmdbConfig {
    /// TMDB v3 api key. Overridden by TMDB_API_KEY env when set.
    pub api_key: Option<String>,
}

/// Webhook server bind and port settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Port for the Slack events/commands webhook (default 3000).
    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_server_bind")]
    pub bind: String,
}

fn default_server_port() -> u16 {
    3000
}

fn default_server_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_server_port(),
            bind: default_server_bind(),
        }
    }
}

/// Bot behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotConfig {
    /// Seconds a conversation waits for the next reply before ending timedOut (default 120).
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,

    /// How many times a step may repeat before the session gives up (default 3).
    #[serde(default = "default_session_max_repeats")]
    pub session_max_repeats: u32,

    /// Delay between a confirmed shutdown and process termination (default 3).
    #[serde(default = "default_shutdown_delay_secs")]
    pub shutdown_delay_secs: u64,
}

fn default_session_timeout_secs() -> u64 {
    120
}

fn default_session_max_repeats() -> u32 {
    3
}

fn default_shutdown_delay_secs() -> u64 {
    3
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            session_timeout_secs: default_session_timeout_secs(),
            session_max_repeats: default_session_max_repeats(),
            shutdown_delay_secs: default_shutdown_delay_secs(),
        }
    }
}

fn env_or(var: &str, config_value: Option<&String>) -> Option<String> {
    std::env::var(var)
        .ok()
        .and_then(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .or_else(|| {
            config_value
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

/// Resolve the Slack bot token: env SLACK_BOT_TOKEN overrides config.
pub fn resolve_slack_token(config: &Config) -> Option<String> {
    env_or("SLACK_BOT_TOKEN", config.slack.bot_token.as_ref())
}

/// Resolve the TMDB api key: env TMDB_API_KEY overrides config.
pub fn resolve_tmdb_key(config: &Config) -> Option<String> {
    env_or("TMDB_API_KEY", config.tmdb.api_key.as_ref())
}

/// Resolve the /movie command verification token: env SLACK_MOVIE_CMD_TOKEN overrides config.
pub fn resolve_movie_command_token(config: &Config) -> Option<String> {
    env_or(
        "SLACK_MOVIE_CMD_TOKEN",
        config.slack.movie_command_token.as_ref(),
    )
}

/// Resolve the /actor command verification token: env SLACK_ACTOR_CMD_TOKEN overrides config.
pub fn resolve_actor_command_token(config: &Config) -> Option<String> {
    env_or(
        "SLACK_ACTOR_CMD_TOKEN",
        config.slack.actor_command_token.as_ref(),
    )
}

/// Resolve bot token and TMDB key or fail with a startup diagnostic.
pub fn require_credentials(config: &Config) -> Result<(String, String)> {
    let slack = resolve_slack_token(config)
        .context("Slack bot token missing (set SLACK_BOT_TOKEN or slack.botToken in config)")?;
    let tmdb = resolve_tmdb_key(config)
        .context("TMDB api key missing (set TMDB_API_KEY or tmdb.apiKey in config)")?;
    Ok((slack, tmdb))
}

/// Resolve config path from env or default (~/.reelbot/config.json).
pub fn default_config_path() -> PathBuf {
    std::env::var("REELBOT_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".reelbot").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Default path for the persisted user store (`users.json` next to the config file).
pub fn default_user_store_path(config_path: &std::path::Path) -> PathBuf {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| std::path::Path::new("."))
        .join("users.json")
}

/// Load config from the default path (or REELBOT_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
