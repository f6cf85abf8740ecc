//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.mealsnap/config.json`) and
//! environment. Secrets (bot token, webhook URL) can be overridden via env so
//! they stay out of the config file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP server settings (health + webhook endpoint).
    #[serde(default)]
    pub server: ServerConfig,

    /// Telegram ingestion settings.
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Image intake limits.
    #[serde(default)]
    pub images: ImageConfig,
}

/// Server bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Port for the HTTP server (default 8080).
    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_server_bind")]
    pub bind: String,
}

fn default_server_port() -> u16 {
    8080
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

/// Telegram channel config. No bot token means ingestion is disabled entirely.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramConfig {
    /// Bot token from BotFather. Overridden by TELEGRAM_BOT_TOKEN env when set.
    pub bot_token: Option<String>,

    /// When set, Telegram POSTs updates to this URL. If unset (and no tunnel),
    /// long-poll getUpdates is used. Overridden by TELEGRAM_WEBHOOK_URL env.
    pub webhook_url: Option<String>,

    /// Optional secret for webhook verification (X-Telegram-Bot-Api-Secret-Token).
    pub webhook_secret: Option<String>,

    /// Local tunnel bootstrap: when enabled and no explicit webhook URL is set,
    /// try to obtain a public HTTPS URL from a local ngrok process.
    #[serde(default)]
    pub tunnel: TunnelConfig,
}

/// Local tunnel (ngrok) settings. Best-effort; failures fall back to polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TunnelConfig {
    /// Enable the tunnel bootstrap (default false).
    #[serde(default)]
    pub enabled: bool,

    /// Local port the tunnel forwards to (default 8080).
    #[serde(default = "default_tunnel_port")]
    pub port: u16,
}

fn default_tunnel_port() -> u16 {
    8080
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_tunnel_port(),
        }
    }
}

/// Image intake limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageConfig {
    /// Maximum accepted image size in MB (default 10).
    #[serde(default = "default_max_image_size_mb")]
    pub max_size_mb: u32,
}

fn default_max_image_size_mb() -> u32 {
    10
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_size_mb: default_max_image_size_mb(),
        }
    }
}

impl ImageConfig {
    /// Size limit in bytes, for the normalizer.
    pub fn max_size_bytes(&self) -> usize {
        self.max_size_mb as usize * 1024 * 1024
    }
}

/// Resolve the Telegram bot token: env TELEGRAM_BOT_TOKEN overrides config.
pub fn resolve_telegram_token(config: &Config) -> Option<String> {
    non_empty_env("TELEGRAM_BOT_TOKEN")
        .or_else(|| non_empty(config.telegram.bot_token.as_deref()))
}

/// Resolve the explicit webhook URL: env TELEGRAM_WEBHOOK_URL overrides config.
pub fn resolve_webhook_url(config: &Config) -> Option<String> {
    non_empty_env("TELEGRAM_WEBHOOK_URL")
        .or_else(|| non_empty(config.telegram.webhook_url.as_deref()))
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|s| non_empty(Some(&s)))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Resolve config path from env or default (~/.mealsnap/config.json).
pub fn default_config_path() -> PathBuf {
    std::env::var("MEALSNAP_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".mealsnap").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the default path (or MEALSNAP_CONFIG_PATH). Missing file => default config.
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
