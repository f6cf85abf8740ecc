//! Telegram Bot API client: getUpdates long-poll, webhook registration,
//! sendMessage, and the two-step file fetch (getFile, then binary download).

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Server-side wait for getUpdates. Intentionally the longest timeout here:
/// it is how Telegram holds the connection open awaiting new updates.
pub const LONG_POLL_WAIT_SECS: u64 = 25;

const GET_FILE_TIMEOUT: Duration = Duration::from_secs(20);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);
const SEND_TIMEOUT: Duration = Duration::from_secs(15);
// Client-side cap for the long poll; must exceed the server-side wait.
const POLL_HTTP_TIMEOUT: Duration = Duration::from_secs(LONG_POLL_WAIT_SECS + 10);

#[derive(Debug, thiserror::Error)]
pub enum TelegramError {
    #[error("telegram request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("telegram api error: {0}")]
    Api(String),
}

/// Standard Bot API response envelope.
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram update payload (getUpdates result item or webhook POST body).
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
    #[serde(default)]
    pub edited_message: Option<TelegramMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramMessage {
    #[serde(default)]
    pub chat: Option<TelegramChat>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    /// Photo variants, ordered ascending by size.
    #[serde(default)]
    pub photo: Option<Vec<PhotoSize>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub file_size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TelegramFile {
    #[serde(default)]
    file_path: Option<String>,
}

/// The platform calls the processor needs: reply to a chat, fetch a photo.
/// Split out so processing can be tested without the network.
#[async_trait]
pub trait BotApi: Send + Sync {
    /// Send a text reply to a chat.
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), TelegramError>;

    /// Resolve a file_id to bytes and a filename (getFile, then download).
    async fn fetch_file(&self, file_id: &str) -> Result<(Vec<u8>, String), TelegramError>;
}

/// Bot API client bound to one bot token.
#[derive(Clone)]
pub struct TelegramBot {
    token: String,
    api_base: String,
    client: reqwest::Client,
}

impl TelegramBot {
    pub fn new(token: String) -> Self {
        Self::with_api_base(token, TELEGRAM_API_BASE.to_string())
    }

    /// Override the API base URL (for tests or proxied endpoints).
    pub fn with_api_base(token: String, api_base: String) -> Self {
        Self {
            token,
            api_base: api_base.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    /// Long-poll getUpdates. Only message and edited_message updates are requested.
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
    ) -> Result<Vec<TelegramUpdate>, TelegramError> {
        let mut body = serde_json::json!({
            "timeout": LONG_POLL_WAIT_SECS,
            "allowed_updates": ["message", "edited_message"],
        });
        if let Some(off) = offset {
            body["offset"] = serde_json::Value::from(off);
        }
        let res = self
            .client
            .post(self.method_url("getUpdates"))
            .timeout(POLL_HTTP_TIMEOUT)
            .json(&body)
            .send()
            .await?;
        let updates: Vec<TelegramUpdate> = unwrap_envelope("getUpdates", res).await?;
        Ok(updates)
    }

    /// Register a webhook URL (and optional secret). Telegram then POSTs
    /// updates to the URL instead of serving getUpdates.
    pub async fn set_webhook(&self, url: &str, secret: Option<&str>) -> Result<(), TelegramError> {
        let mut body = serde_json::json!({ "url": url });
        if let Some(s) = secret {
            body["secret_token"] = serde_json::Value::String(s.to_string());
        }
        let res = self
            .client
            .post(self.method_url("setWebhook"))
            .timeout(SEND_TIMEOUT)
            .json(&body)
            .send()
            .await?;
        let _: serde_json::Value = unwrap_envelope("setWebhook", res).await?;
        Ok(())
    }

    /// Remove the webhook so the bot can use getUpdates again.
    pub async fn delete_webhook(&self) -> Result<(), TelegramError> {
        let res = self
            .client
            .post(self.method_url("deleteWebhook"))
            .timeout(SEND_TIMEOUT)
            .send()
            .await?;
        let _: serde_json::Value = unwrap_envelope("deleteWebhook", res).await?;
        Ok(())
    }

    /// getFile: resolve a file_id to its server-side path.
    async fn get_file_path(&self, file_id: &str) -> Result<String, TelegramError> {
        let res = self
            .client
            .get(self.method_url("getFile"))
            .timeout(GET_FILE_TIMEOUT)
            .query(&[("file_id", file_id)])
            .send()
            .await?;
        let file: TelegramFile = unwrap_envelope("getFile", res).await?;
        file.file_path
            .ok_or_else(|| TelegramError::Api("getFile returned no file_path".to_string()))
    }

    /// Download file bytes by server-side path.
    async fn download_file(&self, file_path: &str) -> Result<Vec<u8>, TelegramError> {
        let url = format!("{}/file/bot{}/{}", self.api_base, self.token, file_path);
        let res = self
            .client
            .get(&url)
            .timeout(DOWNLOAD_TIMEOUT)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            return Err(TelegramError::Api(format!(
                "file download failed: {}",
                status
            )));
        }
        Ok(res.bytes().await?.to_vec())
    }
}

#[async_trait]
impl BotApi for TelegramBot {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), TelegramError> {
        let body = serde_json::json!({ "chat_id": chat_id, "text": text });
        let res = self
            .client
            .post(self.method_url("sendMessage"))
            .timeout(SEND_TIMEOUT)
            .json(&body)
            .send()
            .await?;
        let _: serde_json::Value = unwrap_envelope("sendMessage", res).await?;
        Ok(())
    }

    async fn fetch_file(&self, file_id: &str) -> Result<(Vec<u8>, String), TelegramError> {
        let file_path = self.get_file_path(file_id).await?;
        let filename = file_path
            .rsplit('/')
            .next()
            .unwrap_or("photo.jpg")
            .to_string();
        let bytes = self.download_file(&file_path).await?;
        Ok((bytes, filename))
    }
}

/// Check HTTP status and the `ok` flag, then deserialize `result`.
async fn unwrap_envelope<T: serde::de::DeserializeOwned>(
    method: &str,
    res: reqwest::Response,
) -> Result<T, TelegramError> {
    if !res.status().is_success() {
        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        return Err(TelegramError::Api(format!(
            "{} failed: {} {}",
            method, status, body
        )));
    }
    let envelope: ApiEnvelope<T> = res.json().await?;
    if !envelope.ok {
        return Err(TelegramError::Api(format!(
            "{} returned ok: false ({})",
            method,
            envelope.description.unwrap_or_default()
        )));
    }
    envelope
        .result
        .ok_or_else(|| TelegramError::Api(format!("{} returned no result", method)))
}
