//! Telegram bot notifier

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::common::errors::{DcaError, Result};
use crate::common::traits::Notifier;
use crate::config::types::TelegramConfig;

#[derive(Debug, Deserialize)]
struct SendMessageResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Sends Markdown messages through the Bot API
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    client: Client,
    api_url: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig, timeout: Duration) -> Result<Self> {
        if !config.is_configured() {
            return Err(DcaError::Configuration(
                "telegram.bot_token and telegram.chat_id are required".into(),
            ));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DcaError::Internal(e.to_string()))?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
            chat_id: config.chat_id.clone(),
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    #[instrument(skip(self, message))]
    async fn notify(&self, message: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_url, self.bot_token);
        let body = json!({
            "chat_id": self.chat_id,
            "text": message,
            "parse_mode": "Markdown",
        });

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        debug!("Telegram responded {}", status);

        let parsed: Option<SendMessageResponse> = serde_json::from_str(&text).ok();
        match parsed {
            Some(r) if status.is_success() && r.ok => {
                info!("Telegram notification sent");
                Ok(())
            }
            Some(r) => Err(DcaError::Notification(format!(
                "Telegram returned status {}: {}",
                status,
                r.description.unwrap_or(text)
            ))),
            None => Err(DcaError::Notification(format!(
                "Telegram returned status {}: {}",
                status, text
            ))),
        }
    }
}

/// Notifier that only logs, used when Telegram is not configured
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &str) -> Result<()> {
        info!("Notification:\n{}", message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_token_and_chat() {
        let config = TelegramConfig {
            bot_token: "123:abc".into(),
            chat_id: String::new(),
            api_url: "https://api.telegram.org".into(),
        };
        assert!(TelegramNotifier::new(&config, Duration::from_secs(5)).is_err());
    }

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        assert!(LogNotifier.notify("hello").await.is_ok());
    }
}
