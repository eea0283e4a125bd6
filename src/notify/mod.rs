//! Outbound notifications
//!
//! Delivery is best effort. A notifier never returns an error to the
//! caller, it logs and reports `false`.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::common::errors::{BotError, Result};
use crate::common::traits::{Notifier, NotifyCategory};
use crate::config::types::TelegramConfig;

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: String,
    disable_web_page_preview: bool,
}

/// Telegram Bot API notifier
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    client: Client,
    api_url: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| BotError::Internal(e.to_string()))?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
            chat_id: config.chat_id.clone(),
        })
    }

    async fn send(&self, text: String) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_url, self.bot_token);
        let response = self
            .client
            .post(&url)
            .json(&SendMessage {
                chat_id: &self.chat_id,
                text,
                disable_web_page_preview: true,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BotError::InvalidResponse(format!(
                "Server returned status {}: {}",
                status, body
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, category: NotifyCategory, message: &str) -> bool {
        match self.send(format!("[{}] {}", category, message)).await {
            Ok(()) => {
                debug!(%category, "telegram notification sent");
                true
            }
            Err(e) => {
                warn!(%category, error = %e, "telegram notification failed");
                false
            }
        }
    }
}

/// Notifier that only writes to the log
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, category: NotifyCategory, message: &str) -> bool {
        match category {
            NotifyCategory::Alert => warn!(%category, "{}", message),
            _ => info!(%category, "{}", message),
        }
        true
    }
}

/// Pick the notifier configured for this run
pub fn build_notifier(config: Option<&TelegramConfig>) -> Result<Arc<dyn Notifier>> {
    match config {
        Some(telegram) if telegram.enabled && !telegram.bot_token.is_empty() => {
            info!("telegram notifications enabled");
            Ok(Arc::new(TelegramNotifier::new(telegram)?))
        }
        _ => Ok(Arc::new(LogNotifier)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(url: &str) -> TelegramConfig {
        TelegramConfig {
            bot_token: "123:abc".into(),
            chat_id: "42".into(),
            enabled: true,
            api_url: url.into(),
        }
    }

    #[tokio::test]
    async fn test_telegram_posts_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .and(body_partial_json(serde_json::json!({
                "chat_id": "42",
                "text": "[TRADE] opened BTCUSDT LONG",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = TelegramNotifier::new(&config(&server.uri())).unwrap();
        assert!(notifier.notify(NotifyCategory::Trade, "opened BTCUSDT LONG").await);
    }

    #[tokio::test]
    async fn test_telegram_failure_is_swallowed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let notifier = TelegramNotifier::new(&config(&server.uri())).unwrap();
        assert!(!notifier.notify(NotifyCategory::Alert, "boom").await);
    }

    #[test]
    fn test_disabled_telegram_falls_back_to_log() {
        let mut telegram = config("http://localhost");
        telegram.enabled = false;
        assert!(build_notifier(Some(&telegram)).is_ok());
        assert!(build_notifier(None).is_ok());
    }
}
