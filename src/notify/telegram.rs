use crate::notify::Notifier;
use crate::{Error, Result};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    disable_web_page_preview: bool,
}

/// Telegram Bot API notifier (`sendMessage`)
pub struct TelegramNotifier {
    client: Client,
    base_url: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: String, chat_id: String) -> Result<Self> {
        Self::with_base_url(TELEGRAM_API_BASE, bot_token, chat_id)
    }

    pub fn with_base_url(base_url: &str, bot_token: String, chat_id: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bot_token,
            chat_id,
        })
    }
}

#[async_trait::async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, message: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.bot_token);
        let body = SendMessage {
            chat_id: &self.chat_id,
            text: message,
            disable_web_page_preview: true,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::TransientIo(format!("telegram request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::TransientIo(format!(
                "telegram returned {}: {}",
                status, error_text
            )));
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "telegram"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_send_posts_message() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/botTOKEN/sendMessage")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "chat_id": "42",
                "text": "🎯 BTCUSDT LONG target hit"
            })))
            .with_status(200)
            .with_body(r#"{"ok":true}"#)
            .create_async()
            .await;

        let notifier =
            TelegramNotifier::with_base_url(&server.url(), "TOKEN".to_string(), "42".to_string())
                .unwrap();
        notifier.send("🎯 BTCUSDT LONG target hit").await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_failure_is_transient() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/botTOKEN/sendMessage")
            .with_status(401)
            .with_body(r#"{"ok":false,"description":"Unauthorized"}"#)
            .create_async()
            .await;

        let notifier =
            TelegramNotifier::with_base_url(&server.url(), "TOKEN".to_string(), "42".to_string())
                .unwrap();
        let err = notifier.send("hi").await.unwrap_err();

        assert!(matches!(err, Error::TransientIo(_)));
        assert!(!err.is_symbol_local());
    }
}
