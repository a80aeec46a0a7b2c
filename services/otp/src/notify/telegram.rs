use std::time::Duration;

use serde::Serialize;

use crate::config::TelegramSettings;
use crate::notify::DeliveryError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: String,
}

/// Sends codes through the Telegram Bot API `sendMessage` method.
pub struct TelegramNotifier {
    client: reqwest::Client,
    endpoint: String,
}

impl TelegramNotifier {
    pub fn new(settings: &TelegramSettings) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/bot{}/sendMessage", settings.api_url, settings.token),
        })
    }

    pub async fn send(&self, chat_id: &str, code: &str) -> Result<(), DeliveryError> {
        let body = SendMessage {
            chat_id,
            text: format!("Your one-time verification code: {code}"),
        };
        // The endpoint embeds the bot token; keep it out of error messages.
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(DeliveryError::Telegram(status));
        }
        Ok(())
    }
}
