//! Delivery channels and the dispatcher that routes a code to one of them.

pub mod email;
pub mod file;
pub mod sms;
pub mod smpp;
pub mod telegram;

use crate::config::OtpConfig;
use crate::domain::repository::CodeDispatcher;
use crate::domain::types::Channel;

use self::email::EmailNotifier;
use self::file::FileNotifier;
use self::sms::SmsNotifier;
use self::smpp::SmppError;
use self::telegram::TelegramNotifier;

/// Why a single delivery attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("{0} channel is not configured")]
    NotConfigured(Channel),
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("building email: {0}")]
    EmailMessage(#[from] lettre::error::Error),
    #[error("smtp: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("smpp: {0}")]
    Smpp(#[from] SmppError),
    #[error("telegram api returned {0}")]
    Telegram(reqwest::StatusCode),
    #[error("telegram request: {0}")]
    Http(#[from] reqwest::Error),
    #[error("file sink: {0}")]
    File(#[from] std::io::Error),
}

/// Routes each delivery to the notifier for its channel. Notifiers are built
/// once at startup; a missing one means the channel is not configured.
pub struct NotificationDispatcher {
    email: Option<EmailNotifier>,
    sms: Option<SmsNotifier>,
    telegram: Option<TelegramNotifier>,
    file: FileNotifier,
}

impl NotificationDispatcher {
    /// Dispatcher with only the file sink enabled.
    pub fn new(file: FileNotifier) -> Self {
        Self {
            email: None,
            sms: None,
            telegram: None,
            file,
        }
    }

    pub fn from_config(config: &OtpConfig) -> Result<Self, DeliveryError> {
        let mut dispatcher = Self::new(FileNotifier::new(&config.file_sink_path));
        if let Some(settings) = config.email() {
            dispatcher = dispatcher.with_email(EmailNotifier::new(&settings)?);
        }
        if let Some(settings) = config.smpp() {
            dispatcher = dispatcher.with_sms(SmsNotifier::new(settings));
        }
        if let Some(settings) = config.telegram() {
            dispatcher = dispatcher.with_telegram(TelegramNotifier::new(&settings)?);
        }
        Ok(dispatcher)
    }

    pub fn with_email(mut self, notifier: EmailNotifier) -> Self {
        self.email = Some(notifier);
        self
    }

    pub fn with_sms(mut self, notifier: SmsNotifier) -> Self {
        self.sms = Some(notifier);
        self
    }

    pub fn with_telegram(mut self, notifier: TelegramNotifier) -> Self {
        self.telegram = Some(notifier);
        self
    }

    pub fn configured_channels(&self) -> Vec<Channel> {
        Channel::ALL
            .into_iter()
            .filter(|channel| match channel {
                Channel::Email => self.email.is_some(),
                Channel::Sms => self.sms.is_some(),
                Channel::Telegram => self.telegram.is_some(),
                Channel::File => true,
            })
            .collect()
    }

    async fn route(&self, channel: Channel, recipient: &str, code: &str) -> Result<(), DeliveryError> {
        match channel {
            Channel::Email => {
                let notifier = self.email.as_ref().ok_or(DeliveryError::NotConfigured(channel))?;
                notifier.send(recipient, code).await
            }
            Channel::Sms => {
                let notifier = self.sms.as_ref().ok_or(DeliveryError::NotConfigured(channel))?;
                Ok(notifier.send(recipient, code).await?)
            }
            Channel::Telegram => {
                let notifier = self
                    .telegram
                    .as_ref()
                    .ok_or(DeliveryError::NotConfigured(channel))?;
                notifier.send(recipient, code).await
            }
            Channel::File => self.file.send(recipient, code).await,
        }
    }
}

impl CodeDispatcher for NotificationDispatcher {
    async fn deliver(
        &self,
        channel: Channel,
        recipient: &str,
        code: &str,
    ) -> Result<(), DeliveryError> {
        let result = self.route(channel, recipient, code).await;
        let shown = match channel {
            Channel::Sms => mask_phone(recipient),
            _ => recipient.to_owned(),
        };
        match &result {
            Ok(()) => tracing::info!(%channel, recipient = %shown, "otp delivered"),
            Err(e) => tracing::warn!(%channel, recipient = %shown, error = %e, "otp delivery failed"),
        }
        result
    }
}

/// Keep the first two and last two characters of a phone number.
pub fn mask_phone(phone: &str) -> String {
    let chars: Vec<char> = phone.chars().collect();
    let n = chars.len();
    if n <= 4 {
        return "*".repeat(n);
    }
    let mut masked = String::with_capacity(n);
    masked.extend(&chars[..2]);
    masked.extend(std::iter::repeat_n('*', n - 4));
    masked.extend(&chars[n - 2..]);
    masked
}
