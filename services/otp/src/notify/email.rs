use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::EmailSettings;
use crate::notify::DeliveryError;

const SUBJECT: &str = "Your one-time code";

/// Sends codes by email over a pooled STARTTLS SMTP transport.
pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailNotifier {
    pub fn new(settings: &EmailSettings) -> Result<Self, DeliveryError> {
        let from = parse_mailbox(&settings.from)?;
        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)?.port(settings.port);
        if let Some(username) = &settings.username {
            builder = builder.credentials(Credentials::new(
                username.clone(),
                settings.password.clone().unwrap_or_default(),
            ));
        }
        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    pub fn message(&self, to: &str, code: &str) -> Result<Message, DeliveryError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(parse_mailbox(to)?)
            .subject(SUBJECT)
            .header(ContentType::TEXT_PLAIN)
            .body(format!("Your one-time verification code: {code}"))?;
        Ok(message)
    }

    pub async fn send(&self, to: &str, code: &str) -> Result<(), DeliveryError> {
        let message = self.message(to, code)?;
        self.transport.send(message).await?;
        Ok(())
    }
}

fn parse_mailbox(raw: &str) -> Result<Mailbox, DeliveryError> {
    raw.parse::<Mailbox>()
        .map_err(|e| DeliveryError::InvalidAddress(format!("{raw}: {e}")))
}
