use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use otpgate_core::config::Config;

/// OTP service configuration loaded from environment variables.
///
/// A delivery channel whose required variables are absent stays disabled;
/// generating a code for it then fails with a delivery error.
#[derive(Debug, Clone, Deserialize)]
pub struct OtpConfig {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// TCP port to listen on. Env var: `OTP_PORT`.
    #[serde(default = "default_port")]
    pub otp_port: u16,
    /// Seconds between expiration sweeps. Env var: `SWEEP_INTERVAL_SECS`.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    /// Append-only file the FILE channel writes to.
    #[serde(default = "default_file_sink_path")]
    pub file_sink_path: PathBuf,

    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    /// Sender mailbox, e.g. `Otpgate <no-reply@example.com>`.
    pub smtp_from: Option<String>,

    pub smpp_host: Option<String>,
    #[serde(default = "default_smpp_port")]
    pub smpp_port: u16,
    pub smpp_system_id: Option<String>,
    pub smpp_password: Option<String>,
    #[serde(default)]
    pub smpp_system_type: String,
    pub smpp_source_addr: Option<String>,

    #[serde(default = "default_telegram_api_url")]
    pub telegram_api_url: String,
    pub telegram_token: Option<String>,
}

impl Config for OtpConfig {}

fn default_port() -> u16 {
    8080
}

fn default_sweep_interval() -> u64 {
    300
}

fn default_file_sink_path() -> PathBuf {
    PathBuf::from("otp_codes.txt")
}

fn default_smtp_port() -> u16 {
    587
}

fn default_smpp_port() -> u16 {
    2775
}

fn default_telegram_api_url() -> String {
    "https://api.telegram.org".to_owned()
}

#[derive(Debug, Clone)]
pub struct EmailSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct SmppSettings {
    pub host: String,
    pub port: u16,
    pub system_id: String,
    pub password: String,
    pub system_type: String,
    pub source_addr: String,
}

#[derive(Debug, Clone)]
pub struct TelegramSettings {
    pub api_url: String,
    pub token: String,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

impl OtpConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn email(&self) -> Option<EmailSettings> {
        Some(EmailSettings {
            host: non_empty(&self.smtp_host)?,
            port: self.smtp_port,
            username: non_empty(&self.smtp_username),
            password: self.smtp_password.clone(),
            from: non_empty(&self.smtp_from)?,
        })
    }

    pub fn smpp(&self) -> Option<SmppSettings> {
        Some(SmppSettings {
            host: non_empty(&self.smpp_host)?,
            port: self.smpp_port,
            system_id: non_empty(&self.smpp_system_id)?,
            password: self.smpp_password.clone().unwrap_or_default(),
            system_type: self.smpp_system_type.clone(),
            source_addr: non_empty(&self.smpp_source_addr)?,
        })
    }

    pub fn telegram(&self) -> Option<TelegramSettings> {
        Some(TelegramSettings {
            api_url: self.telegram_api_url.trim_end_matches('/').to_owned(),
            token: non_empty(&self.telegram_token)?,
        })
    }
}
