use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::OtpServiceError;

/// Shortest code an administrator may configure.
pub const MIN_CODE_LENGTH: i32 = 4;
/// Longest code an administrator may configure.
pub const MAX_CODE_LENGTH: i32 = 10;
/// Shortest time-to-live in seconds.
pub const MIN_TTL_SECS: i32 = 30;
/// Longest time-to-live in seconds (one hour).
pub const MAX_TTL_SECS: i32 = 3600;

pub const DEFAULT_CODE_LENGTH: i32 = 6;
pub const DEFAULT_TTL_SECS: i32 = 300;

/// Length and time-to-live applied to codes issued from now on.
///
/// Only constructible through [`Policy::new`] (or `Default`), so every value
/// in circulation is within bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    length: i32,
    ttl_seconds: i32,
}

impl Policy {
    pub fn new(length: i32, ttl_seconds: i32) -> Result<Self, OtpServiceError> {
        if !(MIN_CODE_LENGTH..=MAX_CODE_LENGTH).contains(&length) {
            return Err(OtpServiceError::InvalidPolicy(format!(
                "length must be between {MIN_CODE_LENGTH} and {MAX_CODE_LENGTH}, got {length}"
            )));
        }
        if !(MIN_TTL_SECS..=MAX_TTL_SECS).contains(&ttl_seconds) {
            return Err(OtpServiceError::InvalidPolicy(format!(
                "ttlSeconds must be between {MIN_TTL_SECS} and {MAX_TTL_SECS}, got {ttl_seconds}"
            )));
        }
        Ok(Self {
            length,
            ttl_seconds,
        })
    }

    pub fn length(&self) -> i32 {
        self.length
    }

    pub fn ttl_seconds(&self) -> i32 {
        self.ttl_seconds
    }

    pub fn ttl(&self) -> Duration {
        Duration::seconds(i64::from(self.ttl_seconds))
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            length: DEFAULT_CODE_LENGTH,
            ttl_seconds: DEFAULT_TTL_SECS,
        }
    }
}

/// Delivery medium for a code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Email,
    Sms,
    Telegram,
    File,
}

impl Channel {
    pub const ALL: [Channel; 4] = [Self::Email, Self::Sms, Self::Telegram, Self::File];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "EMAIL",
            Self::Sms => "SMS",
            Self::Telegram => "TELEGRAM",
            Self::File => "FILE",
        }
    }
}

impl FromStr for Channel {
    type Err = OtpServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EMAIL" => Ok(Self::Email),
            "SMS" => Ok(Self::Sms),
            "TELEGRAM" => Ok(Self::Telegram),
            "FILE" => Ok(Self::File),
            _ => Err(OtpServiceError::InvalidChannel),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of an issued code. `Used` and `Expired` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpStatus {
    Active,
    Used,
    Expired,
}

impl OtpStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Used => "USED",
            Self::Expired => "EXPIRED",
        }
    }

    /// Transition table: only `Active` may move, and only to a terminal state.
    pub fn can_transition_to(&self, next: OtpStatus) -> bool {
        matches!(
            (self, next),
            (Self::Active, Self::Used) | (Self::Active, Self::Expired)
        )
    }
}

impl FromStr for OtpStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(Self::Active),
            "USED" => Ok(Self::Used),
            "EXPIRED" => Ok(Self::Expired),
            other => Err(anyhow::anyhow!("unknown otp status: {other}")),
        }
    }
}

impl fmt::Display for OtpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One-time passcode bound to a user and an operation.
#[derive(Debug, Clone)]
pub struct OtpCode {
    pub id: Uuid,
    pub user_id: Uuid,
    pub operation_id: String,
    pub code: String,
    pub channel: Channel,
    pub status: OtpStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl OtpCode {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// User as seen by the OTP service: identity plus per-channel contact addresses.
#[derive(Debug, Clone)]
pub struct OtpUser {
    pub id: Uuid,
    pub username: String,
    pub role: u8,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl OtpUser {
    /// Recipient address for `channel`, or `None` if the user has none.
    /// The file sink keys lines by username, so every user has a FILE address.
    pub fn address_for(&self, channel: Channel) -> Option<&str> {
        let address = match channel {
            Channel::Email => self.email.as_deref(),
            Channel::Sms => self.phone.as_deref(),
            Channel::Telegram => self.telegram_chat_id.as_deref(),
            Channel::File => Some(self.username.as_str()),
        };
        address.map(str::trim).filter(|a| !a.is_empty())
    }
}
