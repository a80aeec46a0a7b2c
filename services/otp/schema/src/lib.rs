pub mod otp_codes;
pub mod otp_config;
pub mod users;
