pub mod identity;

/// Role value carried in `x-otpgate-user-role` for ordinary users.
pub const ROLE_USER: u8 = 0;
/// Role value carried in `x-otpgate-user-role` for administrators.
pub const ROLE_ADMIN: u8 = 1;
