//! Accounts, bearer tokens and sign-in throttling.

mod limiter;
mod password;
mod service;
mod tokens;

pub use limiter::LoginLimiter;
pub use password::{
    hash_password, verify_password, verify_password_or_dummy, PasswordError, MIN_PASSWORD_LENGTH,
};
pub use service::{normalize_email, AuthService};
pub use tokens::{bearer_token, hash_refresh_token, AuthUser, RefreshToken, TokenError, TokenIssuer};
