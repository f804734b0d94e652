use std::sync::Arc;

use axum::http::HeaderMap;
use chrono::Utc;

use edufin_common::{SessionResponse, SigninRequest, SigninResponse, SignupRequest};

use crate::error::{ApiError, Result};
use crate::models::{NewUser, User};
use crate::store::Store;

use super::limiter::LoginLimiter;
use super::password::{hash_password, validate_password, verify_password_or_dummy, PasswordError};
use super::tokens::{bearer_token, hash_refresh_token, AuthUser, TokenError, TokenIssuer};

/// Registration, sign-in and bearer session handling.
pub struct AuthService {
    store: Arc<Store>,
    tokens: TokenIssuer,
    limiter: LoginLimiter,
}

impl AuthService {
    pub fn new(store: Arc<Store>, tokens: TokenIssuer, limiter: LoginLimiter) -> Self {
        Self {
            store,
            tokens,
            limiter,
        }
    }

    /// Create an account and return its id.
    pub async fn register(&self, request: &SignupRequest) -> Result<String> {
        let email = required(&request.email, "email")?;
        let password = required(&request.password, "password")?;
        let first_name = required(&request.first_name, "firstName")?;
        let last_name = required(&request.last_name, "lastName")?;

        let email = normalize_email(email);
        validate_email(&email)?;
        validate_password(password).map_err(|e| ApiError::Validation(e.to_string()))?;

        let password = password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        let user = self.store.create_user(&NewUser {
            email,
            password_hash,
            first_name: first_name.trim().to_string(),
            last_name: last_name.trim().to_string(),
        })?;

        Ok(user.id)
    }

    /// Verify credentials and open a session.
    pub async fn login(&self, request: &SigninRequest) -> Result<SigninResponse> {
        let email = required(&request.email, "email")?;
        let password = required(&request.password, "password")?;
        let email = normalize_email(email);

        if !self.limiter.check(&email) {
            tracing::warn!("Sign-in throttled");
            return Err(ApiError::TooManyAttempts);
        }

        // Unknown emails still pay for a verify
        let user = self.store.find_user_by_email(&email)?;
        let stored_hash = user.as_ref().map(|u| u.password_hash.clone());
        let password = password.to_string();
        tokio::task::spawn_blocking(move || {
            verify_password_or_dummy(&password, stored_hash.as_deref())
        })
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(|e| match e {
            PasswordError::Mismatch => ApiError::InvalidCredentials,
            other => ApiError::Internal(other.to_string()),
        })?;
        let user = user.ok_or(ApiError::InvalidCredentials)?;

        tracing::info!(user_id = %user.id, "User signed in");
        self.open_session(&user)
    }

    /// Identity behind the request's bearer token.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<AuthUser> {
        let token = bearer_token(headers)?;
        Ok(self.authenticate_token(token)?)
    }

    fn authenticate_token(&self, token: &str) -> std::result::Result<AuthUser, TokenError> {
        let user = self.tokens.verify(token)?;

        let revoked = self
            .store
            .is_token_revoked(&user.jti)
            .map_err(|e| TokenError::InvalidToken(e.to_string()))?;
        if revoked {
            return Err(TokenError::Revoked);
        }

        Ok(user)
    }

    /// Session check that never fails: any problem reads as anonymous.
    pub fn session(&self, headers: &HeaderMap) -> SessionResponse {
        let auth_user = match self.authenticate(headers) {
            Ok(user) => user,
            Err(e) => {
                tracing::debug!("Session check failed: {}", e);
                return SessionResponse::anonymous();
            }
        };

        match self.store.find_user_by_id(&auth_user.id) {
            Ok(Some(user)) => SessionResponse::authenticated(user.profile()),
            Ok(None) => SessionResponse::anonymous(),
            Err(e) => {
                tracing::warn!("Session lookup failed: {}", e);
                SessionResponse::anonymous()
            }
        }
    }

    /// Revoke the presented access token and, if given, the refresh token.
    ///
    /// Succeeds for a token that is already invalid.
    pub fn logout(&self, headers: &HeaderMap, refresh_token: Option<&str>) -> Result<()> {
        if let Ok(user) = bearer_token(headers).and_then(|t| self.tokens.verify(t)) {
            self.store.revoke_token(&user.jti, user.expires_at)?;
            tracing::info!(user_id = %user.id, "User signed out");
        }

        if let Some(refresh_token) = refresh_token {
            self.store.consume_refresh_token(&hash_refresh_token(refresh_token))?;
        }

        Ok(())
    }

    /// Exchange a refresh token for a new token pair. Each refresh token works once.
    pub fn refresh(&self, refresh_token: Option<&str>) -> Result<SigninResponse> {
        let refresh_token = refresh_token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ApiError::Validation("Missing required field: refreshToken".to_string()))?;

        let (user_id, expires_at) = self
            .store
            .consume_refresh_token(&hash_refresh_token(refresh_token))?
            .ok_or_else(|| ApiError::Unauthorized("Invalid refresh token".to_string()))?;

        if expires_at < Utc::now().timestamp() {
            return Err(ApiError::Unauthorized("Refresh token expired".to_string()));
        }

        let user = self
            .store
            .find_user_by_id(&user_id)?
            .ok_or_else(|| ApiError::Unauthorized("Invalid refresh token".to_string()))?;

        self.open_session(&user)
    }

    /// Drop expired revocations, refresh tokens and idle limiter keys.
    pub fn purge_expired(&self) -> Result<usize> {
        self.limiter.retain_recent();
        Ok(self.store.purge_expired(Utc::now().timestamp())?)
    }

    fn open_session(&self, user: &User) -> Result<SigninResponse> {
        let token = self.tokens.issue_access_token(&user.id, &user.email)?;
        let refresh = self.tokens.generate_refresh_token();
        self.store
            .store_refresh_token(&refresh.hash, &user.id, refresh.expires_at)?;

        Ok(SigninResponse {
            success: true,
            token,
            refresh_token: refresh.token,
            user: user.profile(),
        })
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str> {
    match value.as_deref() {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ApiError::Validation(format!("Missing required field: {}", field))),
    }
}

fn validate_email(email: &str) -> Result<()> {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') && !domain.starts_with('.') => Ok(()),
        _ => Err(ApiError::Validation("Invalid email address".to_string())),
    }
}
