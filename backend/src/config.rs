//! Configuration for the Edufin backend.

use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub stripe: StripeConfig,
    #[serde(default)]
    pub billing: BillingConfig,
    #[serde(default)]
    pub content: ContentConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub cors: CorsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public base URL of the web app, used to build checkout redirect URLs.
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: default_public_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file path, or `:memory:`.
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for signing access tokens.
    pub jwt_secret: String,
    #[serde(default = "default_access_ttl")]
    pub access_token_ttl_secs: u64,
    #[serde(default = "default_refresh_ttl")]
    pub refresh_token_ttl_secs: u64,
    /// Sign-in attempts allowed per email per minute.
    #[serde(default = "default_login_attempts")]
    pub login_attempts_per_minute: u32,
    /// How often expired revocations and refresh tokens are purged.
    #[serde(default = "default_purge_interval")]
    pub purge_interval_secs: u64,
}

pub const MAX_STRIPE_RETRIES: u32 = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct StripeConfig {
    pub secret_key: String,
    /// Signing secret for webhook payloads (`whsec_...`).
    #[serde(default)]
    pub webhook_secret: String,
    #[serde(default = "default_stripe_api_base")]
    pub api_base: String,
    #[serde(default = "default_stripe_timeout")]
    pub timeout_secs: u64,
    /// Attempts for read queries (customer and subscription lookups).
    /// At most `MAX_STRIPE_RETRIES`.
    #[serde(default = "default_stripe_retries")]
    pub max_retries: u32,
}

/// Stripe price identifier per purchasable tier.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct BillingConfig {
    #[serde(default)]
    pub prices: PricesConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PricesConfig {
    #[serde(default = "default_price_basico")]
    pub basico: String,
    #[serde(default = "default_price_premium")]
    pub premium: String,
    #[serde(default = "default_price_corporativo")]
    pub corporativo: String,
}

impl Default for PricesConfig {
    fn default() -> Self {
        Self {
            basico: default_price_basico(),
            premium: default_price_premium(),
            corporativo: default_price_corporativo(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ContentConfig {
    /// JSON array of content items. No catalog is served when unset.
    #[serde(default)]
    pub catalog_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    /// Comma-separated origins, or `*`.
    #[serde(default = "default_cors_origins")]
    pub origins: String,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            origins: default_cors_origins(),
        }
    }
}

// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3001
}
fn default_public_url() -> String {
    "http://localhost:5173".to_string()
}
fn default_database_path() -> String {
    "./data/edufin.db".to_string()
}
fn default_access_ttl() -> u64 {
    900
}
fn default_refresh_ttl() -> u64 {
    30 * 24 * 3600
}
fn default_login_attempts() -> u32 {
    10
}
fn default_purge_interval() -> u64 {
    3600
}
fn default_stripe_api_base() -> String {
    "https://api.stripe.com".to_string()
}
fn default_stripe_timeout() -> u64 {
    10
}
fn default_stripe_retries() -> u32 {
    3
}
fn default_price_basico() -> String {
    "price_escola_basica".to_string()
}
fn default_price_premium() -> String {
    "price_escola_premium".to_string()
}
fn default_price_corporativo() -> String {
    "price_rede_de_ensino".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_cors_origins() -> String {
    "*".to_string()
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Sources, highest precedence first:
    /// 1. `JWT_SECRET`, `STRIPE_SECRET_KEY`, `STRIPE_WEBHOOK_SECRET`, `DB_FILENAME`
    /// 2. Environment variables (EDUFIN__SECTION__KEY format)
    /// 3. config.toml file (if present)
    /// 4. Built-in defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config = ConfigLoader::builder()
            .add_source(File::with_name("config").required(false))
            .add_source(
                Environment::with_prefix("EDUFIN")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("auth.jwt_secret", env::var("JWT_SECRET").ok())?
            .set_override_option("stripe.secret_key", env::var("STRIPE_SECRET_KEY").ok())?
            .set_override_option(
                "stripe.webhook_secret",
                env::var("STRIPE_WEBHOOK_SECRET").ok(),
            )?
            .set_override_option("database.path", env::var("DB_FILENAME").ok())?
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.jwt_secret.trim().is_empty() {
            return Err(ConfigError::Message("auth.jwt_secret (JWT_SECRET) must not be empty".to_string()));
        }
        if self.stripe.secret_key.trim().is_empty() {
            return Err(ConfigError::Message(
                "stripe.secret_key (STRIPE_SECRET_KEY) must not be empty".to_string(),
            ));
        }
        if self.stripe.max_retries > MAX_STRIPE_RETRIES {
            return Err(ConfigError::Message(format!(
                "stripe.max_retries must be at most {}",
                MAX_STRIPE_RETRIES
            )));
        }
        Ok(())
    }

    /// Non-fatal problems, logged once tracing is up.
    pub fn warnings(&self) -> Vec<&'static str> {
        let mut warnings = Vec::new();
        if self.stripe.webhook_secret.is_empty() {
            warnings.push("STRIPE_WEBHOOK_SECRET not set; webhook deliveries will be rejected");
        }
        warnings
    }
}
