pub mod mock_stripe;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use sha2::Sha256;

use edufin_common::ContentItem;

use crate::auth::AuthUser;
use crate::billing::{
    CheckoutParams, CheckoutSession, Customer, PaymentProvider, ProviderSubscription, StripeError,
};
use crate::config::{
    AuthConfig, BillingConfig, Config, ContentConfig, CorsConfig, DatabaseConfig, LoggingConfig,
    ServerConfig, StripeConfig,
};
use crate::store::Store;
use crate::AppState;

pub const TEST_JWT_SECRET: &str = "test-jwt-secret";
pub const TEST_WEBHOOK_SECRET: &str = "whsec_test_secret";

pub fn test_config() -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 3001,
            public_url: "http://localhost:5173".to_string(),
        },
        database: DatabaseConfig {
            path: ":memory:".to_string(),
        },
        auth: AuthConfig {
            jwt_secret: TEST_JWT_SECRET.to_string(),
            access_token_ttl_secs: 900,
            refresh_token_ttl_secs: 3600,
            login_attempts_per_minute: 100,
            purge_interval_secs: 3600,
        },
        stripe: StripeConfig {
            secret_key: "sk_test_123".to_string(),
            webhook_secret: TEST_WEBHOOK_SECRET.to_string(),
            api_base: "http://127.0.0.1:1".to_string(),
            timeout_secs: 2,
            max_retries: 1,
        },
        billing: BillingConfig::default(),
        content: ContentConfig::default(),
        logging: LoggingConfig {
            level: "debug".to_string(),
        },
        cors: CorsConfig {
            origins: "*".to_string(),
        },
    }
}

/// Application state over an in-memory store and the given provider.
pub fn create_test_state(provider: Arc<dyn PaymentProvider>, catalog: Vec<ContentItem>) -> Arc<AppState> {
    let config = test_config();
    let store = Arc::new(Store::open(&config.database.path).expect("Failed to open test store"));
    Arc::new(AppState::new(config, store, provider, catalog))
}

pub fn test_auth_user(id: &str, email: &str) -> AuthUser {
    AuthUser {
        id: id.to_string(),
        email: email.to_string(),
        jti: uuid::Uuid::new_v4().to_string(),
        expires_at: (Utc::now() + Duration::minutes(15)).timestamp(),
    }
}

#[derive(serde::Serialize)]
struct TestClaims {
    sub: String,
    email: String,
    jti: String,
    iat: i64,
    exp: i64,
}

fn sign_jwt(user_id: &str, email: &str, iat: DateTime<Utc>, exp: DateTime<Utc>) -> String {
    let claims = TestClaims {
        sub: user_id.to_string(),
        email: email.to_string(),
        jti: uuid::Uuid::new_v4().to_string(),
        iat: iat.timestamp(),
        exp: exp.timestamp(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
    )
    .expect("Failed to encode JWT")
}

/// Access token signed with the test secret, valid for an hour.
pub fn generate_test_jwt(user_id: &str, email: &str) -> String {
    let now = Utc::now();
    sign_jwt(user_id, email, now, now + Duration::hours(1))
}

/// Access token signed with the test secret that expired an hour ago.
pub fn generate_expired_jwt(user_id: &str, email: &str) -> String {
    let now = Utc::now();
    sign_jwt(user_id, email, now - Duration::hours(2), now - Duration::hours(1))
}

/// A valid `Stripe-Signature` header for `payload`.
pub fn stripe_signature_header(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

/// In-process payment provider with call counters.
#[derive(Default)]
pub struct MockPaymentProvider {
    customers: Mutex<Vec<Customer>>,
    subscriptions: Mutex<Vec<ProviderSubscription>>,
    checkouts: Mutex<Vec<CheckoutParams>>,
    fail: AtomicBool,
    customer_calls: AtomicUsize,
    subscription_calls: AtomicUsize,
    checkout_calls: AtomicUsize,
}

impl MockPaymentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_customer(self, id: &str, email: &str) -> Self {
        self.customers.lock().unwrap().push(Customer {
            id: id.to_string(),
            email: Some(email.to_string()),
        });
        self
    }

    pub fn with_subscription(
        self,
        id: &str,
        customer_id: &str,
        price_id: &str,
        current_period_end: Option<DateTime<Utc>>,
    ) -> Self {
        self.subscriptions.lock().unwrap().push(ProviderSubscription {
            id: id.to_string(),
            customer_id: customer_id.to_string(),
            price_id: Some(price_id.to_string()),
            current_period_end,
        });
        self
    }

    /// Every call fails as if the provider timed out.
    pub fn failing(self) -> Self {
        self.fail.store(true, Ordering::SeqCst);
        self
    }

    pub fn clear_subscriptions(&self) {
        self.subscriptions.lock().unwrap().clear();
    }

    pub fn subscription_list_calls(&self) -> usize {
        self.subscription_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.customer_calls.load(Ordering::SeqCst)
            + self.subscription_calls.load(Ordering::SeqCst)
            + self.checkout_calls.load(Ordering::SeqCst)
    }

    pub fn checkout_requests(&self) -> Vec<CheckoutParams> {
        self.checkouts.lock().unwrap().clone()
    }

    fn check_failure(&self) -> Result<(), StripeError> {
        if self.fail.load(Ordering::SeqCst) {
            Err(StripeError::Timeout)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn find_customers_by_email(&self, email: &str) -> Result<Vec<Customer>, StripeError> {
        self.customer_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        Ok(self
            .customers
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.email.as_deref() == Some(email))
            .cloned()
            .collect())
    }

    async fn get_customer(&self, customer_id: &str) -> Result<Option<Customer>, StripeError> {
        self.customer_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        Ok(self
            .customers
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == customer_id)
            .cloned())
    }

    async fn list_active_subscriptions(
        &self,
        customer_id: &str,
    ) -> Result<Vec<ProviderSubscription>, StripeError> {
        self.subscription_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.customer_id == customer_id)
            .cloned()
            .collect())
    }

    async fn create_checkout_session(
        &self,
        params: &CheckoutParams,
    ) -> Result<CheckoutSession, StripeError> {
        self.checkout_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;

        let mut checkouts = self.checkouts.lock().unwrap();
        checkouts.push(params.clone());
        let id = format!("cs_test_{}", checkouts.len());
        Ok(CheckoutSession {
            url: format!("https://checkout.stripe.test/{}", id),
            id,
        })
    }
}
