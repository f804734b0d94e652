//! Payment provider integration.

pub mod prices;
pub mod stripe;
pub mod webhook;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use prices::PriceTable;
pub use stripe::{StripeClient, StripeError};
pub use webhook::{verify_signature, WebhookAction, WebhookError, WebhookEvent};

/// Customer record at the payment provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Customer {
    pub id: String,
    pub email: Option<String>,
}

/// An active subscription as reported by the payment provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSubscription {
    pub id: String,
    pub customer_id: String,
    pub price_id: Option<String>,
    pub current_period_end: Option<DateTime<Utc>>,
}

/// Input for a hosted checkout session.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutParams {
    pub price_id: String,
    /// Existing customer, if one was found for the email.
    pub customer_id: Option<String>,
    pub customer_email: String,
    /// Internal user id, echoed back in webhook metadata.
    pub user_id: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// Operations the service needs from the payment provider.
///
/// Read operations may be retried by the implementation; checkout creation
/// must not be.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Customers with this email, most recently created first.
    async fn find_customers_by_email(&self, email: &str) -> Result<Vec<Customer>, StripeError>;

    /// `None` if the customer does not exist or was deleted.
    async fn get_customer(&self, customer_id: &str) -> Result<Option<Customer>, StripeError>;

    async fn list_active_subscriptions(
        &self,
        customer_id: &str,
    ) -> Result<Vec<ProviderSubscription>, StripeError>;

    async fn create_checkout_session(
        &self,
        params: &CheckoutParams,
    ) -> Result<CheckoutSession, StripeError>;
}
