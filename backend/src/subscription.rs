//! Subscription resolution against the payment provider, mirrored locally.

use std::sync::Arc;

use chrono::Utc;

use edufin_common::{PlanTier, SubscriptionStatus};

use crate::auth::{normalize_email, AuthUser};
use crate::billing::{PaymentProvider, PriceTable, ProviderSubscription, WebhookAction};
use crate::error::Result;
use crate::models::Subscriber;
use crate::store::Store;

pub struct SubscriptionService {
    store: Arc<Store>,
    provider: Arc<dyn PaymentProvider>,
    prices: Arc<PriceTable>,
}

impl SubscriptionService {
    pub fn new(store: Arc<Store>, provider: Arc<dyn PaymentProvider>, prices: Arc<PriceTable>) -> Self {
        Self {
            store,
            provider,
            prices,
        }
    }

    /// Ask the provider for the caller's subscription and mirror the answer.
    ///
    /// Running it twice against unchanged provider state leaves the same row.
    pub async fn resolve(&self, user: &AuthUser) -> Result<SubscriptionStatus> {
        let customers = self.provider.find_customers_by_email(&user.email).await?;
        if customers.len() > 1 {
            tracing::warn!(
                user_id = %user.id,
                count = customers.len(),
                "Several payment customers share this email, using the most recent"
            );
        }

        let customer_id = customers.into_iter().next().map(|c| c.id);
        self.sync_customer(&user.email, Some(&user.id), customer_id.as_deref())
            .await
    }

    /// Re-read the customer's active subscriptions and upsert the mirror row.
    pub async fn sync_customer(
        &self,
        email: &str,
        user_id: Option<&str>,
        customer_id: Option<&str>,
    ) -> Result<SubscriptionStatus> {
        let subscription = match customer_id {
            Some(id) => {
                let subscriptions = self.provider.list_active_subscriptions(id).await?;
                self.pick_subscription(id, subscriptions)
            }
            None => None,
        };

        let tier = subscription
            .as_ref()
            .map(|s| self.tier_of(s));

        let subscriber = Subscriber {
            email: email.to_string(),
            user_id: user_id.map(String::from),
            stripe_customer_id: customer_id.map(String::from),
            subscribed: subscription.is_some(),
            subscription_tier: tier,
            subscription_end: subscription.and_then(|s| s.current_period_end),
            updated_at: Utc::now(),
        };
        self.store.upsert_subscriber(&subscriber)?;

        tracing::info!(
            customer_id = customer_id.unwrap_or("-"),
            subscribed = subscriber.subscribed,
            tier = %tier.map(|t| t.label()).unwrap_or("-"),
            "Subscription resolved"
        );

        Ok(subscriber.status())
    }

    /// Reconcile the mirror after a verified webhook event.
    pub async fn apply_webhook(&self, action: &WebhookAction) -> Result<()> {
        match action {
            WebhookAction::CheckoutCompleted {
                customer_id,
                email,
                user_id,
            } => {
                let email = match email {
                    Some(email) => Some(normalize_email(email)),
                    None => self.email_for(user_id.as_deref(), customer_id.as_deref()).await?,
                };
                let Some(email) = email else {
                    tracing::warn!("Checkout completed without a resolvable email, skipping");
                    return Ok(());
                };

                let customer_id = match customer_id {
                    Some(id) => Some(id.clone()),
                    None => self
                        .provider
                        .find_customers_by_email(&email)
                        .await?
                        .into_iter()
                        .next()
                        .map(|c| c.id),
                };

                self.sync_customer(&email, user_id.as_deref(), customer_id.as_deref())
                    .await?;
            }
            WebhookAction::SubscriptionChanged { customer_id } => {
                let (email, user_id) = match self.store.find_subscriber_by_customer(customer_id)? {
                    Some(subscriber) => (Some(subscriber.email), subscriber.user_id),
                    None => (self.email_for(None, Some(customer_id)).await?, None),
                };
                let Some(email) = email else {
                    tracing::warn!(customer_id = %customer_id, "Subscription event for unknown customer, skipping");
                    return Ok(());
                };

                self.sync_customer(&email, user_id.as_deref(), Some(customer_id))
                    .await?;
            }
            WebhookAction::Ignored => {}
        }
        Ok(())
    }

    /// Tier from the local mirror only. `None` without an active subscription.
    pub fn current_tier(&self, email: &str) -> Result<Option<PlanTier>> {
        Ok(self
            .store
            .get_subscriber(email)?
            .and_then(|s| s.active_tier()))
    }

    async fn email_for(&self, user_id: Option<&str>, customer_id: Option<&str>) -> Result<Option<String>> {
        if let Some(user_id) = user_id {
            if let Some(user) = self.store.find_user_by_id(user_id)? {
                return Ok(Some(user.email));
            }
        }
        if let Some(customer_id) = customer_id {
            if let Some(customer) = self.provider.get_customer(customer_id).await? {
                return Ok(customer.email.map(|e| normalize_email(&e)));
            }
        }
        Ok(None)
    }

    fn tier_of(&self, subscription: &ProviderSubscription) -> PlanTier {
        subscription
            .price_id
            .as_deref()
            .map(|price| self.prices.tier_for_price(price))
            .unwrap_or(PlanTier::Unknown)
    }

    /// Highest tier wins, then the latest period end.
    fn pick_subscription(
        &self,
        customer_id: &str,
        subscriptions: Vec<ProviderSubscription>,
    ) -> Option<ProviderSubscription> {
        if subscriptions.len() > 1 {
            tracing::warn!(
                customer_id = %customer_id,
                count = subscriptions.len(),
                "Customer has several active subscriptions"
            );
        }

        subscriptions
            .into_iter()
            .max_by_key(|s| (self.tier_of(s).rank(), s.current_period_end))
    }
}
