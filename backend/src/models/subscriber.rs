use chrono::{DateTime, Utc};
use serde::Serialize;

use edufin_common::{PlanTier, SubscriptionStatus};

/// Local mirror of a customer's subscription state, keyed by email.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Subscriber {
    pub email: String,
    pub user_id: Option<String>,
    pub stripe_customer_id: Option<String>,
    pub subscribed: bool,
    pub subscription_tier: Option<PlanTier>,
    pub subscription_end: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Subscriber {
    pub fn status(&self) -> SubscriptionStatus {
        SubscriptionStatus {
            subscribed: self.subscribed,
            subscription_tier: self.subscription_tier,
            subscription_end: self.subscription_end,
        }
    }

    /// Tier used for content gating. Only an active subscription grants one.
    pub fn active_tier(&self) -> Option<PlanTier> {
        if self.subscribed {
            self.subscription_tier
        } else {
            None
        }
    }
}
