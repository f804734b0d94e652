use std::sync::Arc;

use edufin_common::{CheckoutRequest, CheckoutResponse};

use crate::auth::AuthUser;
use crate::billing::{CheckoutParams, PaymentProvider, PriceTable};
use crate::error::{ApiError, Result};

const DEFAULT_SUCCESS_PATH: &str = "/dashboard";
const CANCEL_PATH: &str = "/planos";

/// Starts hosted checkout sessions. Nothing here is retried.
pub struct CheckoutService {
    provider: Arc<dyn PaymentProvider>,
    prices: Arc<PriceTable>,
    public_url: String,
}

impl CheckoutService {
    pub fn new(provider: Arc<dyn PaymentProvider>, prices: Arc<PriceTable>, public_url: &str) -> Self {
        Self {
            provider,
            prices,
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn create(&self, user: &AuthUser, request: &CheckoutRequest) -> Result<CheckoutResponse> {
        let price_id = request
            .price_id
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or(ApiError::MissingPriceId)?;

        if !self.prices.contains_price(price_id) {
            return Err(ApiError::UnknownPriceId(price_id.to_string()));
        }

        let success_path = success_path(request.success_path.as_deref())?;

        // Reuse an existing customer so repeat purchases don't duplicate it.
        let customer_id = self
            .provider
            .find_customers_by_email(&user.email)
            .await?
            .into_iter()
            .next()
            .map(|c| c.id);

        let params = CheckoutParams {
            price_id: price_id.to_string(),
            customer_id,
            customer_email: user.email.clone(),
            user_id: user.id.clone(),
            success_url: format!(
                "{}{}?session_id={{CHECKOUT_SESSION_ID}}",
                self.public_url, success_path
            ),
            cancel_url: format!("{}{}", self.public_url, CANCEL_PATH),
        };

        let session = self.provider.create_checkout_session(&params).await?;
        tracing::info!(
            user_id = %user.id,
            session_id = %session.id,
            tier = %self.prices.tier_for_price(price_id),
            "Checkout session created"
        );

        Ok(CheckoutResponse { url: session.url })
    }
}

/// Only same-site absolute paths are accepted as redirect targets.
fn success_path(path: Option<&str>) -> Result<&str> {
    match path.map(str::trim) {
        None | Some("") => Ok(DEFAULT_SUCCESS_PATH),
        Some(p) if p.starts_with('/') && !p.starts_with("//") && !p.contains('\\') => {
            // The session id query is appended after the path
            if p.contains(['?', '#']) {
                return Err(ApiError::Validation(
                    "successPath must not contain a query or fragment".to_string(),
                ));
            }
            Ok(p)
        }
        Some(_) => Err(ApiError::Validation(
            "successPath must be a path starting with '/'".to_string(),
        )),
    }
}
