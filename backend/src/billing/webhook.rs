//! Stripe webhook verification and event decoding.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a signed delivery, in seconds.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Missing Stripe-Signature header")]
    MissingSignature,
    #[error("Malformed Stripe-Signature header")]
    MalformedHeader,
    #[error("Signature timestamp outside tolerance")]
    TimestampOutOfTolerance,
    #[error("Signature mismatch")]
    SignatureMismatch,
    #[error("Webhook secret not configured")]
    NotConfigured,
    #[error("Invalid event payload: {0}")]
    InvalidPayload(String),
}

/// Verify a `Stripe-Signature` header (`t=<ts>,v1=<hex>[,v1=<hex>...]`)
/// against the raw request body.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
) -> Result<(), WebhookError> {
    if secret.is_empty() {
        return Err(WebhookError::NotConfigured);
    }

    let mut timestamp: Option<&str> = None;
    let mut signatures: Vec<&str> = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(WebhookError::MalformedHeader)?;
    if signatures.is_empty() {
        return Err(WebhookError::MalformedHeader);
    }

    let ts: i64 = timestamp.parse().map_err(|_| WebhookError::MalformedHeader)?;
    if (now - ts).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(WebhookError::TimestampOutOfTolerance);
    }

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| WebhookError::NotConfigured)?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);

    // verify_slice compares in constant time
    let matched = signatures.iter().any(|sig| match hex::decode(sig) {
        Ok(bytes) => mac.clone().verify_slice(&bytes).is_ok(),
        Err(_) => false,
    });

    if matched {
        Ok(())
    } else {
        Err(WebhookError::SignatureMismatch)
    }
}

/// Envelope of a Stripe event.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: Value,
}

/// What the service does in response to an event.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookAction {
    CheckoutCompleted {
        customer_id: Option<String>,
        email: Option<String>,
        user_id: Option<String>,
    },
    SubscriptionChanged {
        customer_id: String,
    },
    Ignored,
}

impl WebhookEvent {
    pub fn parse(payload: &[u8]) -> Result<Self, WebhookError> {
        serde_json::from_slice(payload).map_err(|e| WebhookError::InvalidPayload(e.to_string()))
    }

    pub fn action(&self) -> WebhookAction {
        let object = &self.data.object;
        match self.event_type.as_str() {
            "checkout.session.completed" => WebhookAction::CheckoutCompleted {
                customer_id: str_at(object, &["customer"]),
                email: str_at(object, &["customer_details", "email"])
                    .or_else(|| str_at(object, &["customer_email"])),
                user_id: str_at(object, &["metadata", "user_id"])
                    .or_else(|| str_at(object, &["client_reference_id"])),
            },
            "customer.subscription.created"
            | "customer.subscription.updated"
            | "customer.subscription.deleted" => match str_at(object, &["customer"]) {
                Some(customer_id) => WebhookAction::SubscriptionChanged { customer_id },
                None => WebhookAction::Ignored,
            },
            _ => WebhookAction::Ignored,
        }
    }
}

fn str_at(value: &Value, path: &[&str]) -> Option<String> {
    path.iter()
        .try_fold(value, |v, key| v.get(key))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from)
}
