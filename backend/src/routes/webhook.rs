use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;

use crate::billing::{verify_signature, WebhookError, WebhookEvent};
use crate::error::Result;
use crate::AppState;

#[derive(Serialize)]
struct WebhookAck {
    received: bool,
}

/// Stripe event delivery. Signature is checked against the raw body; event
/// ids are recorded so redeliveries are acknowledged without side effects.
async fn stripe_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(WebhookError::MissingSignature)?;

    verify_signature(
        &body,
        signature,
        &state.config.stripe.webhook_secret,
        Utc::now().timestamp(),
    )
    .inspect_err(|e| tracing::warn!("Rejected webhook delivery: {}", e))?;

    let event = WebhookEvent::parse(&body)?;

    if !state.store.record_webhook_event(&event.id, &event.event_type)? {
        tracing::info!(event_id = %event.id, "Duplicate webhook event acknowledged");
        return Ok(Json(WebhookAck { received: true }));
    }

    tracing::info!(event_id = %event.id, event_type = %event.event_type, "Processing webhook event");

    // Unrecord on failure so the provider's retry is processed.
    if let Err(e) = state.subscriptions.apply_webhook(&event.action()).await {
        state.store.forget_webhook_event(&event.id)?;
        return Err(e);
    }

    Ok(Json(WebhookAck { received: true }))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/webhooks/stripe", post(stripe_webhook))
        .with_state(state)
}
