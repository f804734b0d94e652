//! Canned Stripe API responses for wiremock servers.

use serde_json::{json, Value};

/// `GET /v1/customers` list body. Entries are `(id, email)`.
pub fn customer_list_json(customers: &[(&str, &str)]) -> Value {
    let data: Vec<Value> = customers
        .iter()
        .map(|(id, email)| customer_json(id, email))
        .collect();

    json!({
        "object": "list",
        "url": "/v1/customers",
        "has_more": false,
        "data": data,
    })
}

pub fn customer_json(id: &str, email: &str) -> Value {
    json!({
        "id": id,
        "object": "customer",
        "email": email,
        "created": 1_700_000_000,
        "livemode": false,
    })
}

/// `GET /v1/subscriptions` list body.
/// Entries are `(subscription id, customer id, price id, current_period_end)`.
pub fn subscription_list_json(subscriptions: &[(&str, &str, &str, i64)]) -> Value {
    let data: Vec<Value> = subscriptions
        .iter()
        .map(|(id, customer, price, period_end)| {
            json!({
                "id": id,
                "object": "subscription",
                "customer": customer,
                "status": "active",
                "current_period_end": period_end,
                "items": {
                    "object": "list",
                    "data": [{
                        "id": format!("si_{}", id),
                        "object": "subscription_item",
                        "price": {"id": price, "object": "price"},
                        "current_period_end": period_end,
                    }],
                },
            })
        })
        .collect();

    json!({
        "object": "list",
        "url": "/v1/subscriptions",
        "has_more": false,
        "data": data,
    })
}

/// `POST /v1/checkout/sessions` body. The hosted URL embeds the session id.
pub fn checkout_session_json(session_id: &str) -> Value {
    json!({
        "id": session_id,
        "object": "checkout.session",
        "mode": "subscription",
        "status": "open",
        "url": format!("https://checkout.stripe.com/c/pay/{}", session_id),
    })
}

/// A `checkout.session.completed` event envelope.
pub fn checkout_completed_event(event_id: &str, customer_id: &str, email: &str, user_id: &str) -> Value {
    json!({
        "id": event_id,
        "object": "event",
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": "cs_test",
                "object": "checkout.session",
                "customer": customer_id,
                "customer_details": {"email": email},
                "client_reference_id": user_id,
                "metadata": {"user_id": user_id},
            }
        }
    })
}

/// A `customer.subscription.*` event envelope.
pub fn subscription_event(event_id: &str, event_type: &str, customer_id: &str) -> Value {
    json!({
        "id": event_id,
        "object": "event",
        "type": event_type,
        "data": {
            "object": {
                "id": "sub_test",
                "object": "subscription",
                "customer": customer_id,
            }
        }
    })
}
