use std::sync::Arc;

use axum::{
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};

use edufin_common::{CheckoutRequest, CheckoutResponse, SubscriptionStatus};

use crate::error::Result;
use crate::extract::ApiJson;
use crate::AppState;

async fn check_subscription(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<SubscriptionStatus>> {
    let user = state.auth.authenticate(&headers)?;
    let status = state.subscriptions.resolve(&user).await?;
    Ok(Json(status))
}

async fn create_checkout_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>> {
    let user = state.auth.authenticate(&headers)?;
    let response = state.checkout.create(&user, &request).await?;
    Ok(Json(response))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/check-subscription",
            post(check_subscription).get(check_subscription),
        )
        .route("/create-checkout-session", post(create_checkout_session))
        .with_state(state)
}
