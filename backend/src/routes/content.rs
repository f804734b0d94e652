use std::sync::Arc;

use axum::{
    extract::State,
    http::HeaderMap,
    routing::get,
    Json, Router,
};

use edufin_common::{filter_content, ContentItem, PlanInfo};

use crate::error::Result;
use crate::AppState;

/// Catalog items the caller's mirrored plan unlocks. No provider call.
async fn content(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<ContentItem>>> {
    let user = state.auth.authenticate(&headers)?;
    let items = match state.subscriptions.current_tier(&user.email)? {
        Some(tier) => filter_content(&state.catalog, tier),
        None => Vec::new(),
    };
    Ok(Json(items))
}

async fn plans(State(state): State<Arc<AppState>>) -> Json<Vec<PlanInfo>> {
    Json(state.prices.plans())
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/content", get(content))
        .route("/plans", get(plans))
        .with_state(state)
}
