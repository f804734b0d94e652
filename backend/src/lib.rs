pub mod auth;
pub mod billing;
pub mod catalog;
pub mod checkout;
pub mod client;
pub mod config;
pub mod error;
pub mod extract;
pub mod logging;
pub mod models;
pub mod routes;
pub mod store;
pub mod subscription;
#[doc(hidden)]
pub mod test_util;

pub use auth::{AuthService, AuthUser};
pub use billing::{PaymentProvider, PriceTable, StripeClient};
pub use checkout::CheckoutService;
pub use client::ApiClient;
pub use config::Config;
pub use error::ApiError;
pub use store::Store;
pub use subscription::SubscriptionService;

use std::sync::Arc;

use axum::{http::HeaderValue, middleware, Router};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use edufin_common::ContentItem;

use crate::auth::{LoginLimiter, TokenIssuer};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: Arc<Store>,
    pub auth: AuthService,
    pub subscriptions: SubscriptionService,
    pub checkout: CheckoutService,
    pub prices: Arc<PriceTable>,
    /// Full catalog; filtered per request by plan tier.
    pub catalog: Vec<ContentItem>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<Store>,
        provider: Arc<dyn PaymentProvider>,
        catalog: Vec<ContentItem>,
    ) -> Self {
        let tokens = TokenIssuer::new(
            &config.auth.jwt_secret,
            config.auth.access_token_ttl_secs,
            config.auth.refresh_token_ttl_secs,
        );
        let limiter = LoginLimiter::new(config.auth.login_attempts_per_minute);
        let prices = Arc::new(PriceTable::new(&config.billing.prices));

        Self {
            auth: AuthService::new(store.clone(), tokens, limiter),
            subscriptions: SubscriptionService::new(store.clone(), provider.clone(), prices.clone()),
            checkout: CheckoutService::new(provider, prices.clone(), &config.server.public_url),
            store,
            prices,
            catalog,
            config,
        }
    }
}

/// The full HTTP surface.
pub fn app(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.cors.origins);

    Router::new()
        .merge(routes::health::router())
        .merge(routes::auth::router(state.clone()))
        .merge(routes::subscription::router(state.clone()))
        .merge(routes::webhook::router(state.clone()))
        .merge(routes::content::router(state))
        .layer(middleware::from_fn(logging::request_logger))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(origins: &str) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if origins.trim() == "*" {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .filter_map(|o| match o.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(origins))
}
