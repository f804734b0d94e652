use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use edufin_backend::catalog::load_catalog;
use edufin_backend::{app, AppState, Config, Store, StripeClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| config.logging.level.clone().into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Edufin backend");
    for warning in config.warnings() {
        tracing::warn!("{}", warning);
    }

    // Initialize components
    let store = Arc::new(Store::open(&config.database.path)?);
    tracing::info!("Opened database at {}", config.database.path);

    let stripe = StripeClient::new(
        &config.stripe.api_base,
        &config.stripe.secret_key,
        Duration::from_secs(config.stripe.timeout_secs),
        config.stripe.max_retries,
    )?;

    let catalog = load_catalog(config.content.catalog_path.as_deref())?;

    let state = Arc::new(AppState::new(config.clone(), store, Arc::new(stripe), catalog));

    // Purge expired revocations and refresh tokens
    let purge_state = state.clone();
    let purge_every = Duration::from_secs(config.auth.purge_interval_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(purge_every);
        loop {
            interval.tick().await;
            match purge_state.auth.purge_expired() {
                Ok(0) => {}
                Ok(removed) => tracing::debug!("Purged {} expired token rows", removed),
                Err(e) => tracing::warn!("Token purge failed: {}", e),
            }
        }
    });

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}
