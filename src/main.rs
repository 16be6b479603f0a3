mod app_state;
mod bridge;
mod config;
mod controller;
mod format;
mod handlers;
mod models;
mod session;

use clap::Parser;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use app_state::AppState;
use bridge::{HostBridge, HttpHostBridge, MockHostBridge};
use config::Config;
use controller::AtmController;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "atm_session=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse configuration
    let config = Config::parse();

    // Connect to the host resource, or fall back to the in-memory authority
    let bridge: Arc<dyn HostBridge> = match &config.host_base_url {
        Some(base_url) => Arc::new(HttpHostBridge::new(base_url, &config.resource_name)?),
        None => {
            tracing::warn!("HOST_BASE_URL not set, using mock authority with demo cards");
            Arc::new(MockHostBridge::demo(&config.mock_pin))
        }
    };

    let state = AppState {
        controller: AtmController::new(bridge, config.timing()),
    };

    let app = handlers::router(state).layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    let listener = tokio::net::TcpListener::bind(&config.socket_addr()).await?;

    tracing::info!("ATM session controller running on {}", config.socket_addr());
    tracing::info!("Host resource: {}", config.resource_name);
    if let Some(base_url) = &config.host_base_url {
        tracing::info!("Host callbacks: {}", base_url);
    }

    axum::serve(listener, app).await?;

    Ok(())
}
