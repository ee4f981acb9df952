mod analytics;
mod client;
mod config;
mod error;
mod frame;
mod geo;
mod handlers;
mod models;
mod pagination;
mod query;
mod renewables;
mod retry;
mod router;
mod state;
mod transport;

use std::sync::Arc;

use anyhow::Context as _;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::client::EiaClient;
use crate::config::Config;
use crate::router::create_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("renewviz=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;
    info!(
        base_url = %config.base_url,
        page_size = config.page_size,
        max_retries = config.max_retries,
        "Using EIA API"
    );

    let bind_address = config.bind_address.clone();
    let client = EiaClient::from_config(config)?;
    let app = create_router(Arc::new(AppState::new(client)));

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
