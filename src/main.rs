use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use camo_spotter::model::Model;
use camo_spotter::server::{router, AppState};
use camo_spotter::utils::get_env;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = get_env()?;
    if config.gateway.api_key.is_none() {
        warn!("AI_GATEWAY_API_KEY is not set, analysis requests will fail");
    }
    info!("Using model {} via {}", config.gateway.model, config.gateway.url);

    let model = Model::new(config.gateway).context("Failed to build AI gateway client")?;
    let shared_state = Arc::new(AppState { model });
    let app = router(shared_state, config.body_limit_bytes);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Listening on http://{}", addr);
    axum::Server::try_bind(&addr)
        .with_context(|| format!("Failed to bind {}", addr))?
        .serve(app.into_make_service())
        .await
        .context("Server error")?;

    Ok(())
}
