use std::sync::Arc;

use cadloop_core::config::CadConfig;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod error;
mod routes;
mod state;
mod ws;

#[cfg(test)]
mod tests_routes;

use state::AppState;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = CadConfig::from_env();
    if config.generation.api_key.is_none() && config.generation.endpoint.is_none() {
        warn!("ANTHROPIC_API_KEY is not set; turns will fail with a configuration error");
    }
    let addr = config.server.addr.clone();
    let shared_state = Arc::new(AppState::from_config(config));

    let app = routes::app(shared_state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await
}
