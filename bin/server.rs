// ATM Availability - Web Server
// REST API with Axum, plus the built frontend as static files

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

use atm_availability::api::{router, AppState};
use atm_availability::{init_tracing, AvailabilityService, Config, GeminiClient, ReportStore};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Config::from_env();

    let store = ReportStore::open(&config.db_path)
        .with_context(|| format!("Failed to open report store at {}", config.db_path.display()))?;
    let generator = GeminiClient::new(&config.discovery)?;
    let service = AvailabilityService::new(store, Arc::new(generator));

    if !config.static_dir.is_dir() {
        warn!(path = %config.static_dir.display(), "static folder not found, creating it");
        std::fs::create_dir_all(&config.static_dir).with_context(|| {
            format!("Failed to create static folder {}", config.static_dir.display())
        })?;
    }

    let app = router(AppState { service }, &config.static_dir);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!(%addr, version = atm_availability::VERSION, "server running");
    info!("API: http://localhost:{}/api/atms?pincode=600001", config.port);

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}
