//! EcoCode - estimates the environmental footprint of application requests.
//!
//! # API Endpoints
//!
//! - `POST /api/metrics` - Record a resource-usage sample
//! - `GET /api/metrics` - Page through recorded metrics with filters
//! - `GET /api/metrics/applications` - List known applications
//! - `GET /api/metrics/report` - Aggregate footprint summary
//! - `GET /api/metrics/ranking` - Endpoints ranked by emissions
//! - `DELETE /api/metrics` - Purge every record (maintenance only)
//! - `GET /health` - Health check

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use ecocode::api::{AppState, router};
use ecocode::config::Settings;
use ecocode::impact::ImpactCalculator;
use ecocode::storage::Storage;
use ecocode::store::MetricStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("ecocode=info".parse()?))
        .init();

    let settings = Settings::from_env();

    info!(
        port = settings.port,
        db_url = %settings.database_url,
        base_factor = settings.factors.base_factor_g_per_point,
        grid_intensity = settings.factors.grid_intensity_g_per_wh,
        "Starting EcoCode server"
    );

    // Initialize storage
    let storage = Storage::new(&settings.database_url, settings.max_connections).await?;
    info!("Database initialized");

    let store = MetricStore::new(storage.clone(), ImpactCalculator::new(settings.factors));
    let state = AppState { store };

    // The dashboard is served from a different origin.
    let app = router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let listener = TcpListener::bind(addr).await?;

    info!(%addr, "EcoCode is listening");

    axum::serve(listener, app).await?;

    storage.close().await;
    info!("Database closed");

    Ok(())
}
