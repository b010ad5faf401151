//! Device Fingerprint Server
//!
//! HTTP API over the fingerprint engine.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  FINGERPRINT SERVER                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐  ┌───────────┐  ┌─────────────────────────┐ │
//! │  │  API      │  │  API key  │  │  Velocity compaction    │ │
//! │  │  (Axum)   │  │  check    │  │  (Background task)      │ │
//! │  └─────┬─────┘  └─────┬─────┘  └────────────┬────────────┘ │
//! │        └──────────────┼──────────────────────┘              │
//! │                       ▼                                     │
//! │              ┌──────────────────┐                          │
//! │              │ FingerprintEngine│                          │
//! │              └──────────────────┘                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod models;
mod handlers;
mod middleware;
mod error;


use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, delete},
    middleware as axum_middleware,
};
use device_fingerprint_core::{EngineConfig, FingerprintEngine};
use tower_http::{
    cors::{CorsLayer, Any},
    trace::TraceLayer,
    compression::CompressionLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use error::{AppError, AppResult};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::from_env();

    // Initialize logging (also receives the engine's `log` records); JSON lines in production
    let json_logs = config.is_production();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "device_fingerprint_server=debug,device_fingerprint_core=info,tower_http=debug".into()))
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(tracing_subscriber::fmt::layer))
        .init();

    tracing::info!(
        "Fingerprint server starting ({}, {} trusted proxy hops)...",
        config.environment,
        config.trusted_proxy_hops
    );
    if config.api_key.is_none() {
        if config.is_production() {
            tracing::warn!("API_KEY is not set: the API is open to anyone who can reach it");
        } else {
            tracing::info!("API_KEY is not set: API key check disabled");
        }
    }

    // Build engine
    let engine_config = EngineConfig::load().context("invalid engine configuration")?;
    let engine = FingerprintEngine::new(engine_config).context("failed to build fingerprint engine")?;
    tracing::info!("Fingerprint store: {}", engine.store_backend());

    let engine = Arc::new(engine);
    let _compactor = engine.spawn_compactor();

    // Build application state
    let state = AppState {
        engine,
        config: config.clone(),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("🚀 Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .context("server error")?;

    Ok(())
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<FingerprintEngine>,
    pub config: config::Config,
}

/// Create the main router with all routes
fn create_router(state: AppState) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(handlers::health::check));

    // API routes (API key when configured)
    let api_routes = Router::new()
        .route("/api/v1/identify", post(handlers::identify::identify))
        .route("/api/v1/events", post(handlers::events::record))
        .route("/api/v1/visitors/:visitor_id/velocity", get(handlers::events::velocity))
        .route(
            "/api/v1/devices/:device_id",
            get(handlers::devices::get).delete(handlers::devices::delete),
        )
        .route("/api/v1/linked-ids/:linked_id", delete(handlers::linked_ids::unlink))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_api_key
        ));

    // Combine all routes
    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(DefaultBodyLimit::max(state.config.body_limit))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}
