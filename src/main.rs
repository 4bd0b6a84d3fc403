//! Sensortune - motion-triggered music playback orchestrator
//!
//! Main entry point for the service.

use sensortune::{
    broker_gate::BrokerGateClient,
    device_provisioner::DeviceProvisioner,
    ingress_router::IngressRouter,
    motion_orchestrator::MotionOrchestrator,
    music_adapter::HttpMusicClient,
    registry::Registry,
    secret_store::SecretStore,
    session_store::SessionRepository,
    state::{AppConfig, AppState},
    timeout_reaper::TimeoutReaper,
    token_warden::{LeaseRepository, TokenWarden},
    web_api,
};
use sqlx::mysql::MySqlPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sensortune=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting sensortune v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    tracing::info!(
        database_url = %config.database_url,
        broker_gate_url = %config.broker_gate_url,
        music_api_url = %config.music_api_url,
        reaper_tick_seconds = config.reaper_tick_seconds,
        warden_tick_seconds = config.warden_tick_seconds,
        "Configuration loaded"
    );

    // Create database pool
    let pool = MySqlPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&config.database_url)
        .await?;

    tracing::info!("Database connected");

    // Initialize components
    let registry = Arc::new(Registry::new(pool.clone()));
    let sessions = SessionRepository::new(pool.clone());
    let secrets = SecretStore::new(pool.clone());

    let music = Arc::new(HttpMusicClient::new(
        config.music_api_url.clone(),
        config.music_auth_url.clone(),
        config.music_client_id.clone(),
        config.music_client_secret.clone(),
    ));

    let broker = Arc::new(BrokerGateClient::new(
        config.broker_gate_url.clone(),
        config.broker_device_endpoint.clone(),
        config.broker_region.clone(),
    ));

    let warden = Arc::new(TokenWarden::new(
        registry.clone(),
        secrets.clone(),
        music.clone(),
        LeaseRepository::new(pool.clone()),
        config.warden_tick_seconds,
    ));
    tracing::info!("TokenWarden initialized");

    let orchestrator = Arc::new(MotionOrchestrator::new(
        registry.clone(),
        sessions.clone(),
        warden.clone(),
        music.clone(),
        config.retention_seconds(),
    ));

    let reaper = Arc::new(TimeoutReaper::new(
        registry.clone(),
        sessions.clone(),
        warden.clone(),
        music.clone(),
        config.reaper_tick_seconds,
        config.retention_seconds(),
    ));

    let ingress = Arc::new(IngressRouter::new(registry.clone(), orchestrator.clone()));
    let provisioner = Arc::new(DeviceProvisioner::new(registry.clone(), broker.clone()));

    // Create application state
    let state = AppState {
        pool,
        config,
        registry,
        sessions,
        secrets,
        music,
        broker,
        warden,
        orchestrator,
        reaper,
        ingress,
        provisioner,
    };

    // Create router
    let app = web_api::create_router(state.clone())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    // Start control loops
    state.reaper.clone().start();
    tracing::info!("TimeoutReaper started");

    state.warden.clone().start();
    tracing::info!("TokenWarden started");

    // Start server
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
