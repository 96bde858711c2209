// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::application::dashboard_service::DashboardService;
use crate::infrastructure::config::load_dashboard_config;
use crate::infrastructure::graphql_repository::GraphQLRepository;
use crate::infrastructure::push_channel::StompPushChannel;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    change_range, get_chart, get_dashboard, health_check, reload_chart, stream_mutations,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing, RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = load_dashboard_config().context("Failed to load config/dashboard")?;

    // Create repository and push channel (infrastructure layer)
    let repository = Arc::new(GraphQLRepository::new(config.api.graphql_url.clone()));
    let push_channel = Arc::new(StompPushChannel::new(config.push.clone()));

    // Create service (application layer): history first, then live updates
    let dashboard_service = DashboardService::new(repository, config.history.clone(), config.stream.buffer);
    tokio::spawn(dashboard_service.clone().run(push_channel, config.stream.buffer));

    let state = Arc::new(AppState { dashboard_service });

    // Build router (presentation layer)
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/dashboard", get(get_dashboard))
        .route("/charts/stream", get(stream_mutations))
        .route("/charts/:id", get(get_chart))
        .route("/charts/:id/reload", post(reload_chart))
        .route("/charts/:id/range", post(change_range))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.server.bind))?;
    tracing::info!(%addr, "Starting thermonitor-dashboard service");

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router).await?;

    Ok(())
}
