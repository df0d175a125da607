//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the REST API over an in-memory store.
//!
//! ## Intended use
//! Development and debugging: nothing is persisted and no profiles are loaded. The workspace's
//! main `frs-run` binary resolves the full configuration (file backend, profiles, paging).

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::config::{api_key_from_env_value, base_url_from_env_value, DEFAULT_REST_ADDR};
use api_rest::{router, AppState, RestConfig};
use frs_core::{ResourceStore, StoreConfig};

/// Main entry point for the FRS REST API server
///
/// # Environment Variables
/// - `FRS_REST_ADDR`: Server address (default: "0.0.0.0:3000")
/// - `FRS_BASE_URL`: Public base URL for links (default: "http://localhost:3000")
/// - `API_KEY`: When set, resource routes require a matching `x-api-key` header
///
/// # Errors
/// Fails when `FRS_REST_ADDR` cannot be bound or serving stops with an I/O error.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("FRS_REST_ADDR").unwrap_or_else(|_| DEFAULT_REST_ADDR.into());
    let cfg = RestConfig::new(
        base_url_from_env_value(std::env::var("FRS_BASE_URL").ok()),
        api_key_from_env_value(std::env::var("API_KEY").ok()),
    );

    tracing::info!("-- Starting FRS REST API (in-memory) on {}", addr);

    let store = Arc::new(ResourceStore::open(StoreConfig::default())?);
    let app = router(AppState::new(cfg, store));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
