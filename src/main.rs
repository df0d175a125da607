use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::config::{DEFAULT_REST_ADDR, api_key_from_env_value, base_url_from_env_value};
use api_rest::{AppState, RestConfig, router};
use frs_core::config::{
    data_dir_from_env_value, flag_from_env_value, page_size_from_env_value,
    profiles_from_env_value,
};
use frs_core::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use frs_core::{ResourceStore, StoreConfig};

/// Main entry point for FRS
///
/// Resolves configuration once, loads the store and serves the FHIR REST API until Ctrl-C.
///
/// # Environment Variables
/// - `FRS_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `FRS_BASE_URL`: Public base URL for `Location` and Bundle links (default: "http://localhost:3000")
/// - `FRS_DATA_DIR`: Directory for version files; unset keeps everything in memory
/// - `FRS_PAGE_SIZE` / `FRS_MAX_PAGE_SIZE`: Search paging (defaults: 20 / 100)
/// - `FRS_REQUIRE_IF_MATCH`: Whether updates must carry `If-Match` (default: true)
/// - `FRS_PROFILE_FILE`: YAML file with profile definitions
/// - `API_KEY`: When set, resource routes require a matching `x-api-key` header
///
/// # Returns
/// * `Ok(())` - If the server starts and shuts down cleanly
/// * `Err(anyhow::Error)` - If configuration, store loading or the server fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("frs_run=info".parse()?)
                .add_directive("frs_core=info".parse()?)
                .add_directive("api_rest=info".parse()?)
                .add_directive("audit=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("FRS_REST_ADDR").unwrap_or_else(|_| DEFAULT_REST_ADDR.into());

    let default_page_size =
        page_size_from_env_value(std::env::var("FRS_PAGE_SIZE").ok(), DEFAULT_PAGE_SIZE)?;
    let max_page_size =
        page_size_from_env_value(std::env::var("FRS_MAX_PAGE_SIZE").ok(), MAX_PAGE_SIZE)?;
    let require_if_match = flag_from_env_value(std::env::var("FRS_REQUIRE_IF_MATCH").ok(), true)?;
    let data_dir = data_dir_from_env_value(std::env::var("FRS_DATA_DIR").ok());
    let profiles = profiles_from_env_value(std::env::var("FRS_PROFILE_FILE").ok())?;

    match &data_dir {
        Some(dir) => tracing::info!("++ Using file backend at {}", dir.display()),
        None => tracing::info!("++ FRS_DATA_DIR not set; resources are kept in memory"),
    }
    tracing::info!(profiles = profiles.len(), "++ Profiles loaded");

    let store_cfg = StoreConfig::new(
        default_page_size,
        max_page_size,
        require_if_match,
        data_dir,
        profiles,
    )?;
    let store = Arc::new(ResourceStore::open(store_cfg)?);

    let rest_cfg = RestConfig::new(
        base_url_from_env_value(std::env::var("FRS_BASE_URL").ok()),
        api_key_from_env_value(std::env::var("API_KEY").ok()),
    );
    if rest_cfg.api_key().is_none() {
        tracing::warn!("API_KEY not set; resource routes are open");
    }

    let app = router(AppState::new(rest_cfg, store));

    tracing::info!("++ Starting FRS REST on {}", rest_addr);
    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for shutdown signal: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    tracing::info!("-- FRS REST stopped");
    Ok(())
}
