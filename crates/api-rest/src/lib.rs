//! # API REST
//!
//! FHIR RESTful HTTP interface for FRS.
//!
//! Handles:
//! - routing with axum (`/{type}`, `/{type}/{id}`, `_history`, `/metadata`)
//! - mapping store errors to status codes and `OperationOutcome` bodies
//! - FHIR headers (`ETag`, `Last-Modified`, `Location`, `If-Match`)
//! - the optional `x-api-key` guard
//! - the OpenAPI document at `/api-docs/openapi.json`
//!
//! All storage semantics live in `frs-core`.

#![warn(rust_2018_idioms)]

pub mod auth;
pub mod capability;
pub mod config;
pub mod error;
pub mod handlers;
pub mod headers;

use std::sync::Arc;

use axum::middleware;
use axum::routing::get;
use axum::Router;
use frs_core::ResourceStore;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;

pub use config::RestConfig;
pub use error::{RestError, RestResult};

/// Application state shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<RestConfig>,
    pub store: Arc<ResourceStore>,
}

impl AppState {
    pub fn new(cfg: RestConfig, store: Arc<ResourceStore>) -> Self {
        Self {
            cfg: Arc::new(cfg),
            store,
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::metadata,
        handlers::create,
        handlers::read,
        handlers::read_version,
        handlers::update,
        handlers::delete,
        handlers::history,
        handlers::search,
    ),
    components(schemas(handlers::HealthRes))
)]
pub struct ApiDoc;

/// Build the full router: open service routes plus guarded resource routes.
pub fn router(state: AppState) -> Router {
    let resources = Router::new()
        .route(
            "/:resource_type",
            get(handlers::search).post(handlers::create),
        )
        .route(
            "/:resource_type/:id",
            get(handlers::read)
                .put(handlers::update)
                .delete(handlers::delete),
        )
        .route("/:resource_type/:id/_history", get(handlers::history))
        .route(
            "/:resource_type/:id/_history/:version_id",
            get(handlers::read_version),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/metadata", get(handlers::metadata))
        .route("/api-docs/openapi.json", get(handlers::openapi))
        .merge(resources)
        .layer(CorsLayer::permissive())
        .with_state(state)
}
