//! API-key guard for resource routes.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::RestError;
use crate::headers::API_KEY_HEADER;
use crate::AppState;

/// Reject requests without a matching `x-api-key` when a key is configured.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.cfg.api_key() else {
        return next.run(request).await;
    };

    let rejection = match request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        Some(provided) if provided == expected => None,
        Some(_) => Some("invalid x-api-key header"),
        None => Some("missing x-api-key header"),
    };

    match rejection {
        None => next.run(request).await,
        Some(reason) => {
            tracing::warn!(path = %request.uri().path(), reason, "rejected request");
            RestError::Unauthorized(reason).into_response()
        }
    }
}
