//! FHIR response headers and request header parsing.

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use frs_core::Actor;
use serde::Serialize;

use crate::error::{RestError, RestResult};

pub const FHIR_JSON: &str = "application/fhir+json";

/// Header naming who performs a mutation.
pub const ACTOR_HEADER: &str = "x-actor";

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Weak ETag for a version id: `W/"<n>"`.
pub fn etag(version_id: u64) -> String {
    format!("W/\"{version_id}\"")
}

/// RFC 7231 date, e.g. `Tue, 15 Nov 1994 08:12:31 GMT`.
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Response headers for one resource version.
#[derive(Debug, Default)]
pub struct VersionHeaders {
    version_id: Option<u64>,
    last_modified: Option<DateTime<Utc>>,
    location: Option<String>,
}

impl VersionHeaders {
    pub fn new(version_id: Option<u64>, last_modified: Option<DateTime<Utc>>) -> Self {
        Self {
            version_id,
            last_modified,
            location: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn to_header_map(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(version_id) = self.version_id {
            if let Ok(value) = HeaderValue::from_str(&etag(version_id)) {
                headers.insert(header::ETAG, value);
            }
        }
        if let Some(at) = self.last_modified {
            if let Ok(value) = HeaderValue::from_str(&http_date(at)) {
                headers.insert(header::LAST_MODIFIED, value);
            }
        }
        if let Some(location) = &self.location {
            if let Ok(value) = HeaderValue::from_str(location) {
                headers.insert(header::LOCATION, value);
            }
        }
        headers
    }
}

/// Serialize `body` as `application/fhir+json`.
pub fn fhir_json<T: Serialize>(status: StatusCode, mut headers: HeaderMap, body: &T) -> Response {
    match serde_json::to_vec(body) {
        Ok(bytes) => {
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(FHIR_JSON));
            (status, headers, Body::from(bytes)).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize response body");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Parse `If-Match`. Accepts `W/"<n>"`, `"<n>"` and `<n>`.
///
/// # Errors
///
/// Returns [`RestError::InvalidIfMatch`] if the header is present but not a version token.
pub fn if_match(headers: &HeaderMap) -> RestResult<Option<u64>> {
    let Some(raw) = headers.get(header::IF_MATCH) else {
        return Ok(None);
    };
    let text = raw
        .to_str()
        .map_err(|_| RestError::InvalidIfMatch(String::from_utf8_lossy(raw.as_bytes()).into()))?;

    let trimmed = text.trim();
    let unprefixed = trimmed.strip_prefix("W/").unwrap_or(trimmed);
    let unquoted = unprefixed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(unprefixed);

    unquoted
        .parse::<u64>()
        .map(Some)
        .map_err(|_| RestError::InvalidIfMatch(text.to_owned()))
}

/// Actor named by `x-actor`; anonymous when absent or blank.
pub fn actor(headers: &HeaderMap) -> Actor {
    headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|name| Actor::new(name).ok())
        .unwrap_or_else(Actor::anonymous)
}
