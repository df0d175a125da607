//! FHIR RESTful interaction handlers.
//!
//! Handlers resolve the path type, decode the body, call the [`ResourceStore`] and render the
//! result. They never touch the environment or any state beyond [`AppState`].
//!
//! [`ResourceStore`]: frs_core::ResourceStore

use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use fhir::{
    Bundle, BundleEntry, BundleEntryRequest, BundleEntryResponse, BundleType, Resource,
    ResourceKind,
};
use frs_core::{StoreError, VersionOperation, VersionRecord};
use serde::Serialize;
use serde_json::Value;
use utoipa::{OpenApi, ToSchema};

use crate::capability::capability_statement;
use crate::error::{RestError, RestResult};
use crate::headers::{self, fhir_json, VersionHeaders};
use crate::{ApiDoc, AppState};

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

fn parse_kind(name: &str) -> RestResult<ResourceKind> {
    name.parse()
        .map_err(|_| RestError::UnknownResourceType(name.to_owned()))
}

fn parse_body(body: &Bytes) -> RestResult<Value> {
    serde_json::from_slice(body).map_err(|e| RestError::MalformedBody(e.to_string()))
}

fn resource_response(
    status: StatusCode,
    resource: &Resource,
    location: Option<String>,
) -> Response {
    let mut version_headers = VersionHeaders::new(resource.version_id(), resource.last_updated());
    if let Some(location) = location {
        version_headers = version_headers.with_location(location);
    }
    fhir_json(status, version_headers.to_header_map(), resource)
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
///
/// Always open, even when an API key is configured.
#[axum::debug_handler]
pub async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "FRS REST API is alive".into(),
    })
}

#[utoipa::path(
    get,
    path = "/metadata",
    responses(
        (status = 200, description = "CapabilityStatement", content_type = "application/fhir+json")
    )
)]
/// Capability statement built from the kind registry.
#[axum::debug_handler]
pub async fn metadata(State(state): State<AppState>) -> Response {
    let statement = capability_statement(state.store.validator().profiles());
    fhir_json(StatusCode::OK, HeaderMap::new(), &statement)
}

/// The OpenAPI document for this API.
pub async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[utoipa::path(
    post,
    path = "/{resource_type}",
    params(("resource_type" = String, Path, description = "Resource type, e.g. Patient")),
    request_body(content = serde_json::Value, content_type = "application/fhir+json"),
    responses(
        (status = 201, description = "Resource created; Location, ETag and Last-Modified set"),
        (status = 400, description = "Validation failed, or the body has an id"),
        (status = 401, description = "Missing or invalid API key")
    )
)]
/// Create a resource
///
/// The server assigns `id`, `meta.versionId = "1"` and `meta.lastUpdated`. The actor recorded
/// in history and audit comes from `x-actor`.
///
/// # Errors
///
/// - `400 Bad Request` for malformed JSON, an unknown type, a body id, or any validation
///   failure.
/// - `500 Internal Server Error` if the version could not be stored.
#[axum::debug_handler]
pub async fn create(
    State(state): State<AppState>,
    Path(resource_type): Path<String>,
    request_headers: HeaderMap,
    body: Bytes,
) -> RestResult<Response> {
    let kind = parse_kind(&resource_type)?;
    let candidate = parse_body(&body)?;
    let actor = headers::actor(&request_headers);

    let created = state.store.create(&actor, kind, &candidate)?;
    let id = created
        .id()
        .ok_or_else(|| RestError::Internal("created resource has no id".into()))?;
    let location = format!(
        "{}/_history/{}",
        state.cfg.resource_url(kind.as_str(), id.as_str()),
        created.version_id().unwrap_or(1)
    );

    tracing::info!(kind = %kind, id = %id, actor = %actor, "resource created");
    Ok(resource_response(StatusCode::CREATED, &created, Some(location)))
}

#[utoipa::path(
    get,
    path = "/{resource_type}/{id}",
    params(
        ("resource_type" = String, Path, description = "Resource type"),
        ("id" = String, Path, description = "Logical id")
    ),
    responses(
        (status = 200, description = "Current version"),
        (status = 404, description = "Unknown id"),
        (status = 410, description = "Resource was deleted")
    )
)]
/// Read the current version of a resource
#[axum::debug_handler]
pub async fn read(
    State(state): State<AppState>,
    Path((resource_type, id)): Path<(String, String)>,
) -> RestResult<Response> {
    let kind = parse_kind(&resource_type)?;
    let resource = state.store.read(kind, &id)?;
    Ok(resource_response(StatusCode::OK, &resource, None))
}

#[utoipa::path(
    get,
    path = "/{resource_type}/{id}/_history/{version_id}",
    params(
        ("resource_type" = String, Path, description = "Resource type"),
        ("id" = String, Path, description = "Logical id"),
        ("version_id" = String, Path, description = "Version id")
    ),
    responses(
        (status = 200, description = "The requested version"),
        (status = 404, description = "Unknown id or version"),
        (status = 410, description = "The version records the delete")
    )
)]
/// Read a specific version of a resource
#[axum::debug_handler]
pub async fn read_version(
    State(state): State<AppState>,
    Path((resource_type, id, version_id)): Path<(String, String, String)>,
) -> RestResult<Response> {
    let kind = parse_kind(&resource_type)?;
    let version = version_id
        .parse::<u64>()
        .map_err(|_| StoreError::NotFound {
            kind,
            id: format!("{id}/_history/{version_id}"),
        })?;
    let resource = state.store.read_version(kind, &id, version)?;
    Ok(resource_response(StatusCode::OK, &resource, None))
}

#[utoipa::path(
    put,
    path = "/{resource_type}/{id}",
    params(
        ("resource_type" = String, Path, description = "Resource type"),
        ("id" = String, Path, description = "Logical id"),
        ("If-Match" = Option<String>, Header, description = "Version the client last read, W/\"n\" or n")
    ),
    request_body(content = serde_json::Value, content_type = "application/fhir+json"),
    responses(
        (status = 200, description = "Updated; ETag carries the new version"),
        (status = 400, description = "Validation failed or the body id does not match"),
        (status = 404, description = "Unknown id"),
        (status = 409, description = "If-Match does not name the current version"),
        (status = 410, description = "Resource was deleted")
    )
)]
/// Update a resource
///
/// # Errors
///
/// - `409 Conflict` if `If-Match` is stale, or missing while the server requires it.
/// - `404 Not Found` / `410 Gone` for unknown or deleted resources.
/// - `400 Bad Request` for body problems.
#[axum::debug_handler]
pub async fn update(
    State(state): State<AppState>,
    Path((resource_type, id)): Path<(String, String)>,
    request_headers: HeaderMap,
    body: Bytes,
) -> RestResult<Response> {
    let kind = parse_kind(&resource_type)?;
    let token = headers::if_match(&request_headers)?;
    let candidate = parse_body(&body)?;
    let actor = headers::actor(&request_headers);

    let updated = state.store.update(&actor, kind, &id, &candidate, token)?;

    tracing::info!(kind = %kind, id = %id, version = ?updated.version_id(), actor = %actor, "resource updated");
    Ok(resource_response(StatusCode::OK, &updated, None))
}

#[utoipa::path(
    delete,
    path = "/{resource_type}/{id}",
    params(
        ("resource_type" = String, Path, description = "Resource type"),
        ("id" = String, Path, description = "Logical id")
    ),
    responses(
        (status = 204, description = "Deleted; ETag carries the tombstone version"),
        (status = 404, description = "Unknown id"),
        (status = 410, description = "Already deleted")
    )
)]
/// Delete a resource
///
/// Earlier versions stay readable through `_history`.
#[axum::debug_handler]
pub async fn delete(
    State(state): State<AppState>,
    Path((resource_type, id)): Path<(String, String)>,
    request_headers: HeaderMap,
) -> RestResult<Response> {
    let kind = parse_kind(&resource_type)?;
    let actor = headers::actor(&request_headers);

    let version_id = state.store.delete(&actor, kind, &id)?;

    tracing::info!(kind = %kind, id = %id, version = version_id, actor = %actor, "resource deleted");
    let response_headers = VersionHeaders::new(Some(version_id), None).to_header_map();
    Ok((StatusCode::NO_CONTENT, response_headers).into_response())
}

#[utoipa::path(
    get,
    path = "/{resource_type}/{id}/_history",
    params(
        ("resource_type" = String, Path, description = "Resource type"),
        ("id" = String, Path, description = "Logical id")
    ),
    responses(
        (status = 200, description = "History bundle, newest first"),
        (status = 404, description = "Unknown id")
    )
)]
/// Version history of a resource
#[axum::debug_handler]
pub async fn history(
    State(state): State<AppState>,
    Path((resource_type, id)): Path<(String, String)>,
) -> RestResult<Response> {
    let kind = parse_kind(&resource_type)?;
    let versions = state.store.history(kind, &id)?;

    let mut bundle = Bundle::new(BundleType::History).with_total(versions.len());
    bundle.push_link(
        "self",
        format!("{}/_history", state.cfg.resource_url(kind.as_str(), &id)),
    );
    bundle.entry = versions
        .iter()
        .map(|version| history_entry(&state, version))
        .collect();

    Ok(fhir_json(StatusCode::OK, HeaderMap::new(), &bundle))
}

fn history_entry(state: &AppState, version: &VersionRecord) -> BundleEntry {
    let kind = version.resource_type.as_str();
    let full_url = state.cfg.resource_url(kind, version.id.as_str());
    let (request_url, status) = match version.operation {
        VersionOperation::Create => (kind.to_owned(), "201 Created"),
        VersionOperation::Update => (format!("{kind}/{}", version.id), "200 OK"),
        VersionOperation::Delete => (format!("{kind}/{}", version.id), "204 No Content"),
    };

    BundleEntry {
        full_url: Some(full_url),
        resource: version.resource.clone(),
        search: None,
        request: Some(BundleEntryRequest {
            method: version.operation.http_method().to_owned(),
            url: request_url,
        }),
        response: Some(BundleEntryResponse {
            status: status.to_owned(),
            etag: Some(version.etag()),
            last_modified: Some(version.last_updated),
        }),
    }
}

#[utoipa::path(
    get,
    path = "/{resource_type}",
    params(("resource_type" = String, Path, description = "Resource type")),
    responses(
        (status = 200, description = "Searchset bundle with total and paging links"),
        (status = 400, description = "Unsupported parameter or unresolvable value")
    )
)]
/// Search current resources of one type
///
/// Parameters combine with AND; comma-separated values within one parameter combine with OR.
/// `_count` and `_offset` page through the matches in id order.
#[axum::debug_handler]
pub async fn search(
    State(state): State<AppState>,
    Path(resource_type): Path<String>,
    RawQuery(raw_query): RawQuery,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> RestResult<Response> {
    let kind = parse_kind(&resource_type)?;
    let Query(params) = query.map_err(|e| RestError::MalformedQuery(e.body_text()))?;

    let page = state.store.search(kind, &params)?;

    let type_url = format!("{}/{}", state.cfg.base_url(), kind.as_str());
    let mut bundle = Bundle::new(BundleType::Searchset).with_total(page.total);
    match raw_query.as_deref().filter(|q| !q.is_empty()) {
        Some(q) => bundle.push_link("self", format!("{type_url}?{q}")),
        None => bundle.push_link("self", type_url.clone()),
    }
    if let Some(next_offset) = page.next_offset {
        bundle.push_link(
            "next",
            next_link(&type_url, raw_query.as_deref(), page.count, next_offset),
        );
    }
    bundle.entry = page
        .resources
        .into_iter()
        .map(|resource| {
            let id = resource.id().map(|id| id.to_string()).unwrap_or_default();
            BundleEntry::matched(state.cfg.resource_url(kind.as_str(), &id), resource)
        })
        .collect();

    tracing::debug!(kind = %kind, total = page.total, "search served");
    Ok(fhir_json(StatusCode::OK, HeaderMap::new(), &bundle))
}

/// Keep the caller's encoded parameters and replace the paging ones.
fn next_link(type_url: &str, raw_query: Option<&str>, count: usize, offset: usize) -> String {
    let mut pieces: Vec<String> = raw_query
        .unwrap_or_default()
        .split('&')
        .filter(|piece| !piece.is_empty())
        .filter(|piece| {
            let name = piece.split('=').next().unwrap_or_default();
            name != "_count" && name != "_offset"
        })
        .map(str::to_owned)
        .collect();
    pieces.push(format!("_count={count}"));
    pieces.push(format!("_offset={offset}"));
    format!("{type_url}?{}", pieces.join("&"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_link_replaces_paging_parameters() {
        assert_eq!(
            next_link(
                "http://h/Patient",
                Some("family=sm%20ith&_count=2&_offset=0"),
                2,
                2
            ),
            "http://h/Patient?family=sm%20ith&_count=2&_offset=2"
        );
        assert_eq!(
            next_link("http://h/Patient", None, 20, 20),
            "http://h/Patient?_count=20&_offset=20"
        );
    }

    #[test]
    fn unknown_types_are_rejected() {
        assert!(matches!(
            parse_kind("Encounter"),
            Err(RestError::UnknownResourceType(name)) if name == "Encounter"
        ));
        assert_eq!(parse_kind("Observation").unwrap(), ResourceKind::Observation);
    }
}
