use std::sync::Arc;

use api_rest::{router, AppState, RestConfig};
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use frs_core::{
    MemoryBackend, RecordingAuditSink, ResourceStore, SequentialIds, StoreConfig, Validator,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

const BASE: &str = "http://fhir.test";

fn app_with(api_key: Option<&str>) -> Router {
    let store = ResourceStore::new(
        Arc::new(StoreConfig::default()),
        Validator::default(),
        Arc::new(MemoryBackend::new()),
        Arc::new(SequentialIds::new("p")),
        Arc::new(RecordingAuditSink::new()),
    )
    .unwrap();
    router(AppState::new(
        RestConfig::new(BASE, api_key.map(str::to_owned)),
        Arc::new(store),
    ))
}

fn app() -> Router {
    app_with(None)
}

struct Reply {
    status: StatusCode,
    headers: axum::http::HeaderMap,
    body: Value,
}

async fn send(app: &Router, request: Request<Body>) -> Reply {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    Reply {
        status,
        headers,
        body,
    }
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn with_body(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/fhir+json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn jane_smith() -> Value {
    json!({
        "resourceType": "Patient",
        "name": [{"family": "Smith", "given": ["Jane"]}],
        "gender": "female"
    })
}

#[tokio::test]
async fn create_sets_location_and_version_headers() {
    let app = app();
    let reply = send(&app, with_body("POST", "/Patient", &jane_smith())).await;

    assert_eq!(reply.status, StatusCode::CREATED);
    assert_eq!(reply.headers[header::ETAG], "W/\"1\"");
    assert_eq!(
        reply.headers[header::LOCATION],
        "http://fhir.test/Patient/p1/_history/1"
    );
    assert!(reply.headers.contains_key(header::LAST_MODIFIED));
    assert_eq!(
        reply.headers[header::CONTENT_TYPE],
        "application/fhir+json"
    );
    assert_eq!(reply.body["id"], "p1");
    assert_eq!(reply.body["meta"]["versionId"], "1");
}

#[tokio::test]
async fn full_lifecycle_over_http() {
    let app = app();
    send(&app, with_body("POST", "/Patient", &jane_smith())).await;

    let mut changed = jane_smith();
    changed["gender"] = json!("other");
    let mut update = with_body("PUT", "/Patient/p1", &changed);
    update
        .headers_mut()
        .insert(header::IF_MATCH, "W/\"1\"".parse().unwrap());
    let reply = send(&app, update).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.headers[header::ETAG], "W/\"2\"");

    let reply = send(&app, get("/Patient/p1")).await;
    assert_eq!(reply.body["gender"], "other");

    let delete = Request::delete("/Patient/p1").body(Body::empty()).unwrap();
    let reply = send(&app, delete).await;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);
    assert_eq!(reply.headers[header::ETAG], "W/\"3\"");

    let reply = send(&app, get("/Patient/p1")).await;
    assert_eq!(reply.status, StatusCode::GONE);
    assert_eq!(reply.body["resourceType"], "OperationOutcome");
    assert_eq!(reply.body["issue"][0]["code"], "deleted");

    let reply = send(&app, get("/Patient/p1/_history/1")).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["gender"], "female");

    let reply = send(&app, get("/Patient/p1/_history")).await;
    assert_eq!(reply.body["type"], "history");
    assert_eq!(reply.body["total"], 3);
    let methods: Vec<&str> = reply.body["entry"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["request"]["method"].as_str())
        .collect();
    assert_eq!(methods, vec!["DELETE", "PUT", "POST"]);
    assert!(reply.body["entry"][0].get("resource").is_none());
}

#[tokio::test]
async fn stale_or_missing_if_match_conflicts() {
    let app = app();
    send(&app, with_body("POST", "/Patient", &jane_smith())).await;

    let reply = send(&app, with_body("PUT", "/Patient/p1", &jane_smith())).await;
    assert_eq!(reply.status, StatusCode::CONFLICT);
    assert_eq!(reply.body["issue"][0]["code"], "conflict");

    let mut stale = with_body("PUT", "/Patient/p1", &jane_smith());
    stale
        .headers_mut()
        .insert(header::IF_MATCH, "W/\"7\"".parse().unwrap());
    assert_eq!(send(&app, stale).await.status, StatusCode::CONFLICT);

    let mut garbled = with_body("PUT", "/Patient/p1", &jane_smith());
    garbled
        .headers_mut()
        .insert(header::IF_MATCH, "yesterday".parse().unwrap());
    assert_eq!(send(&app, garbled).await.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn validation_failures_are_operation_outcomes() {
    let app = app();

    let reply = send(
        &app,
        with_body(
            "POST",
            "/Patient",
            &json!({"resourceType": "Patient", "gender": "F"}),
        ),
    )
    .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["issue"][0]["code"], "structure");
    assert_eq!(reply.body["issue"][0]["expression"][0], "gender");
    assert!(reply.body["issue"][0]["diagnostics"]
        .as_str()
        .unwrap()
        .starts_with("SchemaViolation"));

    let reply = send(&app, with_body("POST", "/Patient", &json!({"gender": "female"}))).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["issue"][0]["code"], "required");

    let malformed = Request::post("/Patient")
        .body(Body::from("{not json"))
        .unwrap();
    let reply = send(&app, malformed).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["resourceType"], "OperationOutcome");

    let mut with_id = jane_smith();
    with_id["id"] = json!("chosen");
    let reply = send(&app, with_body("POST", "/Patient", &with_id)).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["issue"][0]["code"], "invalid");
}

#[tokio::test]
async fn unknown_types_and_ids() {
    let app = app();
    let reply = send(&app, get("/Encounter/e1")).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["issue"][0]["code"], "not-supported");

    let reply = send(&app, get("/Patient/nobody")).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.body["issue"][0]["expression"][0], "Patient/nobody");

    send(&app, with_body("POST", "/Patient", &jane_smith())).await;
    let reply = send(&app, get("/Patient/p1/_history/9")).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn search_returns_a_paged_searchset() {
    let app = app();
    for family in ["Smith", "Smithers", "Jones"] {
        let body = json!({"resourceType": "Patient", "name": [{"family": family}]});
        send(&app, with_body("POST", "/Patient", &body)).await;
    }

    let reply = send(&app, get("/Patient?family=smith&_count=1")).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["type"], "searchset");
    assert_eq!(reply.body["total"], 2);
    assert_eq!(reply.body["entry"].as_array().unwrap().len(), 1);
    assert_eq!(
        reply.body["entry"][0]["fullUrl"],
        "http://fhir.test/Patient/p1"
    );
    assert_eq!(reply.body["entry"][0]["search"]["mode"], "match");

    let links: Vec<(String, String)> = reply.body["link"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| {
            (
                l["relation"].as_str().unwrap().to_owned(),
                l["url"].as_str().unwrap().to_owned(),
            )
        })
        .collect();
    assert_eq!(
        links,
        vec![
            (
                "self".to_owned(),
                "http://fhir.test/Patient?family=smith&_count=1".to_owned()
            ),
            (
                "next".to_owned(),
                "http://fhir.test/Patient?family=smith&_count=1&_offset=1".to_owned()
            ),
        ]
    );

    let reply = send(&app, get("/Patient?gender=unknown-value")).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let reply = send(&app, get("/Patient?_sort=family")).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["issue"][0]["code"], "not-supported");
}

#[tokio::test]
async fn api_key_guards_resource_routes_only() {
    let app = app_with(Some("s3cret"));

    let reply = send(&app, get("/Patient/p1")).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["issue"][0]["code"], "login");

    let wrong = Request::get("/Patient/p1")
        .header("x-api-key", "guess")
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&app, wrong).await.status, StatusCode::UNAUTHORIZED);

    let right = Request::get("/Patient/p1")
        .header("x-api-key", "s3cret")
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&app, right).await.status, StatusCode::NOT_FOUND);

    assert_eq!(send(&app, get("/health")).await.status, StatusCode::OK);
    assert_eq!(send(&app, get("/metadata")).await.status, StatusCode::OK);
}

#[tokio::test]
async fn history_entries_carry_response_details() {
    let app = app();
    let create = Request::post("/Patient")
        .header("x-actor", "dr-who")
        .body(Body::from(jane_smith().to_string()))
        .unwrap();
    assert_eq!(send(&app, create).await.status, StatusCode::CREATED);

    let reply = send(&app, get("/Patient/p1/_history")).await;
    assert_eq!(reply.body["entry"][0]["response"]["status"], "201 Created");
    assert_eq!(reply.body["entry"][0]["response"]["etag"], "W/\"1\"");
}

#[tokio::test]
async fn service_routes() {
    let app = app();

    let reply = send(&app, get("/health")).await;
    assert_eq!(reply.body["ok"], true);

    let reply = send(&app, get("/metadata")).await;
    assert_eq!(reply.body["resourceType"], "CapabilityStatement");
    assert_eq!(reply.body["fhirVersion"], "4.0.1");

    let reply = send(&app, get("/api-docs/openapi.json")).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body["paths"].get("/{resource_type}/{id}").is_some());
}
