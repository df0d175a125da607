//! HTTP error mapping.
//!
//! Every failure leaves the server as an `OperationOutcome`:
//!
//! | Error | Status | Issue code |
//! |-------|--------|------------|
//! | MissingField | 400 | required |
//! | SchemaViolation, malformed body | 400 | structure |
//! | ProfileViolation | 400 | invariant |
//! | InvalidState, bad `If-Match` | 400 | invalid |
//! | UnsupportedParameter, unknown type | 400 | not-supported |
//! | NotFound | 404 | not-found |
//! | ConflictVersion | 409 | conflict |
//! | Gone | 410 | deleted |
//! | missing/invalid API key | 401 | login |
//! | Backend | 500 | exception |
//!
//! The diagnostics start with the error kind; `expression` carries the offending element,
//! parameter or resource reference when there is one.

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use fhir::{IssueType, OperationOutcome};
use frs_core::{ErrorKind, StoreError};

use crate::headers::fhir_json;

#[derive(Debug, thiserror::Error)]
pub enum RestError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("unknown resource type '{0}'")]
    UnknownResourceType(String),

    #[error("request body is not valid JSON: {0}")]
    MalformedBody(String),

    #[error("invalid query string: {0}")]
    MalformedQuery(String),

    #[error("invalid If-Match header '{0}'")]
    InvalidIfMatch(String),

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type RestResult<T> = std::result::Result<T, RestError>;

impl RestError {
    fn status_and_code(&self) -> (StatusCode, IssueType) {
        match self {
            RestError::Store(e) => match e.kind() {
                ErrorKind::MissingField => (StatusCode::BAD_REQUEST, IssueType::Required),
                ErrorKind::SchemaViolation => (StatusCode::BAD_REQUEST, IssueType::Structure),
                ErrorKind::ProfileViolation => (StatusCode::BAD_REQUEST, IssueType::Invariant),
                ErrorKind::InvalidState => (StatusCode::BAD_REQUEST, IssueType::Invalid),
                ErrorKind::UnsupportedParameter => {
                    (StatusCode::BAD_REQUEST, IssueType::NotSupported)
                }
                ErrorKind::NotFound => (StatusCode::NOT_FOUND, IssueType::NotFound),
                ErrorKind::Gone => (StatusCode::GONE, IssueType::Deleted),
                ErrorKind::ConflictVersion => (StatusCode::CONFLICT, IssueType::Conflict),
                ErrorKind::Backend => (StatusCode::INTERNAL_SERVER_ERROR, IssueType::Exception),
            },
            RestError::UnknownResourceType(_) => (StatusCode::BAD_REQUEST, IssueType::NotSupported),
            RestError::MalformedBody(_) | RestError::MalformedQuery(_) => {
                (StatusCode::BAD_REQUEST, IssueType::Structure)
            }
            RestError::InvalidIfMatch(_) => (StatusCode::BAD_REQUEST, IssueType::Invalid),
            RestError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, IssueType::Login),
            RestError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, IssueType::Exception),
        }
    }

    /// Name of the error kind, as reported in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            RestError::Store(e) => e.kind().as_str(),
            RestError::UnknownResourceType(_) => "UnsupportedResourceType",
            RestError::MalformedBody(_) | RestError::MalformedQuery(_) => "SchemaViolation",
            RestError::InvalidIfMatch(_) => "InvalidState",
            RestError::Unauthorized(_) => "Unauthorized",
            RestError::Internal(_) => "Internal",
        }
    }

    pub fn to_outcome(&self) -> OperationOutcome {
        let (_, code) = self.status_and_code();
        let outcome = OperationOutcome::error(code, format!("{}: {}", self.kind_name(), self));
        match self {
            RestError::Store(e) => match e.location() {
                Some(location) => outcome.with_expression(location),
                None => outcome,
            },
            RestError::UnknownResourceType(name) => outcome.with_expression(name.clone()),
            _ => outcome,
        }
    }
}

impl IntoResponse for RestError {
    fn into_response(self) -> Response {
        let (status, _) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "request rejected");
        }
        fhir_json(status, HeaderMap::new(), &self.to_outcome())
    }
}
