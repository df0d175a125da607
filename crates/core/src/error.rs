use std::path::PathBuf;

use fhir::{FhirError, ResourceKind};

/// Coarse classification of every failure the store can report.
///
/// The HTTP layer maps these to status codes; the CLI prints them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MissingField,
    SchemaViolation,
    ProfileViolation,
    InvalidState,
    NotFound,
    Gone,
    ConflictVersion,
    UnsupportedParameter,
    Backend,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorKind::MissingField => "MissingField",
            ErrorKind::SchemaViolation => "SchemaViolation",
            ErrorKind::ProfileViolation => "ProfileViolation",
            ErrorKind::InvalidState => "InvalidState",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Gone => "Gone",
            ErrorKind::ConflictVersion => "ConflictVersion",
            ErrorKind::UnsupportedParameter => "UnsupportedParameter",
            ErrorKind::Backend => "Backend",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures raised by the validation engine. Never has side effects.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("missing field {field}: {detail}")]
    MissingField { field: String, detail: String },

    #[error("schema violation at {path}: {message}")]
    SchemaViolation { path: String, message: String },

    #[error("profile {profile} not satisfied at {path}: {message}")]
    ProfileViolation {
        profile: String,
        path: String,
        message: String,
    },
}

impl ValidationError {
    pub fn schema(path: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationError::SchemaViolation {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ValidationError::MissingField { .. } => ErrorKind::MissingField,
            ValidationError::SchemaViolation { .. } => ErrorKind::SchemaViolation,
            ValidationError::ProfileViolation { .. } => ErrorKind::ProfileViolation,
        }
    }

    /// The element the error points at.
    pub fn path(&self) -> &str {
        match self {
            ValidationError::MissingField { field, .. } => field,
            ValidationError::SchemaViolation { path, .. } => path,
            ValidationError::ProfileViolation { path, .. } => path,
        }
    }
}

impl From<FhirError> for ValidationError {
    fn from(err: FhirError) -> Self {
        match err {
            FhirError::MissingResourceType => ValidationError::MissingField {
                field: "resourceType".into(),
                detail: "resourceType is required".into(),
            },
            FhirError::UnknownResourceType(name) => ValidationError::MissingField {
                field: "resourceType".into(),
                detail: format!("'{name}' is not a supported resource type"),
            },
            FhirError::Schema { path, message } => {
                ValidationError::SchemaViolation { path, message }
            }
            FhirError::InvalidJson(e) => ValidationError::schema("<root>", e.to_string()),
        }
    }
}

/// Failures of a version backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("failed to create storage directory {path}: {source}", path = path.display())]
    DirCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write version file {path}: {source}", path = path.display())]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read storage directory {path}: {source}", path = path.display())]
    DirRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("version file already exists: {path}", path = path.display())]
    VersionExists { path: PathBuf },
    #[error("failed to serialize version record: {0}")]
    Serialization(serde_json::Error),
    #[error("version history is inconsistent: {0}")]
    Inconsistent(String),
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Failures of the resource store. Every variant maps onto one [`ErrorKind`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("{kind}/{id} not found")]
    NotFound { kind: ResourceKind, id: String },

    #[error("{kind}/{id} has no version {version}")]
    VersionNotFound {
        kind: ResourceKind,
        id: String,
        version: u64,
    },

    #[error("{kind}/{id} has been deleted")]
    Gone { kind: ResourceKind, id: String },

    #[error(
        "version conflict on {kind}/{id}: current version is {current}, request expected {}",
        expected.map(|v| v.to_string()).unwrap_or_else(|| "none".into())
    )]
    ConflictVersion {
        kind: ResourceKind,
        id: String,
        expected: Option<u64>,
        current: u64,
    },

    #[error("unsupported search parameter '{name}' for {kind}")]
    UnsupportedParameter { kind: ResourceKind, name: String },

    #[error("failed to generate resource id: {0}")]
    IdGeneration(#[from] frs_types::IdError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Validation(e) => e.kind(),
            StoreError::InvalidState(_) => ErrorKind::InvalidState,
            StoreError::NotFound { .. } | StoreError::VersionNotFound { .. } => {
                ErrorKind::NotFound
            }
            StoreError::Gone { .. } => ErrorKind::Gone,
            StoreError::ConflictVersion { .. } => ErrorKind::ConflictVersion,
            StoreError::UnsupportedParameter { .. } => ErrorKind::UnsupportedParameter,
            StoreError::IdGeneration(_) | StoreError::Backend(_) => ErrorKind::Backend,
        }
    }

    /// The offending element, parameter or resource reference, when there is one.
    pub fn location(&self) -> Option<String> {
        match self {
            StoreError::Validation(e) => Some(e.path().to_owned()),
            StoreError::NotFound { kind, id }
            | StoreError::Gone { kind, id }
            | StoreError::ConflictVersion { kind, id, .. } => Some(format!("{kind}/{id}")),
            StoreError::VersionNotFound { kind, id, version } => {
                Some(format!("{kind}/{id}/_history/{version}"))
            }
            StoreError::UnsupportedParameter { name, .. } => Some(name.clone()),
            StoreError::InvalidState(_)
            | StoreError::IdGeneration(_)
            | StoreError::Backend(_) => None,
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Failures while resolving configuration at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    InvalidInput(String),
    #[error("failed to read profile file {path}: {source}", path = path.display())]
    ProfileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse profile YAML: {0}")]
    ProfileParse(#[from] serde_yaml::Error),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
