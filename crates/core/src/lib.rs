//! # FRS Core
//!
//! Storage and validation engine for the FHIR resource server.
//!
//! This crate owns everything that does not depend on a transport:
//! - the kind registry (structural rules and search parameters per resource kind)
//! - validation against the wire model, the registry and loaded profiles
//! - the versioned resource store with optimistic concurrency
//! - search resolution and matching
//! - version backends (in memory, or sharded JSON files under `FRS_DATA_DIR`)
//!
//! **No API concerns**: HTTP routing, headers and OperationOutcome rendering belong in
//! `api-rest`; argument parsing belongs in `cli`.

pub mod audit;
pub mod backend;
pub mod config;
pub mod constants;
pub mod error;
pub mod history;
pub mod ids;
pub mod profile;
pub mod registry;
pub mod search;
pub mod store;
pub mod validation;

pub use audit::{Actor, AuditEvent, AuditSink, RecordingAuditSink, TracingAuditSink};
pub use backend::{FileBackend, MemoryBackend, VersionBackend};
pub use config::StoreConfig;
pub use error::{
    BackendError, BackendResult, ConfigError, ConfigResult, ErrorKind, StoreError, StoreResult,
    ValidationError,
};
pub use history::{VersionOperation, VersionRecord};
pub use ids::{IdGenerator, SequentialIds, UuidIds};
pub use profile::{Profile, ProfileSet};
pub use search::SearchPage;
pub use store::ResourceStore;
pub use validation::Validator;
