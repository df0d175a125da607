//! FHIR R4 resource model and JSON wire handling for FRS.
//!
//! This crate provides:
//! - the typed [`Resource`] union over the supported [`ResourceKind`]s,
//! - strict JSON decoding that reports the path of the offending element,
//! - the shared datatypes (names, codes, references, dates),
//! - response resources used at the HTTP boundary ([`OperationOutcome`], [`Bundle`]).
//!
//! It knows nothing about storage, versioning policy or validation profiles; those live in
//! `frs-core`.

pub mod bundle;
pub mod datatypes;
pub mod kind;
pub mod observation;
pub mod outcome;
pub mod patient;
pub mod resource;

pub use bundle::{
    Bundle, BundleEntry, BundleEntryRequest, BundleEntryResponse, BundleLink, BundleType,
};
pub use datatypes::{
    AdministrativeGender, CodeableConcept, Coding, DateError, DateRange, FhirDate, FhirDateTime,
    HumanName, Identifier, Meta, NameUse, Quantity, Reference,
};
pub use kind::ResourceKind;
pub use observation::{Observation, ObservationStatus};
pub use outcome::{IssueSeverity, IssueType, OperationOutcome, OperationOutcomeIssue};
pub use patient::Patient;
pub use resource::Resource;

pub use frs_types::ResourceId;

/// Errors returned by the `fhir` wire crate.
#[derive(Debug, thiserror::Error)]
pub enum FhirError {
    #[error("resourceType is missing")]
    MissingResourceType,

    #[error("unknown resourceType '{0}'")]
    UnknownResourceType(String),

    /// The JSON did not match the wire schema. `path` locates the element
    /// (`<root>` when the document itself is wrong).
    #[error("schema mismatch at {path}: {message}")]
    Schema { path: String, message: String },

    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Type alias for Results that can fail with a [`FhirError`].
pub type FhirResult<T> = Result<T, FhirError>;
