//! Validation engine.
//!
//! Runs, in order:
//! 1. wire decoding (`resourceType` dispatch, element shapes, value sets, dates, id grammar),
//! 2. the kind's structural rules from the registry,
//! 3. every applicable profile.
//!
//! Validation never mutates the candidate or any store state, and the store runs the same
//! pipeline on create and update.

use fhir::Resource;
use serde_json::Value;

use crate::profile::ProfileSet;
use crate::registry;
use crate::ValidationError;

#[derive(Clone, Debug, Default)]
pub struct Validator {
    profiles: ProfileSet,
}

impl Validator {
    pub fn new(profiles: ProfileSet) -> Self {
        Self { profiles }
    }

    pub fn profiles(&self) -> &ProfileSet {
        &self.profiles
    }

    /// Check `candidate`, the JSON form of a resource.
    ///
    /// # Errors
    ///
    /// - `MissingField` if `resourceType` is absent or not a supported kind.
    /// - `SchemaViolation` (with the offending path) if any element has the wrong shape.
    /// - `ProfileViolation` if an applicable profile is not satisfied.
    pub fn validate(&self, candidate: &Value) -> Result<(), ValidationError> {
        self.check(candidate).map(|_| ())
    }

    /// Like [`Validator::validate`], returning the decoded resource on success.
    pub fn check(&self, candidate: &Value) -> Result<Resource, ValidationError> {
        let resource = Resource::from_value(candidate.clone())?;
        let kind = resource.kind();

        (registry::definition(kind).structural_rules)(&resource)?;
        self.profiles
            .check(kind, resource.claimed_profiles(), candidate)?;

        Ok(resource)
    }
}
