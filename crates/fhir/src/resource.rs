//! The typed resource union and its JSON wire form.
//!
//! Decoding is dispatched on `resourceType` by hand rather than with an internally tagged
//! serde enum: tagged enums buffer their content and lose the element path, and the path is
//! what callers report back in a `SchemaViolation`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::datatypes::Meta;
use crate::{FhirError, FhirResult, Observation, Patient, ResourceId, ResourceKind};

/// One FHIR resource of any supported kind.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "resourceType")]
pub enum Resource {
    Patient(Patient),
    Observation(Observation),
}

impl Resource {
    /// Decode a resource from a JSON value.
    ///
    /// # Errors
    ///
    /// - [`FhirError::MissingResourceType`] if `resourceType` is absent.
    /// - [`FhirError::UnknownResourceType`] if it names an unsupported kind.
    /// - [`FhirError::Schema`] if the document is not an object, `resourceType` is not a
    ///   string, or the body does not match the kind's wire schema.
    pub fn from_value(value: Value) -> FhirResult<Self> {
        let Value::Object(mut object) = value else {
            return Err(FhirError::Schema {
                path: "<root>".into(),
                message: "a resource must be a JSON object".into(),
            });
        };

        let kind = match object.remove("resourceType") {
            None => return Err(FhirError::MissingResourceType),
            Some(Value::String(name)) => name.parse::<ResourceKind>()?,
            Some(_) => {
                return Err(FhirError::Schema {
                    path: "resourceType".into(),
                    message: "resourceType must be a string".into(),
                })
            }
        };

        let body = Value::Object(object);
        match kind {
            ResourceKind::Patient => decode(body).map(Resource::Patient),
            ResourceKind::Observation => decode(body).map(Resource::Observation),
        }
    }

    /// Decode a resource from JSON text.
    pub fn from_json(text: &str) -> FhirResult<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    pub fn to_value(&self) -> FhirResult<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn to_json(&self) -> FhirResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> FhirResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::Patient(_) => ResourceKind::Patient,
            Resource::Observation(_) => ResourceKind::Observation,
        }
    }

    pub fn id(&self) -> Option<&ResourceId> {
        match self {
            Resource::Patient(p) => p.id.as_ref(),
            Resource::Observation(o) => o.id.as_ref(),
        }
    }

    pub fn set_id(&mut self, id: Option<ResourceId>) {
        match self {
            Resource::Patient(p) => p.id = id,
            Resource::Observation(o) => o.id = id,
        }
    }

    pub fn meta(&self) -> Option<&Meta> {
        match self {
            Resource::Patient(p) => p.meta.as_ref(),
            Resource::Observation(o) => o.meta.as_ref(),
        }
    }

    /// Mutable access to `meta`, creating an empty one if needed.
    pub fn meta_mut(&mut self) -> &mut Meta {
        let slot = match self {
            Resource::Patient(p) => &mut p.meta,
            Resource::Observation(o) => &mut o.meta,
        };
        slot.get_or_insert_with(Meta::default)
    }

    /// Profile URLs claimed in `meta.profile`.
    pub fn claimed_profiles(&self) -> &[String] {
        self.meta().map(|m| m.profile.as_slice()).unwrap_or(&[])
    }

    /// `meta.versionId` as a number, if present and numeric.
    pub fn version_id(&self) -> Option<u64> {
        self.meta()?.version_id.as_deref()?.parse().ok()
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.meta()?.last_updated
    }

    /// Stamp the server-owned meta fields.
    pub fn stamp(&mut self, id: ResourceId, version_id: u64, last_updated: DateTime<Utc>) {
        self.set_id(Some(id));
        let meta = self.meta_mut();
        meta.version_id = Some(version_id.to_string());
        meta.last_updated = Some(last_updated);
    }
}

impl<'de> Deserialize<'de> for Resource {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Resource::from_value(value).map_err(serde::de::Error::custom)
    }
}

impl From<Patient> for Resource {
    fn from(patient: Patient) -> Self {
        Resource::Patient(patient)
    }
}

impl From<Observation> for Resource {
    fn from(observation: Observation) -> Self {
        Resource::Observation(observation)
    }
}

fn decode<T>(body: Value) -> FhirResult<T>
where
    T: for<'de> Deserialize<'de>,
{
    serde_path_to_error::deserialize(body).map_err(|err| {
        let path = err.path().to_string();
        let path = if path.is_empty() || path == "." {
            "<root>".to_owned()
        } else {
            path
        };
        FhirError::Schema {
            path,
            message: err.into_inner().to_string(),
        }
    })
}
