//! Profiles: user-supplied constraints that narrow a base resource kind.
//!
//! A profile file is YAML:
//!
//! ```yaml
//! profiles:
//!   - url: https://example.org/fhir/StructureDefinition/registered-patient
//!     resource: Patient
//!     mandatory: true
//!     required:
//!       - name.family
//!       - birthDate
//! ```
//!
//! A mandatory profile applies to every resource of its kind. Otherwise it applies only when
//! the resource lists its `url` in `meta.profile`. Claimed URLs that match no loaded profile
//! are kept on the resource but not enforced.
//!
//! Required paths are dotted element names. A path segment that lands on an array requires
//! the array to be non-empty and every entry to satisfy the rest of the path, so `name.family`
//! means "at least one name, and every name has a family".

use std::path::Path;

use fhir::ResourceKind;
use serde::Deserialize;
use serde_json::Value;

use crate::{ConfigError, ConfigResult, ValidationError};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProfileFile {
    #[serde(default)]
    profiles: Vec<ProfileEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProfileEntry {
    url: String,
    resource: String,
    #[serde(default)]
    mandatory: bool,
    #[serde(default)]
    required: Vec<String>,
}

/// One loaded profile.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Profile {
    url: String,
    kind: ResourceKind,
    mandatory: bool,
    required: Vec<String>,
}

impl Profile {
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidInput`] for an empty URL or an empty path segment.
    pub fn new(
        url: impl Into<String>,
        kind: ResourceKind,
        mandatory: bool,
        required: Vec<String>,
    ) -> ConfigResult<Self> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(ConfigError::InvalidInput("profile url cannot be empty".into()));
        }
        if let Some(bad) = required
            .iter()
            .find(|path| path.split('.').any(|seg| seg.trim().is_empty()))
        {
            return Err(ConfigError::InvalidInput(format!(
                "profile {url} has an invalid required path '{bad}'"
            )));
        }
        Ok(Self {
            url,
            kind,
            mandatory,
            required,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn mandatory(&self) -> bool {
        self.mandatory
    }

    pub fn required(&self) -> &[String] {
        &self.required
    }

    fn applies_to(&self, kind: ResourceKind, claimed: &[String]) -> bool {
        self.kind == kind && (self.mandatory || claimed.iter().any(|url| *url == self.url))
    }

    fn check(&self, candidate: &Value) -> Result<(), ValidationError> {
        for path in &self.required {
            let segments: Vec<&str> = path.split('.').collect();
            if !satisfied(candidate, &segments) {
                return Err(ValidationError::ProfileViolation {
                    profile: self.url.clone(),
                    path: path.clone(),
                    message: "required element is missing".into(),
                });
            }
        }
        Ok(())
    }
}

fn satisfied(value: &Value, segments: &[&str]) -> bool {
    match value {
        Value::Null => false,
        Value::Array(items) => !items.is_empty() && items.iter().all(|i| satisfied(i, segments)),
        Value::String(s) if segments.is_empty() => !s.trim().is_empty(),
        _ if segments.is_empty() => true,
        Value::Object(map) => map
            .get(segments[0])
            .is_some_and(|child| satisfied(child, &segments[1..])),
        _ => false,
    }
}

/// The profiles known to the validator.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProfileSet {
    profiles: Vec<Profile>,
}

impl ProfileSet {
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidInput`] if two profiles share a URL.
    pub fn new(profiles: Vec<Profile>) -> ConfigResult<Self> {
        for (i, profile) in profiles.iter().enumerate() {
            if profiles[..i].iter().any(|p| p.url == profile.url) {
                return Err(ConfigError::InvalidInput(format!(
                    "duplicate profile url {}",
                    profile.url
                )));
            }
        }
        Ok(Self { profiles })
    }

    pub fn from_yaml_str(text: &str) -> ConfigResult<Self> {
        let file: ProfileFile = serde_yaml::from_str(text)?;
        let profiles = file
            .profiles
            .into_iter()
            .map(|entry| {
                let kind = entry.resource.parse::<ResourceKind>().map_err(|_| {
                    ConfigError::InvalidInput(format!(
                        "profile {} targets unsupported resource '{}'",
                        entry.url, entry.resource
                    ))
                })?;
                Profile::new(entry.url, kind, entry.mandatory, entry.required)
            })
            .collect::<ConfigResult<Vec<_>>>()?;
        Self::new(profiles)
    }

    pub fn from_yaml_file(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ProfileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let set = Self::from_yaml_str(&text)?;
        tracing::info!(path = %path.display(), count = set.len(), "loaded profiles");
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Profile> {
        self.profiles.iter()
    }

    /// Check `candidate` (the JSON form of a resource of `kind`) against every applicable
    /// profile. Stops at the first unmet constraint.
    pub fn check(
        &self,
        kind: ResourceKind,
        claimed: &[String],
        candidate: &Value,
    ) -> Result<(), ValidationError> {
        self.profiles
            .iter()
            .filter(|p| p.applies_to(kind, claimed))
            .try_for_each(|p| p.check(candidate))
    }
}
