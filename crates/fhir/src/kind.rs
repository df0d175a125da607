//! The closed set of resource kinds this server understands.

use std::fmt;
use std::str::FromStr;

use crate::FhirError;

/// Discriminant of a [`Resource`](crate::Resource).
///
/// Adding a kind means adding a variant here, a struct for it, and a row in the core
/// kind registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Patient,
    Observation,
}

impl ResourceKind {
    /// Every supported kind, in registry order.
    pub const ALL: [ResourceKind; 2] = [ResourceKind::Patient, ResourceKind::Observation];

    /// The `resourceType` string used on the wire and in URLs.
    pub const fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Patient => "Patient",
            ResourceKind::Observation => "Observation",
        }
    }

    /// Position of this kind in [`ResourceKind::ALL`].
    pub const fn index(self) -> usize {
        match self {
            ResourceKind::Patient => 0,
            ResourceKind::Observation => 1,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = FhirError;

    /// Case-sensitive, as FHIR resource type names are.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| FhirError::UnknownResourceType(s.to_owned()))
    }
}

impl serde::Serialize for ResourceKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> serde::Deserialize<'de> for ResourceKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_kinds() {
        assert_eq!(
            "Patient".parse::<ResourceKind>().unwrap(),
            ResourceKind::Patient
        );
        assert_eq!(
            "Observation".parse::<ResourceKind>().unwrap(),
            ResourceKind::Observation
        );
    }

    #[test]
    fn index_matches_position_in_all() {
        for (i, kind) in ResourceKind::ALL.into_iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }

    #[test]
    fn rejects_unknown_and_wrong_case() {
        for bad in ["patient", "Encounter", ""] {
            match bad.parse::<ResourceKind>() {
                Err(FhirError::UnknownResourceType(name)) => assert_eq!(name, bad),
                other => panic!("expected UnknownResourceType, got {other:?}"),
            }
        }
    }
}
