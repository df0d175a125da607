//! FHIR Patient resource.
//!
//! Notes:
//! - `id` and `meta.versionId` / `meta.lastUpdated` are assigned by the store, never trusted
//!   from a create request.
//! - Cardinality rules that serde cannot express (a name must carry a family or a given
//!   name) are enforced by the core validation engine, not here.

use serde::{Deserialize, Serialize};

use crate::datatypes::{AdministrativeGender, FhirDate, HumanName, Identifier, Meta};
use crate::ResourceId;

/// Demographics and administrative information about a person receiving care.
///
/// The JSON form is strict: unknown members fail decoding with their path.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Patient {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ResourceId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identifier: Vec<Identifier>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub name: Vec<HumanName>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<AdministrativeGender>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<FhirDate>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::NameUse;

    #[test]
    fn decodes_full_patient() {
        let json = r#"{
            "id": "90a8d1ea318041d9adb070a834d4e0f6",
            "identifier": [{"system": "https://fhir.nhs.uk/Id/nhs-number", "value": "9434765919"}],
            "active": true,
            "name": [{"use": "official", "family": "Williams", "given": ["Sarah", "Jane"]}],
            "gender": "female",
            "birthDate": "1992-03-20",
            "meta": {"lastUpdated": "2026-01-23T13:58:04.099304Z", "versionId": "3"}
        }"#;

        let patient: Patient = serde_json::from_str(json).expect("decode patient");
        assert_eq!(
            patient.id.as_ref().map(ResourceId::as_str),
            Some("90a8d1ea318041d9adb070a834d4e0f6")
        );
        assert_eq!(patient.name[0].use_type, Some(NameUse::Official));
        assert_eq!(patient.name[0].given, vec!["Sarah", "Jane"]);
        assert_eq!(patient.gender, Some(AdministrativeGender::Female));
        assert_eq!(
            patient.birth_date.map(|d| d.to_string()).as_deref(),
            Some("1992-03-20")
        );
        assert_eq!(
            patient.meta.and_then(|m| m.version_id).as_deref(),
            Some("3")
        );
    }

    #[test]
    fn encodes_only_present_fields() {
        let patient = Patient {
            name: vec![HumanName {
                family: Some("Smith".into()),
                ..Default::default()
            }],
            ..Default::default()
        };

        let value = serde_json::to_value(&patient).expect("encode");
        assert_eq!(value, serde_json::json!({"name": [{"family": "Smith"}]}));
    }

    #[test]
    fn rejects_unknown_members() {
        let err = serde_json::from_str::<Patient>(r#"{"nickname": "Sal"}"#)
            .expect_err("unknown member should fail");
        assert!(err.to_string().contains("nickname"));
    }

    #[test]
    fn rejects_wrong_types() {
        let err = serde_json::from_str::<Patient>(r#"{"name": [{"given": "Sarah"}]}"#)
            .expect_err("given must be an array");
        assert!(err.to_string().contains("invalid type"));
    }
}
