//! Per-kind behaviour, as data.
//!
//! The store and the validator are generic over [`ResourceKind`]; everything that differs
//! between kinds (structural rules that serde cannot express, search parameters and the
//! fields they index) is looked up in [`REGISTRY`]. Adding a kind means adding a row here.

use fhir::{
    AdministrativeGender, DateRange, Observation, ObservationStatus, Patient, Resource,
    ResourceKind,
};

use crate::ValidationError;

/// Value type of a search parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamType {
    String,
    Token,
    Date,
    Reference,
}

impl ParamType {
    pub const fn as_str(self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Token => "token",
            ParamType::Date => "date",
            ParamType::Reference => "reference",
        }
    }
}

/// A value extracted from a resource for one search parameter.
#[derive(Clone, Debug, PartialEq)]
pub enum IndexValue {
    Text(String),
    Token {
        system: Option<String>,
        code: String,
    },
    Date(DateRange),
    Reference {
        kind: Option<String>,
        id: String,
    },
}

/// A search parameter supported by one kind.
pub struct SearchParamDef {
    pub name: &'static str,
    pub param_type: ParamType,
    /// Closed value set of a token parameter. Values outside it are a schema violation.
    pub domain: Option<&'static [&'static str]>,
    /// Restricts a reference parameter to one target kind.
    pub target: Option<ResourceKind>,
    pub description: &'static str,
    pub extract: fn(&Resource) -> Vec<IndexValue>,
}

/// Everything the store needs to know about one resource kind.
pub struct KindDefinition {
    pub kind: ResourceKind,
    /// Cardinality and shape rules checked after decoding.
    pub structural_rules: fn(&Resource) -> Result<(), ValidationError>,
    pub search_params: &'static [SearchParamDef],
}

impl std::fmt::Debug for SearchParamDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchParamDef")
            .field("name", &self.name)
            .field("param_type", &self.param_type)
            .field("domain", &self.domain)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for KindDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KindDefinition")
            .field("kind", &self.kind)
            .field("search_params", &self.search_params)
            .finish_non_exhaustive()
    }
}

impl KindDefinition {
    pub fn search_param(&self, name: &str) -> Option<&'static SearchParamDef> {
        self.search_params.iter().find(|p| p.name == name)
    }
}

/// Look up the definition of `kind`.
pub fn definition(kind: ResourceKind) -> &'static KindDefinition {
    &REGISTRY[kind.index()]
}

pub const GENDER_SYSTEM: &str = "http://hl7.org/fhir/administrative-gender";
pub const OBSERVATION_STATUS_SYSTEM: &str = "http://hl7.org/fhir/observation-status";

const GENDER_DOMAIN: &[&str] = &["male", "female", "other", "unknown"];
const BOOLEAN_DOMAIN: &[&str] = &["true", "false"];
const OBSERVATION_STATUS_DOMAIN: &[&str] = &[
    "registered",
    "preliminary",
    "final",
    "amended",
    "corrected",
    "cancelled",
    "entered-in-error",
    "unknown",
];

/// Registry rows, in [`ResourceKind::ALL`] order.
pub static REGISTRY: [KindDefinition; 2] = [
    KindDefinition {
        kind: ResourceKind::Patient,
        structural_rules: patient_rules,
        search_params: &[
            SearchParamDef {
                name: "_id",
                param_type: ParamType::Token,
                domain: None,
                target: None,
                description: "Logical id of the resource",
                extract: resource_id,
            },
            SearchParamDef {
                name: "name",
                param_type: ParamType::String,
                domain: None,
                target: None,
                description: "Any part of a name: family, given or text",
                extract: patient_name,
            },
            SearchParamDef {
                name: "family",
                param_type: ParamType::String,
                domain: None,
                target: None,
                description: "Family name",
                extract: patient_family,
            },
            SearchParamDef {
                name: "given",
                param_type: ParamType::String,
                domain: None,
                target: None,
                description: "Given name",
                extract: patient_given,
            },
            SearchParamDef {
                name: "gender",
                param_type: ParamType::Token,
                domain: Some(GENDER_DOMAIN),
                target: None,
                description: "Administrative gender",
                extract: patient_gender,
            },
            SearchParamDef {
                name: "birthdate",
                param_type: ParamType::Date,
                domain: None,
                target: None,
                description: "Date of birth",
                extract: patient_birthdate,
            },
            SearchParamDef {
                name: "active",
                param_type: ParamType::Token,
                domain: Some(BOOLEAN_DOMAIN),
                target: None,
                description: "Whether the record is in active use",
                extract: patient_active,
            },
            SearchParamDef {
                name: "identifier",
                param_type: ParamType::Token,
                domain: None,
                target: None,
                description: "Business identifier (system|value)",
                extract: patient_identifier,
            },
        ],
    },
    KindDefinition {
        kind: ResourceKind::Observation,
        structural_rules: observation_rules,
        search_params: &[
            SearchParamDef {
                name: "_id",
                param_type: ParamType::Token,
                domain: None,
                target: None,
                description: "Logical id of the resource",
                extract: resource_id,
            },
            SearchParamDef {
                name: "status",
                param_type: ParamType::Token,
                domain: Some(OBSERVATION_STATUS_DOMAIN),
                target: None,
                description: "Status of the observation",
                extract: observation_status,
            },
            SearchParamDef {
                name: "code",
                param_type: ParamType::Token,
                domain: None,
                target: None,
                description: "Code of the observation (system|code)",
                extract: observation_code,
            },
            SearchParamDef {
                name: "subject",
                param_type: ParamType::Reference,
                domain: None,
                target: None,
                description: "Who the observation is about",
                extract: observation_subject,
            },
            SearchParamDef {
                name: "patient",
                param_type: ParamType::Reference,
                domain: None,
                target: Some(ResourceKind::Patient),
                description: "The patient the observation is about",
                extract: observation_subject,
            },
            SearchParamDef {
                name: "date",
                param_type: ParamType::Date,
                domain: None,
                target: None,
                description: "Clinically relevant time of the observation",
                extract: observation_date,
            },
        ],
    },
];

// ============================================================================
// Structural rules
// ============================================================================

fn patient_rules(resource: &Resource) -> Result<(), ValidationError> {
    let Resource::Patient(patient) = resource else {
        return Ok(());
    };

    for (i, name) in patient.name.iter().enumerate() {
        let has_family = name.family.as_deref().is_some_and(|f| !f.trim().is_empty());
        let has_given = name.given.iter().any(|g| !g.trim().is_empty());
        if !has_family && !has_given {
            return Err(ValidationError::schema(
                format!("name[{i}]"),
                "a name must have a family name or at least one given name",
            ));
        }
    }

    for (i, identifier) in patient.identifier.iter().enumerate() {
        if identifier.value.as_deref().map_or(true, |v| v.trim().is_empty()) {
            return Err(ValidationError::schema(
                format!("identifier[{i}].value"),
                "an identifier must have a value",
            ));
        }
    }

    Ok(())
}

fn observation_rules(resource: &Resource) -> Result<(), ValidationError> {
    let Resource::Observation(obs) = resource else {
        return Ok(());
    };

    if obs.value_quantity.is_some() && obs.value_string.is_some() {
        return Err(ValidationError::schema(
            "value[x]",
            "only one of valueQuantity and valueString may be present",
        ));
    }

    if obs.code.coding.is_empty() && obs.code.text.is_none() {
        return Err(ValidationError::schema(
            "code",
            "code must have at least one coding or a text",
        ));
    }

    for (i, coding) in obs.code.coding.iter().enumerate() {
        if coding.code.is_none() && coding.display.is_none() {
            return Err(ValidationError::schema(
                format!("code.coding[{i}]"),
                "a coding must have a code or a display",
            ));
        }
    }

    if let Some(subject) = &obs.subject {
        if subject.type_and_id().is_none() {
            return Err(ValidationError::schema(
                "subject.reference",
                "reference must have the form Type/id",
            ));
        }
    }

    Ok(())
}

// ============================================================================
// Index extraction
// ============================================================================

fn as_patient(resource: &Resource) -> Option<&Patient> {
    match resource {
        Resource::Patient(p) => Some(p),
        _ => None,
    }
}

fn as_observation(resource: &Resource) -> Option<&Observation> {
    match resource {
        Resource::Observation(o) => Some(o),
        _ => None,
    }
}

fn resource_id(resource: &Resource) -> Vec<IndexValue> {
    resource
        .id()
        .map(|id| IndexValue::Token {
            system: None,
            code: id.to_string(),
        })
        .into_iter()
        .collect()
}

fn patient_name(resource: &Resource) -> Vec<IndexValue> {
    let Some(patient) = as_patient(resource) else {
        return Vec::new();
    };
    patient
        .name
        .iter()
        .flat_map(|name| {
            name.family
                .iter()
                .chain(name.given.iter())
                .chain(name.text.iter())
                .map(|s| IndexValue::Text(s.clone()))
        })
        .collect()
}

fn patient_family(resource: &Resource) -> Vec<IndexValue> {
    as_patient(resource)
        .map(|p| {
            p.name
                .iter()
                .filter_map(|n| n.family.clone())
                .map(IndexValue::Text)
                .collect()
        })
        .unwrap_or_default()
}

fn patient_given(resource: &Resource) -> Vec<IndexValue> {
    as_patient(resource)
        .map(|p| {
            p.name
                .iter()
                .flat_map(|n| n.given.iter().cloned())
                .map(IndexValue::Text)
                .collect()
        })
        .unwrap_or_default()
}

fn patient_gender(resource: &Resource) -> Vec<IndexValue> {
    as_patient(resource)
        .and_then(|p| p.gender)
        .map(|g: AdministrativeGender| IndexValue::Token {
            system: Some(GENDER_SYSTEM.into()),
            code: g.as_str().into(),
        })
        .into_iter()
        .collect()
}

fn patient_birthdate(resource: &Resource) -> Vec<IndexValue> {
    as_patient(resource)
        .and_then(|p| p.birth_date)
        .map(|d| IndexValue::Date(d.range()))
        .into_iter()
        .collect()
}

fn patient_active(resource: &Resource) -> Vec<IndexValue> {
    as_patient(resource)
        .and_then(|p| p.active)
        .map(|active| IndexValue::Token {
            system: None,
            code: active.to_string(),
        })
        .into_iter()
        .collect()
}

fn patient_identifier(resource: &Resource) -> Vec<IndexValue> {
    as_patient(resource)
        .map(|p| {
            p.identifier
                .iter()
                .filter_map(|i| {
                    i.value.clone().map(|code| IndexValue::Token {
                        system: i.system.clone(),
                        code,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn observation_status(resource: &Resource) -> Vec<IndexValue> {
    as_observation(resource)
        .map(|o: &Observation| {
            let status: ObservationStatus = o.status;
            vec![IndexValue::Token {
                system: Some(OBSERVATION_STATUS_SYSTEM.into()),
                code: status.as_str().into(),
            }]
        })
        .unwrap_or_default()
}

fn observation_code(resource: &Resource) -> Vec<IndexValue> {
    as_observation(resource)
        .map(|o| {
            o.code
                .coding
                .iter()
                .filter_map(|c| {
                    c.code.clone().map(|code| IndexValue::Token {
                        system: c.system.clone(),
                        code,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn observation_subject(resource: &Resource) -> Vec<IndexValue> {
    as_observation(resource)
        .and_then(|o| o.subject.as_ref())
        .and_then(|s| s.type_and_id())
        .map(|(kind, id)| IndexValue::Reference {
            kind: Some(kind.to_owned()),
            id: id.to_owned(),
        })
        .into_iter()
        .collect()
}

fn observation_date(resource: &Resource) -> Vec<IndexValue> {
    as_observation(resource)
        .and_then(|o| o.effective_date_time)
        .map(|dt| IndexValue::Date(dt.range()))
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fhir::{CodeableConcept, HumanName, Reference};

    #[test]
    fn registry_rows_follow_kind_order() {
        for kind in ResourceKind::ALL {
            assert_eq!(definition(kind).kind, kind);
        }
    }

    #[test]
    fn token_domains_match_value_sets() {
        let genders: Vec<&str> = AdministrativeGender::ALL.iter().map(|g| g.as_str()).collect();
        assert_eq!(genders, GENDER_DOMAIN);

        let statuses: Vec<&str> = ObservationStatus::ALL.iter().map(|s| s.as_str()).collect();
        assert_eq!(statuses, OBSERVATION_STATUS_DOMAIN);
    }

    #[test]
    fn patient_name_needs_family_or_given() {
        let patient = Resource::Patient(Patient {
            name: vec![
                HumanName {
                    family: Some("Smith".into()),
                    ..Default::default()
                },
                HumanName {
                    text: Some("J. Smith".into()),
                    ..Default::default()
                },
            ],
            ..Default::default()
        });

        let err = (definition(ResourceKind::Patient).structural_rules)(&patient).unwrap_err();
        assert_eq!(err.path(), "name[1]");
    }

    fn observation() -> Observation {
        Observation {
            id: None,
            meta: None,
            status: ObservationStatus::Final,
            code: CodeableConcept {
                coding: Vec::new(),
                text: Some("Heart rate".into()),
            },
            subject: None,
            effective_date_time: None,
            value_quantity: None,
            value_string: None,
        }
    }

    #[test]
    fn observation_cardinality_rules() {
        let rules = definition(ResourceKind::Observation).structural_rules;

        let mut both = observation();
        both.value_quantity = Some(Default::default());
        both.value_string = Some("72".into());
        assert_eq!(rules(&both.into()).unwrap_err().path(), "value[x]");

        let mut no_code = observation();
        no_code.code.text = None;
        assert_eq!(rules(&no_code.into()).unwrap_err().path(), "code");

        let mut bad_subject = observation();
        bad_subject.subject = Some(Reference {
            reference: Some("p1".into()),
            display: None,
        });
        assert_eq!(
            rules(&bad_subject.into()).unwrap_err().path(),
            "subject.reference"
        );

        assert!(rules(&observation().into()).is_ok());
    }

    #[test]
    fn name_index_covers_all_parts() {
        let patient = Resource::Patient(Patient {
            name: vec![HumanName {
                family: Some("Smith".into()),
                given: vec!["Jane".into(), "Ann".into()],
                text: Some("Jane Smith".into()),
                ..Default::default()
            }],
            ..Default::default()
        });

        let values = (definition(ResourceKind::Patient)
            .search_param("name")
            .unwrap()
            .extract)(&patient);
        assert_eq!(values.len(), 4);
    }
}
