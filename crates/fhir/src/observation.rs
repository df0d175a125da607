//! FHIR Observation resource.

use serde::{Deserialize, Serialize};

use crate::datatypes::{CodeableConcept, FhirDateTime, Meta, Quantity, Reference};
use crate::ResourceId;

/// Observation status value set (required binding).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObservationStatus {
    Registered,
    Preliminary,
    Final,
    Amended,
    Corrected,
    Cancelled,
    EnteredInError,
    Unknown,
}

impl ObservationStatus {
    pub const ALL: [ObservationStatus; 8] = [
        ObservationStatus::Registered,
        ObservationStatus::Preliminary,
        ObservationStatus::Final,
        ObservationStatus::Amended,
        ObservationStatus::Corrected,
        ObservationStatus::Cancelled,
        ObservationStatus::EnteredInError,
        ObservationStatus::Unknown,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            ObservationStatus::Registered => "registered",
            ObservationStatus::Preliminary => "preliminary",
            ObservationStatus::Final => "final",
            ObservationStatus::Amended => "amended",
            ObservationStatus::Corrected => "corrected",
            ObservationStatus::Cancelled => "cancelled",
            ObservationStatus::EnteredInError => "entered-in-error",
            ObservationStatus::Unknown => "unknown",
        }
    }
}

/// Measurements and simple assertions made about a patient.
///
/// `status` and `code` are mandatory (1..1); decoding fails without them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Observation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ResourceId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,

    pub status: ObservationStatus,

    pub code: CodeableConcept,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Reference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_date_time: Option<FhirDateTime>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_quantity: Option<Quantity>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_string: Option<String>,
}
