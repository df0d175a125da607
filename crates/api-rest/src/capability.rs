//! Minimal CapabilityStatement, generated from the kind registry and loaded profiles.

use chrono::Utc;
use frs_core::registry::REGISTRY;
use frs_core::ProfileSet;
use serde_json::{json, Value};

use crate::headers::FHIR_JSON;

const INTERACTIONS: [&str; 7] = [
    "read",
    "vread",
    "update",
    "delete",
    "history-instance",
    "create",
    "search-type",
];

pub fn capability_statement(profiles: &ProfileSet) -> Value {
    let resources: Vec<Value> = REGISTRY
        .iter()
        .map(|definition| {
            let kind = definition.kind;
            let search_params: Vec<Value> = definition
                .search_params
                .iter()
                .map(|param| {
                    json!({
                        "name": param.name,
                        "type": param.param_type.as_str(),
                        "documentation": param.description,
                    })
                })
                .collect();
            let interactions: Vec<Value> =
                INTERACTIONS.iter().map(|code| json!({"code": code})).collect();
            let supported_profiles: Vec<&str> = profiles
                .iter()
                .filter(|p| p.kind() == kind)
                .map(|p| p.url())
                .collect();

            let mut resource = json!({
                "type": kind.as_str(),
                "interaction": interactions,
                "versioning": "versioned",
                "readHistory": true,
                "updateCreate": false,
                "conditionalCreate": false,
                "conditionalUpdate": false,
                "conditionalDelete": "not-supported",
                "searchParam": search_params,
            });
            if !supported_profiles.is_empty() {
                resource["supportedProfile"] = json!(supported_profiles);
            }
            resource
        })
        .collect();

    json!({
        "resourceType": "CapabilityStatement",
        "status": "active",
        "date": Utc::now().to_rfc3339(),
        "kind": "instance",
        "software": {
            "name": "frs",
            "version": env!("CARGO_PKG_VERSION"),
        },
        "fhirVersion": "4.0.1",
        "format": [FHIR_JSON, "json"],
        "rest": [{
            "mode": "server",
            "resource": resources,
        }],
    })
}
