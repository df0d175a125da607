use fhir::{DateRange, Resource};

use super::resolver::{
    Clause, DateComparator, DateValue, Predicate, ReferenceValue, SearchQuery, StringMode,
    TokenSystem, TokenValue,
};
use crate::registry::IndexValue;

impl SearchQuery {
    /// True when `resource` satisfies every clause.
    pub fn matches(&self, resource: &Resource) -> bool {
        resource.kind() == self.kind && self.clauses.iter().all(|c| c.matches(resource))
    }
}

impl Clause {
    /// True when any indexed value of the resource satisfies any value of the predicate.
    pub fn matches(&self, resource: &Resource) -> bool {
        let indexed = (self.param.extract)(resource);
        let target = self.param.target.map(|k| k.as_str());

        indexed.iter().any(|value| match (&self.predicate, value) {
            (Predicate::String { mode, values }, IndexValue::Text(text)) => {
                values.iter().any(|v| string_matches(*mode, v, text))
            }
            (Predicate::Token(tokens), IndexValue::Token { system, code }) => tokens
                .iter()
                .any(|t| token_matches(t, system.as_deref(), code)),
            (Predicate::Date(dates), IndexValue::Date(range)) => {
                dates.iter().any(|d| date_matches(d, range))
            }
            (Predicate::Reference(refs), IndexValue::Reference { kind, id }) => refs
                .iter()
                .any(|r| reference_matches(r, target, kind.as_deref(), id)),
            _ => false,
        })
    }
}

fn string_matches(mode: StringMode, wanted: &str, text: &str) -> bool {
    match mode {
        StringMode::Exact => text == wanted,
        StringMode::Prefix => text.to_lowercase().starts_with(wanted),
        StringMode::Contains => text.to_lowercase().contains(wanted),
    }
}

fn token_matches(token: &TokenValue, system: Option<&str>, code: &str) -> bool {
    let system_ok = match &token.system {
        TokenSystem::Any => true,
        TokenSystem::Absent => system.is_none(),
        TokenSystem::Exactly(wanted) => system == Some(wanted.as_str()),
    };
    system_ok && token.code.as_deref().map_or(true, |wanted| wanted == code)
}

/// Compares the interval covered by the indexed value against the parameter's interval.
fn date_matches(date: &DateValue, target: &DateRange) -> bool {
    let param = &date.range;
    match date.comparator {
        DateComparator::Eq => param.contains(target),
        DateComparator::Ne => !param.contains(target),
        DateComparator::Gt => target.end > param.end,
        DateComparator::Lt => target.start < param.start,
        DateComparator::Ge => target.end > param.start,
        DateComparator::Le => target.start < param.end,
    }
}

fn reference_matches(
    wanted: &ReferenceValue,
    target: Option<&str>,
    kind: Option<&str>,
    id: &str,
) -> bool {
    if let Some(target) = target {
        if kind != Some(target) {
            return false;
        }
    }
    let kind_ok = match wanted.kind.as_deref() {
        None => true,
        Some(k) => kind == Some(k),
    };
    kind_ok && wanted.id == id
}

#[cfg(test)]
mod tests {
    use crate::registry::definition;
    use crate::search::resolve;
    use fhir::{Resource, ResourceKind};
    use serde_json::json;

    fn query(kind: ResourceKind, pairs: &[(&str, &str)]) -> crate::search::SearchQuery {
        let params: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        resolve(definition(kind), &params, 20, 100).unwrap()
    }

    fn jane() -> Resource {
        Resource::from_value(json!({
            "resourceType": "Patient",
            "id": "p1",
            "active": true,
            "identifier": [{"system": "https://fhir.nhs.uk/Id/nhs-number", "value": "9434765919"}],
            "name": [{"family": "Smith", "given": ["Jane", "Ann"]}],
            "gender": "female",
            "birthDate": "1992-03-20"
        }))
        .unwrap()
    }

    fn heart_rate() -> Resource {
        Resource::from_value(json!({
            "resourceType": "Observation",
            "id": "o1",
            "status": "final",
            "code": {"coding": [{"system": "http://loinc.org", "code": "8867-4"}]},
            "subject": {"reference": "Patient/p1"},
            "effectiveDateTime": "2024-05-01T10:30:00Z"
        }))
        .unwrap()
    }

    fn patient_matches(pairs: &[(&str, &str)]) -> bool {
        query(ResourceKind::Patient, pairs).matches(&jane())
    }

    fn observation_matches(pairs: &[(&str, &str)]) -> bool {
        query(ResourceKind::Observation, pairs).matches(&heart_rate())
    }

    #[test]
    fn string_matching() {
        assert!(patient_matches(&[("name", "smi")]));
        assert!(patient_matches(&[("given", "ANN")]));
        assert!(!patient_matches(&[("family", "mith")]));
        assert!(patient_matches(&[("family:contains", "mith")]));
        assert!(patient_matches(&[("family:exact", "Smith")]));
        assert!(!patient_matches(&[("family:exact", "smith")]));
        assert!(!patient_matches(&[("name", "nobody")]));
    }

    #[test]
    fn or_within_and_across_parameters() {
        assert!(patient_matches(&[("gender", "male,female")]));
        assert!(!patient_matches(&[("gender", "male,other")]));
        assert!(patient_matches(&[("gender", "female"), ("family", "smith")]));
        assert!(!patient_matches(&[("gender", "female"), ("family", "jones")]));
    }

    #[test]
    fn token_matching() {
        assert!(patient_matches(&[("_id", "p1")]));
        assert!(patient_matches(&[("active", "true")]));
        assert!(!patient_matches(&[("active", "false")]));
        assert!(patient_matches(&[("identifier", "9434765919")]));
        assert!(patient_matches(&[(
            "identifier",
            "https://fhir.nhs.uk/Id/nhs-number|9434765919"
        )]));
        assert!(patient_matches(&[("identifier", "https://fhir.nhs.uk/Id/nhs-number|")]));
        assert!(!patient_matches(&[("identifier", "|9434765919")]));
        assert!(patient_matches(&[(
            "gender",
            "http://hl7.org/fhir/administrative-gender|female"
        )]));
    }

    #[test]
    fn date_matching() {
        assert!(patient_matches(&[("birthdate", "1992")]));
        assert!(patient_matches(&[("birthdate", "eq1992-03")]));
        assert!(!patient_matches(&[("birthdate", "1992-04")]));
        assert!(patient_matches(&[("birthdate", "ne1992-04")]));
        assert!(patient_matches(&[("birthdate", "gt1991")]));
        assert!(!patient_matches(&[("birthdate", "gt1992")]));
        assert!(patient_matches(&[("birthdate", "ge1992")]));
        assert!(patient_matches(&[("birthdate", "lt1993-01-01")]));
        assert!(patient_matches(&[("birthdate", "le1992-03-20")]));
        assert!(!patient_matches(&[("birthdate", "lt1992-03-20")]));
        assert!(observation_matches(&[("date", "2024-05-01")]));
    }

    #[test]
    fn reference_matching() {
        assert!(observation_matches(&[("subject", "Patient/p1")]));
        assert!(observation_matches(&[("subject", "p1")]));
        assert!(observation_matches(&[("patient", "p1")]));
        assert!(!observation_matches(&[("subject", "Group/p1")]));
        assert!(!observation_matches(&[("patient", "p2")]));
        assert!(observation_matches(&[("code", "http://loinc.org|8867-4")]));
        assert!(observation_matches(&[("status", "final,amended")]));
    }
}
