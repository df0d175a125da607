//! OperationOutcome: the error body returned at the HTTP boundary.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Fatal,
    Error,
    Warning,
    Information,
}

/// The subset of the FHIR issue-type value set this server emits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueType {
    Invalid,
    Structure,
    Required,
    Value,
    Invariant,
    Security,
    Login,
    NotSupported,
    NotFound,
    Deleted,
    Conflict,
    Exception,
    Processing,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationOutcomeIssue {
    pub severity: IssueSeverity,
    pub code: IssueType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<String>,

    /// Element paths the issue refers to.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expression: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationOutcome {
    pub resource_type: String,
    pub issue: Vec<OperationOutcomeIssue>,
}

impl OperationOutcome {
    /// A single error issue.
    pub fn error(code: IssueType, diagnostics: impl Into<String>) -> Self {
        Self {
            resource_type: "OperationOutcome".into(),
            issue: vec![OperationOutcomeIssue {
                severity: IssueSeverity::Error,
                code,
                diagnostics: Some(diagnostics.into()),
                expression: Vec::new(),
            }],
        }
    }

    /// Attach an element path to the first issue.
    pub fn with_expression(mut self, path: impl Into<String>) -> Self {
        if let Some(issue) = self.issue.first_mut() {
            issue.expression.push(path.into());
        }
        self
    }

    /// A single informational issue, used for successful deletes.
    pub fn information(diagnostics: impl Into<String>) -> Self {
        Self {
            resource_type: "OperationOutcome".into(),
            issue: vec![OperationOutcomeIssue {
                severity: IssueSeverity::Information,
                code: IssueType::Processing,
                diagnostics: Some(diagnostics.into()),
                expression: Vec::new(),
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serialises_wire_shape() {
        let outcome = OperationOutcome::error(IssueType::NotFound, "Patient/p9 not found")
            .with_expression("Patient.id");
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({
                "resourceType": "OperationOutcome",
                "issue": [{
                    "severity": "error",
                    "code": "not-found",
                    "diagnostics": "Patient/p9 not found",
                    "expression": ["Patient.id"]
                }]
            })
        );
    }
}
