//! Audit trail of mutations.
//!
//! The store reports every successful create, update and delete to an [`AuditSink`] after the
//! change is committed. Sinks are fire-and-forget: they cannot fail the operation.

use chrono::{DateTime, Utc};
use fhir::{ResourceId, ResourceKind};
use frs_types::{NonEmptyText, TextError};
use parking_lot::Mutex;

use crate::constants::DEFAULT_ACTOR;
use crate::history::VersionOperation;

/// Who performed a mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Actor(String);

impl Actor {
    /// # Errors
    ///
    /// Returns [`TextError::Empty`] if `name` is empty or whitespace-only.
    pub fn new(name: impl AsRef<str>) -> Result<Self, TextError> {
        NonEmptyText::new(name).map(|text| Self(text.as_str().to_owned()))
    }

    pub fn anonymous() -> Self {
        Self(DEFAULT_ACTOR.to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuditEvent {
    pub resource_type: ResourceKind,
    pub id: ResourceId,
    pub version_id: u64,
    pub operation: VersionOperation,
    pub actor: String,
    pub at: DateTime<Utc>,
}

pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent);
}

/// Writes one structured `tracing` event per mutation on the `audit` target.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) {
        tracing::info!(
            target: "audit",
            resource_type = %event.resource_type,
            id = %event.id,
            version_id = event.version_id,
            operation = %event.operation,
            actor = %event.actor,
            at = %event.at.to_rfc3339(),
            "resource mutated"
        );
    }
}

/// Keeps events in memory, for inspection in tests and tools.
#[derive(Debug, Default)]
pub struct RecordingAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }
}

impl AuditSink for RecordingAuditSink {
    fn record(&self, event: &AuditEvent) {
        self.events.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actor_requires_text() {
        assert!(Actor::new("  ").is_err());
        assert_eq!(Actor::new(" dr-who ").unwrap().as_str(), "dr-who");
        assert_eq!(Actor::anonymous().as_str(), "anonymous");
    }

    #[test]
    fn recording_sink_keeps_events_in_order() {
        let sink = RecordingAuditSink::new();
        for (version, operation) in [(1, VersionOperation::Create), (2, VersionOperation::Delete)] {
            sink.record(&AuditEvent {
                resource_type: ResourceKind::Patient,
                id: ResourceId::parse("p1").unwrap(),
                version_id: version,
                operation,
                actor: "anonymous".into(),
                at: Utc::now(),
            });
        }
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].operation, VersionOperation::Delete);
    }
}
