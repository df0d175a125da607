//! Version history records.
//!
//! Every mutation produces exactly one [`VersionRecord`]. Records are append-only: a new
//! version is written next to the old ones, never over them. A delete appends a tombstone,
//! i.e. a record without a resource body.

use chrono::{DateTime, Utc};
use fhir::{Resource, ResourceId, ResourceKind};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionOperation {
    Create,
    Update,
    Delete,
}

impl VersionOperation {
    pub const fn as_str(self) -> &'static str {
        match self {
            VersionOperation::Create => "create",
            VersionOperation::Update => "update",
            VersionOperation::Delete => "delete",
        }
    }

    /// HTTP method that produced this kind of version.
    pub const fn http_method(self) -> &'static str {
        match self {
            VersionOperation::Create => "POST",
            VersionOperation::Update => "PUT",
            VersionOperation::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for VersionOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stored version of one resource.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionRecord {
    pub resource_type: ResourceKind,
    pub id: ResourceId,
    pub version_id: u64,
    pub last_updated: DateTime<Utc>,
    pub operation: VersionOperation,
    pub actor: String,
    /// The snapshot; `None` for a tombstone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<Resource>,
}

impl VersionRecord {
    pub fn is_tombstone(&self) -> bool {
        self.resource.is_none()
    }

    /// `W/"<versionId>"`.
    pub fn etag(&self) -> String {
        format!("W/\"{}\"", self.version_id)
    }
}
