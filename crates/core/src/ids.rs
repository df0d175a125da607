//! Resource id generation.
//!
//! The store asks its [`IdGenerator`] for a candidate and retries on collision, so a generator
//! only has to be unlikely to repeat itself, not guaranteed.

use std::sync::atomic::{AtomicU64, Ordering};

use fhir::ResourceId;
use frs_types::IdError;

pub trait IdGenerator: Send + Sync {
    /// Produce a candidate id.
    fn next_id(&self) -> Result<ResourceId, IdError>;
}

/// Random v4 UUIDs in canonical form: 32 lowercase hex characters, no hyphens.
#[derive(Clone, Copy, Debug, Default)]
pub struct UuidIds;

impl IdGenerator for UuidIds {
    fn next_id(&self) -> Result<ResourceId, IdError> {
        ResourceId::parse(&uuid::Uuid::new_v4().simple().to_string())
    }
}

/// `<prefix>1`, `<prefix>2`, ... Deterministic ids for tests and demos.
#[derive(Debug)]
pub struct SequentialIds {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> Result<ResourceId, IdError> {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        ResourceId::parse(&format!("{}{}", self.prefix, n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_ids_are_canonical_hex() {
        let id = UuidIds.next_id().unwrap();
        assert_eq!(id.as_str().len(), 32);
        assert!(id
            .as_str()
            .bytes()
            .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')));
        assert_ne!(id, UuidIds.next_id().unwrap());
    }

    #[test]
    fn sequential_ids_count_from_one() {
        let ids = SequentialIds::new("p");
        assert_eq!(ids.next_id().unwrap().as_str(), "p1");
        assert_eq!(ids.next_id().unwrap().as_str(), "p2");
    }

    #[test]
    fn sequential_ids_reject_an_invalid_prefix() {
        assert!(SequentialIds::new("bad prefix").next_id().is_err());
    }
}
