use std::collections::btree_map::{BTreeMap, Entry};
use std::sync::Arc;

use fhir::{ResourceId, ResourceKind};
use parking_lot::Mutex;

use super::VersionBackend;
use crate::history::VersionRecord;
use crate::{BackendError, BackendResult};

type VersionKey = (ResourceKind, ResourceId, u64);

/// Keeps records in process memory. Nothing survives a restart.
///
/// Records are shared with the store, not copied.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: Mutex<BTreeMap<VersionKey, Arc<VersionRecord>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl VersionBackend for MemoryBackend {
    fn load(&self) -> BackendResult<Vec<VersionRecord>> {
        Ok(self
            .records
            .lock()
            .values()
            .map(|record| record.as_ref().clone())
            .collect())
    }

    fn append(&self, record: &Arc<VersionRecord>) -> BackendResult<()> {
        let key = (record.resource_type, record.id.clone(), record.version_id);
        match self.records.lock().entry(key) {
            Entry::Occupied(_) => {
                Err(BackendError::Inconsistent(format!(
                    "{}/{} version {} already stored",
                    record.resource_type, record.id, record.version_id
                )))
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(record));
                Ok(())
            }
        }
    }
}
