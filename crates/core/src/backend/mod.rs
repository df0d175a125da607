//! Version backends: where version records live between restarts.
//!
//! The store calls [`VersionBackend::append`] while holding the writer lock of one resource and
//! only publishes the new version in memory once the append has succeeded.

mod files;
mod memory;

pub use files::FileBackend;
pub use memory::MemoryBackend;

use std::sync::Arc;

use crate::history::VersionRecord;
use crate::BackendResult;

pub trait VersionBackend: Send + Sync {
    /// Every stored version record, in no particular order.
    fn load(&self) -> BackendResult<Vec<VersionRecord>>;

    /// Durably store one new version record. Existing versions are never overwritten.
    fn append(&self, record: &Arc<VersionRecord>) -> BackendResult<()>;
}
