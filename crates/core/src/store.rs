//! The resource store: one controller for every resource kind.
//!
//! ## Lifecycle
//!
//! ```text
//! NonExistent --create--> Active --update--> Active --delete--> Deleted
//! ```
//!
//! `Deleted` is terminal. Each transition appends one [`VersionRecord`]; a delete appends a
//! tombstone, so earlier versions stay readable.
//!
//! ## Concurrency
//!
//! Every resource id is its own lockable unit, a `Slot`. Each kind keeps an index from id to
//! slot behind a reader/writer lock that is only held to look up, insert or remove a slot.
//!
//! - Writers (create, update, delete) hold the slot's writer mutex across the re-check, the
//!   token comparison and the backend append. Concurrent updates of one id are serialised and a
//!   stale token fails with `ConflictVersion`. Writers of different ids never wait on each other.
//! - The committed history is published as an immutable `Arc<Entry>` and swapped in only after
//!   the append succeeded. Readers clone that `Arc`, so they never wait on a writer's backend
//!   I/O and never see a half-applied version.
//! - Validation runs before any lock is taken.
//! - Search collects the published snapshots under the index read lock, then matches them with
//!   no lock held.

use std::collections::btree_map::Entry as MapEntry;
use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use fhir::{Resource, ResourceId, ResourceKind};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use crate::audit::{Actor, AuditEvent, AuditSink, TracingAuditSink};
use crate::backend::{FileBackend, MemoryBackend, VersionBackend};
use crate::config::StoreConfig;
use crate::constants::ID_ALLOCATION_ATTEMPTS;
use crate::history::{VersionOperation, VersionRecord};
use crate::ids::{IdGenerator, UuidIds};
use crate::registry;
use crate::search::{self, SearchPage};
use crate::validation::Validator;
use crate::{BackendError, StoreError, StoreResult, ValidationError};

/// All committed versions of one resource. Immutable once published.
#[derive(Debug)]
struct Entry {
    current: Arc<VersionRecord>,
    /// Ascending by version id; the last element is `current`.
    versions: Vec<Arc<VersionRecord>>,
}

impl Entry {
    fn first(record: Arc<VersionRecord>) -> Self {
        Self {
            current: record.clone(),
            versions: vec![record],
        }
    }

    /// A new entry with `record` appended; `self` is left untouched for concurrent readers.
    fn followed_by(&self, record: Arc<VersionRecord>) -> Self {
        let mut versions = Vec::with_capacity(self.versions.len() + 1);
        versions.extend(self.versions.iter().cloned());
        versions.push(record.clone());
        Self {
            current: record,
            versions,
        }
    }
}

/// One resource id.
#[derive(Debug, Default)]
struct Slot {
    /// Held by create, update and delete of this id, including the backend append.
    writer: Mutex<()>,
    /// `None` while a create has reserved the id but not yet committed it.
    published: RwLock<Option<Arc<Entry>>>,
}

impl Slot {
    fn with(entry: Entry) -> Self {
        Self {
            writer: Mutex::new(()),
            published: RwLock::new(Some(Arc::new(entry))),
        }
    }

    fn snapshot(&self) -> Option<Arc<Entry>> {
        self.published.read().clone()
    }

    fn publish(&self, entry: Entry) {
        *self.published.write() = Some(Arc::new(entry));
    }
}

type Index = BTreeMap<ResourceId, Arc<Slot>>;

pub struct ResourceStore {
    cfg: Arc<StoreConfig>,
    validator: Validator,
    backend: Arc<dyn VersionBackend>,
    ids: Arc<dyn IdGenerator>,
    audit: Arc<dyn AuditSink>,
    /// Indexed by [`ResourceKind::index`].
    indexes: Vec<RwLock<Index>>,
}

impl std::fmt::Debug for ResourceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceStore")
            .field("cfg", &self.cfg)
            .finish_non_exhaustive()
    }
}

impl ResourceStore {
    /// Build a store and load existing history from `backend`.
    ///
    /// # Arguments
    ///
    /// * `cfg` - Paging and concurrency-token policy.
    /// * `validator` - Validation engine run on create and update.
    /// * `backend` - Where version records are persisted.
    /// * `ids` - Source of candidate ids for create.
    /// * `audit` - Receives one event per successful mutation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the backend cannot be read, or if the versions of a
    /// resource do not run 1, 2, 3, … without gaps or repeats.
    pub fn new(
        cfg: Arc<StoreConfig>,
        validator: Validator,
        backend: Arc<dyn VersionBackend>,
        ids: Arc<dyn IdGenerator>,
        audit: Arc<dyn AuditSink>,
    ) -> StoreResult<Self> {
        let mut loaded: Vec<BTreeMap<ResourceId, Entry>> =
            ResourceKind::ALL.iter().map(|_| BTreeMap::new()).collect();

        let mut records = backend.load()?;
        records.sort_by(|a, b| {
            (a.resource_type, &a.id, a.version_id).cmp(&(b.resource_type, &b.id, b.version_id))
        });
        let total = records.len();
        for record in records {
            let record = Arc::new(record);
            let expected = match loaded[record.resource_type.index()].entry(record.id.clone()) {
                MapEntry::Vacant(slot) if record.version_id == 1 => {
                    slot.insert(Entry::first(record));
                    continue;
                }
                MapEntry::Vacant(_) => 1,
                MapEntry::Occupied(mut slot) => {
                    let entry = slot.get_mut();
                    let expected = entry.current.version_id + 1;
                    if record.version_id == expected {
                        entry.current = record.clone();
                        entry.versions.push(record);
                        continue;
                    }
                    expected
                }
            };
            return Err(BackendError::Inconsistent(format!(
                "{}/{} has version {} where version {expected} was expected",
                record.resource_type, record.id, record.version_id
            ))
            .into());
        }
        tracing::info!(versions = total, "resource store ready");

        let indexes = loaded
            .into_iter()
            .map(|entries| {
                let index: Index = entries
                    .into_iter()
                    .map(|(id, entry)| (id, Arc::new(Slot::with(entry))))
                    .collect();
                RwLock::new(index)
            })
            .collect();

        Ok(Self {
            cfg,
            validator,
            backend,
            ids,
            audit,
            indexes,
        })
    }

    /// A store over the backend named by `cfg` (files when `data_dir` is set, memory
    /// otherwise), with UUID ids and the tracing audit sink.
    pub fn open(cfg: StoreConfig) -> StoreResult<Self> {
        let backend: Arc<dyn VersionBackend> = match cfg.data_dir() {
            Some(dir) => Arc::new(FileBackend::new(dir)?),
            None => Arc::new(MemoryBackend::new()),
        };
        let validator = Validator::new(cfg.profiles().clone());
        Self::new(
            Arc::new(cfg),
            validator,
            backend,
            Arc::new(UuidIds),
            Arc::new(TracingAuditSink),
        )
    }

    pub fn config(&self) -> &StoreConfig {
        &self.cfg
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    fn index(&self, kind: ResourceKind) -> &RwLock<Index> {
        &self.indexes[kind.index()]
    }

    fn slot(&self, kind: ResourceKind, id: &ResourceId) -> Option<Arc<Slot>> {
        self.index(kind).read().get(id).cloned()
    }

    fn snapshot(&self, kind: ResourceKind, id: &ResourceId) -> Option<Arc<Entry>> {
        self.slot(kind, id)?.snapshot()
    }

    /// Create a new resource of `kind`.
    ///
    /// # Arguments
    ///
    /// * `actor` - Who is creating the resource; recorded in the version and audit event.
    /// * `kind` - Kind named by the request.
    /// * `candidate` - JSON body. Must not carry an `id`.
    ///
    /// # Returns
    ///
    /// The stored resource with server-assigned `id`, `meta.versionId = "1"` and
    /// `meta.lastUpdated`.
    ///
    /// # Errors
    ///
    /// - `InvalidState` if the body already has an id, or no free id could be allocated.
    /// - `SchemaViolation` at `resourceType` if the body is a different kind.
    /// - Any validation error.
    /// - `Backend` if the version could not be persisted.
    pub fn create(
        &self,
        actor: &Actor,
        kind: ResourceKind,
        candidate: &Value,
    ) -> StoreResult<Resource> {
        if candidate.get("id").is_some_and(|id| !id.is_null()) {
            return Err(StoreError::InvalidState(
                "a resource to be created must not have an id".into(),
            ));
        }
        check_body_kind(kind, candidate)?;
        let mut resource = self.validator.check(candidate)?;

        let slot = Arc::new(Slot::default());
        let writer = slot.writer.lock();
        let id = self.reserve_id(kind, &slot)?;

        let now = Utc::now();
        resource.stamp(id.clone(), 1, now);
        let record = Arc::new(VersionRecord {
            resource_type: kind,
            id: id.clone(),
            version_id: 1,
            last_updated: now,
            operation: VersionOperation::Create,
            actor: actor.to_string(),
            resource: Some(resource.clone()),
        });
        if let Err(e) = self.backend.append(&record) {
            self.index(kind).write().remove(&id);
            return Err(e.into());
        }
        slot.publish(Entry::first(record.clone()));
        drop(writer);

        tracing::debug!(kind = %kind, id = %record.id, version = 1, "created resource");
        self.emit(&record);
        Ok(resource)
    }

    /// Pick an unused id and insert `slot` under it. Readers treat the slot as absent until
    /// its first version is published.
    fn reserve_id(&self, kind: ResourceKind, slot: &Arc<Slot>) -> StoreResult<ResourceId> {
        let mut index = self.index(kind).write();
        for _ in 0..ID_ALLOCATION_ATTEMPTS {
            let id = self.ids.next_id()?;
            if let MapEntry::Vacant(free) = index.entry(id.clone()) {
                free.insert(slot.clone());
                return Ok(id);
            }
            tracing::debug!(id = %id, "generated id already in use, retrying");
        }
        Err(StoreError::InvalidState(format!(
            "could not allocate an unused id after {ID_ALLOCATION_ATTEMPTS} attempts"
        )))
    }

    /// Current version of `kind/id`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the id was never created, `Gone` if it has been deleted.
    pub fn read(&self, kind: ResourceKind, id: &str) -> StoreResult<Resource> {
        let record = self.current(kind, id)?;
        match &record.resource {
            Some(resource) => Ok(resource.clone()),
            None => Err(gone(kind, id)),
        }
    }

    /// The current version record of `kind/id`, tombstone included.
    pub fn current(&self, kind: ResourceKind, id: &str) -> StoreResult<Arc<VersionRecord>> {
        let parsed = parse_id(kind, id)?;
        self.snapshot(kind, &parsed)
            .map(|entry| entry.current.clone())
            .ok_or_else(|| not_found(kind, id))
    }

    /// A specific historical version of `kind/id`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the id or the version does not exist, `Gone` for the tombstone version.
    pub fn read_version(
        &self,
        kind: ResourceKind,
        id: &str,
        version_id: u64,
    ) -> StoreResult<Resource> {
        let record = self.version(kind, id, version_id)?;
        match &record.resource {
            Some(resource) => Ok(resource.clone()),
            None => Err(gone(kind, id)),
        }
    }

    /// A specific version record of `kind/id`, tombstone included.
    pub fn version(
        &self,
        kind: ResourceKind,
        id: &str,
        version_id: u64,
    ) -> StoreResult<Arc<VersionRecord>> {
        let parsed = parse_id(kind, id)?;
        let entry = self
            .snapshot(kind, &parsed)
            .ok_or_else(|| not_found(kind, id))?;
        entry
            .versions
            .iter()
            .find(|v| v.version_id == version_id)
            .cloned()
            .ok_or_else(|| StoreError::VersionNotFound {
                kind,
                id: id.to_owned(),
                version: version_id,
            })
    }

    /// Replace the current version of `kind/id`.
    ///
    /// # Arguments
    ///
    /// * `actor` - Who is updating the resource.
    /// * `kind` - Kind named by the request.
    /// * `id` - Id named by the request; a body id, if present, must match.
    /// * `candidate` - JSON body.
    /// * `token` - Version the client last read (`If-Match`).
    ///
    /// # Errors
    ///
    /// - `NotFound` / `Gone` for a missing or deleted resource.
    /// - `InvalidState` if the body id differs from `id`.
    /// - Any validation error.
    /// - `ConflictVersion` if `token` does not match the current version, or is absent while
    ///   the store requires one.
    pub fn update(
        &self,
        actor: &Actor,
        kind: ResourceKind,
        id: &str,
        candidate: &Value,
        token: Option<u64>,
    ) -> StoreResult<Resource> {
        let parsed = parse_id(kind, id)?;
        let slot = self.slot(kind, &parsed).ok_or_else(|| not_found(kind, id))?;
        active(kind, id, &slot)?;

        match candidate.get("id") {
            Some(Value::String(body_id)) if body_id != id => {
                return Err(StoreError::InvalidState(format!(
                    "body id '{body_id}' does not match '{id}'"
                )));
            }
            _ => {}
        }
        check_body_kind(kind, candidate)?;
        let mut resource = self.validator.check(candidate)?;

        let writer = slot.writer.lock();
        let entry = active(kind, id, &slot)?;
        let current = entry.current.version_id;
        let token_ok = match token {
            Some(expected) => expected == current,
            None => !self.cfg.require_version_token(),
        };
        if !token_ok {
            return Err(StoreError::ConflictVersion {
                kind,
                id: id.to_owned(),
                expected: token,
                current,
            });
        }

        let version_id = current + 1;
        let now = Utc::now();
        resource.stamp(parsed.clone(), version_id, now);
        let record = Arc::new(VersionRecord {
            resource_type: kind,
            id: parsed,
            version_id,
            last_updated: now,
            operation: VersionOperation::Update,
            actor: actor.to_string(),
            resource: Some(resource.clone()),
        });
        self.backend.append(&record)?;
        slot.publish(entry.followed_by(record.clone()));
        drop(writer);

        tracing::debug!(kind = %kind, id = %id, version = version_id, "updated resource");
        self.emit(&record);
        Ok(resource)
    }

    /// Delete `kind/id` by appending a tombstone version.
    ///
    /// # Returns
    ///
    /// The version id of the tombstone.
    ///
    /// # Errors
    ///
    /// `NotFound` if the id was never created, `Gone` if it is already deleted.
    pub fn delete(&self, actor: &Actor, kind: ResourceKind, id: &str) -> StoreResult<u64> {
        let parsed = parse_id(kind, id)?;
        let slot = self.slot(kind, &parsed).ok_or_else(|| not_found(kind, id))?;

        let writer = slot.writer.lock();
        let entry = active(kind, id, &slot)?;
        let version_id = entry.current.version_id + 1;
        let record = Arc::new(VersionRecord {
            resource_type: kind,
            id: parsed,
            version_id,
            last_updated: Utc::now(),
            operation: VersionOperation::Delete,
            actor: actor.to_string(),
            resource: None,
        });
        self.backend.append(&record)?;
        slot.publish(entry.followed_by(record.clone()));
        drop(writer);

        tracing::debug!(kind = %kind, id = %id, version = version_id, "deleted resource");
        self.emit(&record);
        Ok(version_id)
    }

    /// Every version of `kind/id`, newest first, tombstone included.
    ///
    /// # Errors
    ///
    /// `NotFound` if the id was never created.
    pub fn history(&self, kind: ResourceKind, id: &str) -> StoreResult<Vec<Arc<VersionRecord>>> {
        let parsed = parse_id(kind, id)?;
        let entry = self
            .snapshot(kind, &parsed)
            .ok_or_else(|| not_found(kind, id))?;
        Ok(entry.versions.iter().rev().cloned().collect())
    }

    /// Search current, non-deleted resources of `kind`.
    ///
    /// # Arguments
    ///
    /// * `kind` - Kind to search.
    /// * `params` - Raw `(name, value)` query parameters, including `_count` and `_offset`.
    ///
    /// # Errors
    ///
    /// `UnsupportedParameter` for unknown names or modifiers, `SchemaViolation` for values that
    /// cannot be resolved.
    pub fn search(&self, kind: ResourceKind, params: &[(String, String)]) -> StoreResult<SearchPage> {
        let query = search::resolve(
            registry::definition(kind),
            params,
            self.cfg.default_page_size(),
            self.cfg.max_page_size(),
        )?;

        let snapshots: Vec<Arc<Entry>> = self
            .index(kind)
            .read()
            .values()
            .filter_map(|slot| slot.snapshot())
            .collect();

        let matches: Vec<&Resource> = snapshots
            .iter()
            .filter_map(|entry| entry.current.resource.as_ref())
            .filter(|resource| query.matches(resource))
            .collect();

        let total = matches.len();
        let resources: Vec<Resource> = matches
            .into_iter()
            .skip(query.offset)
            .take(query.count)
            .cloned()
            .collect();

        let end = query.offset.saturating_add(query.count);
        let next_offset = (query.count > 0 && end < total).then_some(end);
        tracing::debug!(kind = %kind, total, returned = resources.len(), "search complete");

        Ok(SearchPage {
            resources,
            total,
            offset: query.offset,
            count: query.count,
            next_offset,
        })
    }

    fn emit(&self, record: &VersionRecord) {
        self.audit.record(&AuditEvent {
            resource_type: record.resource_type,
            id: record.id.clone(),
            version_id: record.version_id,
            operation: record.operation,
            actor: record.actor.clone(),
            at: record.last_updated,
        });
    }
}

/// The published entry of `slot`, failing for a reserved or deleted resource.
fn active(kind: ResourceKind, id: &str, slot: &Slot) -> StoreResult<Arc<Entry>> {
    match slot.snapshot() {
        None => Err(not_found(kind, id)),
        Some(entry) if entry.current.is_tombstone() => Err(gone(kind, id)),
        Some(entry) => Ok(entry),
    }
}

fn not_found(kind: ResourceKind, id: &str) -> StoreError {
    StoreError::NotFound {
        kind,
        id: id.to_owned(),
    }
}

fn gone(kind: ResourceKind, id: &str) -> StoreError {
    StoreError::Gone {
        kind,
        id: id.to_owned(),
    }
}

/// Ids outside the FHIR grammar cannot exist in the store.
fn parse_id(kind: ResourceKind, id: &str) -> StoreResult<ResourceId> {
    ResourceId::parse(id).map_err(|_| not_found(kind, id))
}

fn check_body_kind(kind: ResourceKind, candidate: &Value) -> StoreResult<()> {
    if let Some(Value::String(name)) = candidate.get("resourceType") {
        if let Ok(body_kind) = name.parse::<ResourceKind>() {
            if body_kind != kind {
                return Err(ValidationError::schema(
                    "resourceType",
                    format!("body is a {body_kind} but the request targets {kind}"),
                )
                .into());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::RecordingAuditSink;
    use crate::ids::SequentialIds;
    use crate::profile::ProfileSet;
    use crate::ErrorKind;
    use serde_json::json;

    struct Harness {
        store: ResourceStore,
        audit: Arc<RecordingAuditSink>,
        backend: Arc<MemoryBackend>,
    }

    fn harness(cfg: StoreConfig) -> Harness {
        let audit = Arc::new(RecordingAuditSink::new());
        let backend = Arc::new(MemoryBackend::new());
        let store = ResourceStore::new(
            Arc::new(cfg),
            Validator::default(),
            backend.clone(),
            Arc::new(SequentialIds::new("p")),
            audit.clone(),
        )
        .unwrap();
        Harness {
            store,
            audit,
            backend,
        }
    }

    fn actor() -> Actor {
        Actor::new("dr-who").unwrap()
    }

    fn smith() -> Value {
        json!({
            "resourceType": "Patient",
            "name": [{"family": "Smith", "given": ["Jane"]}],
            "gender": "female"
        })
    }

    #[test]
    fn create_assigns_id_version_and_timestamp() {
        let h = harness(StoreConfig::default());
        let created = h.store.create(&actor(), ResourceKind::Patient, &smith()).unwrap();

        assert_eq!(created.id().map(|id| id.as_str()), Some("p1"));
        assert_eq!(created.version_id(), Some(1));
        assert!(created.last_updated().is_some());
        assert_eq!(h.store.read(ResourceKind::Patient, "p1").unwrap(), created);
    }

    #[test]
    fn create_rejects_client_ids_and_mismatched_kinds() {
        let h = harness(StoreConfig::default());

        let mut with_id = smith();
        with_id["id"] = json!("mine");
        let err = h.store.create(&actor(), ResourceKind::Patient, &with_id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        let err = h
            .store
            .create(&actor(), ResourceKind::Observation, &smith())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaViolation);
        assert_eq!(err.location().as_deref(), Some("resourceType"));

        assert!(h.backend.load().unwrap().is_empty());
        assert!(h.audit.events().is_empty());
    }

    #[test]
    fn create_ignores_client_meta_but_keeps_profiles() {
        let h = harness(StoreConfig::default());
        let mut body = smith();
        body["meta"] = json!({"versionId": "41", "profile": ["https://example.org/p"]});

        let created = h.store.create(&actor(), ResourceKind::Patient, &body).unwrap();
        assert_eq!(created.version_id(), Some(1));
        assert_eq!(created.claimed_profiles(), ["https://example.org/p".to_string()]);
    }

    /// Always proposes the same id.
    struct Stuck;

    impl IdGenerator for Stuck {
        fn next_id(&self) -> Result<ResourceId, frs_types::IdError> {
            ResourceId::parse("same")
        }
    }

    #[test]
    fn id_allocation_gives_up_after_repeated_collisions() {
        let store = ResourceStore::new(
            Arc::new(StoreConfig::default()),
            Validator::default(),
            Arc::new(MemoryBackend::new()),
            Arc::new(Stuck),
            Arc::new(RecordingAuditSink::new()),
        )
        .unwrap();
        store.create(&actor(), ResourceKind::Patient, &smith()).unwrap();
        let err = store.create(&actor(), ResourceKind::Patient, &smith()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn update_requires_matching_token() {
        let h = harness(StoreConfig::default());
        h.store.create(&actor(), ResourceKind::Patient, &smith()).unwrap();
        let body = json!({"resourceType": "Patient", "gender": "other"});

        for token in [None, Some(7)] {
            let err = h
                .store
                .update(&actor(), ResourceKind::Patient, "p1", &body, token)
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ConflictVersion);
        }

        let updated = h
            .store
            .update(&actor(), ResourceKind::Patient, "p1", &body, Some(1))
            .unwrap();
        assert_eq!(updated.version_id(), Some(2));
        assert_eq!(updated.id().map(|id| id.as_str()), Some("p1"));
    }

    #[test]
    fn update_without_token_when_tokens_are_optional() {
        let cfg = StoreConfig::new(20, 100, false, None, ProfileSet::default()).unwrap();
        let h = harness(cfg);
        h.store.create(&actor(), ResourceKind::Patient, &smith()).unwrap();
        let updated = h
            .store
            .update(&actor(), ResourceKind::Patient, "p1", &smith(), None)
            .unwrap();
        assert_eq!(updated.version_id(), Some(2));
    }

    #[test]
    fn update_error_precedence() {
        let h = harness(StoreConfig::default());
        let err = h
            .store
            .update(&actor(), ResourceKind::Patient, "p9", &smith(), Some(1))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        h.store.create(&actor(), ResourceKind::Patient, &smith()).unwrap();

        let mut other_id = smith();
        other_id["id"] = json!("p2");
        let err = h
            .store
            .update(&actor(), ResourceKind::Patient, "p1", &other_id, Some(1))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        // Validation is reported before a stale token.
        let invalid = json!({"resourceType": "Patient", "gender": "bogus"});
        let err = h
            .store
            .update(&actor(), ResourceKind::Patient, "p1", &invalid, Some(9))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaViolation);

        h.store.delete(&actor(), ResourceKind::Patient, "p1").unwrap();
        let err = h
            .store
            .update(&actor(), ResourceKind::Patient, "p1", &smith(), Some(2))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Gone);
    }

    #[test]
    fn delete_appends_a_tombstone() {
        let h = harness(StoreConfig::default());
        h.store.create(&actor(), ResourceKind::Patient, &smith()).unwrap();

        assert_eq!(h.store.delete(&actor(), ResourceKind::Patient, "p1").unwrap(), 2);
        assert_eq!(
            h.store.read(ResourceKind::Patient, "p1").unwrap_err().kind(),
            ErrorKind::Gone
        );
        assert_eq!(
            h.store.delete(&actor(), ResourceKind::Patient, "p1").unwrap_err().kind(),
            ErrorKind::Gone
        );
        assert_eq!(
            h.store.read_version(ResourceKind::Patient, "p1", 2).unwrap_err().kind(),
            ErrorKind::Gone
        );
        assert!(h.store.read_version(ResourceKind::Patient, "p1", 1).is_ok());

        let history = h.store.history(ResourceKind::Patient, "p1").unwrap();
        let versions: Vec<u64> = history.iter().map(|v| v.version_id).collect();
        assert_eq!(versions, vec![2, 1]);
        assert!(history[0].is_tombstone());
    }

    #[test]
    fn lookups_of_unknown_ids() {
        let h = harness(StoreConfig::default());
        for id in ["p404", "not a valid id"] {
            assert_eq!(
                h.store.read(ResourceKind::Patient, id).unwrap_err().kind(),
                ErrorKind::NotFound
            );
            assert_eq!(
                h.store.history(ResourceKind::Patient, id).unwrap_err().kind(),
                ErrorKind::NotFound
            );
        }
        h.store.create(&actor(), ResourceKind::Patient, &smith()).unwrap();
        assert_eq!(
            h.store.read_version(ResourceKind::Patient, "p1", 5).unwrap_err().kind(),
            ErrorKind::NotFound
        );
        // Kinds have separate tables.
        assert_eq!(
            h.store.read(ResourceKind::Observation, "p1").unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn every_mutation_is_audited_once() {
        let h = harness(StoreConfig::default());
        h.store.create(&actor(), ResourceKind::Patient, &smith()).unwrap();
        h.store
            .update(&actor(), ResourceKind::Patient, "p1", &smith(), Some(1))
            .unwrap();
        h.store.delete(&Actor::anonymous(), ResourceKind::Patient, "p1").unwrap();

        let events = h.audit.events();
        let ops: Vec<_> = events.iter().map(|e| (e.operation, e.version_id)).collect();
        assert_eq!(
            ops,
            vec![
                (VersionOperation::Create, 1),
                (VersionOperation::Update, 2),
                (VersionOperation::Delete, 3)
            ]
        );
        assert_eq!(events[0].actor, "dr-who");
        assert_eq!(events[2].actor, "anonymous");
    }

    #[test]
    fn search_pages_in_id_order_and_skips_deleted() {
        let cfg = StoreConfig::new(2, 3, true, None, ProfileSet::default()).unwrap();
        let h = harness(cfg);
        for _ in 0..5 {
            h.store.create(&actor(), ResourceKind::Patient, &smith()).unwrap();
        }
        h.store.delete(&actor(), ResourceKind::Patient, "p2").unwrap();

        let page = h.store.search(ResourceKind::Patient, &[]).unwrap();
        assert_eq!(page.total, 4);
        assert_eq!(page.count, 2);
        assert_eq!(page.next_offset, Some(2));
        let ids: Vec<_> = page
            .resources
            .iter()
            .filter_map(|r| r.id().map(|id| id.to_string()))
            .collect();
        assert_eq!(ids, vec!["p1", "p3"]);

        let params = vec![
            ("_count".to_string(), "50".to_string()),
            ("_offset".to_string(), "2".to_string()),
        ];
        let page = h.store.search(ResourceKind::Patient, &params).unwrap();
        assert_eq!(page.count, 3);
        assert_eq!(page.resources.len(), 2);
        assert_eq!(page.next_offset, None);
    }

    #[test]
    fn reload_from_backend_restores_state() {
        let backend = Arc::new(MemoryBackend::new());
        let build = || {
            ResourceStore::new(
                Arc::new(StoreConfig::default()),
                Validator::default(),
                backend.clone(),
                Arc::new(SequentialIds::new("p")),
                Arc::new(RecordingAuditSink::new()),
            )
            .unwrap()
        };

        let first = build();
        first.create(&actor(), ResourceKind::Patient, &smith()).unwrap();
        first.delete(&actor(), ResourceKind::Patient, "p1").unwrap();

        let second = build();
        assert_eq!(
            second.read(ResourceKind::Patient, "p1").unwrap_err().kind(),
            ErrorKind::Gone
        );
        // p1 is taken, so the fresh generator's first id collides and is retried.
        let created = second.create(&actor(), ResourceKind::Patient, &smith()).unwrap();
        assert_eq!(created.id().map(|id| id.as_str()), Some("p2"));
    }

    fn patient_record(id: &str, version_id: u64) -> Arc<VersionRecord> {
        Arc::new(VersionRecord {
            resource_type: ResourceKind::Patient,
            id: ResourceId::parse(id).unwrap(),
            version_id,
            last_updated: Utc::now(),
            operation: VersionOperation::Delete,
            actor: "anonymous".into(),
            resource: None,
        })
    }

    fn open_over(backend: Arc<MemoryBackend>) -> StoreResult<ResourceStore> {
        ResourceStore::new(
            Arc::new(StoreConfig::default()),
            Validator::default(),
            backend,
            Arc::new(SequentialIds::new("p")),
            Arc::new(RecordingAuditSink::new()),
        )
    }

    #[test]
    fn loading_rejects_gaps_in_a_history() {
        let backend = Arc::new(MemoryBackend::new());
        backend.append(&patient_record("p1", 1)).unwrap();
        backend.append(&patient_record("p1", 3)).unwrap();
        let Err(err) = open_over(backend) else {
            panic!("a gap in the history must stop the store from opening");
        };
        assert_eq!(err.kind(), ErrorKind::Backend);
        assert!(err.to_string().contains("version 2 was expected"), "{err}");

        let backend = Arc::new(MemoryBackend::new());
        backend.append(&patient_record("p7", 2)).unwrap();
        assert!(matches!(open_over(backend), Err(e) if e.kind() == ErrorKind::Backend));
    }

    #[test]
    fn failed_create_releases_the_reserved_id() {
        struct Refusing;
        impl VersionBackend for Refusing {
            fn load(&self) -> crate::BackendResult<Vec<VersionRecord>> {
                Ok(Vec::new())
            }
            fn append(&self, record: &Arc<VersionRecord>) -> crate::BackendResult<()> {
                Err(BackendError::Inconsistent(format!("refusing {}", record.id)))
            }
        }

        let audit = Arc::new(RecordingAuditSink::new());
        let store = ResourceStore::new(
            Arc::new(StoreConfig::default()),
            Validator::default(),
            Arc::new(Refusing),
            Arc::new(Stuck),
            audit.clone(),
        )
        .unwrap();

        for _ in 0..2 {
            let err = store.create(&actor(), ResourceKind::Patient, &smith()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Backend);
        }
        assert_eq!(
            store.read(ResourceKind::Patient, "same").unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(store.search(ResourceKind::Patient, &[]).unwrap().total, 0);
        assert!(audit.events().is_empty());
    }

    #[test]
    fn a_resource_is_unchanged_until_its_append_succeeds() {
        struct FailsUpdates(MemoryBackend);
        impl VersionBackend for FailsUpdates {
            fn load(&self) -> crate::BackendResult<Vec<VersionRecord>> {
                self.0.load()
            }
            fn append(&self, record: &Arc<VersionRecord>) -> crate::BackendResult<()> {
                if record.version_id > 1 {
                    return Err(BackendError::Inconsistent("disk full".into()));
                }
                self.0.append(record)
            }
        }

        let store = ResourceStore::new(
            Arc::new(StoreConfig::default()),
            Validator::default(),
            Arc::new(FailsUpdates(MemoryBackend::new())),
            Arc::new(SequentialIds::new("p")),
            Arc::new(RecordingAuditSink::new()),
        )
        .unwrap();
        store.create(&actor(), ResourceKind::Patient, &smith()).unwrap();

        let body = json!({"resourceType": "Patient", "gender": "other"});
        let err = store
            .update(&actor(), ResourceKind::Patient, "p1", &body, Some(1))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Backend);
        assert!(store.delete(&actor(), ResourceKind::Patient, "p1").is_err());

        let created = store.read_version(ResourceKind::Patient, "p1", 1).unwrap();
        assert_eq!(store.read(ResourceKind::Patient, "p1").unwrap(), created);
        assert_eq!(store.history(ResourceKind::Patient, "p1").unwrap().len(), 1);
    }
}
