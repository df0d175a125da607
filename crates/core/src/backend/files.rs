//! Append-only JSON files in sharded directories.
//!
//! ```text
//! <root>/
//! └── Patient/
//!     └── 3f/                  # first two hex characters of SHA-256(id)
//!         └── a9/              # next two
//!             └── p1/
//!                 ├── 1.json
//!                 └── 2.json
//! ```
//!
//! Shard segments come from the SHA-256 of the id, not from the id itself. A version is written
//! to a uniquely named hidden temp file and hard-linked into place; an existing version file is
//! never replaced, even by another process sharing the directory. The temp file is always
//! removed afterwards.
//!
//! Loading is strict: any `.json` file in a resource directory that cannot be read, parsed or
//! matched to its path fails the load with [`BackendError::Inconsistent`].

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fhir::{ResourceId, ResourceKind};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::VersionBackend;
use crate::constants::VERSION_FILE_EXTENSION;
use crate::history::VersionRecord;
use crate::{BackendError, BackendResult};

#[derive(Clone, Debug)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    /// Open (creating if needed) a file backend rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::DirCreation`] if `root` cannot be created.
    pub fn new(root: impl Into<PathBuf>) -> BackendResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| BackendError::DirCreation {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns `<root>/<Type>/<s1>/<s2>/<id>/`.
    pub fn resource_dir(&self, kind: ResourceKind, id: &ResourceId) -> PathBuf {
        let digest = hex::encode(Sha256::digest(id.as_str().as_bytes()));
        self.root
            .join(kind.as_str())
            .join(&digest[0..2])
            .join(&digest[2..4])
            .join(id.as_str())
    }

    fn version_path(&self, record: &VersionRecord) -> PathBuf {
        self.resource_dir(record.resource_type, &record.id)
            .join(format!("{}.{}", record.version_id, VERSION_FILE_EXTENSION))
    }

    /// Read one version file and check it belongs where it was found.
    fn read_version_file(
        &self,
        kind: ResourceKind,
        dir_id: &str,
        path: &Path,
    ) -> BackendResult<VersionRecord> {
        let unusable = |reason: String| {
            tracing::error!(path = %path.display(), %reason, "unusable version file");
            BackendError::Inconsistent(format!("{}: {reason}", path.display()))
        };

        let bytes = fs::read(path).map_err(|e| unusable(format!("unreadable ({e})")))?;
        let record: VersionRecord =
            serde_json::from_slice(&bytes).map_err(|e| unusable(format!("corrupt ({e})")))?;

        let file_version = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<u64>().ok());
        if record.resource_type != kind
            || record.id.as_str() != dir_id
            || file_version != Some(record.version_id)
        {
            return Err(unusable(format!(
                "holds {}/{} version {}",
                record.resource_type, record.id, record.version_id
            )));
        }
        Ok(record)
    }
}

fn subdirs(path: &Path) -> BackendResult<Vec<PathBuf>> {
    let iter = match fs::read_dir(path) {
        Ok(iter) => iter,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(BackendError::DirRead {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    Ok(iter
        .flatten()
        .map(|entry| entry.path())
        .filter(|p| p.is_dir())
        .collect())
}

fn write_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create_new(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Give `tmp` the name `target`, failing if `target` already exists.
fn publish(tmp: &Path, target: &Path) -> BackendResult<()> {
    match fs::hard_link(tmp, target) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(BackendError::VersionExists {
            path: target.to_path_buf(),
        }),
        Err(source) => Err(BackendError::FileWrite {
            path: target.to_path_buf(),
            source,
        }),
    }
}

impl VersionBackend for FileBackend {
    fn load(&self) -> BackendResult<Vec<VersionRecord>> {
        let mut records = Vec::new();

        for kind in ResourceKind::ALL {
            for s1 in subdirs(&self.root.join(kind.as_str()))? {
                for s2 in subdirs(&s1)? {
                    for resource_dir in subdirs(&s2)? {
                        let Some(dir_id) = resource_dir
                            .file_name()
                            .and_then(|n| n.to_str())
                            .map(str::to_owned)
                        else {
                            continue;
                        };

                        let files =
                            fs::read_dir(&resource_dir).map_err(|source| BackendError::DirRead {
                                path: resource_dir.clone(),
                                source,
                            })?;
                        for file in files.flatten() {
                            let path = file.path();
                            if path.extension().and_then(|e| e.to_str())
                                != Some(VERSION_FILE_EXTENSION)
                            {
                                continue;
                            }
                            records.push(self.read_version_file(kind, &dir_id, &path)?);
                        }
                    }
                }
            }
        }

        tracing::info!(root = %self.root.display(), versions = records.len(), "loaded version files");
        Ok(records)
    }

    fn append(&self, record: &Arc<VersionRecord>) -> BackendResult<()> {
        let dir = self.resource_dir(record.resource_type, &record.id);
        fs::create_dir_all(&dir).map_err(|source| BackendError::DirCreation {
            path: dir.clone(),
            source,
        })?;

        let target = self.version_path(record);
        let bytes = serde_json::to_vec_pretty(record.as_ref()).map_err(BackendError::Serialization)?;
        let tmp = dir.join(format!(".{}-{}.tmp", record.version_id, Uuid::new_v4().simple()));

        let result = write_file(&tmp, &bytes)
            .map_err(|source| BackendError::FileWrite {
                path: tmp.clone(),
                source,
            })
            .and_then(|()| publish(&tmp, &target));

        if let Err(e) = fs::remove_file(&tmp) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %tmp.display(), error = %e, "failed to remove temp file");
            }
        }
        result
    }
}
